//! crates/pdf_reader_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database; they only carry `serde`
//! derives so the web layer can hand them to the browser unchanged.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// An uploaded PDF and its reading state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub file_name: String,
    /// Key into the blob namespace.
    pub file_path: String,
    pub file_size: Option<i64>,
    /// Unknown until the viewer has parsed the file at least once.
    pub total_pages: Option<u32>,
    /// `None` when the document has never been read.
    pub current_page: Option<u32>,
    pub upload_date: DateTime<Utc>,
    pub last_opened: Option<DateTime<Utc>>,
}

/// The fields supplied when a freshly uploaded file is recorded.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: Option<i64>,
}

/// A partial update of a `Document`. Fields left as `None` are not touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentPatch {
    pub current_page: Option<u32>,
    pub total_pages: Option<u32>,
    pub last_opened: Option<DateTime<Utc>>,
}

impl DocumentPatch {
    pub fn current_page(page: u32) -> Self {
        Self {
            current_page: Some(page),
            ..Default::default()
        }
    }

    pub fn total_pages(count: u32) -> Self {
        Self {
            total_pages: Some(count),
            ..Default::default()
        }
    }

    pub fn last_opened(at: DateTime<Utc>) -> Self {
        Self {
            last_opened: Some(at),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.current_page.is_none() && self.total_pages.is_none() && self.last_opened.is_none()
    }
}

/// A user-created, page-indexed annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    /// Not checked against the page count; it may point past a total that is not known yet.
    pub page_number: u32,
    pub title: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBookmark {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub page_number: u32,
    pub title: String,
    pub note: Option<String>,
}

/// Per-user, per-document projection of the last read position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingProgress {
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub last_read: DateTime<Utc>,
}

// Represents a user - used throughout app
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

/// Orders bookmarks by ascending page, oldest first within a page.
pub fn sort_bookmarks(bookmarks: &mut [Bookmark]) {
    bookmarks.sort_by(|a, b| {
        a.page_number
            .cmp(&b.page_number)
            .then(a.created_at.cmp(&b.created_at))
    });
}

/// Derives the default display title from an uploaded file name.
pub fn title_from_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim();
    let stem = match trimmed.len().checked_sub(4) {
        Some(cut) if trimmed.is_char_boundary(cut) && trimmed[cut..].eq_ignore_ascii_case(".pdf") => {
            &trimmed[..cut]
        }
        _ => trimmed,
    };
    if stem.is_empty() {
        "Untitled".to_string()
    } else {
        stem.to_string()
    }
}
