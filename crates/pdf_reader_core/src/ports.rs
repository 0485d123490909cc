//! crates/pdf_reader_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture: the reading
//! session only ever talks to stores through them, so it stays independent of
//! PostgreSQL, the blob backend, and the HTTP layer.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Bookmark, Document, DocumentPatch, NewBookmark, NewDocument, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, disk).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Store Ports (Traits)
//=========================================================================================

/// Document metadata rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch_document(&self, document_id: Uuid) -> PortResult<Document>;

    /// Most recently opened first (never-opened last), then newest upload first.
    async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>>;

    async fn update_document(&self, document_id: Uuid, patch: DocumentPatch) -> PortResult<()>;

    async fn insert_document(&self, document: NewDocument) -> PortResult<Document>;
}

/// The binary side of the document store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(&self, key: &str, data: Bytes) -> PortResult<()>;

    async fn get_blob(&self, key: &str) -> PortResult<Bytes>;

    async fn delete_blob(&self, key: &str) -> PortResult<()>;

    /// Returns a URL the viewer can fetch the bytes from. Callers must not assume
    /// it is permanent.
    async fn resolve_content_location(&self, key: &str) -> PortResult<String>;
}

#[async_trait]
pub trait BookmarkStore: Send + Sync {
    /// Sorted by page number ascending.
    async fn list_bookmarks(&self, document_id: Uuid) -> PortResult<Vec<Bookmark>>;

    async fn insert_bookmark(&self, bookmark: NewBookmark) -> PortResult<Bookmark>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Idempotent upsert keyed by `(user_id, document_id)`.
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        current_page: u32,
        total_pages: Option<u32>,
    ) -> PortResult<()>;
}

#[async_trait]
pub trait AuthStore: Send + Sync {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;
}
