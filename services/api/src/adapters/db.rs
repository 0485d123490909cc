//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! metadata-side ports from the `core` crate (documents, bookmarks, reading
//! progress, auth). It handles all interactions with PostgreSQL using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdf_reader_core::domain::{
    Bookmark, Document, DocumentPatch, NewBookmark, NewDocument, ReadingProgress, User,
    UserCredentials,
};
use pdf_reader_core::ports::{
    AuthStore, BookmarkStore, DocumentStore, PortError, PortResult, ProgressStore,
};
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the store ports on top of PostgreSQL.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn to_db_page(page: u32) -> PortResult<i32> {
    i32::try_from(page).map_err(|_| PortError::Unexpected(format!("Page {} is out of range", page)))
}

// Negative values are excluded by CHECK constraints.
fn from_db_page(page: i32) -> u32 {
    page.max(0) as u32
}

const DOCUMENT_COLUMNS: &str = "id, user_id, title, file_name, file_path, file_size, \
     total_pages, current_page, upload_date, last_opened";

const BOOKMARK_COLUMNS: &str = "id, user_id, document_id, page_number, title, note, created_at";

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct DocumentRecord {
    id: Uuid,
    user_id: Uuid,
    title: String,
    file_name: String,
    file_path: String,
    file_size: Option<i64>,
    total_pages: Option<i32>,
    current_page: Option<i32>,
    upload_date: DateTime<Utc>,
    last_opened: Option<DateTime<Utc>>,
}
impl DocumentRecord {
    fn to_domain(self) -> Document {
        Document {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            file_name: self.file_name,
            file_path: self.file_path,
            file_size: self.file_size,
            total_pages: self.total_pages.map(from_db_page),
            current_page: self.current_page.map(from_db_page),
            upload_date: self.upload_date,
            last_opened: self.last_opened,
        }
    }
}

#[derive(FromRow)]
struct BookmarkRecord {
    id: Uuid,
    user_id: Uuid,
    document_id: Uuid,
    page_number: i32,
    title: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}
impl BookmarkRecord {
    fn to_domain(self) -> Bookmark {
        Bookmark {
            id: self.id,
            user_id: self.user_id,
            document_id: self.document_id,
            page_number: from_db_page(self.page_number),
            title: self.title,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl DocumentStore for DbAdapter {
    async fn fetch_document(&self, document_id: Uuid) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Document {} not found", document_id))
            }
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>> {
        let records = sqlx::query_as::<_, DocumentRecord>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE user_id = $1 \
             ORDER BY last_opened DESC NULLS LAST, upload_date DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn update_document(&self, document_id: Uuid, patch: DocumentPatch) -> PortResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let current_page = patch.current_page.map(to_db_page).transpose()?;
        let total_pages = patch.total_pages.map(to_db_page).transpose()?;

        let result = sqlx::query(
            "UPDATE documents SET \
                 current_page = COALESCE($2, current_page), \
                 total_pages = COALESCE($3, total_pages), \
                 last_opened = COALESCE($4, last_opened) \
             WHERE id = $1",
        )
        .bind(document_id)
        .bind(current_page)
        .bind(total_pages)
        .bind(patch.last_opened)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Document {} not found", document_id)));
        }
        debug!(%document_id, ?patch, "Document updated");
        Ok(())
    }

    async fn insert_document(&self, document: NewDocument) -> PortResult<Document> {
        let record = sqlx::query_as::<_, DocumentRecord>(&format!(
            "INSERT INTO documents (id, user_id, title, file_name, file_path, file_size) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(document.user_id)
        .bind(&document.title)
        .bind(&document.file_name)
        .bind(&document.file_path)
        .bind(document.file_size)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl BookmarkStore for DbAdapter {
    async fn list_bookmarks(&self, document_id: Uuid) -> PortResult<Vec<Bookmark>> {
        let records = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE document_id = $1 \
             ORDER BY page_number ASC, created_at ASC"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_bookmark(&self, bookmark: NewBookmark) -> PortResult<Bookmark> {
        let record = sqlx::query_as::<_, BookmarkRecord>(&format!(
            "INSERT INTO bookmarks (id, user_id, document_id, page_number, title, note) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BOOKMARK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(bookmark.user_id)
        .bind(bookmark.document_id)
        .bind(to_db_page(bookmark.page_number)?)
        .bind(&bookmark.title)
        .bind(&bookmark.note)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }
}

#[async_trait]
impl ProgressStore for DbAdapter {
    async fn upsert_progress(
        &self,
        user_id: Uuid,
        document_id: Uuid,
        current_page: u32,
        total_pages: Option<u32>,
    ) -> PortResult<()> {
        let progress = ReadingProgress {
            user_id,
            document_id,
            current_page,
            total_pages,
            last_read: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO reading_progress (user_id, document_id, current_page, total_pages, last_read) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, document_id) DO UPDATE SET \
                 current_page = EXCLUDED.current_page, \
                 total_pages = EXCLUDED.total_pages, \
                 last_read = EXCLUDED.last_read",
        )
        .bind(progress.user_id)
        .bind(progress.document_id)
        .bind(to_db_page(progress.current_page)?)
        .bind(progress.total_pages.map(to_db_page).transpose()?)
        .bind(progress.last_read)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }
}

#[async_trait]
impl AuthStore for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<User> {
        let user_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) RETURNING user_id",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(User {
            user_id,
            email: email.to_string(),
        })
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;

        Ok(UserCredentials {
            user_id: record.user_id,
            email: record.email,
            hashed_password: record.hashed_password,
        })
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
