//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the document library REST endpoints and the
//! master definition for the OpenAPI specification.

use crate::error::{ApiError, ApiResult};
use crate::web::{auth, state::AppState};
use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use pdf_reader_core::domain::{title_from_file_name, Bookmark, Document, NewDocument};
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_documents_handler,
        upload_document_handler,
        get_document_handler,
        list_bookmarks_handler,
        file_handler,
        health_handler,
        auth::signup_handler,
        auth::login_handler,
        auth::logout_handler,
    ),
    components(
        schemas(DocumentResponse, BookmarkResponse, auth::Credentials, auth::AuthResponse)
    ),
    tags(
        (name = "PDF Reader API", description = "Document library, bookmarks and authentication.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub title: String,
    pub file_name: String,
    pub file_size: Option<i64>,
    pub total_pages: Option<u32>,
    pub current_page: Option<u32>,
    pub upload_date: DateTime<Utc>,
    pub last_opened: Option<DateTime<Utc>>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title,
            file_name: doc.file_name,
            file_size: doc.file_size,
            total_pages: doc.total_pages,
            current_page: doc.current_page,
            upload_date: doc.upload_date,
            last_opened: doc.last_opened,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct BookmarkResponse {
    pub id: Uuid,
    pub page_number: u32,
    pub title: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Bookmark> for BookmarkResponse {
    fn from(b: Bookmark) -> Self {
        Self {
            id: b.id,
            page_number: b.page_number,
            title: b.title,
            note: b.note,
            created_at: b.created_at,
        }
    }
}

//=========================================================================================
// Upload Helpers
//=========================================================================================

/// Accepts a file when either its declared type or its extension says PDF.
pub fn validate_upload(file_name: &str, content_type: Option<&str>, size: usize) -> ApiResult<()> {
    let declared_pdf = content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"));
    let named_pdf = file_name.to_ascii_lowercase().ends_with(".pdf");
    if !declared_pdf && !named_pdf {
        return Err(ApiError::BadRequest("Please select a PDF file".to_string()));
    }
    if size == 0 {
        return Err(ApiError::BadRequest("The uploaded file is empty".to_string()));
    }
    Ok(())
}

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+|\.{2,}").expect("static regex"))
}

/// Builds `{user_id}/{unix_millis}_{file_name}`, with the file name reduced to
/// URL- and path-safe characters.
pub fn storage_key(user_id: Uuid, unix_millis: i64, file_name: &str) -> String {
    let trimmed = file_name.trim().trim_matches('.');
    let cleaned = if trimmed.is_empty() {
        "document.pdf".to_string()
    } else {
        unsafe_chars().replace_all(trimmed, "_").into_owned()
    };
    format!("{}/{}_{}", user_id, unix_millis, cleaned)
}

/// A document is only visible to its owner; anyone else gets "not found".
async fn owned_document(state: &AppState, user_id: Uuid, document_id: Uuid) -> ApiResult<Document> {
    let doc = state.documents.fetch_document(document_id).await?;
    if doc.user_id != user_id {
        return Err(ApiError::NotFound(format!("Document {} not found", document_id)));
    }
    Ok(doc)
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's documents, most recently opened first.
#[utoipa::path(
    get,
    path = "/documents",
    responses(
        (status = 200, description = "The caller's library", body = [DocumentResponse]),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> ApiResult<Json<Vec<DocumentResponse>>> {
    let documents = state.documents.list_documents(user_id).await?;
    Ok(Json(documents.into_iter().map(DocumentResponse::from).collect()))
}

/// Upload a PDF.
///
/// Accepts a multipart/form-data request; the first part carrying a file name
/// is stored.
#[utoipa::path(
    post,
    path = "/documents",
    request_body(content_type = "multipart/form-data", description = "The PDF to upload."),
    responses(
        (status = 201, description = "Document uploaded", body = DocumentResponse),
        (status = 400, description = "Missing file or not a PDF"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn upload_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut upload: Option<(String, Option<String>, Bytes)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read multipart data: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read file bytes: {e}")))?;
        upload = Some((file_name, content_type, data));
        break;
    }

    let (file_name, content_type, data) = upload
        .ok_or_else(|| ApiError::BadRequest("Multipart form must include a file".to_string()))?;
    validate_upload(&file_name, content_type.as_deref(), data.len())?;

    let key = storage_key(user_id, Utc::now().timestamp_millis(), &file_name);
    let file_size = i64::try_from(data.len()).ok();
    state.blobs.put_blob(&key, data).await?;

    let new_document = NewDocument {
        user_id,
        title: title_from_file_name(&file_name),
        file_name,
        file_path: key.clone(),
        file_size,
    };

    match state.documents.insert_document(new_document).await {
        Ok(doc) => {
            info!(document_id = %doc.id, %user_id, "Document uploaded");
            Ok((StatusCode::CREATED, Json(DocumentResponse::from(doc))))
        }
        Err(e) => {
            error!(key = %key, "Failed to record uploaded document: {:?}", e);
            if let Err(cleanup) = state.blobs.delete_blob(&key).await {
                warn!(key = %key, "Uploaded blob left without metadata: {:?}", cleanup);
            }
            Err(e.into())
        }
    }
}

/// Fetch one document's metadata.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Document metadata", body = DocumentResponse),
        (status = 404, description = "No such document")
    )
)]
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<DocumentResponse>> {
    let doc = owned_document(&state, user_id, document_id).await?;
    Ok(Json(doc.into()))
}

/// List a document's bookmarks in page order.
#[utoipa::path(
    get,
    path = "/documents/{id}/bookmarks",
    params(("id" = Uuid, Path, description = "Document id")),
    responses(
        (status = 200, description = "Bookmarks, page ascending", body = [BookmarkResponse]),
        (status = 404, description = "No such document")
    )
)]
pub async fn list_bookmarks_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<Vec<BookmarkResponse>>> {
    owned_document(&state, user_id, document_id).await?;
    let bookmarks = state.bookmarks.list_bookmarks(document_id).await?;
    Ok(Json(bookmarks.into_iter().map(BookmarkResponse::from).collect()))
}

/// Serve the bytes of a stored PDF to its owner.
#[utoipa::path(
    get,
    path = "/files/{key}",
    params(("key" = String, Path, description = "Storage key")),
    responses(
        (status = 200, description = "PDF bytes"),
        (status = 404, description = "No such file")
    )
)]
pub async fn file_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let owner = user_id.to_string();
    if key.split('/').next() != Some(owner.as_str()) {
        return Err(ApiError::NotFound(format!("File {} not found", key)));
    }
    let data = state.blobs.get_blob(&key).await?;
    Ok(([(header::CONTENT_TYPE, "application/pdf")], data))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up"))
)]
pub async fn health_handler() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_uploads_are_accepted_by_type_or_extension() {
        assert!(validate_upload("paper.pdf", None, 10).is_ok());
        assert!(validate_upload("PAPER.PDF", Some("application/octet-stream"), 10).is_ok());
        assert!(validate_upload("scan", Some("application/pdf"), 10).is_ok());
    }

    #[test]
    fn non_pdf_and_empty_uploads_are_rejected() {
        assert!(matches!(
            validate_upload("notes.txt", Some("text/plain"), 10),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate_upload("paper.pdf", Some("application/pdf"), 0),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn storage_key_is_scoped_and_sanitized() {
        let user = Uuid::nil();
        let key = storage_key(user, 1_700_000_000_000, "My Thesis (final).pdf");
        assert_eq!(
            key,
            "00000000-0000-0000-0000-000000000000/1700000000000_My_Thesis_final_.pdf"
        );

        let key = storage_key(user, 1, "../../etc/passwd");
        assert!(!key.contains(".."));
        assert_eq!(key.matches('/').count(), 1);

        assert!(storage_key(user, 1, "...").ends_with("_document.pdf"));
    }

    #[test]
    fn document_response_hides_storage_path() {
        let doc = Document {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Paper".to_string(),
            file_name: "Paper.pdf".to_string(),
            file_path: "u/1_Paper.pdf".to_string(),
            file_size: Some(2048),
            total_pages: None,
            current_page: None,
            upload_date: Utc::now(),
            last_opened: None,
        };
        let json = serde_json::to_value(DocumentResponse::from(doc)).unwrap();
        assert!(json.get("file_path").is_none());
        assert_eq!(json["total_pages"], serde_json::Value::Null);
    }
}
