//! services/api/src/adapters/blob.rs
//!
//! Stores uploaded PDF bytes on the local filesystem and implements the
//! `BlobStore` port. Content locations point back at this service's
//! `/files/{key}` route.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use pdf_reader_core::ports::{BlobStore, PortError, PortResult};
use tokio::fs;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub async fn new(base_path: PathBuf, public_base_url: String) -> PortResult<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            PortError::Unexpected(format!(
                "Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Blob store initialized");

        Ok(Self {
            base_path,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Maps a key to a path under the base directory, rejecting anything that
    /// could escape it.
    fn blob_path(&self, key: &str) -> PortResult<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() {
            return Err(PortError::Unexpected("Empty blob key".to_string()));
        }
        for component in relative.components() {
            if !matches!(component, Component::Normal(_)) {
                return Err(PortError::Unexpected(format!("Invalid blob key '{}'", key)));
            }
        }
        Ok(self.base_path.join(relative))
    }
}

fn io_error(key: &str, action: &str, e: std::io::Error) -> PortError {
    if e.kind() == std::io::ErrorKind::NotFound {
        PortError::NotFound(format!("Blob {} not found", key))
    } else {
        PortError::Unexpected(format!("Failed to {} blob {}: {}", action, key, e))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_blob(&self, key: &str, data: Bytes) -> PortResult<()> {
        if data.is_empty() {
            return Err(PortError::Unexpected("Empty blob".to_string()));
        }
        let path = self.blob_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(key, "prepare", e))?;
        }
        fs::write(&path, &data)
            .await
            .map_err(|e| io_error(key, "write", e))?;

        debug!(key, size = data.len(), "Stored blob");
        Ok(())
    }

    async fn get_blob(&self, key: &str) -> PortResult<Bytes> {
        let path = self.blob_path(key)?;
        let data = fs::read(&path).await.map_err(|e| io_error(key, "read", e))?;
        debug!(key, size = data.len(), "Retrieved blob");
        Ok(Bytes::from(data))
    }

    async fn delete_blob(&self, key: &str) -> PortResult<()> {
        let path = self.blob_path(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| io_error(key, "delete", e))?;
        debug!(key, "Deleted blob");
        Ok(())
    }

    async fn resolve_content_location(&self, key: &str) -> PortResult<String> {
        self.blob_path(key)?;
        Ok(format!("{}/files/{}", self.public_base_url, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (LocalBlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"), "http://localhost:3000/".to_string())
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_get_delete() {
        let (store, _dir) = store().await;
        let key = "7f1c/1700000000000_paper.pdf";
        store.put_blob(key, Bytes::from_static(b"%PDF-1.7")).await.unwrap();

        assert_eq!(store.get_blob(key).await.unwrap(), Bytes::from_static(b"%PDF-1.7"));

        store.delete_blob(key).await.unwrap();
        assert!(matches!(store.get_blob(key).await, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_the_base_directory() {
        let (store, _dir) = store().await;
        for key in ["../secret.pdf", "/etc/passwd", "a/../../b.pdf", ""] {
            assert!(store.put_blob(key, Bytes::from_static(b"x")).await.is_err(), "{key}");
            assert!(store.resolve_content_location(key).await.is_err(), "{key}");
        }
    }

    #[tokio::test]
    async fn empty_uploads_are_rejected() {
        let (store, _dir) = store().await;
        assert!(store.put_blob("u/empty.pdf", Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn content_location_points_at_files_route() {
        let (store, _dir) = store().await;
        let url = store.resolve_content_location("u/1_doc.pdf").await.unwrap();
        assert_eq!(url, "http://localhost:3000/files/u/1_doc.pdf");
    }
}
