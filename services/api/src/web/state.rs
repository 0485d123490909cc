//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use pdf_reader_core::ports::{AuthStore, BlobStore, BookmarkStore, DocumentStore, ProgressStore};
use pdf_reader_core::session::{SessionSettings, SessionStores};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub auth: Arc<dyn AuthStore>,
    pub config: Arc<Config>,
}

impl AppState {
    /// The subset of stores a reading session works with.
    pub fn session_stores(&self) -> SessionStores {
        SessionStores {
            documents: self.documents.clone(),
            blobs: self.blobs.clone(),
            bookmarks: self.bookmarks.clone(),
            progress: self.progress.clone(),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            persist_debounce: self.config.progress_debounce,
        }
    }
}
