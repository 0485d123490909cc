pub mod auth;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

// Re-export the handlers the binary needs to build the router.
pub use auth::{login_handler, logout_handler, signup_handler};
pub use middleware::require_auth;
pub use rest::{
    file_handler, get_document_handler, health_handler, list_bookmarks_handler,
    list_documents_handler, upload_document_handler,
};
pub use ws_handler::ws_handler;
