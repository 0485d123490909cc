//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser reader (which hosts
//! the embedded PDF viewer) and the API server.

use pdf_reader_core::domain::Bookmark;
use pdf_reader_core::session::{SessionSnapshot, ViewState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where the browser should go when a session cannot be opened.
pub const LIBRARY_ROUTE: &str = "/documents";

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a document for reading. This must be the first message sent on the connection.
    Open { document_id: Uuid },

    NextPage,
    PreviousPage,
    GoToPage { page: u32 },

    ZoomIn,
    ZoomOut,

    /// Sent by the viewer once it has parsed the file.
    PageCountDiscovered { count: u32 },

    /// Sent by the viewer when the file could not be fetched or parsed.
    RenderError { message: String },

    CreateBookmark {
        title: String,
        #[serde(default)]
        note: Option<String>,
    },

    JumpToBookmark { bookmark_id: Uuid },
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The document metadata is being fetched; the UI shows a loading state.
    Loading,

    SessionReady { snapshot: SessionSnapshot },

    /// The document could not be opened. The client should navigate to `redirect_to`.
    SessionFailed { message: String, redirect_to: String },

    /// Tells the viewer which page and scale to draw.
    ViewUpdated {
        #[serde(flatten)]
        view: ViewState,
    },

    BookmarksUpdated { bookmarks: Vec<Bookmark> },

    /// Replace the viewer with download / open-externally actions.
    RenderFailed { message: String, download_url: String },

    /// A non-fatal error for the last request.
    Error { message: String },
}
