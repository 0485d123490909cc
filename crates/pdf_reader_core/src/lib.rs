//! Core of the PDF reader: domain types, store ports, and the reading session
//! controller. Nothing in here knows about HTTP or PostgreSQL.

pub mod domain;
pub mod ports;
pub mod session;

pub use domain::{
    Bookmark, Document, DocumentPatch, NewBookmark, NewDocument, ReadingProgress, User,
    UserCredentials,
};
pub use ports::{
    AuthStore, BlobStore, BookmarkStore, DocumentStore, PortError, PortResult, ProgressStore,
};
pub use session::{
    Navigation, ReadingSession, RenderFallback, SessionError, SessionPhase, SessionSettings,
    SessionSnapshot, SessionStores, ViewState, ZoomDirection,
};
