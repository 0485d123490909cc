//! crates/pdf_reader_core/src/session.rs
//!
//! The reading session controller: the in-memory truth for "which page, at which
//! zoom" of one open document, kept in sync with the stores without ever
//! blocking the caller on a write.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::{sort_bookmarks, Bookmark, Document, DocumentPatch, NewBookmark};
use crate::ports::{BlobStore, BookmarkStore, DocumentStore, PortError, ProgressStore};

pub const ZOOM_DEFAULT_PERCENT: u16 = 100;
pub const ZOOM_STEP_PERCENT: u16 = 25;
pub const ZOOM_MIN_PERCENT: u16 = 50;
pub const ZOOM_MAX_PERCENT: u16 = 200;

/// Highest page number the stores can hold (they use signed 32-bit columns).
pub const MAX_PAGE: u32 = i32::MAX as u32;

//=========================================================================================
// Public Types
//=========================================================================================

/// The store handles a session talks to.
#[derive(Clone)]
pub struct SessionStores {
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub bookmarks: Arc<dyn BookmarkStore>,
    pub progress: Arc<dyn ProgressStore>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    /// Quiet period used to coalesce reading-position writes. `None` writes on
    /// every page change.
    pub persist_debounce: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    To(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    In,
    Out,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is not ready")]
    NotReady,
    #[error("Document {0} not found")]
    NotFound(Uuid),
    #[error("Store error: {0}")]
    Store(#[from] PortError),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Bookmark {0} not found in this session")]
    BookmarkNotFound(Uuid),
}

impl SessionError {
    /// A short message that is safe to show to the user.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::NotReady => "The document is not open.".to_string(),
            SessionError::NotFound(_) => "Failed to load PDF.".to_string(),
            SessionError::Store(_) => "Something went wrong. Please try again.".to_string(),
            SessionError::Validation(msg) => msg.clone(),
            SessionError::BookmarkNotFound(_) => "That bookmark no longer exists.".to_string(),
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// What the viewer needs to draw the current page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    pub page: u32,
    pub total_pages: Option<u32>,
    pub zoom_percent: u16,
    pub scale: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub document_id: Uuid,
    pub title: String,
    pub content_url: String,
    pub view: ViewState,
    pub bookmarks: Vec<Bookmark>,
    pub render_error: bool,
}

/// Shown in place of the viewer when the PDF could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderFallback {
    pub message: String,
    pub download_url: String,
}

//=========================================================================================
// Session State
//=========================================================================================

struct Loaded {
    document: Document,
    content_url: String,
    bookmarks: Vec<Bookmark>,
    current_page: u32,
    /// The page most recently handed to the position writer (or read from the store).
    persisted_page: Option<u32>,
    zoom_percent: u16,
    render_error: Option<String>,
}

impl Loaded {
    fn view(&self) -> ViewState {
        ViewState {
            page: self.current_page,
            total_pages: self.document.total_pages,
            zoom_percent: self.zoom_percent,
            scale: f32::from(self.zoom_percent) / 100.0,
        }
    }
}

enum State {
    Loading,
    Ready(Box<Loaded>),
    Failed,
}

/// One user's view of one open document.
pub struct ReadingSession {
    stores: SessionStores,
    user_id: Uuid,
    document_id: Uuid,
    state: State,
    writer: PositionWriter,
    background: Vec<JoinHandle<()>>,
}

/// `max(1, min(target, total))`; only `MAX_PAGE` bounds it while the total is unknown.
pub fn clamp_page(target: u32, total_pages: Option<u32>) -> u32 {
    target.min(total_pages.unwrap_or(target)).clamp(1, MAX_PAGE)
}

impl ReadingSession {
    pub fn new(
        stores: SessionStores,
        user_id: Uuid,
        document_id: Uuid,
        settings: SessionSettings,
    ) -> Self {
        let writer = PositionWriter {
            documents: stores.documents.clone(),
            progress: stores.progress.clone(),
            debounce: settings.persist_debounce,
            pending: None,
            total_pages: watch::channel(None).0,
        };
        Self {
            stores,
            user_id,
            document_id,
            state: State::Loading,
            writer,
            background: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        match self.state {
            State::Loading => SessionPhase::Loading,
            State::Ready(_) => SessionPhase::Ready,
            State::Failed => SessionPhase::Failed,
        }
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn document_id(&self) -> Uuid {
        self.document_id
    }

    pub fn document(&self) -> Option<&Document> {
        self.loaded().ok().map(|l| &l.document)
    }

    pub fn current_page(&self) -> Option<u32> {
        self.loaded().ok().map(|l| l.current_page)
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.loaded().map(|l| l.bookmarks.as_slice()).unwrap_or(&[])
    }

    pub fn view(&self) -> SessionResult<ViewState> {
        Ok(self.loaded()?.view())
    }

    pub fn snapshot(&self) -> SessionResult<SessionSnapshot> {
        let loaded = self.loaded()?;
        Ok(SessionSnapshot {
            document_id: loaded.document.id,
            title: loaded.document.title.clone(),
            content_url: loaded.content_url.clone(),
            view: loaded.view(),
            bookmarks: loaded.bookmarks.clone(),
            render_error: loaded.render_error.is_some(),
        })
    }

    /// Loads the document and moves the session to `Ready`, or to `Failed` if the
    /// document cannot be read. Only the metadata fetch and the content location
    /// gate readiness; the bookmark list degrades to empty.
    pub async fn open(&mut self) -> SessionResult<SessionSnapshot> {
        if !matches!(self.state, State::Loading) {
            return Err(SessionError::NotReady);
        }
        let document_id = self.document_id;
        info!(%document_id, user_id = %self.user_id, "Opening reading session");

        let document = match self.stores.documents.fetch_document(document_id).await {
            Ok(doc) if doc.user_id == self.user_id => doc,
            Ok(_) => {
                warn!(%document_id, user_id = %self.user_id, "Document belongs to another user");
                self.state = State::Failed;
                return Err(SessionError::NotFound(document_id));
            }
            Err(e) => {
                error!(%document_id, error = %e, "Failed to load document metadata");
                self.state = State::Failed;
                return Err(match e {
                    PortError::NotFound(_) => SessionError::NotFound(document_id),
                    other => SessionError::Store(other),
                });
            }
        };

        let (bookmarks, content_url) = futures::join!(
            self.stores.bookmarks.list_bookmarks(document_id),
            self.stores.blobs.resolve_content_location(&document.file_path),
        );

        let content_url = match content_url {
            Ok(url) => url,
            Err(e) => {
                error!(%document_id, error = %e, "Failed to resolve content location");
                self.state = State::Failed;
                return Err(SessionError::Store(e));
            }
        };

        let mut bookmarks = bookmarks.unwrap_or_else(|e| {
            warn!(%document_id, error = %e, "Failed to load bookmarks; continuing without them");
            Vec::new()
        });
        sort_bookmarks(&mut bookmarks);

        let opened_at = Utc::now();
        let documents = self.stores.documents.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = documents
                .update_document(document_id, DocumentPatch::last_opened(opened_at))
                .await
            {
                warn!(%document_id, error = %e, "Failed to update last opened time");
            }
        }));

        let current_page = clamp_page(document.current_page.unwrap_or(1), document.total_pages);
        let persisted_page = document.current_page;
        let total_pages = document.total_pages;
        self.writer.set_total_pages(total_pages);
        let mut document = document;
        document.last_opened = Some(opened_at);

        self.state = State::Ready(Box::new(Loaded {
            document,
            content_url,
            bookmarks,
            current_page,
            persisted_page,
            zoom_percent: ZOOM_DEFAULT_PERCENT,
            render_error: None,
        }));

        // A stored page beyond a known total gets corrected in the store as well.
        if matches!(persisted_page, Some(stored) if stored != current_page) {
            self.persist_position(current_page, total_pages);
        }

        info!(%document_id, page = current_page, "Reading session ready");
        self.snapshot()
    }

    pub fn navigate(&mut self, navigation: Navigation) -> SessionResult<ViewState> {
        let loaded = self.loaded_mut()?;
        let target = match navigation {
            Navigation::Next => loaded.current_page.saturating_add(1),
            Navigation::Previous => loaded.current_page.saturating_sub(1),
            Navigation::To(page) => page,
        };
        let page = clamp_page(target, loaded.document.total_pages);
        loaded.current_page = page;

        let needs_write = loaded.persisted_page != Some(page);
        let total_pages = loaded.document.total_pages;
        let view = loaded.view();

        if needs_write {
            self.persist_position(page, total_pages);
        }
        Ok(view)
    }

    pub fn zoom(&mut self, direction: ZoomDirection) -> SessionResult<ViewState> {
        let loaded = self.loaded_mut()?;
        loaded.zoom_percent = match direction {
            ZoomDirection::In => (loaded.zoom_percent + ZOOM_STEP_PERCENT).min(ZOOM_MAX_PERCENT),
            ZoomDirection::Out => loaded
                .zoom_percent
                .saturating_sub(ZOOM_STEP_PERCENT)
                .max(ZOOM_MIN_PERCENT),
        };
        Ok(loaded.view())
    }

    /// Called once the viewer has parsed the file. Writes the total only when it
    /// differs from what the session already knows.
    pub fn on_page_count_discovered(&mut self, count: u32) -> SessionResult<ViewState> {
        let document_id = self.document_id;
        let loaded = self.loaded_mut()?;
        loaded.render_error = None;

        if count == 0 || count > MAX_PAGE {
            warn!(%document_id, count, "Viewer reported an impossible page count; ignoring");
            return Ok(loaded.view());
        }
        match loaded.document.total_pages {
            Some(known) if known == count => return Ok(loaded.view()),
            Some(known) => {
                warn!(%document_id, known, count, "Viewer page count disagrees with stored total; overwriting");
            }
            None => debug!(%document_id, count, "Page count discovered"),
        }

        loaded.document.total_pages = Some(count);
        let clamped = clamp_page(loaded.current_page, Some(count));
        let moved = clamped != loaded.current_page;
        loaded.current_page = clamped;
        let needs_position_write = moved && loaded.persisted_page != Some(clamped);
        let view = loaded.view();
        self.writer.set_total_pages(Some(count));

        let documents = self.stores.documents.clone();
        self.track(tokio::spawn(async move {
            if let Err(e) = documents
                .update_document(document_id, DocumentPatch::total_pages(count))
                .await
            {
                warn!(%document_id, error = %e, "Failed to persist page count");
            }
        }));

        if needs_position_write {
            self.persist_position(clamped, Some(count));
        }
        Ok(view)
    }

    pub fn on_render_error(&mut self, message: &str) -> SessionResult<RenderFallback> {
        let document_id = self.document_id;
        let loaded = self.loaded_mut()?;
        error!(%document_id, error = message, "Viewer failed to render document");
        loaded.render_error = Some(message.to_string());
        Ok(RenderFallback {
            message: "This PDF could not be displayed. You can download it or open it in a new tab."
                .to_string(),
            download_url: loaded.content_url.clone(),
        })
    }

    /// Bookmarks the current page. The write is awaited so a rejected insert
    /// can be reported; nothing is kept locally on failure.
    pub async fn create_bookmark(
        &mut self,
        title: &str,
        note: Option<&str>,
    ) -> SessionResult<Bookmark> {
        let page_number = self.loaded()?.current_page;
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::Validation(
                "Bookmark title cannot be empty.".to_string(),
            ));
        }

        let new_bookmark = NewBookmark {
            user_id: self.user_id,
            document_id: self.document_id,
            page_number,
            title: title.to_string(),
            note: note
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
        };

        let bookmark = self
            .stores
            .bookmarks
            .insert_bookmark(new_bookmark)
            .await
            .map_err(|e| {
                error!(document_id = %self.document_id, error = %e, "Failed to create bookmark");
                SessionError::Store(e)
            })?;

        let loaded = self.loaded_mut()?;
        let at = loaded.bookmarks.partition_point(|b| {
            (b.page_number, b.created_at) <= (bookmark.page_number, bookmark.created_at)
        });
        loaded.bookmarks.insert(at, bookmark.clone());
        info!(document_id = %self.document_id, page = page_number, "Bookmark created");
        Ok(bookmark)
    }

    pub fn jump_to_bookmark(&mut self, bookmark_id: Uuid) -> SessionResult<ViewState> {
        let page = self
            .loaded()?
            .bookmarks
            .iter()
            .find(|b| b.id == bookmark_id)
            .map(|b| b.page_number)
            .ok_or(SessionError::BookmarkNotFound(bookmark_id))?;
        self.navigate(Navigation::To(page))
    }

    /// Waits for every background write this session has started.
    pub async fn flush(&mut self) {
        for handle in self.background.drain(..) {
            if let Err(e) = handle.await {
                warn!(document_id = %self.document_id, error = %e, "Background write task failed");
            }
        }
    }

    fn loaded(&self) -> SessionResult<&Loaded> {
        match &self.state {
            State::Ready(loaded) => Ok(&**loaded),
            _ => Err(SessionError::NotReady),
        }
    }

    fn loaded_mut(&mut self) -> SessionResult<&mut Loaded> {
        match &mut self.state {
            State::Ready(loaded) => Ok(&mut **loaded),
            _ => Err(SessionError::NotReady),
        }
    }

    fn persist_position(&mut self, page: u32, total_pages: Option<u32>) {
        // Marked before the write lands; a failed write is not retried.
        if let State::Ready(loaded) = &mut self.state {
            loaded.persisted_page = Some(page);
        }
        let handle = self
            .writer
            .schedule(self.user_id, self.document_id, page, total_pages);
        self.track(handle);
    }

    fn track(&mut self, handle: JoinHandle<()>) {
        self.background.retain(|h| !h.is_finished());
        self.background.push(handle);
    }
}

//=========================================================================================
// Position Writer
//=========================================================================================

/// Persists the reading position, optionally coalescing bursts into one
/// trailing write. Writes that have started are never cancelled.
struct PositionWriter {
    documents: Arc<dyn DocumentStore>,
    progress: Arc<dyn ProgressStore>,
    debounce: Option<Duration>,
    pending: Option<CancellationToken>,
    /// Latest known page count; a debounced write reads it when it fires.
    total_pages: watch::Sender<Option<u32>>,
}

impl PositionWriter {
    fn set_total_pages(&self, total_pages: Option<u32>) {
        self.total_pages.send_replace(total_pages);
    }

    fn schedule(
        &mut self,
        user_id: Uuid,
        document_id: Uuid,
        page: u32,
        total_pages: Option<u32>,
    ) -> JoinHandle<()> {
        if let Some(previous) = self.pending.take() {
            previous.cancel();
        }
        self.set_total_pages(total_pages);
        let documents = self.documents.clone();
        let progress = self.progress.clone();

        match self.debounce {
            None => tokio::spawn(write_position(
                documents,
                progress,
                user_id,
                document_id,
                page,
                total_pages,
            )),
            Some(delay) => {
                let token = CancellationToken::new();
                self.pending = Some(token.clone());
                let totals = self.total_pages.subscribe();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = token.cancelled() => {
                            debug!(%document_id, page, "Position write superseded");
                        }
                        _ = tokio::time::sleep(delay) => {
                            let total_pages = *totals.borrow();
                            write_position(documents, progress, user_id, document_id, page, total_pages).await;
                        }
                    }
                })
            }
        }
    }
}

async fn write_position(
    documents: Arc<dyn DocumentStore>,
    progress: Arc<dyn ProgressStore>,
    user_id: Uuid,
    document_id: Uuid,
    page: u32,
    total_pages: Option<u32>,
) {
    if let Err(e) = documents
        .update_document(document_id, DocumentPatch::current_page(page))
        .await
    {
        warn!(%document_id, page, error = %e, "Failed to persist current page");
    }
    match progress
        .upsert_progress(user_id, document_id, page, total_pages)
        .await
    {
        Ok(()) => debug!(%document_id, page, "Reading progress updated"),
        Err(e) => warn!(%document_id, page, error = %e, "Failed to update reading progress"),
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewDocument;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::Duration as ChronoDuration;
    use std::sync::Mutex;

    use crate::ports::PortResult;

    #[derive(Default)]
    struct Calls {
        document_fetches: usize,
        document_updates: Vec<DocumentPatch>,
        progress_upserts: Vec<(u32, Option<u32>)>,
        bookmark_lists: usize,
        bookmark_inserts: usize,
    }

    #[derive(Default)]
    struct FakeStore {
        documents: Mutex<Vec<Document>>,
        bookmarks: Mutex<Vec<Bookmark>>,
        calls: Mutex<Calls>,
        fail_bookmark_list: bool,
        fail_bookmark_insert: bool,
        fail_updates: bool,
    }

    impl FakeStore {
        fn with_document(document: Document) -> Self {
            Self {
                documents: Mutex::new(vec![document]),
                ..Default::default()
            }
        }

        fn page_writes(&self) -> Vec<u32> {
            self.calls
                .lock()
                .unwrap()
                .document_updates
                .iter()
                .filter_map(|p| p.current_page)
                .collect()
        }

        fn total_writes(&self) -> Vec<u32> {
            self.calls
                .lock()
                .unwrap()
                .document_updates
                .iter()
                .filter_map(|p| p.total_pages)
                .collect()
        }
    }

    #[async_trait]
    impl DocumentStore for FakeStore {
        async fn fetch_document(&self, document_id: Uuid) -> PortResult<Document> {
            self.calls.lock().unwrap().document_fetches += 1;
            self.documents
                .lock()
                .unwrap()
                .iter()
                .find(|d| d.id == document_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(document_id.to_string()))
        }

        async fn list_documents(&self, owner_id: Uuid) -> PortResult<Vec<Document>> {
            Ok(self
                .documents
                .lock()
                .unwrap()
                .iter()
                .filter(|d| d.user_id == owner_id)
                .cloned()
                .collect())
        }

        async fn update_document(&self, _document_id: Uuid, patch: DocumentPatch) -> PortResult<()> {
            self.calls.lock().unwrap().document_updates.push(patch);
            if self.fail_updates {
                return Err(PortError::Unexpected("write rejected".to_string()));
            }
            Ok(())
        }

        async fn insert_document(&self, _document: NewDocument) -> PortResult<Document> {
            Err(PortError::Unexpected("not used".to_string()))
        }
    }

    #[async_trait]
    impl BlobStore for FakeStore {
        async fn put_blob(&self, _key: &str, _data: Bytes) -> PortResult<()> {
            Ok(())
        }

        async fn get_blob(&self, key: &str) -> PortResult<Bytes> {
            Err(PortError::NotFound(key.to_string()))
        }

        async fn delete_blob(&self, _key: &str) -> PortResult<()> {
            Ok(())
        }

        async fn resolve_content_location(&self, key: &str) -> PortResult<String> {
            Ok(format!("http://files.test/{key}"))
        }
    }

    #[async_trait]
    impl BookmarkStore for FakeStore {
        async fn list_bookmarks(&self, document_id: Uuid) -> PortResult<Vec<Bookmark>> {
            self.calls.lock().unwrap().bookmark_lists += 1;
            if self.fail_bookmark_list {
                return Err(PortError::Unexpected("connection reset".to_string()));
            }
            let mut list: Vec<Bookmark> = self
                .bookmarks
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.document_id == document_id)
                .cloned()
                .collect();
            sort_bookmarks(&mut list);
            Ok(list)
        }

        async fn insert_bookmark(&self, bookmark: NewBookmark) -> PortResult<Bookmark> {
            self.calls.lock().unwrap().bookmark_inserts += 1;
            if self.fail_bookmark_insert {
                return Err(PortError::Unexpected("insert rejected".to_string()));
            }
            let stored = Bookmark {
                id: Uuid::new_v4(),
                user_id: bookmark.user_id,
                document_id: bookmark.document_id,
                page_number: bookmark.page_number,
                title: bookmark.title,
                note: bookmark.note,
                created_at: Utc::now(),
            };
            self.bookmarks.lock().unwrap().push(stored.clone());
            Ok(stored)
        }
    }

    #[async_trait]
    impl ProgressStore for FakeStore {
        async fn upsert_progress(
            &self,
            _user_id: Uuid,
            _document_id: Uuid,
            current_page: u32,
            total_pages: Option<u32>,
        ) -> PortResult<()> {
            self.calls
                .lock()
                .unwrap()
                .progress_upserts
                .push((current_page, total_pages));
            if self.fail_updates {
                return Err(PortError::Unexpected("write rejected".to_string()));
            }
            Ok(())
        }
    }

    fn document(user_id: Uuid, current_page: Option<u32>, total_pages: Option<u32>) -> Document {
        Document {
            id: Uuid::new_v4(),
            user_id,
            title: "Systems Design".to_string(),
            file_name: "Systems Design.pdf".to_string(),
            file_path: format!("{user_id}/1700000000000_Systems Design.pdf"),
            file_size: Some(1024),
            total_pages,
            current_page,
            upload_date: Utc::now() - ChronoDuration::days(3),
            last_opened: None,
        }
    }

    fn stores(fake: &Arc<FakeStore>) -> SessionStores {
        SessionStores {
            documents: fake.clone(),
            blobs: fake.clone(),
            bookmarks: fake.clone(),
            progress: fake.clone(),
        }
    }

    async fn open_session(
        current_page: Option<u32>,
        total_pages: Option<u32>,
    ) -> (ReadingSession, Arc<FakeStore>) {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, current_page, total_pages);
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore::with_document(doc));
        let mut session =
            ReadingSession::new(stores(&fake), user_id, doc_id, SessionSettings::default());
        session.open().await.unwrap();
        (session, fake)
    }

    #[tokio::test]
    async fn never_opened_document_seeds_page_one() {
        let (mut session, fake) = open_session(None, None).await;
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert_eq!(session.current_page(), Some(1));

        session.flush().await;
        assert!(fake.page_writes().is_empty());
        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.document_updates.len(), 1);
        assert!(calls.document_updates[0].last_opened.is_some());
    }

    #[tokio::test]
    async fn next_page_persists_position_and_progress() {
        let (mut session, fake) = open_session(Some(42), Some(100)).await;
        assert_eq!(session.current_page(), Some(42));

        let view = session.navigate(Navigation::Next).unwrap();
        assert_eq!(view.page, 43);
        session.flush().await;

        assert_eq!(fake.page_writes(), vec![43]);
        assert_eq!(fake.calls.lock().unwrap().progress_upserts, vec![(43, Some(100))]);
    }

    #[tokio::test]
    async fn navigation_clamps_to_known_total() {
        let (mut session, _fake) = open_session(Some(42), Some(100)).await;
        assert_eq!(session.navigate(Navigation::To(500)).unwrap().page, 100);
        assert_eq!(session.navigate(Navigation::To(0)).unwrap().page, 1);
        assert_eq!(session.navigate(Navigation::Previous).unwrap().page, 1);
    }

    #[tokio::test]
    async fn navigation_is_unbounded_above_while_total_unknown() {
        let (mut session, _fake) = open_session(Some(3), None).await;
        assert_eq!(session.navigate(Navigation::To(500)).unwrap().page, 500);
        assert_eq!(session.navigate(Navigation::Next).unwrap().page, 501);
    }

    #[test]
    fn clamp_page_matches_formula() {
        for total in [None, Some(1), Some(7), Some(100)] {
            for target in [0u32, 1, 2, 6, 7, 8, 99, 100, 101, 5000] {
                let expected = target.min(total.unwrap_or(target)).max(1);
                assert_eq!(clamp_page(target, total), expected);
            }
        }
    }

    #[test]
    fn clamp_page_never_exceeds_storable_range() {
        assert_eq!(clamp_page(u32::MAX, None), MAX_PAGE);
        assert_eq!(clamp_page(MAX_PAGE, None), MAX_PAGE);
        assert_eq!(clamp_page(u32::MAX, Some(40)), 40);
    }

    #[tokio::test]
    async fn unknown_total_navigation_stays_storable() {
        let (mut session, fake) = open_session(Some(3), None).await;
        assert_eq!(session.navigate(Navigation::To(u32::MAX)).unwrap().page, MAX_PAGE);
        assert_eq!(session.navigate(Navigation::Next).unwrap().page, MAX_PAGE);
        session.on_page_count_discovered(u32::MAX).unwrap();
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![MAX_PAGE]);
        assert!(fake.total_writes().is_empty());
    }

    #[tokio::test]
    async fn staying_on_the_persisted_page_does_not_write() {
        let (mut session, fake) = open_session(Some(10), Some(20)).await;
        session.navigate(Navigation::To(10)).unwrap();
        session.navigate(Navigation::To(11)).unwrap();
        session.navigate(Navigation::To(11)).unwrap();
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![11]);
    }

    #[tokio::test]
    async fn returning_to_the_opening_page_is_persisted() {
        let (mut session, fake) = open_session(Some(10), Some(20)).await;
        session.navigate(Navigation::Next).unwrap();
        session.navigate(Navigation::Previous).unwrap();
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![11, 10]);
    }

    #[tokio::test]
    async fn zoom_stays_within_bounds() {
        let (mut session, _fake) = open_session(None, None).await;
        for _ in 0..20 {
            let view = session.zoom(ZoomDirection::In).unwrap();
            assert!(view.zoom_percent <= ZOOM_MAX_PERCENT);
        }
        assert_eq!(session.view().unwrap().zoom_percent, ZOOM_MAX_PERCENT);
        assert_eq!(session.view().unwrap().scale, 2.0);

        for _ in 0..20 {
            let view = session.zoom(ZoomDirection::Out).unwrap();
            assert!(view.zoom_percent >= ZOOM_MIN_PERCENT);
        }
        assert_eq!(session.view().unwrap().scale, 0.5);
    }

    #[tokio::test]
    async fn zoom_is_never_persisted() {
        let (mut session, fake) = open_session(Some(2), Some(9)).await;
        session.zoom(ZoomDirection::In).unwrap();
        session.zoom(ZoomDirection::Out).unwrap();
        session.flush().await;
        assert_eq!(fake.calls.lock().unwrap().document_updates.len(), 1);
    }

    #[tokio::test]
    async fn repeated_page_count_is_written_once() {
        let (mut session, fake) = open_session(Some(1), None).await;
        session.on_page_count_discovered(12).unwrap();
        session.on_page_count_discovered(12).unwrap();
        session.flush().await;
        assert_eq!(fake.total_writes(), vec![12]);
        assert_eq!(session.view().unwrap().total_pages, Some(12));
    }

    #[tokio::test]
    async fn smaller_page_count_clamps_current_page() {
        let (mut session, fake) = open_session(Some(30), Some(40)).await;
        let view = session.on_page_count_discovered(25).unwrap();
        assert_eq!(view.page, 25);
        session.flush().await;
        assert_eq!(fake.total_writes(), vec![25]);
        assert_eq!(fake.page_writes(), vec![25]);
        assert_eq!(fake.calls.lock().unwrap().progress_upserts, vec![(25, Some(25))]);
    }

    #[tokio::test]
    async fn zero_page_count_is_ignored() {
        let (mut session, fake) = open_session(Some(3), None).await;
        session.on_page_count_discovered(0).unwrap();
        session.flush().await;
        assert!(fake.total_writes().is_empty());
        assert_eq!(session.view().unwrap().total_pages, None);
    }

    #[tokio::test]
    async fn stored_page_beyond_total_is_corrected_on_open() {
        let (mut session, fake) = open_session(Some(120), Some(100)).await;
        assert_eq!(session.current_page(), Some(100));
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![100]);
    }

    #[tokio::test]
    async fn blank_bookmark_title_is_rejected_without_a_write() {
        let (mut session, fake) = open_session(Some(5), Some(10)).await;
        for title in ["", "   ", "\t\n"] {
            let err = session.create_bookmark(title, None).await.unwrap_err();
            assert!(matches!(err, SessionError::Validation(_)));
        }
        assert_eq!(fake.calls.lock().unwrap().bookmark_inserts, 0);
        assert!(session.bookmarks().is_empty());
    }

    #[tokio::test]
    async fn bookmark_captures_current_page_in_sorted_position() {
        let (mut session, _fake) = open_session(Some(42), Some(100)).await;
        session.navigate(Navigation::To(90)).unwrap();
        session.create_bookmark("Appendix", None).await.unwrap();
        session.navigate(Navigation::To(7)).unwrap();
        session.create_bookmark("Preface", Some("  ")).await.unwrap();
        session.navigate(Navigation::To(43)).unwrap();

        let intro = session.create_bookmark("  Intro ", None).await.unwrap();
        assert_eq!(intro.page_number, 43);
        assert_eq!(intro.title, "Intro");
        assert_eq!(intro.note, None);

        let pages: Vec<u32> = session.bookmarks().iter().map(|b| b.page_number).collect();
        assert_eq!(pages, vec![7, 43, 90]);
        assert_eq!(session.bookmarks()[1].id, intro.id);
    }

    #[tokio::test]
    async fn bookmarks_load_sorted_regardless_of_insertion_order() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, None, None);
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore::with_document(doc));
        for page in [50, 3, 17, 3, 99] {
            fake.insert_bookmark(NewBookmark {
                user_id,
                document_id: doc_id,
                page_number: page,
                title: format!("Page {page}"),
                note: Some("note".to_string()),
            })
            .await
            .unwrap();
        }

        let mut session =
            ReadingSession::new(stores(&fake), user_id, doc_id, SessionSettings::default());
        let snapshot = session.open().await.unwrap();
        let pages: Vec<u32> = snapshot.bookmarks.iter().map(|b| b.page_number).collect();
        assert_eq!(pages, vec![3, 3, 17, 50, 99]);
    }

    #[tokio::test]
    async fn rejected_bookmark_is_surfaced_and_not_kept() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, Some(4), None);
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore {
            fail_bookmark_insert: true,
            ..FakeStore::with_document(doc)
        });
        let mut session =
            ReadingSession::new(stores(&fake), user_id, doc_id, SessionSettings::default());
        session.open().await.unwrap();

        let err = session.create_bookmark("Chapter 2", None).await.unwrap_err();
        assert!(matches!(err, SessionError::Store(_)));
        assert!(session.bookmarks().is_empty());
    }

    #[tokio::test]
    async fn jump_to_bookmark_navigates_to_its_page() {
        let (mut session, fake) = open_session(Some(8), Some(30)).await;
        let bookmark = session.create_bookmark("Diagram", None).await.unwrap();
        session.navigate(Navigation::To(20)).unwrap();

        let view = session.jump_to_bookmark(bookmark.id).unwrap();
        assert_eq!(view.page, 8);
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![20, 8]);

        let missing = session.jump_to_bookmark(Uuid::new_v4()).unwrap_err();
        assert!(matches!(missing, SessionError::BookmarkNotFound(_)));
    }

    #[tokio::test]
    async fn missing_document_fails_without_further_store_calls() {
        let fake = Arc::new(FakeStore::default());
        let mut session = ReadingSession::new(
            stores(&fake),
            Uuid::new_v4(),
            Uuid::new_v4(),
            SessionSettings::default(),
        );
        assert_eq!(session.phase(), SessionPhase::Loading);

        let err = session.open().await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
        assert_eq!(session.phase(), SessionPhase::Failed);

        assert!(matches!(session.navigate(Navigation::Next), Err(SessionError::NotReady)));
        assert!(session.create_bookmark("x", None).await.is_err());
        assert!(session.open().await.is_err());
        session.flush().await;

        let calls = fake.calls.lock().unwrap();
        assert_eq!(calls.document_fetches, 1);
        assert_eq!(calls.bookmark_lists, 0);
        assert_eq!(calls.bookmark_inserts, 0);
        assert!(calls.document_updates.is_empty());
        assert!(calls.progress_upserts.is_empty());
    }

    #[tokio::test]
    async fn document_of_another_user_is_not_found() {
        let doc = document(Uuid::new_v4(), Some(2), None);
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore::with_document(doc));
        let mut session =
            ReadingSession::new(stores(&fake), Uuid::new_v4(), doc_id, SessionSettings::default());
        assert!(matches!(session.open().await, Err(SessionError::NotFound(_))));
        assert_eq!(session.phase(), SessionPhase::Failed);
    }

    #[tokio::test]
    async fn bookmark_fetch_failure_degrades_to_empty_list() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, Some(6), Some(10));
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore {
            fail_bookmark_list: true,
            ..FakeStore::with_document(doc)
        });
        let mut session =
            ReadingSession::new(stores(&fake), user_id, doc_id, SessionSettings::default());
        let snapshot = session.open().await.unwrap();
        assert_eq!(session.phase(), SessionPhase::Ready);
        assert!(snapshot.bookmarks.is_empty());
        assert_eq!(snapshot.view.page, 6);
    }

    #[tokio::test]
    async fn failed_writes_do_not_roll_back_the_visible_page() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, Some(1), Some(10));
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore {
            fail_updates: true,
            ..FakeStore::with_document(doc)
        });
        let mut session =
            ReadingSession::new(stores(&fake), user_id, doc_id, SessionSettings::default());
        session.open().await.unwrap();

        session.navigate(Navigation::To(4)).unwrap();
        session.flush().await;
        assert_eq!(session.current_page(), Some(4));
        assert_eq!(fake.page_writes(), vec![4]);

        session.navigate(Navigation::To(4)).unwrap();
        session.flush().await;
        assert_eq!(fake.page_writes(), vec![4]);
    }

    #[tokio::test]
    async fn render_error_offers_download_and_keeps_session_usable() {
        let (mut session, _fake) = open_session(Some(2), None).await;
        let fallback = session.on_render_error("Invalid PDF structure").unwrap();
        assert!(fallback.download_url.starts_with("http://files.test/"));
        assert!(!fallback.message.contains("Invalid PDF structure"));
        assert!(session.snapshot().unwrap().render_error);

        assert_eq!(session.navigate(Navigation::Next).unwrap().page, 3);
        session.on_page_count_discovered(5).unwrap();
        assert!(!session.snapshot().unwrap().render_error);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_navigation_coalesces_into_trailing_write() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, Some(42), Some(100));
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore::with_document(doc));
        let settings = SessionSettings {
            persist_debounce: Some(Duration::from_millis(500)),
        };
        let mut session = ReadingSession::new(stores(&fake), user_id, doc_id, settings);
        session.open().await.unwrap();

        session.navigate(Navigation::Next).unwrap();
        session.navigate(Navigation::Next).unwrap();
        session.navigate(Navigation::Next).unwrap();
        session.flush().await;

        assert_eq!(session.current_page(), Some(45));
        assert_eq!(fake.page_writes(), vec![45]);
        assert_eq!(fake.calls.lock().unwrap().progress_upserts, vec![(45, Some(100))]);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_write_carries_page_count_found_while_waiting() {
        let user_id = Uuid::new_v4();
        let doc = document(user_id, Some(3), None);
        let doc_id = doc.id;
        let fake = Arc::new(FakeStore::with_document(doc));
        let settings = SessionSettings {
            persist_debounce: Some(Duration::from_millis(500)),
        };
        let mut session = ReadingSession::new(stores(&fake), user_id, doc_id, settings);
        session.open().await.unwrap();

        session.navigate(Navigation::Next).unwrap();
        session.on_page_count_discovered(100).unwrap();
        session.flush().await;

        assert_eq!(fake.page_writes(), vec![4]);
        assert_eq!(fake.calls.lock().unwrap().progress_upserts, vec![(4, Some(100))]);
    }
}
