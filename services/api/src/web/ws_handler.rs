//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a reading WebSocket
//! connection. Each connection owns exactly one `ReadingSession`; the browser's
//! viewer events are applied to it one at a time.

use crate::web::{
    protocol::{ClientMessage, ServerMessage, LIBRARY_ROUTE},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use pdf_reader_core::session::{Navigation, ReadingSession, SessionError, ZoomDirection};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

/// Serializes and sends one message. Returns `false` once the client is gone.
async fn send(sender: &mut WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New reading connection for user: {}", user_id);
    let (mut sender, mut receiver) = socket.split();

    // --- 1. Open Phase ---
    let document_id = match receiver.next().await {
        Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
            Ok(ClientMessage::Open { document_id }) => document_id,
            _ => {
                error!("First message was not a valid Open message.");
                let msg = ServerMessage::Error {
                    message: "Open a document first.".to_string(),
                };
                let _ = send(&mut sender, &msg).await;
                return;
            }
        },
        _ => {
            info!("Client disconnected before opening a document.");
            return;
        }
    };

    if !send(&mut sender, &ServerMessage::Loading).await {
        return;
    }

    let mut session = ReadingSession::new(
        app_state.session_stores(),
        user_id,
        document_id,
        app_state.session_settings(),
    );

    match session.open().await {
        Ok(snapshot) => {
            if !send(&mut sender, &ServerMessage::SessionReady { snapshot }).await {
                session.flush().await;
                return;
            }
        }
        Err(e) => {
            warn!(%document_id, "Reading session failed to open: {}", e);
            let msg = ServerMessage::SessionFailed {
                message: e.user_message(),
                redirect_to: LIBRARY_ROUTE.to_string(),
            };
            let _ = send(&mut sender, &msg).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    }

    // --- 2. Main Message Loop ---
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(client_msg) => apply_client_message(&mut session, client_msg).await,
                    Err(e) => {
                        warn!("Failed to deserialize client message: {}", e);
                        ServerMessage::Error {
                            message: "Unrecognized request.".to_string(),
                        }
                    }
                };
                if !send(&mut sender, &reply).await {
                    break;
                }
            }
            Message::Close(_) => {
                info!("Client sent close message.");
                break;
            }
            _ => {}
        }
    }

    // --- 3. Cleanup ---
    session.flush().await;
    info!(%document_id, "Reading connection closed.");
}

/// Applies one client request to the session and builds the reply.
pub async fn apply_client_message(session: &mut ReadingSession, msg: ClientMessage) -> ServerMessage {
    let result = match msg {
        ClientMessage::Open { .. } => {
            warn!("Received subsequent Open message, which is ignored.");
            return ServerMessage::Error {
                message: "A document is already open on this connection.".to_string(),
            };
        }
        ClientMessage::NextPage => session.navigate(Navigation::Next).map(view_updated),
        ClientMessage::PreviousPage => session.navigate(Navigation::Previous).map(view_updated),
        ClientMessage::GoToPage { page } => session.navigate(Navigation::To(page)).map(view_updated),
        ClientMessage::ZoomIn => session.zoom(ZoomDirection::In).map(view_updated),
        ClientMessage::ZoomOut => session.zoom(ZoomDirection::Out).map(view_updated),
        ClientMessage::PageCountDiscovered { count } => {
            session.on_page_count_discovered(count).map(view_updated)
        }
        ClientMessage::RenderError { message } => {
            session
                .on_render_error(&message)
                .map(|fallback| ServerMessage::RenderFailed {
                    message: fallback.message,
                    download_url: fallback.download_url,
                })
        }
        ClientMessage::CreateBookmark { title, note } => session
            .create_bookmark(&title, note.as_deref())
            .await
            .map(|_| ServerMessage::BookmarksUpdated {
                bookmarks: session.bookmarks().to_vec(),
            }),
        ClientMessage::JumpToBookmark { bookmark_id } => {
            session.jump_to_bookmark(bookmark_id).map(view_updated)
        }
    };

    result.unwrap_or_else(|e: SessionError| ServerMessage::Error {
        message: e.user_message(),
    })
}

fn view_updated(view: pdf_reader_core::session::ViewState) -> ServerMessage {
    ServerMessage::ViewUpdated { view }
}
