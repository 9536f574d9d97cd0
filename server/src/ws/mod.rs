//! Control-Session Front-End
//!
//! Upgrades authenticated requests to WebSocket control sessions,
//! drives the keep-alive, reads and dispatches control frames to the
//! signaling coordinator, and owns per-session teardown.
//!
//! ## Authentication
//!
//! The upgrade authenticates via the `Sec-WebSocket-Protocol` header
//! rather than query parameters, to keep tokens out of logs and
//! browser history:
//!
//! ```text
//! Sec-WebSocket-Protocol: access_token.<jwt>
//! ```

mod events;
pub(crate) mod registry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::AppState;
use crate::auth::jwt;
use crate::voice::VoiceError;

pub use events::{
    CandidateData, ClientFrame, JoinData, MuteData, ParticipantList, SdpData, ServerFrame,
    UserAction,
};
pub use registry::{ControlRegistry, ControlSession, FrameSink};

/// Keep-alive probe interval.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Read-idle deadline; satisfied by the client's pong replies.
const READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// WebSocket protocol header prefix carrying the token.
const WS_PROTOCOL_PREFIX: &str = "access_token.";

/// Extract the JWT from the `Sec-WebSocket-Protocol` header.
fn extract_token_from_protocol(headers: &HeaderMap) -> Option<String> {
    headers
        .get("sec-websocket-protocol")
        .and_then(|h| h.to_str().ok())
        .and_then(|protocols| {
            // The header may contain multiple protocols separated by commas
            protocols
                .split(',')
                .map(str::trim)
                .find(|p| p.starts_with(WS_PROTOCOL_PREFIX))
                .map(|p| p[WS_PROTOCOL_PREFIX.len()..].to_string())
        })
}

/// Build a plain-text HTTP error response without panicking.
fn error_response(status: u16, body: &'static str) -> Response {
    Response::builder()
        .status(status)
        .body(body.into())
        .unwrap_or_else(|_| {
            Response::builder()
                .status(500)
                .body("Internal Server Error".into())
                .expect("fallback response builder")
        })
}

/// [`FrameSink`] over the write half of a WebSocket.
struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.inner.send(Message::Text(text.into())).await
    }

    async fn send_ping(&mut self) -> Result<(), axum::Error> {
        self.inner.send(Message::Ping(Default::default())).await
    }

    async fn send_close(&mut self) {
        let _ = self.inner.send(Message::Close(None)).await;
    }
}

/// WebSocket upgrade handler.
///
/// GET /ws
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let token = match extract_token_from_protocol(&headers) {
        Some(t) => t,
        None => {
            return error_response(
                401,
                "Missing or invalid Sec-WebSocket-Protocol header. Expected: access_token.<jwt>",
            );
        }
    };

    let user_id = match jwt::user_id_from_token(&token, &state.config.jwt_secret) {
        Ok(id) => id,
        Err(_) => return error_response(401, "Invalid token"),
    };

    // Confirm the protocol so browser clients complete the handshake
    ws.protocols(["access_token"])
        .on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Drive one control session until its connection ends.
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (sink, mut receiver) = socket.split();
    let session = Arc::new(ControlSession::new(
        user_id,
        Box::new(WsSink { inner: sink }),
    ));
    let session_id = session.session_id;

    // A user holds at most one control session. Superseding releases
    // the old session's media peer here, then closes its socket; the
    // old reader observes the close and skips its own leave via the
    // detach identity guard.
    if let Some(evicted) = state.control.attach(session.clone()).await {
        info!(user_id = %user_id, "Superseding existing control session");
        if let Err(e) = state.coordinator.handle_leave(user_id).await {
            warn!(user_id = %user_id, error = %e, "Leave for superseded session failed");
        }
        evicted.close().await;
    }

    info!(user_id = %user_id, "Control session connected");

    let keepalive_session = session.clone();
    let keepalive = tokio::spawn(async move {
        let mut interval = tokio::time::interval(KEEPALIVE_INTERVAL);
        interval.tick().await; // first tick is immediate
        loop {
            interval.tick().await;
            if keepalive_session.send_ping().await.is_err() {
                break;
            }
        }
    });

    loop {
        let msg = match tokio::time::timeout(READ_IDLE_TIMEOUT, receiver.next()).await {
            Err(_) => {
                info!(user_id = %user_id, "Control session idle timeout");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                warn!(user_id = %user_id, error = %e, "WebSocket read error");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => dispatch_frame(&state, user_id, &text).await,
            Message::Pong(_) => {
                // Keep-alive reply; the idle deadline re-arms on every
                // inbound frame, so nothing to do here.
            }
            Message::Close(_) => {
                info!(user_id = %user_id, "Control session closed by peer");
                break;
            }
            _ => {}
        }
    }

    keepalive.abort();

    // Only the session still registered drives the leave; a superseded
    // session's media peer was already released by its evictor.
    if state.control.detach(user_id, session_id).await {
        if let Err(e) = state.coordinator.handle_leave(user_id).await {
            warn!(user_id = %user_id, error = %e, "Leave on session teardown failed");
        }
    }

    info!(user_id = %user_id, "Control session disconnected");
}

/// Decode one inbound frame and invoke the matching coordinator
/// operation.
///
/// Message-level problems never end the session: validation failures
/// are answered with an error frame, state-precondition misses are
/// logged and dropped, store failures get a generic error reply.
async fn dispatch_frame(state: &AppState, user_id: Uuid, text: &str) {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "Malformed control frame");
            state
                .control
                .send(user_id, &ServerFrame::error("invalid message"))
                .await;
            return;
        }
    };

    macro_rules! payload {
        ($ty:ty) => {
            match frame.payload::<$ty>() {
                Ok(data) => data,
                Err(e) => {
                    warn!(user_id = %user_id, kind = %frame.kind, error = %e, "Invalid payload");
                    state
                        .control
                        .send(
                            user_id,
                            &ServerFrame::error(format!("invalid {} payload", frame.kind)),
                        )
                        .await;
                    return;
                }
            }
        };
    }

    let coordinator = &state.coordinator;
    let result = match frame.kind.as_str() {
        "join" => {
            let data = payload!(JoinData);
            coordinator.handle_join(user_id, &data.channel_id).await
        }
        "offer" => {
            let data = payload!(SdpData);
            coordinator.handle_offer(user_id, data.sdp).await
        }
        "answer" => {
            let data = payload!(SdpData);
            coordinator.handle_answer(user_id, data.sdp).await
        }
        "candidate" => {
            let data = payload!(CandidateData);
            coordinator.handle_candidate(user_id, data.candidate).await
        }
        "mute" => {
            let data = payload!(MuteData);
            coordinator.handle_mute(user_id, data.is_muted).await
        }
        "leave" => coordinator.handle_leave(user_id).await,
        "ping" => {
            coordinator.handle_ping(user_id).await;
            Ok(())
        }
        other => {
            warn!(user_id = %user_id, kind = %other, "Unknown message type");
            state
                .control
                .send(user_id, &ServerFrame::error("unknown message type"))
                .await;
            return;
        }
    };

    match result {
        Ok(()) => {}
        Err(VoiceError::PeerNotFound(_)) => {
            // offer/answer/candidate/mute before join; drop, keep session
            warn!(user_id = %user_id, kind = %frame.kind, "Dropping message without media peer");
        }
        Err(VoiceError::Store(e)) => {
            warn!(user_id = %user_id, kind = %frame.kind, error = %e, "Store failure");
            state
                .control
                .send(user_id, &ServerFrame::error("internal error"))
                .await;
        }
        Err(e) => {
            warn!(user_id = %user_id, kind = %frame.kind, error = %e, "Signaling operation failed");
        }
    }
}
