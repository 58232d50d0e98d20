//! WebSocket transport for debug sessions.
//!
//! Clients connect to `ws://host:port/{runtime_name}`. Each connection is
//! bound to exactly one registered [`ProtocolHandler`] for its lifetime.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde_json::Value;
use tokio::{
    net::TcpListener,
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::{
    error::{DebugError, Result},
    handler::{ProtocolHandler, error_response},
    protocol::{JsonRpcRequest, error_codes},
    service::HandlerRegistry,
    session::{OutgoingMessage, SessionId, SessionLink, SessionTable},
};

/// How long `close` waits for in-flight connections to drain
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ListenerState {
    registry: Arc<HandlerRegistry>,
    sessions: Arc<SessionTable>,
}

struct ActiveListener {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
}

/// Accepts debugger connections on one TCP endpoint.
pub struct TransportListener {
    host: String,
    sessions: Arc<SessionTable>,
    active: Mutex<Option<ActiveListener>>,
}

impl TransportListener {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            sessions: Arc::new(SessionTable::new()),
            active: Mutex::new(None),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        self.sessions.clone()
    }

    pub async fn is_listening(&self) -> bool {
        self.active.lock().await.is_some()
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.active.lock().await.as_ref().map(|a| a.local_addr)
    }

    /// Binds `host:port` and starts accepting connections. Port 0 picks an
    /// ephemeral port; the bound address is returned.
    pub(crate) async fn listen(
        &self,
        port: u16,
        registry: Arc<HandlerRegistry>,
    ) -> Result<SocketAddr> {
        let mut active = self.active.lock().await;
        if let Some(current) = active.as_ref() {
            return Err(DebugError::InvalidState(format!(
                "Already listening on {}",
                current.local_addr
            )));
        }

        let addr = format!("{}:{port}", self.host);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DebugError::from_bind(&addr, &e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| DebugError::Transport(format!("Failed reading bound address: {e}")))?;

        self.sessions.open().await;
        let app = router(ListenerState {
            registry,
            sessions: self.sessions.clone(),
        });

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        info!("Debugger listening on ws://{local_addr}");
        *active = Some(ActiveListener {
            local_addr,
            shutdown,
            server,
        });
        Ok(local_addr)
    }

    /// Stops accepting connections and closes every open session. Calling it
    /// again, or before `listen`, does nothing.
    pub async fn close(&self) -> Result<()> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };

        let _ = active.shutdown.send(());
        let closed = self.sessions.close_all().await;
        debug!("Closed {closed} debugger session(s)");

        let abort = active.server.abort_handle();
        match tokio::time::timeout(SHUTDOWN_GRACE, active.server).await {
            Ok(Ok(Ok(()))) => {
                info!("Debugger listener on {} closed", active.local_addr);
                Ok(())
            }
            Ok(Ok(Err(e))) => Err(DebugError::Transport(format!("Listener failed: {e}"))),
            Ok(Err(e)) => Err(DebugError::Transport(format!("Listener task failed: {e}"))),
            Err(_) => {
                warn!(
                    "Debugger listener on {} did not stop within {SHUTDOWN_GRACE:?}, aborting",
                    active.local_addr
                );
                abort.abort();
                Ok(())
            }
        }
    }
}

fn router(state: ListenerState) -> Router {
    Router::new()
        .route("/{runtime_name}", get(ws_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Handle WebSocket upgrade
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(runtime_name): Path<String>,
    State(state): State<ListenerState>,
) -> Response {
    if !state.registry.read().await.contains_key(&runtime_name) {
        warn!("Rejecting debugger connection: runtime `{runtime_name}` not found");
        let message = DebugError::NotFound(runtime_name).to_string();
        return (StatusCode::NOT_FOUND, message).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, runtime_name))
}

/// Handle an individual debugger connection
async fn handle_socket(socket: WebSocket, state: ListenerState, runtime_name: String) {
    let (tx, rx) = mpsc::unbounded_channel::<OutgoingMessage>();
    let responses = tx.clone();
    let link = SessionLink::new(tx);
    let session_id = link.id;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    // Attach under the registry read lock so unregister cannot interleave
    let attached = {
        let registry = state.registry.read().await;
        match registry.get(&runtime_name) {
            Some(handler) => handler.attach_session(link).map(|()| handler.clone()),
            None => Err(DebugError::NotFound(runtime_name.clone())),
        }
    };
    let handler = match attached {
        Ok(handler) => handler,
        Err(e) => {
            warn!("Rejecting debugger connection for `{runtime_name}`: {e}");
            reject(socket, &runtime_name, &e).await;
            return;
        }
    };

    if !state
        .sessions
        .insert(session_id, &runtime_name, handler.clone(), shutdown_tx)
        .await
    {
        handler.detach_session(session_id);
        reject(socket, &runtime_name, &DebugError::Cancelled).await;
        return;
    }

    info!(session_id =? session_id, runtime = runtime_name, "New debugger connection");

    let (sender, receiver) = socket.split();
    let mut send_task = tokio::spawn(write_messages(sender, rx));
    let mut recv_task = tokio::spawn(read_messages(
        receiver,
        session_id,
        handler,
        responses.clone(),
    ));

    tokio::select! {
        _ = &mut send_task => {
            debug!("Send task completed for session {session_id}");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            debug!("Receive task completed for session {session_id}");
            send_task.abort();
        }
        _ = shutdown_rx => {
            debug!("Listener closing session {session_id}");
            recv_task.abort();
            let _ = responses.send(OutgoingMessage::Close);
            if tokio::time::timeout(Duration::from_secs(1), &mut send_task).await.is_err() {
                send_task.abort();
            }
        }
    }

    state.sessions.remove(session_id).await;
    info!("Debugger connection closed for session {session_id}");
}

/// Sends a JSON-RPC error explaining why the connection is refused, then
/// closes it.
async fn reject(mut socket: WebSocket, runtime_name: &str, err: &DebugError) {
    let (code, close) = match err {
        DebugError::SessionActive(_) => (error_codes::SESSION_IN_USE, close_code::POLICY),
        DebugError::NotFound(_) => (error_codes::NOT_FOUND, close_code::POLICY),
        DebugError::Cancelled => (error_codes::INVALID_STATE, close_code::AWAY),
        _ => (error_codes::INVALID_STATE, close_code::POLICY),
    };
    let message = match err {
        DebugError::SessionActive(_) => {
            format!("Runtime `{runtime_name}` is already being debugged by another client")
        }
        other => other.to_string(),
    };

    let frame = error_response(code, message.clone(), Value::Null);
    if let Err(e) = socket.send(Message::Text(frame.to_string().into())).await {
        debug!("Failed sending rejection for `{runtime_name}`: {e}");
        return;
    }
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close,
            reason: message.into(),
        })))
        .await;
}

/// Handle outgoing messages (responses and notifications)
async fn write_messages(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<OutgoingMessage>,
) {
    while let Some(msg) = rx.recv().await {
        let value = match msg {
            OutgoingMessage::Response(value) | OutgoingMessage::Notification(value) => value,
            OutgoingMessage::Close => {
                let _ = sender
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: String::from("Debugger service closing").into(),
                    })))
                    .await;
                break;
            }
        };
        if let Err(e) = sender.send(Message::Text(value.to_string().into())).await {
            error!("Error sending WebSocket message: {e}");
            break;
        }
    }
}

/// Handle incoming client commands
async fn read_messages(
    mut receiver: SplitStream<WebSocket>,
    session_id: SessionId,
    handler: Arc<ProtocolHandler>,
    responses: mpsc::UnboundedSender<OutgoingMessage>,
) {
    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let response = handle_text(text.as_str(), session_id, &handler);
                if responses.send(OutgoingMessage::Response(response)).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("Client closed session {session_id}");
                break;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary message on session {session_id}");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Err(e) => {
                error!("WebSocket error for session {session_id}: {e}");
                break;
            }
        }
    }
}

fn handle_text(text: &str, session_id: SessionId, handler: &ProtocolHandler) -> Value {
    let request: JsonRpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            // Echo back the id if the frame was at least valid JSON
            let id = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("id").cloned())
                .unwrap_or(Value::Null);
            let code = if id.is_null() {
                error_codes::PARSE_ERROR
            } else {
                error_codes::INVALID_REQUEST
            };
            return error_response(code, format!("Invalid request: {e}"), id);
        }
    };
    handler.handle_command(session_id, &request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RuntimeHandle;

    #[test]
    fn test_malformed_frames_get_error_responses() {
        let handler = ProtocolHandler::new(RuntimeHandle::allocate());
        let session = SessionId::new_v4();

        let res = handle_text("not json", session, &handler);
        assert_eq!(res["error"]["code"], error_codes::PARSE_ERROR);
        assert_eq!(res["id"], Value::Null);

        let res = handle_text(r#"{"id": 4, "params": 1}"#, session, &handler);
        assert_eq!(res["error"]["code"], error_codes::INVALID_REQUEST);
        assert_eq!(res["id"], 4);
    }
}
