//! Shared helpers for debugger integration tests

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use jshost_debugger::{ProtocolHandler, RuntimeHandle, ServiceConfig, SessionService};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsWrite = SplitSink<WsStream, Message>;
pub(crate) type WsRead = SplitStream<WsStream>;

#[allow(unused)]
pub(crate) async fn start_service(names: &[&str]) -> (SessionService, Vec<Arc<ProtocolHandler>>, SocketAddr) {
    let service = SessionService::new(ServiceConfig::default());
    let mut handlers = Vec::new();
    for name in names {
        let handler = Arc::new(ProtocolHandler::new(RuntimeHandle::allocate()));
        service
            .register_handler(name, handler.clone(), false)
            .await
            .expect("Failed registering handler");
        handlers.push(handler);
    }
    let addr = service.listen(0).await.expect("Failed to listen");
    (service, handlers, addr)
}

/// Runs the full teardown order and checks that every step succeeds
#[allow(unused)]
pub(crate) async fn teardown(service: SessionService, names: &[&str], handlers: Vec<Arc<ProtocolHandler>>) {
    service.close().await.expect("close");
    for name in names {
        service.unregister_handler(name).await.expect("unregister");
    }
    service.destroy().await.expect("destroy service");
    for handler in handlers {
        handler.destroy().expect("destroy handler");
    }
}

#[allow(unused)]
pub(crate) async fn connect(addr: SocketAddr, name: &str) -> (WsWrite, WsRead) {
    let url = format!("ws://{addr}/{name}");
    let (ws_stream, _) = connect_async(&url).await.expect("Failed to connect");
    ws_stream.split()
}

/// Next text frame as JSON, failing the test after a few seconds
#[allow(unused)]
pub(crate) async fn next_json(read: &mut WsRead) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), read.next())
            .await
            .expect("Timed out waiting for a frame");
        match frame {
            Some(Ok(Message::Text(text))) => {
                return serde_json::from_str(&text).expect("Frame is not JSON");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("Expected a text frame, got {other:?}"),
        }
    }
}

/// Reads frames until the response with `id` arrives, returning it along
/// with the notifications seen on the way.
#[allow(unused)]
pub(crate) async fn response_for(read: &mut WsRead, id: u64) -> (Value, Vec<Value>) {
    let mut notifications = Vec::new();
    loop {
        let msg = next_json(read).await;
        if msg.get("id").and_then(Value::as_u64) == Some(id) {
            return (msg, notifications);
        }
        notifications.push(msg);
    }
}

#[allow(unused)]
pub(crate) async fn send_request(write: &mut WsWrite, method: &str, params: Value, id: u64) {
    let mut request = json!({
        "jsonrpc": "2.0",
        "method": method,
        "id": id,
    });
    if !params.is_null() {
        request["params"] = params;
    }
    write
        .send(Message::Text(request.to_string().into()))
        .await
        .expect("Failed to send request");
}

/// A connected client that keeps notifications which arrive while it waits
/// for a response, since the engine thread can race the response frame.
#[allow(unused)]
pub(crate) struct DebugClient {
    pub(crate) write: WsWrite,
    pub(crate) read: WsRead,
    backlog: std::collections::VecDeque<Value>,
    next_id: u64,
}

#[allow(unused)]
impl DebugClient {
    pub(crate) async fn connect(addr: SocketAddr, name: &str) -> Self {
        let (write, read) = connect(addr, name).await;
        Self {
            write,
            read,
            backlog: std::collections::VecDeque::new(),
            next_id: 1,
        }
    }

    pub(crate) async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        send_request(&mut self.write, method, params, id).await;
        let (response, notifications) = response_for(&mut self.read, id).await;
        self.backlog.extend(notifications);
        response
    }

    pub(crate) async fn notification(&mut self) -> Value {
        match self.backlog.pop_front() {
            Some(msg) => msg,
            None => next_json(&mut self.read).await,
        }
    }

    /// Skips notifications until one named `method` arrives
    pub(crate) async fn expect(&mut self, method: &str) -> Value {
        loop {
            let msg = self.notification().await;
            if msg["method"] == method {
                return msg;
            }
        }
    }
}
