use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::{
    error::{DebugError, Result},
    handler::ProtocolHandler,
    listener::TransportListener,
    session::SessionTable,
};

/// Handlers addressable by runtime name.
///
/// Sessions attach under the read lock; registration changes take the write
/// lock.
pub(crate) type HandlerRegistry = RwLock<HashMap<String, Arc<ProtocolHandler>>>;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Interface the listener binds
    pub host: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
        }
    }
}

/// Owns the handler registry and the transport listener of one process.
pub struct SessionService {
    registry: Arc<HandlerRegistry>,
    listener: TransportListener,
    destroyed: AtomicBool,
}

impl SessionService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            registry: Arc::new(RwLock::new(HashMap::new())),
            listener: TransportListener::new(config.host),
            destroyed: AtomicBool::new(false),
        }
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(DebugError::InvalidState(
                "Debugger service has been destroyed".to_string(),
            ));
        }
        Ok(())
    }

    /// Makes `handler` reachable at `/{name}`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for names that cannot appear as a single path
    /// segment, `DuplicateName` if the name is taken, `InvalidState` if the
    /// handler is already registered or the service was destroyed.
    pub async fn register_handler(
        &self,
        name: &str,
        handler: Arc<ProtocolHandler>,
        break_on_next_statement: bool,
    ) -> Result<()> {
        self.ensure_alive()?;
        if name.is_empty() || name.contains('/') {
            return Err(DebugError::InvalidArgument(format!(
                "Invalid runtime name `{name}`"
            )));
        }

        let mut registry = self.registry.write().await;
        if registry.contains_key(name) {
            return Err(DebugError::DuplicateName(name.to_string()));
        }
        handler.mark_registered(break_on_next_statement)?;
        info!(runtime = %handler.runtime(), "Registered debug handler as `{name}`");
        registry.insert(name.to_string(), handler);
        Ok(())
    }

    /// Removes the handler registered as `name`, cancelling any waiter.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing is registered under `name`, `SessionActive`
    /// while a client is attached (close the service first).
    pub async fn unregister_handler(&self, name: &str) -> Result<()> {
        let mut registry = self.registry.write().await;
        let Some(handler) = registry.get(name) else {
            return Err(DebugError::NotFound(name.to_string()));
        };
        if handler.has_session() {
            return Err(DebugError::SessionActive(name.to_string()));
        }
        if let Some(handler) = registry.remove(name) {
            handler.mark_unregistered();
        }
        debug!("Unregistered debug handler `{name}`");
        Ok(())
    }

    /// Starts accepting debugger connections and returns the bound address.
    ///
    /// # Errors
    ///
    /// `NoHandlers` with an empty registry, `InvalidState` when already
    /// listening, or a bind error.
    pub async fn listen(&self, port: u16) -> Result<SocketAddr> {
        self.ensure_alive()?;
        if self.registry.read().await.is_empty() {
            return Err(DebugError::NoHandlers);
        }
        self.listener.listen(port, self.registry.clone()).await
    }

    /// Stops the listener, closes sessions and releases every blocked
    /// waiter. Safe to call more than once.
    pub async fn close(&self) -> Result<()> {
        // Terminate first so attached clients see `terminated` before the close frame
        for handler in self.registry.read().await.values() {
            handler.cancel();
            handler.terminate();
        }
        self.listener.close().await
    }

    /// Final teardown.
    ///
    /// # Errors
    ///
    /// `InvalidState` while handlers are registered, while listening, or on
    /// a second call.
    pub async fn destroy(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.listener.is_listening().await {
            return Err(DebugError::InvalidState(
                "Close the debugger service before destroying it".to_string(),
            ));
        }
        let registry = self.registry.read().await;
        if !registry.is_empty() {
            let mut names: Vec<_> = registry.keys().cloned().collect();
            names.sort();
            return Err(DebugError::InvalidState(format!(
                "Handlers still registered: {}",
                names.join(", ")
            )));
        }
        self.destroyed.store(true, Ordering::Release);
        debug!("Debugger service destroyed");
        Ok(())
    }

    pub async fn handler(&self, name: &str) -> Option<Arc<ProtocolHandler>> {
        self.registry.read().await.get(name).cloned()
    }

    pub async fn handler_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.registry.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().await
    }

    pub fn host(&self) -> &str {
        self.listener.host()
    }

    pub fn sessions(&self) -> Arc<SessionTable> {
        self.listener.sessions()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}
