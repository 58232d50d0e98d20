use std::net::SocketAddr;

pub type Result<T> = std::result::Result<T, DebugError>;

/// Failures surfaced by the debugging service.
///
/// None of these are retried automatically: every variant describes a
/// lifecycle or configuration condition the caller has to resolve.
#[derive(Debug, thiserror::Error)]
pub enum DebugError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Runtime `{0}` is already registered")]
    DuplicateName(String),

    #[error("Runtime `{0}` not found")]
    NotFound(String),

    #[error("No handlers registered, nothing to listen for")]
    NoHandlers,

    #[error("Address {0} is already in use")]
    AddressInUse(SocketAddr),

    #[error("Permission denied binding {0}")]
    PermissionDenied(String),

    #[error("Runtime `{0}` has an attached debugger session")]
    SessionActive(String),

    #[error("Wait for debugger was cancelled")]
    Cancelled,

    #[error("Timed out waiting for debugger")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),
}

impl DebugError {
    /// Maps a bind failure onto the transport error taxonomy.
    pub(crate) fn from_bind(addr: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::AddrInUse => match addr.parse() {
                Ok(socket_addr) => DebugError::AddressInUse(socket_addr),
                Err(_) => DebugError::Transport(format!("{addr}: {err}")),
            },
            std::io::ErrorKind::PermissionDenied => DebugError::PermissionDenied(addr.to_string()),
            _ => DebugError::Transport(format!("Failed binding {addr}: {err}")),
        }
    }
}
