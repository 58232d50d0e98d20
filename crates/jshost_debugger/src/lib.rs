//! Remote debugging for embedded JavaScript runtimes
//!
//! A [`SessionService`] owns a registry of named [`ProtocolHandler`]s and a
//! WebSocket listener. Debugger clients connect to `ws://host:port/{name}`
//! and drive the handler with JSON-RPC commands; the engine reports
//! execution events through [`DebugEvents`].
//!
//! Lifecycle order on the host side:
//! `register_handler → listen → wait_for_debugger → … → close →
//! unregister_handler → destroy (service) → destroy (handler)`.

pub mod breakpoints;
pub mod error;
pub mod events;
pub mod handler;
pub mod listener;
pub mod protocol;
pub mod service;
pub mod session;
pub mod source;

pub use breakpoints::{Breakpoint, BreakpointTable};
pub use error::{DebugError, Result};
pub use events::{BreakKind, DebugEvents};
pub use handler::{HandlerPhase, ProtocolHandler};
pub use listener::TransportListener;
pub use service::{ServiceConfig, SessionService};
pub use session::{OutgoingMessage, SessionId, SessionLink, SessionTable};
pub use source::{RuntimeHandle, ScriptSource, SourceContext};
