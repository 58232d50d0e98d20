//! Identifiers shared between the engine binding and the debugger.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_SOURCE_CONTEXT: AtomicU32 = AtomicU32::new(0);
static NEXT_RUNTIME: AtomicU64 = AtomicU64::new(1);

/// Correlates a loaded script with debug locations.
///
/// Values come from a process-wide counter that is never reset, so a context
/// id is never handed out twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceContext(u32);

impl SourceContext {
    /// Allocates the next context id for this process.
    pub fn next() -> Self {
        Self(NEXT_SOURCE_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for SourceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque handle for one script engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeHandle(u64);

impl RuntimeHandle {
    pub fn allocate() -> Self {
        Self(NEXT_RUNTIME.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// A script as it was handed to the engine, before instrumentation.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub url: String,
    pub text: String,
}
