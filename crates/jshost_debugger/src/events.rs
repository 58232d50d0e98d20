//! Engine-facing side of the debugger.
//!
//! The engine binding calls these hooks on its own thread. Implementations
//! must only queue protocol messages; the one blocking call is
//! [`DebugEvents::wait_for_resume`], which is the engine's break primitive.

use crate::source::SourceContext;

/// What kind of location the engine is reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakKind {
    /// An ordinary statement; only stops when armed or on a breakpoint.
    Statement,
    /// An explicit `debugger` statement; stops whenever a client is attached.
    DebuggerStatement,
}

pub trait DebugEvents: Send + Sync {
    /// Records a script about to be executed and returns its context id.
    fn register_source_context(&self, source_url: &str, script_text: &str) -> SourceContext;

    /// Returns `true` when the engine must pause at this location.
    fn on_breakpoint(&self, context: SourceContext, line: u32, column: u32, kind: BreakKind)
    -> bool;

    /// An uncaught exception escaped the script.
    fn on_exception(&self, context: SourceContext, message: &str);

    fn on_pause(&self);

    /// Blocks the calling thread while the runtime is paused.
    fn wait_for_resume(&self);

    fn on_resume(&self);

    /// Runs the full pause sequence if the location calls for it.
    fn break_here(&self, context: SourceContext, line: u32, column: u32, kind: BreakKind) {
        if self.on_breakpoint(context, line, column, kind) {
            self.on_pause();
            self.wait_for_resume();
            self.on_resume();
        }
    }
}
