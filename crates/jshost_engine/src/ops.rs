//! Deno ops behind the `host` object and the debugger hooks
//!
//! Every op reads the per-runtime [`HostState`] from the `OpState`.

use std::{io::Write, sync::Arc};

use deno_core::{OpState, op2};
use jshost_debugger::{BreakKind, DebugEvents, SourceContext};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::HostError, instrument::instrument, load::load_script, runtime::OutputSink,
};

/// Message of the error `host.throw()` raises without an argument
pub(crate) const SAMPLE_ERROR_MESSAGE: &str = "Sample error message";

pub(crate) struct HostState {
    pub(crate) output: OutputSink,
    pub(crate) debugger: Option<Arc<dyn DebugEvents>>,
}

/// Allocates a source context, through the debugger when one is attached
/// so it can announce the script.
pub(crate) fn register_source(
    debugger: Option<&Arc<dyn DebugEvents>>,
    url: &str,
    text: &str,
) -> SourceContext {
    match debugger {
        Some(debugger) => debugger.register_source_context(url, text),
        None => SourceContext::next(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoadedScript {
    pub(crate) code: String,
    pub(crate) url: String,
    pub(crate) context_id: SourceContext,
}

/// Write one line to the host output
#[op2(fast)]
pub(crate) fn op_host_echo(state: &mut OpState, #[string] line: String) -> Result<(), HostError> {
    let host = state
        .try_borrow::<HostState>()
        .ok_or(HostError::MissingState)?;
    let mut output = host.output.lock();
    writeln!(output, "{line}")?;
    output.flush()?;
    Ok(())
}

/// Raise the sample host error
#[op2(fast)]
pub(crate) fn op_host_throw() -> Result<(), HostError> {
    Err(HostError::Thrown(SAMPLE_ERROR_MESSAGE.to_string()))
}

/// Load a script for `host.runScript`
///
/// Registers the script with the debugger and hands the instrumented code
/// back for evaluation.
#[op2]
#[serde]
pub(crate) fn op_host_load_script(
    state: &mut OpState,
    #[string] path: String,
) -> Result<LoadedScript, HostError> {
    let debugger = state
        .try_borrow::<HostState>()
        .ok_or(HostError::MissingState)?
        .debugger
        .clone();

    let file = load_script(path.as_ref()).map_err(|e| HostError::RunScript(e.to_string()))?;
    let url = file.path.to_string();
    let context = register_source(debugger.as_ref(), &url, &file.text);
    let instrumented = instrument(&file.text, context);
    debug!(context = %context, url, statements = instrumented.sites.len(), "Loaded nested script");

    Ok(LoadedScript {
        code: instrumented.code,
        url,
        context_id: context,
    })
}

fn report(state: &OpState, context: u32, line: u32, column: u32, kind: BreakKind) {
    let Some(debugger) = state
        .try_borrow::<HostState>()
        .and_then(|host| host.debugger.clone())
    else {
        return;
    };
    debugger.break_here(SourceContext::from_raw(context), line, column, kind);
}

/// Report a statement start; blocks while the debugger holds the runtime
/// paused
#[op2(fast)]
pub(crate) fn op_debug_statement(state: &mut OpState, context: u32, line: u32, column: u32) {
    report(state, context, line, column, BreakKind::Statement);
}

/// Report a `debugger` statement
#[op2(fast)]
pub(crate) fn op_debug_break(state: &mut OpState, context: u32, line: u32, column: u32) {
    report(state, context, line, column, BreakKind::DebuggerStatement);
}
