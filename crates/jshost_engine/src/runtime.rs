use std::{io::Write, sync::Arc};

use deno_core::{
    JsRuntime, PollEventLoopOptions,
    error::{CoreError, CoreErrorKind, JsError},
};
use jshost_debugger::{DebugEvents, RuntimeHandle};
use parking_lot::Mutex;
use tracing::debug;

use crate::{
    context::{HOST_CALLBACKS, HostContext},
    error::{EngineError, Result},
    ops::{self, HostState},
};

/// Where `host.echo` writes
pub type OutputSink = Arc<Mutex<dyn Write + Send>>;

pub struct RuntimeOptions {
    pub output: OutputSink,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            output: Arc::new(Mutex::new(std::io::stdout())),
        }
    }
}

impl RuntimeOptions {
    #[must_use]
    pub fn with_output(mut self, output: OutputSink) -> Self {
        self.output = output;
        self
    }
}

// Host object ops and bindings, with the per-runtime state.
deno_core::extension!(
    jshost_host,
    ops = [
        ops::op_host_echo,
        ops::op_host_throw,
        ops::op_host_load_script,
        ops::op_debug_statement,
        ops::op_debug_break,
    ],
    esm_entry_point = "ext:jshost_host/host.js",
    esm = [ dir "src", "host.js" ],
    options = {
        host: HostState,
    },
    state = |state, options| {
        state.put(options.host);
    },
);

/// One script engine instance.
///
/// Owns the V8 isolate and the current-thread tokio runtime that drives its
/// event loop, so it must stay on the thread that created it.
pub struct Runtime {
    handle: RuntimeHandle,
    js: JsRuntime,
    event_loop: tokio::runtime::Runtime,
    context_created: bool,
}

impl Runtime {
    /// # Errors
    ///
    /// `Runtime` if the event loop runtime cannot be built.
    pub fn new(options: RuntimeOptions) -> Result<Self> {
        // Create a new current-thread runtime for Deno ops that use deno_unsync
        let event_loop = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::Runtime(format!("Failed to create runtime: {e}")))?;

        let js = JsRuntime::new(deno_core::RuntimeOptions {
            extensions: vec![jshost_host::init(HostState {
                output: options.output,
                debugger: None,
            })],
            ..Default::default()
        });

        let handle = RuntimeHandle::allocate();
        debug!(runtime = %handle, "Created script runtime");
        Ok(Self {
            handle,
            js,
            event_loop,
            context_created: false,
        })
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle
    }

    /// Routes engine debug events to `debugger` from now on.
    pub fn attach_debugger(&mut self, debugger: Arc<dyn DebugEvents>) {
        self.js.op_state().borrow_mut().borrow_mut::<HostState>().debugger = Some(debugger);
    }

    pub fn detach_debugger(&mut self) -> Option<Arc<dyn DebugEvents>> {
        self.js
            .op_state()
            .borrow_mut()
            .borrow_mut::<HostState>()
            .debugger
            .take()
    }

    pub fn has_debugger(&self) -> bool {
        self.debugger().is_some()
    }

    pub(crate) fn debugger(&self) -> Option<Arc<dyn DebugEvents>> {
        self.js
            .op_state()
            .borrow()
            .try_borrow::<HostState>()
            .and_then(|host| host.debugger.clone())
    }

    /// Installs the global `host` object and returns the context that runs
    /// scripts against it.
    ///
    /// `args` becomes `host.arguments`; by convention the first entry is the
    /// script path.
    ///
    /// # Errors
    ///
    /// `InvalidState` if a context was already created on this runtime.
    pub fn create_context(&mut self, args: &[String]) -> Result<HostContext<'_>> {
        if self.context_created {
            return Err(EngineError::InvalidState(format!(
                "{} already has an execution context",
                self.handle
            )));
        }

        let install = format!(
            "globalThis[Symbol.for(\"jshost.install\")]({}, {});",
            to_js_literal(&HOST_CALLBACKS)?,
            to_js_literal(&args)?,
        );
        self.js
            .execute_script("<jshost:context>", install)
            .map_err(|e| EngineError::Runtime(format!("Failed to install host object: {e}")))?;
        self.context_created = true;

        Ok(HostContext::new(self))
    }

    pub(crate) fn parts(&mut self) -> (&mut JsRuntime, &tokio::runtime::Runtime) {
        (&mut self.js, &self.event_loop)
    }

    /// Drives pending promises and ops to completion.
    pub(crate) fn run_event_loop(&mut self) -> Result<()> {
        let (js, event_loop) = self.parts();
        event_loop
            .block_on(js.run_event_loop(PollEventLoopOptions::default()))
            .map_err(|e| EngineError::ScriptException(core_error_message(&e)))
    }

    /// Releases the engine.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a debugger is still attached.
    pub fn dispose(self) -> Result<()> {
        if self.has_debugger() {
            return Err(EngineError::InvalidState(format!(
                "{} still has a debugger attached",
                self.handle
            )));
        }
        debug!(runtime = %self.handle, "Disposing script runtime");
        drop(self.js);
        drop(self.event_loop);
        Ok(())
    }
}

/// Serializes a value as a JavaScript literal.
pub(crate) fn to_js_literal(value: &impl serde::Serialize) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| EngineError::Runtime(format!("Failed to encode script input: {e}")))
}

/// The message of a JavaScript exception, multi-line messages included.
///
/// Falls back to the decorated report when the thrown value was not an
/// `Error`.
pub(crate) fn js_error_message(error: &JsError) -> String {
    match &error.message {
        Some(message) => message.clone(),
        None => strip_decoration(&error.exception_message).to_string(),
    }
}

fn core_error_message(error: &CoreError) -> String {
    match error.as_kind() {
        CoreErrorKind::Js(js_error) => js_error_message(js_error),
        _ => exception_message(&error.to_string()),
    }
}

/// Pulls the exception message out of an engine error report such as
/// `Uncaught Error: boom\n    at ...`. Only the first line survives, so
/// this is for errors that carry no structured exception.
pub(crate) fn exception_message(report: &str) -> String {
    strip_decoration(report.lines().next().unwrap_or_default()).to_string()
}

fn strip_decoration(report: &str) -> &str {
    let report = report.strip_prefix("Uncaught ").unwrap_or(report);
    let report = report.strip_prefix("(in promise) ").unwrap_or(report);
    match report.split_once(": ") {
        Some((name, message)) if name.ends_with("Error") && !name.contains(' ') => message,
        _ => report,
    }
}
