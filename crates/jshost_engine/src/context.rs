use std::path::Path;

use deno_core::{serde_v8, v8};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    error::{EngineError, Result},
    instrument::instrument,
    load::load_script,
    ops::register_source,
    runtime::{Runtime, js_error_message, to_js_literal},
};

/// Native callbacks installed on the global `host` object, by property name
pub const HOST_CALLBACKS: [&str; 3] = ["echo", "runScript", "throw"];

/// The value a script completed with.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// JSON form of the value; `null` when it has none
    pub value: Value,
    /// The value under JavaScript `ToNumber`
    pub number: f64,
}

impl Completion {
    /// The completion number truncated toward zero, with NaN as 0.
    pub fn exit_code(&self) -> i32 {
        if self.number.is_nan() {
            0
        } else {
            self.number.trunc() as i32
        }
    }
}

#[derive(Debug, Deserialize)]
struct Evaluation {
    ok: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    number: Option<f64>,
}

/// An execution context with the `host` object installed.
///
/// Borrows its runtime, so it is always released before the runtime can be
/// disposed.
pub struct HostContext<'rt> {
    runtime: &'rt mut Runtime,
}

impl<'rt> HostContext<'rt> {
    pub(crate) fn new(runtime: &'rt mut Runtime) -> Self {
        Self { runtime }
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        self.runtime
    }

    /// Runs the script at `path` and drives its pending work to completion.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if the file cannot be read or is empty,
    /// `ScriptException` if the script throws, `Runtime` for engine failures.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Completion> {
        let file = load_script(path.as_ref())?;
        let url = file.path.to_string();
        let debugger = self.runtime.debugger();

        let context = register_source(debugger.as_ref(), &url, &file.text);
        let instrumented = instrument(&file.text, context);
        debug!(
            context = %context,
            url,
            statements = instrumented.sites.len(),
            debugger_statements = instrumented.debugger_statements(),
            entry = ?instrumented.entry(),
            "Running script"
        );

        let result = self.evaluate(&instrumented.code, &url);
        let result = match result {
            Ok(completion) => self.runtime.run_event_loop().map(|()| completion),
            Err(e) => Err(e),
        };

        if let Err(EngineError::ScriptException(message)) = &result {
            info!(context = %context, "Script threw: {message}");
            if let Some(debugger) = &debugger {
                debugger.on_exception(context, message);
            }
        }
        result
    }

    fn evaluate(&mut self, code: &str, url: &str) -> Result<Completion> {
        let call = format!(
            "globalThis[Symbol.for(\"jshost.evaluate\")]({}, {});",
            to_js_literal(&code)?,
            to_js_literal(&url)?,
        );

        let (js, _) = self.runtime.parts();
        let global = js
            .execute_script("<jshost:run>", call)
            .map_err(|e| EngineError::ScriptException(js_error_message(&e)))?;

        let evaluation: Evaluation = {
            deno_core::scope!(scope, js);
            let local = v8::Local::new(scope, global);
            serde_v8::from_v8(scope, local)
                .map_err(|e| EngineError::Runtime(format!("Failed to read script result: {e}")))?
        };

        if !evaluation.ok {
            return Err(EngineError::ScriptException(
                evaluation.message.unwrap_or_default(),
            ));
        }
        Ok(Completion {
            value: evaluation.value,
            number: evaluation.number.unwrap_or(f64::NAN),
        })
    }
}
