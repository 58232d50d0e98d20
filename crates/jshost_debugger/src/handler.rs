/// Protocol handler bound to one script runtime
///
/// Translates engine debug events into protocol notifications and client
/// commands into engine state changes.
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use crate::{
    breakpoints::BreakpointTable,
    error::{DebugError, Result},
    events::{BreakKind, DebugEvents},
    protocol::{
        ExceptionParams, GetScriptSourceParams, JsonRpcErrorResponse, JsonRpcNotification,
        JsonRpcRequest, JsonRpcResponse, Method, PauseReason, PausedParams,
        RemoveBreakpointParams, ScriptParsedParams, SetBreakpointParams, error_codes,
        notifications,
    },
    session::{OutgoingMessage, SessionId, SessionLink},
    source::{RuntimeHandle, ScriptSource, SourceContext},
};

/// Lifecycle of a handler.
///
/// `Uninitialized → Registered → {Running ⇄ Paused} → Terminated → Destroyed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HandlerPhase {
    Uninitialized,
    /// Registered with a service, no session has attached yet
    Registered,
    Running,
    Paused,
    Terminated,
    Destroyed,
}

struct HandlerInner {
    phase: HandlerPhase,
    in_registry: bool,
    break_on_next_statement: bool,
    session: Option<SessionLink>,
    client_ready: bool,
    cancelled: bool,
    resume_requested: bool,
    pending_pause: Option<PausedParams>,
    breakpoints: BreakpointTable,
    sources: BTreeMap<SourceContext, ScriptSource>,
}

impl HandlerInner {
    fn notify(&self, method: &str, params: impl Serialize) {
        let Some(session) = &self.session else {
            return;
        };
        let notification = JsonRpcNotification::new(method, serde_json::to_value(params).ok());
        match OutgoingMessage::notification(&notification) {
            Some(message) => session.send(message),
            None => error!("Failed to serialize `{method}` notification"),
        }
    }
}

pub struct ProtocolHandler {
    runtime: RuntimeHandle,
    inner: Mutex<HandlerInner>,
    signal: Condvar,
}

impl ProtocolHandler {
    pub fn new(runtime: RuntimeHandle) -> Self {
        Self {
            runtime,
            inner: Mutex::new(HandlerInner {
                phase: HandlerPhase::Uninitialized,
                in_registry: false,
                break_on_next_statement: false,
                session: None,
                client_ready: false,
                cancelled: false,
                resume_requested: false,
                pending_pause: None,
                breakpoints: BreakpointTable::new(),
                sources: BTreeMap::new(),
            }),
            signal: Condvar::new(),
        }
    }

    pub fn runtime(&self) -> RuntimeHandle {
        self.runtime
    }

    pub fn phase(&self) -> HandlerPhase {
        self.inner.lock().phase
    }

    pub fn has_session(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.inner.lock().session.as_ref().map(|s| s.id)
    }

    pub fn break_on_next_statement(&self) -> bool {
        self.inner.lock().break_on_next_statement
    }

    /// When set, the next statement reported by the engine pauses.
    pub fn set_break_on_next_statement(&self, enabled: bool) {
        self.inner.lock().break_on_next_statement = enabled;
    }

    pub fn breakpoint_count(&self) -> usize {
        self.inner.lock().breakpoints.len()
    }

    pub(crate) fn mark_registered(&self, break_on_next_statement: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.in_registry {
            return Err(DebugError::InvalidState(format!(
                "Handler for {} is already registered",
                self.runtime
            )));
        }
        match inner.phase {
            HandlerPhase::Uninitialized | HandlerPhase::Registered => {
                inner.phase = HandlerPhase::Registered;
                inner.in_registry = true;
                inner.break_on_next_statement = break_on_next_statement;
                Ok(())
            }
            phase => Err(DebugError::InvalidState(format!(
                "Cannot register handler for {} in phase {phase:?}",
                self.runtime
            ))),
        }
    }

    pub(crate) fn mark_unregistered(&self) {
        self.inner.lock().in_registry = false;
        self.cancel();
        self.terminate();
    }

    /// Blocks until a client attaches and sends `runIfWaitingForDebugger`.
    ///
    /// # Errors
    ///
    /// `Cancelled` if the owning service closes while waiting, `Timeout` if
    /// `timeout` elapses first, `InvalidState` if the handler was never
    /// registered.
    pub fn wait_for_debugger(&self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut inner = self.inner.lock();

        loop {
            if inner.cancelled {
                return Err(DebugError::Cancelled);
            }
            match inner.phase {
                HandlerPhase::Uninitialized => {
                    return Err(DebugError::InvalidState(format!(
                        "Handler for {} is not registered",
                        self.runtime
                    )));
                }
                HandlerPhase::Terminated | HandlerPhase::Destroyed => {
                    return Err(DebugError::Cancelled);
                }
                _ => {}
            }
            if inner.client_ready {
                return Ok(());
            }

            match deadline {
                Some(deadline) => {
                    if self.signal.wait_until(&mut inner, deadline).timed_out()
                        && !inner.client_ready
                        && !inner.cancelled
                    {
                        return Err(DebugError::Timeout);
                    }
                }
                None => self.signal.wait(&mut inner),
            }
        }
    }

    /// Attaches a client session.
    ///
    /// # Errors
    ///
    /// `SessionActive` if another session is attached, `InvalidState` if the
    /// handler is not registered or already terminated.
    pub fn attach_session(&self, link: SessionLink) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.phase {
            HandlerPhase::Registered | HandlerPhase::Running | HandlerPhase::Paused => {}
            phase => {
                return Err(DebugError::InvalidState(format!(
                    "Cannot attach to {} in phase {phase:?}",
                    self.runtime
                )));
            }
        }
        if inner.session.is_some() {
            return Err(DebugError::SessionActive(self.runtime.to_string()));
        }

        if inner.phase == HandlerPhase::Registered {
            inner.phase = HandlerPhase::Running;
        }
        let session_id = link.id;
        inner.session = Some(link);

        inner.notify(
            notifications::ATTACHED,
            json!({
                "sessionId": session_id,
                "runtime": self.runtime.to_string(),
                "state": inner.phase,
            }),
        );
        for (context, source) in &inner.sources {
            inner.notify(
                notifications::SCRIPT_PARSED,
                ScriptParsedParams {
                    context_id: *context,
                    url: source.url.clone(),
                },
            );
        }

        info!(session_id =? session_id, runtime = %self.runtime, "Debugger session attached");
        Ok(())
    }

    /// Detaches the session if it is the one currently attached. A paused
    /// runtime resumes.
    pub fn detach_session(&self, id: SessionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.session.as_ref().is_none_or(|s| s.id != id) {
            return false;
        }
        inner.session = None;
        inner.pending_pause = None;
        if inner.phase == HandlerPhase::Paused {
            inner.resume_requested = true;
        }
        drop(inner);

        self.signal.notify_all();
        info!(session_id =? id, runtime = %self.runtime, "Debugger session detached");
        true
    }

    /// Wakes every blocked waiter; `wait_for_debugger` returns `Cancelled`.
    pub fn cancel(&self) {
        self.inner.lock().cancelled = true;
        self.signal.notify_all();
    }

    /// Ends a debugging lifetime that saw at least one session.
    pub fn terminate(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.phase, HandlerPhase::Running | HandlerPhase::Paused) {
            inner.phase = HandlerPhase::Terminated;
            inner.notify(notifications::TERMINATED, json!({}));
            debug!(runtime = %self.runtime, "Handler terminated");
        }
        drop(inner);
        self.signal.notify_all();
    }

    /// Releases breakpoints and sources.
    ///
    /// # Errors
    ///
    /// `InvalidState` while a session is attached, or from any phase other
    /// than `Registered` or `Terminated`.
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.session.is_some() {
            return Err(DebugError::InvalidState(format!(
                "Handler for {} still has an attached session, close the service first",
                self.runtime
            )));
        }
        match inner.phase {
            HandlerPhase::Registered | HandlerPhase::Terminated => {
                inner.breakpoints.clear();
                inner.sources.clear();
                inner.pending_pause = None;
                inner.phase = HandlerPhase::Destroyed;
                debug!(runtime = %self.runtime, "Handler destroyed");
                Ok(())
            }
            phase => Err(DebugError::InvalidState(format!(
                "Cannot destroy handler for {} in phase {phase:?}",
                self.runtime
            ))),
        }
    }

    /// Handles a request from the session `session_id` and returns the
    /// response to send back.
    pub fn handle_command(&self, session_id: SessionId, request: &JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let mut inner = self.inner.lock();

        if inner.session.as_ref().is_none_or(|s| s.id != session_id) {
            return error_response(
                error_codes::INVALID_STATE,
                "Session is not attached to this runtime",
                id,
            );
        }

        debug!(method = %request.method, session_id =? session_id, "Handling debugger command");

        match request.method {
            Method::RunIfWaitingForDebugger => {
                inner.client_ready = true;
                drop(inner);
                self.signal.notify_all();
                success_response(json!({}), id)
            }
            Method::Resume => {
                if inner.phase != HandlerPhase::Paused {
                    return error_response(
                        error_codes::INVALID_STATE,
                        "Runtime is not paused",
                        id,
                    );
                }
                inner.resume_requested = true;
                drop(inner);
                self.signal.notify_all();
                success_response(json!({}), id)
            }
            Method::Pause => {
                inner.break_on_next_statement = true;
                success_response(json!({}), id)
            }
            Method::SetBreakpoint => {
                let params: SetBreakpointParams = match request.parse_params() {
                    Ok(p) => p,
                    Err(e) => return error_response(error_codes::INVALID_PARAMS, e, id),
                };
                if params.line == 0 || params.column == Some(0) {
                    return error_response(
                        error_codes::INVALID_PARAMS,
                        "Lines and columns are 1-based",
                        id,
                    );
                }
                if !inner.sources.contains_key(&params.context_id) {
                    return error_response(
                        error_codes::NOT_FOUND,
                        format!("Source context {} not found", params.context_id),
                        id,
                    );
                }
                let breakpoint =
                    inner
                        .breakpoints
                        .add(params.context_id, params.line, params.column);
                success_response(json!(breakpoint), id)
            }
            Method::RemoveBreakpoint => {
                let params: RemoveBreakpointParams = match request.parse_params() {
                    Ok(p) => p,
                    Err(e) => return error_response(error_codes::INVALID_PARAMS, e, id),
                };
                let removed = inner.breakpoints.remove(params.breakpoint_id);
                success_response(json!({ "removed": removed }), id)
            }
            Method::ListBreakpoints => success_response(json!(inner.breakpoints.list()), id),
            Method::ListScripts => {
                let scripts: Vec<_> = inner
                    .sources
                    .iter()
                    .map(|(context, source)| ScriptParsedParams {
                        context_id: *context,
                        url: source.url.clone(),
                    })
                    .collect();
                success_response(json!(scripts), id)
            }
            Method::GetScriptSource => {
                let params: GetScriptSourceParams = match request.parse_params() {
                    Ok(p) => p,
                    Err(e) => return error_response(error_codes::INVALID_PARAMS, e, id),
                };
                match inner.sources.get(&params.context_id) {
                    Some(source) => success_response(
                        json!({
                            "contextId": params.context_id,
                            "url": source.url,
                            "source": source.text,
                        }),
                        id,
                    ),
                    None => error_response(
                        error_codes::NOT_FOUND,
                        format!("Source context {} not found", params.context_id),
                        id,
                    ),
                }
            }
            Method::GetState => success_response(
                json!({
                    "state": inner.phase,
                    "breakOnNextStatement": inner.break_on_next_statement,
                }),
                id,
            ),
            Method::Unknown => error_response(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", request.method),
                id,
            ),
        }
    }
}

impl DebugEvents for ProtocolHandler {
    fn register_source_context(&self, source_url: &str, script_text: &str) -> SourceContext {
        let context = SourceContext::next();
        let mut inner = self.inner.lock();
        inner.sources.insert(
            context,
            ScriptSource {
                url: source_url.to_string(),
                text: script_text.to_string(),
            },
        );
        inner.notify(
            notifications::SCRIPT_PARSED,
            ScriptParsedParams {
                context_id: context,
                url: source_url.to_string(),
            },
        );
        debug!(context = %context, url = source_url, "Registered source context");
        context
    }

    fn on_breakpoint(
        &self,
        context: SourceContext,
        line: u32,
        column: u32,
        kind: BreakKind,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.session.is_none()
            || !matches!(inner.phase, HandlerPhase::Running | HandlerPhase::Registered)
        {
            return false;
        }

        let (reason, breakpoint_id) = if inner.break_on_next_statement {
            inner.break_on_next_statement = false;
            (PauseReason::BreakOnNextStatement, None)
        } else if let Some(bp) = inner.breakpoints.hit(context, line, column) {
            (PauseReason::Breakpoint, Some(bp.breakpoint_id))
        } else if kind == BreakKind::DebuggerStatement {
            (PauseReason::DebuggerStatement, None)
        } else {
            return false;
        };

        inner.pending_pause = Some(PausedParams {
            reason,
            context_id: context,
            line,
            column,
            breakpoint_id,
        });
        true
    }

    fn on_exception(&self, context: SourceContext, message: &str) {
        let inner = self.inner.lock();
        inner.notify(
            notifications::EXCEPTION,
            ExceptionParams {
                context_id: context,
                message: message.to_string(),
            },
        );
    }

    fn on_pause(&self) {
        let mut inner = self.inner.lock();
        let Some(paused) = inner.pending_pause.take() else {
            return;
        };
        inner.phase = HandlerPhase::Paused;
        inner.resume_requested = false;
        info!(
            reason =? paused.reason,
            context = %paused.context_id,
            line = paused.line,
            "Runtime paused"
        );
        inner.notify(notifications::PAUSED, paused);
    }

    fn wait_for_resume(&self) {
        let mut inner = self.inner.lock();
        while inner.phase == HandlerPhase::Paused
            && !inner.resume_requested
            && !inner.cancelled
            && inner.session.is_some()
        {
            self.signal.wait(&mut inner);
        }
    }

    fn on_resume(&self) {
        let mut inner = self.inner.lock();
        inner.resume_requested = false;
        if inner.phase != HandlerPhase::Paused {
            return;
        }
        inner.phase = HandlerPhase::Running;
        inner.notify(notifications::RESUMED, json!({}));
        debug!(runtime = %self.runtime, "Runtime resumed");
    }
}

impl Drop for ProtocolHandler {
    fn drop(&mut self) {
        let phase = self.inner.get_mut().phase;
        if !matches!(phase, HandlerPhase::Destroyed | HandlerPhase::Uninitialized) {
            warn!(runtime = %self.runtime, phase =? phase, "Protocol handler dropped without destroy");
        }
    }
}

/// Helper to create a success response, with proper error handling
fn success_response(result: Value, id: Value) -> Value {
    serde_json::to_value(JsonRpcResponse::success(result, id)).unwrap_or_else(|e| {
        error!("Critical: Failed to serialize success response: {e}");
        internal_error(Value::Null)
    })
}

/// Helper to create an error response, with proper error handling
pub(crate) fn error_response(code: i32, message: impl Into<String>, id: Value) -> Value {
    serde_json::to_value(JsonRpcErrorResponse::error(code, message, id.clone())).unwrap_or_else(
        |e| {
            error!("Critical: Failed to serialize error response: {e}");
            internal_error(id)
        },
    )
}

fn internal_error(id: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": error_codes::INTERNAL_ERROR,
            "message": "Internal serialization error"
        },
        "id": id
    })
}
