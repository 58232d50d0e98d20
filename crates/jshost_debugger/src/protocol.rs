/// Debug wire protocol for jshost
///
/// Uses JSON-RPC 2.0 style messaging: the client sends requests, the server
/// answers each one and pushes notifications for engine events.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::source::SourceContext;

/// Supported client-to-server methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Method {
    /// Release a runtime blocked in `wait_for_debugger`
    RunIfWaitingForDebugger,
    /// Continue a paused runtime
    Resume,
    /// Pause at the next statement
    Pause,
    SetBreakpoint,
    RemoveBreakpoint,
    ListBreakpoints,
    ListScripts,
    GetScriptSource,
    GetState,
    /// Unknown method (catch-all for forward compatibility)
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Method::RunIfWaitingForDebugger => "runIfWaitingForDebugger",
            Method::Resume => "resume",
            Method::Pause => "pause",
            Method::SetBreakpoint => "setBreakpoint",
            Method::RemoveBreakpoint => "removeBreakpoint",
            Method::ListBreakpoints => "listBreakpoints",
            Method::ListScripts => "listScripts",
            Method::GetScriptSource => "getScriptSource",
            Method::GetState => "getState",
            Method::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Server-to-client notification names
pub mod notifications {
    pub const ATTACHED: &str = "attached";
    pub const SCRIPT_PARSED: &str = "scriptParsed";
    pub const PAUSED: &str = "paused";
    pub const RESUMED: &str = "resumed";
    pub const EXCEPTION: &str = "exception";
    pub const TERMINATED: &str = "terminated";
}

/// JSON-RPC 2.0 Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: Value,
}

/// JSON-RPC 2.0 Response (success)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: Value,
    pub id: Value,
}

/// JSON-RPC 2.0 Error Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: String,
    pub error: JsonRpcError,
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC 2.0 Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointParams {
    pub context_id: SourceContext,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointParams {
    pub breakpoint_id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetScriptSourceParams {
    pub context_id: SourceContext,
}

/// Why the runtime stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PauseReason {
    BreakOnNextStatement,
    Breakpoint,
    DebuggerStatement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedParams {
    pub reason: PauseReason,
    pub context_id: SourceContext,
    pub line: u32,
    pub column: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakpoint_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedParams {
    pub context_id: SourceContext,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionParams {
    pub context_id: SourceContext,
    pub message: String,
}

/// Standard error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    // Application errors
    pub const SESSION_IN_USE: i32 = -32000;
    pub const INVALID_STATE: i32 = -32001;
    pub const NOT_FOUND: i32 = -32002;
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request with a method name that will be parsed to Method enum
    pub fn new(method: impl Into<String>, params: Option<Value>, id: impl Into<Value>) -> Self {
        let method_enum = serde_json::from_value(Value::String(method.into()))
            .unwrap_or(Method::Unknown);

        Self::with_method(method_enum, params, id)
    }

    pub fn with_method(method: Method, params: Option<Value>, id: impl Into<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method,
            params,
            id: id.into(),
        }
    }

    /// Deserializes the request params, treating missing params as `null`
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        serde_json::from_value(self.params.clone().unwrap_or(Value::Null))
            .map_err(|e| format!("Invalid params: {e}"))
    }
}

impl JsonRpcResponse {
    pub fn success(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result,
            id,
        }
    }
}

impl JsonRpcErrorResponse {
    pub fn error(code: i32, message: impl Into<String>, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            error: JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
            id,
        }
    }
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_names_round_trip_through_display() {
        for method in [
            Method::RunIfWaitingForDebugger,
            Method::Resume,
            Method::SetBreakpoint,
            Method::GetScriptSource,
        ] {
            let parsed = JsonRpcRequest::new(method.to_string(), None, 1).method;
            assert_eq!(parsed, method);
        }
    }

    #[test]
    fn test_unknown_method_is_caught() {
        let req: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": "Debugger.enable",
            "id": 7
        }))
        .unwrap();
        assert_eq!(req.method, Method::Unknown);
        assert!(req.params.is_none());
    }

    #[test]
    fn test_set_breakpoint_params_column_is_optional() {
        let req = JsonRpcRequest::new(
            "setBreakpoint",
            Some(json!({ "contextId": 3, "line": 12 })),
            "a",
        );
        let params: SetBreakpointParams = req.parse_params().unwrap();
        assert_eq!(params.context_id, SourceContext::from_raw(3));
        assert_eq!(params.line, 12);
        assert_eq!(params.column, None);

        let missing = JsonRpcRequest::new("setBreakpoint", None, "b");
        assert!(missing.parse_params::<SetBreakpointParams>().is_err());
    }

    #[test]
    fn test_paused_notification_shape() {
        let params = PausedParams {
            reason: PauseReason::BreakOnNextStatement,
            context_id: SourceContext::from_raw(0),
            line: 1,
            column: 1,
            breakpoint_id: None,
        };
        let notification =
            JsonRpcNotification::new(notifications::PAUSED, serde_json::to_value(params).ok());
        assert_eq!(
            serde_json::to_value(notification).unwrap(),
            json!({
                "jsonrpc": "2.0",
                "method": "paused",
                "params": {
                    "reason": "breakOnNextStatement",
                    "contextId": 0,
                    "line": 1,
                    "column": 1
                }
            })
        );
    }
}
