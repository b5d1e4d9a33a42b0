use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i32, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data,
            }),
        }
    }
}

/// Server-initiated notification (no id)
pub fn notification(method: &str, params: Value) -> Value {
    json!({ "jsonrpc": "2.0", "method": method, "params": params })
}

/// Map a bus error code onto the JSON-RPC error space.
pub fn rpc_code_for(bus_code: &str) -> i32 {
    match bus_code {
        "invalid_parameters" => -32602,
        "unknown_tool" => -32601,
        _ => -32603,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tools_call_request() {
        let request: JsonRpcRequest = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"session_status","arguments":{"session_id":"s"}}}"#,
        )
        .unwrap();
        assert_eq!(request.method, "tools/call");
        assert_eq!(request.id, Some(json!(3)));
    }

    #[test]
    fn error_codes_map_to_json_rpc_space() {
        assert_eq!(rpc_code_for("invalid_parameters"), -32602);
        assert_eq!(rpc_code_for("unknown_tool"), -32601);
        assert_eq!(rpc_code_for("storage_error"), -32603);
    }

    #[test]
    fn responses_serialize_one_of_result_or_error() {
        let ok = JsonRpcResponse::success(json!(1), json!({"x": 1}));
        let raw = serde_json::to_string(&ok).unwrap();
        assert!(raw.contains("result"));
        assert!(!raw.contains("error"));

        let err = JsonRpcResponse::failure(json!(1), -32601, "Method not found", None);
        let raw = serde_json::to_string(&err).unwrap();
        assert!(raw.contains("error"));
        assert!(!raw.contains("result"));
    }
}
