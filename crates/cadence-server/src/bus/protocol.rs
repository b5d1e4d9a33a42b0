use cadence_types::Error;
use serde::Deserialize;
use serde_json::{Value, json};

/// Every frame a client may send. Unknown `type` values surface as
/// protocol errors, never as closed connections.
#[derive(Debug, Deserialize)]
pub struct Inbound {
    #[serde(rename = "type")]
    pub kind: String,
    pub auth: Option<String>,
    pub topic: Option<String>,
    pub tool: Option<String>,
    #[serde(default)]
    pub params: Value,
    #[serde(rename = "requestId")]
    pub request_id: Option<Value>,
}

pub fn auth_hello(timeout_ms: u64) -> Value {
    json!({ "type": "auth", "data": { "required": true, "timeout_ms": timeout_ms } })
}

pub fn auth_result(authenticated: bool) -> Value {
    json!({ "type": "auth", "data": { "authenticated": authenticated } })
}

pub fn event_frame(topic: &str, data: &Value) -> Value {
    json!({ "type": "event", "topic": topic, "data": data })
}

pub fn error_frame(message: &str) -> Value {
    json!({ "type": "error", "error": message })
}

pub fn pong_frame() -> Value {
    json!({ "type": "pong" })
}

pub fn result_frame(request_id: &Value, result: Result<Value, Error>) -> Value {
    match result {
        Ok(value) => json!({ "type": "result", "requestId": request_id, "result": value }),
        Err(err) => json!({
            "type": "result",
            "requestId": request_id,
            "error": error_to_wire(&err),
        }),
    }
}

/// Wire shape of the typed error sum: `{code, message, suggestions?}`
pub fn error_to_wire(err: &Error) -> Value {
    let suggestions = err.suggestions();
    if suggestions.is_empty() {
        json!({ "code": err.code(), "message": err.to_string() })
    } else {
        json!({
            "code": err.code(),
            "message": err.to_string(),
            "suggestions": suggestions,
        })
    }
}

const SENSITIVE_KEY_FRAGMENTS: [&str; 4] = ["token", "secret", "password", "auth"];

/// Params copied into `tool:execution` broadcasts with credential-shaped
/// values masked.
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                let lower = key.to_lowercase();
                if SENSITIVE_KEY_FRAGMENTS.iter().any(|f| lower.contains(f)) {
                    out.insert(key.clone(), Value::String("[redacted]".into()));
                } else {
                    out.insert(key.clone(), redact(inner));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}
