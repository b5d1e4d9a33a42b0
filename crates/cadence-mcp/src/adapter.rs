use std::collections::HashMap;

use anyhow::{Context, bail};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::rpc::{JsonRpcRequest, JsonRpcResponse, notification, rpc_code_for};

const PROTOCOL_VERSION: &str = "2025-03-26";

/// Observable topics mirrored to the assistant as `tool/event`
/// notifications.
const TOPICS: [&str; 8] = [
    "session.status",
    "context.status",
    "reality.checks",
    "project.status",
    "project.velocity",
    "documentation.status",
    "agent:suggestions",
    "tool:execution",
];

/// What a pending bus request resolves into on the JSON-RPC side
enum Pending {
    ToolsList { id: Value },
    ToolsCall { id: Value },
}

/// Bridge stdio JSON-RPC onto one authenticated bus connection. Returns
/// when stdin closes or the bus connection ends; the caller exits with 0.
pub async fn run(ws_url: &str, token: &str) -> anyhow::Result<()> {
    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url)
        .await
        .with_context(|| format!("cannot reach bus at {ws_url}"))?;
    let (mut write, mut read) = ws_stream.split();

    // The server opens with an auth hello; answer it and require success.
    write
        .send(Message::Text(
            json!({ "type": "authenticate", "auth": token }).to_string().into(),
        ))
        .await
        .context("authenticate send failed")?;

    let authenticated = wait_for_auth(&mut read).await?;
    if !authenticated {
        bail!("bus rejected the shared token");
    }
    debug!("bus connection authenticated");

    // Subscribe to every topic so the assistant observes the same events
    // as dashboard clients; replayed last values arrive as notifications
    // too.
    for topic in TOPICS {
        write
            .send(Message::Text(
                json!({ "type": "subscribe", "topic": topic }).to_string().into(),
            ))
            .await
            .context("subscribe send failed")?;
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = tokio::io::stdout();
    let mut pending: HashMap<String, Pending> = HashMap::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("stdin read failed")? else {
                    debug!("stdin closed; exiting");
                    return Ok(());
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                    Ok(request) => {
                        if let Some(reply) =
                            handle_request(request, &mut write, &mut pending).await?
                        {
                            emit(&mut stdout, &serde_json::to_value(&reply)?).await?;
                        }
                    }
                    Err(err) => {
                        let reply = JsonRpcResponse::failure(
                            json!(-1),
                            -32700,
                            format!("Parse error: {}", err),
                            None,
                        );
                        emit(&mut stdout, &serde_json::to_value(&reply)?).await?;
                    }
                }
            }
            incoming = read.next() => {
                let Some(message) = incoming else {
                    debug!("bus closed; exiting");
                    return Ok(());
                };
                let message = message.context("bus read failed")?;
                let Message::Text(raw) = message else {
                    if matches!(message, Message::Close(_)) {
                        return Ok(());
                    }
                    continue;
                };
                let Ok(frame) = serde_json::from_str::<Value>(&raw) else {
                    warn!("dropping malformed bus frame");
                    continue;
                };

                if let Some(reply) = handle_bus_frame(&frame, &mut pending) {
                    emit(&mut stdout, &reply).await?;
                }
            }
        }
    }
}

async fn wait_for_auth<S>(read: &mut S) -> anyhow::Result<bool>
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        let Message::Text(raw) = message? else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&raw) else {
            continue;
        };
        if frame["type"] == "auth"
            && let Some(flag) = frame["data"]["authenticated"].as_bool()
        {
            return Ok(flag);
        }
    }
    bail!("bus closed during authentication")
}

async fn handle_request<W>(
    request: JsonRpcRequest,
    write: &mut W,
    pending: &mut HashMap<String, Pending>,
) -> anyhow::Result<Option<JsonRpcResponse>>
where
    W: SinkExt<Message> + Unpin,
    <W as futures::Sink<Message>>::Error: std::error::Error + Send + Sync + 'static,
{
    let id = request.id.clone().unwrap_or(json!(0));

    match request.method.as_str() {
        "initialize" => Ok(Some(JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "resources": {},
                    "prompts": {},
                    "logging": {},
                },
                "serverInfo": {
                    "name": "cadence-mcp",
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ))),
        method if method.starts_with("notifications/") => Ok(None),
        "tools/list" => {
            let request_id = Uuid::new_v4().to_string();
            pending.insert(request_id.clone(), Pending::ToolsList { id });
            write
                .send(Message::Text(
                    json!({
                        "type": "execute",
                        "tool": "_list_tools",
                        "params": {},
                        "requestId": request_id,
                    })
                    .to_string()
                    .into(),
                ))
                .await
                .context("bus send failed")?;
            Ok(None)
        }
        "tools/call" => {
            let params = request.params.unwrap_or(json!({}));
            let Some(name) = params["name"].as_str() else {
                return Ok(Some(JsonRpcResponse::failure(
                    id,
                    -32602,
                    "Missing tool name",
                    None,
                )));
            };
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

            let request_id = Uuid::new_v4().to_string();
            pending.insert(request_id.clone(), Pending::ToolsCall { id });
            write
                .send(Message::Text(
                    json!({
                        "type": "execute",
                        "tool": name,
                        "params": arguments,
                        "requestId": request_id,
                    })
                    .to_string()
                    .into(),
                ))
                .await
                .context("bus send failed")?;
            Ok(None)
        }
        other => Ok(Some(JsonRpcResponse::failure(
            id,
            -32601,
            format!("Method not found: {}", other),
            None,
        ))),
    }
}

/// Translate a bus frame into at most one stdout line.
fn handle_bus_frame(frame: &Value, pending: &mut HashMap<String, Pending>) -> Option<Value> {
    match frame["type"].as_str()? {
        "event" => Some(notification(
            "tool/event",
            json!({
                "topic": frame["topic"],
                "data": frame["data"],
            }),
        )),
        "result" => {
            let request_id = frame["requestId"].as_str()?;
            let entry = pending.remove(request_id)?;

            match entry {
                Pending::ToolsList { id } => {
                    if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
                        return Some(to_error_value(id, error));
                    }
                    let tools: Vec<Value> = frame["result"]["tools"]
                        .as_array()
                        .map(|entries| {
                            entries
                                .iter()
                                .map(|entry| {
                                    json!({
                                        "name": entry["name"],
                                        "description": entry["description"],
                                        "inputSchema": entry["input_schema"],
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    let reply = JsonRpcResponse::success(id, json!({ "tools": tools }));
                    serde_json::to_value(&reply).ok()
                }
                Pending::ToolsCall { id } => {
                    if let Some(error) = frame.get("error").filter(|e| !e.is_null()) {
                        return Some(to_error_value(id, error));
                    }
                    let text = serde_json::to_string_pretty(&frame["result"])
                        .unwrap_or_else(|_| frame["result"].to_string());
                    let reply = JsonRpcResponse::success(
                        id,
                        json!({ "content": [ { "type": "text", "text": text } ] }),
                    );
                    serde_json::to_value(&reply).ok()
                }
            }
        }
        _ => None,
    }
}

fn to_error_value(id: Value, bus_error: &Value) -> Value {
    let code = bus_error["code"].as_str().unwrap_or("internal");
    let message = bus_error["message"]
        .as_str()
        .unwrap_or("tool execution failed");
    let reply = JsonRpcResponse::failure(
        id,
        rpc_code_for(code),
        message,
        Some(json!({ "bus_code": code, "suggestions": bus_error["suggestions"] })),
    );
    serde_json::to_value(&reply).unwrap_or_default()
}

async fn emit(stdout: &mut tokio::io::Stdout, value: &Value) -> anyhow::Result<()> {
    let mut line = value.to_string();
    line.push('\n');
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_frames_become_notifications() {
        let frame = json!({
            "type": "event",
            "topic": "context.status",
            "data": { "usage_percent": 42 },
        });
        let mut pending = HashMap::new();
        let out = handle_bus_frame(&frame, &mut pending).unwrap();
        assert_eq!(out["method"], "tool/event");
        assert_eq!(out["params"]["topic"], "context.status");
        assert_eq!(out["params"]["data"]["usage_percent"], 42);
    }

    #[test]
    fn tools_list_results_are_reshaped() {
        let mut pending = HashMap::new();
        pending.insert("r-1".to_string(), Pending::ToolsList { id: json!(5) });
        let frame = json!({
            "type": "result",
            "requestId": "r-1",
            "result": { "tools": [
                { "name": "session_status", "description": "d", "side_effect": "read",
                  "input_schema": { "type": "object" } }
            ]},
        });

        let out = handle_bus_frame(&frame, &mut pending).unwrap();
        assert_eq!(out["id"], 5);
        assert_eq!(out["result"]["tools"][0]["name"], "session_status");
        assert_eq!(out["result"]["tools"][0]["inputSchema"]["type"], "object");
        assert!(pending.is_empty());
    }

    #[test]
    fn tool_errors_carry_mapped_codes() {
        let mut pending = HashMap::new();
        pending.insert("r-2".to_string(), Pending::ToolsCall { id: json!(9) });
        let frame = json!({
            "type": "result",
            "requestId": "r-2",
            "error": { "code": "invalid_parameters", "message": "bad scope" },
        });

        let out = handle_bus_frame(&frame, &mut pending).unwrap();
        assert_eq!(out["error"]["code"], -32602);
        assert_eq!(out["error"]["message"], "bad scope");
    }

    #[test]
    fn unmatched_results_are_dropped() {
        let mut pending = HashMap::new();
        let frame = json!({ "type": "result", "requestId": "ghost", "result": {} });
        assert!(handle_bus_frame(&frame, &mut pending).is_none());
    }
}
