pub mod protocol;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

use cadence_core::topics;
use chrono::Utc;

use crate::state::AppState;
use protocol::{
    Inbound, auth_hello, auth_result, error_frame, event_frame, pong_frame, redact, result_frame,
};

/// Authentication must complete inside this window after accept.
const AUTH_WINDOW: Duration = Duration::from_secs(10);

/// Per-connection outbound queue bound. A subscriber that lets this fill is
/// dropped; publishers never wait.
const OUTBOUND_QUEUE: usize = 64;

pub fn bus_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

pub async fn serve_bus(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("bus listening on ws://{addr}/ws");
    axum::serve(listener, bus_router(state)).await?;
    Ok(())
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let _ = send_json(&mut sink, &auth_hello(AUTH_WINDOW.as_millis() as u64)).await;

    if !authenticate(&mut sink, &mut stream, &state).await {
        let _ = sink.close().await;
        return;
    }
    let _ = send_json(&mut sink, &auth_result(true)).await;

    state.connected_clients.fetch_add(1, Ordering::Relaxed);
    debug!("bus client authenticated");

    let (out_tx, mut out_rx) = mpsc::channel::<Value>(OUTBOUND_QUEUE);
    let overflow = Arc::new(Notify::new());

    // Writer owns the sink; everything else talks through the bounded
    // queue.
    let writer: JoinHandle<()> = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let text = frame.to_string();
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut subscriptions: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            _ = overflow.notified() => {
                warn!("subscriber overflowed its send queue; dropping connection");
                break;
            }
            incoming = stream.next() => {
                let Some(Ok(message)) = incoming else { break };
                let WsMessage::Text(raw) = message else {
                    match message {
                        WsMessage::Close(_) => break,
                        // Pings are answered by axum; binary is a protocol
                        // violation but not fatal.
                        _ => continue,
                    }
                };

                let frame: Inbound = match serde_json::from_str(&raw) {
                    Ok(frame) => frame,
                    Err(_) => {
                        enqueue(&out_tx, &overflow, error_frame("Malformed JSON"));
                        continue;
                    }
                };

                match frame.kind.as_str() {
                    "ping" => enqueue(&out_tx, &overflow, pong_frame()),
                    "subscribe" => {
                        handle_subscribe(&state, frame, &out_tx, &overflow, &mut subscriptions);
                    }
                    "unsubscribe" => {
                        if let Some(topic) = frame.topic
                            && let Some(handle) = subscriptions.remove(&topic)
                        {
                            handle.abort();
                        }
                    }
                    "execute" => {
                        handle_execute(&state, frame, &out_tx, &overflow);
                    }
                    "authenticate" => {
                        // Already authenticated; idempotent confirmation.
                        enqueue(&out_tx, &overflow, auth_result(true));
                    }
                    other => {
                        enqueue(
                            &out_tx,
                            &overflow,
                            error_frame(&format!("Unknown message type: {}", other)),
                        );
                    }
                }
            }
        }
    }

    for (_, handle) in subscriptions {
        handle.abort();
    }
    writer.abort();
    state.connected_clients.fetch_sub(1, Ordering::Relaxed);
    debug!("bus client disconnected");
}

/// Constant-time comparison of the shared secret. Anything but a valid
/// authenticate frame inside the window fails the handshake.
async fn authenticate(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    stream: &mut SplitStream<WebSocket>,
    state: &AppState,
) -> bool {
    let deadline = Instant::now() + AUTH_WINDOW;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let _ = send_json(sink, &auth_result(false)).await;
            return false;
        }

        let incoming = match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(_) => return false,
            Err(_) => {
                let _ = send_json(sink, &auth_result(false)).await;
                return false;
            }
        };

        let WsMessage::Text(raw) = incoming else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Inbound>(&raw) else {
            let _ = send_json(sink, &error_frame("Malformed JSON")).await;
            continue;
        };

        if frame.kind != "authenticate" {
            let _ = send_json(sink, &error_frame("Authentication required")).await;
            continue;
        }

        let presented = frame.auth.unwrap_or_default();
        let expected = state.config.auth_token.as_bytes();
        let matches: bool = presented.as_bytes().ct_eq(expected).into();
        if matches {
            return true;
        }

        let _ = send_json(sink, &auth_result(false)).await;
        return false;
    }
}

fn handle_subscribe(
    state: &AppState,
    frame: Inbound,
    out_tx: &mpsc::Sender<Value>,
    overflow: &Arc<Notify>,
    subscriptions: &mut HashMap<String, JoinHandle<()>>,
) {
    let Some(topic) = frame.topic else {
        enqueue(out_tx, overflow, error_frame("Missing topic"));
        return;
    };

    let Some(subscription) = state.observables.subscribe(&topic) else {
        enqueue(out_tx, overflow, error_frame("Unknown topic"));
        return;
    };

    // Replace an existing subscription to the same topic.
    if let Some(previous) = subscriptions.remove(&topic) {
        previous.abort();
    }

    // The current last value is delivered before anything the receiver
    // observes afterwards; both ride the same ordered queue.
    if let Some(last) = &subscription.last_value {
        enqueue(out_tx, overflow, event_frame(&topic, last));
    }

    let mut receiver = subscription.receiver;
    let forward_tx = out_tx.clone();
    let forward_overflow = overflow.clone();
    let topic_name = topic.clone();
    let handle = tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(value) => {
                    if forward_tx
                        .try_send(event_frame(&topic_name, &value))
                        .is_err()
                    {
                        forward_overflow.notify_one();
                        break;
                    }
                }
                // Lagging behind the broadcast buffer is the same offence
                // as overflowing the outbound queue.
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    forward_overflow.notify_one();
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    subscriptions.insert(topic, handle);
}

fn handle_execute(
    state: &AppState,
    frame: Inbound,
    out_tx: &mpsc::Sender<Value>,
    overflow: &Arc<Notify>,
) {
    let Some(tool) = frame.tool else {
        enqueue(out_tx, overflow, error_frame("Missing tool"));
        return;
    };
    let request_id = frame.request_id.unwrap_or(Value::Null);
    let params = frame.params;

    let execution_id = Uuid::new_v4().to_string();
    let redacted = redact(&params);
    state.observables.publish(
        topics::TOOL_EXECUTION,
        json!({
            "id": &execution_id,
            "timestamp": Utc::now().to_rfc3339(),
            "tool": &tool,
            "params": &redacted,
            "status": "pending",
        }),
    );

    let exec_state = state.clone();
    let reply_tx = out_tx.clone();
    let reply_overflow = overflow.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let result = exec_state.registry.dispatch(&tool, params).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        exec_state.observables.publish(
            topics::TOOL_EXECUTION,
            json!({
                "id": &execution_id,
                "timestamp": Utc::now().to_rfc3339(),
                "tool": &tool,
                "params": &redacted,
                "status": if result.is_ok() { "ok" } else { "error" },
                "duration_ms": duration_ms,
            }),
        );

        if reply_tx
            .try_send(result_frame(&request_id, result))
            .is_err()
        {
            reply_overflow.notify_one();
        }
    });
}

fn enqueue(out_tx: &mpsc::Sender<Value>, overflow: &Arc<Notify>, frame: Value) {
    if out_tx.try_send(frame).is_err() {
        overflow.notify_one();
    }
}

async fn send_json(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: &Value,
) -> Result<(), axum::Error> {
    sink.send(WsMessage::Text(frame.to_string().into())).await
}
