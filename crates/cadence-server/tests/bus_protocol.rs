use std::net::SocketAddr;

use cadence_core::topics;
use cadence_server::{AppState, Config, build_state, bus_router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_tungstenite::tungstenite::Message;

type WsClient = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn spawn_bus() -> (AppState, SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        host: "127.0.0.1".into(),
        port: 0,
        health_port: 0,
        db_path: dir.path().join("cadence.db"),
        data_dir: dir.path().to_path_buf(),
        auth_token: "test-secret".into(),
        workspace_root: dir.path().to_path_buf(),
        log_level: "warn".into(),
        log_file: None,
    };
    let state = build_state(config).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = bus_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (state, addr, dir)
}

async fn connect(addr: SocketAddr) -> WsClient {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .unwrap();
    client
}

async fn next_json(client: &mut WsClient) -> Value {
    loop {
        match client.next().await.expect("stream open").expect("frame ok") {
            Message::Text(raw) => return serde_json::from_str(&raw).unwrap(),
            Message::Close(_) => panic!("connection closed unexpectedly"),
            _ => continue,
        }
    }
}

async fn send_json(client: &mut WsClient, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

/// Hello, authenticate, confirmation.
async fn authenticate(client: &mut WsClient, token: &str) -> Value {
    let hello = next_json(client).await;
    assert_eq!(hello["type"], "auth");
    assert_eq!(hello["data"]["required"], true);

    send_json(client, json!({ "type": "authenticate", "auth": token })).await;
    next_json(client).await
}

#[tokio::test]
async fn good_token_authenticates_and_bad_token_closes() {
    let (_state, addr, _dir) = spawn_bus().await;

    let mut ok = connect(addr).await;
    let confirmation = authenticate(&mut ok, "test-secret").await;
    assert_eq!(confirmation["data"]["authenticated"], true);

    let mut bad = connect(addr).await;
    let refusal = authenticate(&mut bad, "wrong").await;
    assert_eq!(refusal["data"]["authenticated"], false);
    // Server closes after refusal.
    loop {
        match bad.next().await {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }
}

#[tokio::test]
async fn messages_before_auth_get_an_error_not_a_close() {
    let (_state, addr, _dir) = spawn_bus().await;
    let mut client = connect(addr).await;

    let hello = next_json(&mut client).await;
    assert_eq!(hello["type"], "auth");

    send_json(&mut client, json!({ "type": "ping" })).await;
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "Authentication required");

    // Still inside the window: authentication succeeds afterwards.
    send_json(
        &mut client,
        json!({ "type": "authenticate", "auth": "test-secret" }),
    )
    .await;
    let confirmation = next_json(&mut client).await;
    assert_eq!(confirmation["data"]["authenticated"], true);
}

#[tokio::test]
async fn subscribe_replays_last_value_before_later_publishes() {
    let (state, addr, _dir) = spawn_bus().await;

    // Publish before anyone subscribes; the subscriber must still see it.
    state
        .observables
        .publish(topics::CONTEXT_STATUS, json!({ "usage_percent": 42 }));

    let mut client = connect(addr).await;
    authenticate(&mut client, "test-secret").await;

    send_json(
        &mut client,
        json!({ "type": "subscribe", "topic": "context.status" }),
    )
    .await;

    let replay = next_json(&mut client).await;
    assert_eq!(replay["type"], "event");
    assert_eq!(replay["topic"], "context.status");
    assert_eq!(replay["data"]["usage_percent"], 42);

    state
        .observables
        .publish(topics::CONTEXT_STATUS, json!({ "usage_percent": 50 }));
    let next = next_json(&mut client).await;
    assert_eq!(next["data"]["usage_percent"], 50);
}

#[tokio::test]
async fn unknown_topic_and_unknown_type_are_protocol_errors() {
    let (_state, addr, _dir) = spawn_bus().await;
    let mut client = connect(addr).await;
    authenticate(&mut client, "test-secret").await;

    send_json(
        &mut client,
        json!({ "type": "subscribe", "topic": "no.such.topic" }),
    )
    .await;
    let error = next_json(&mut client).await;
    assert_eq!(error["error"], "Unknown topic");

    send_json(&mut client, json!({ "type": "frobnicate" })).await;
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");

    client
        .send(Message::Text("not json at all".to_string().into()))
        .await
        .unwrap();
    let error = next_json(&mut client).await;
    assert_eq!(error["error"], "Malformed JSON");

    // None of that closed the connection.
    send_json(&mut client, json!({ "type": "ping" })).await;
    let pong = next_json(&mut client).await;
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn execute_returns_result_and_broadcasts_tool_execution() {
    let (_state, addr, _dir) = spawn_bus().await;
    let mut client = connect(addr).await;
    authenticate(&mut client, "test-secret").await;

    send_json(
        &mut client,
        json!({ "type": "subscribe", "topic": "tool:execution" }),
    )
    .await;

    send_json(
        &mut client,
        json!({
            "type": "execute",
            "tool": "session_start",
            "params": {
                "project": "demo",
                "kind": "feature",
                "scope": { "lines": 1000, "tests": 500, "docs": 200 },
                "auth_token": "should-not-leak",
            },
            "requestId": "req-1",
        }),
    )
    .await;

    let mut saw_pending = false;
    let mut saw_terminal = false;
    let mut result: Option<Value> = None;

    while result.is_none() || !saw_terminal {
        let frame = next_json(&mut client).await;
        match frame["type"].as_str().unwrap() {
            "event" => {
                assert_eq!(frame["topic"], "tool:execution");
                assert_eq!(frame["data"]["tool"], "session_start");
                // Credential-shaped params never appear in broadcasts.
                assert_eq!(frame["data"]["params"]["auth_token"], "[redacted]");
                match frame["data"]["status"].as_str().unwrap() {
                    "pending" => saw_pending = true,
                    "ok" => {
                        saw_terminal = true;
                        assert!(frame["data"]["duration_ms"].is_u64());
                    }
                    other => panic!("unexpected status {other}"),
                }
            }
            "result" => {
                assert_eq!(frame["requestId"], "req-1");
                result = Some(frame);
            }
            other => panic!("unexpected frame type {other}"),
        }
    }

    assert!(saw_pending);
    let result = result.unwrap();
    assert_eq!(result["result"]["context_budget"], 23880);
}

#[tokio::test]
async fn execute_errors_use_the_error_shape() {
    let (_state, addr, _dir) = spawn_bus().await;
    let mut client = connect(addr).await;
    authenticate(&mut client, "test-secret").await;

    send_json(
        &mut client,
        json!({
            "type": "execute",
            "tool": "session_status",
            "params": { "session_id": "sess-missing" },
            "requestId": 9,
        }),
    )
    .await;

    let frame = next_json(&mut client).await;
    assert_eq!(frame["type"], "result");
    assert_eq!(frame["requestId"], 9);
    assert_eq!(frame["error"]["code"], "session_not_found");
}

#[tokio::test]
async fn unsubscribed_client_stops_receiving() {
    let (state, addr, _dir) = spawn_bus().await;
    let mut client = connect(addr).await;
    authenticate(&mut client, "test-secret").await;

    send_json(
        &mut client,
        json!({ "type": "subscribe", "topic": "project.velocity" }),
    )
    .await;
    state
        .observables
        .publish(topics::PROJECT_VELOCITY, json!({ "tick": 1 }));
    let event = next_json(&mut client).await;
    assert_eq!(event["data"]["tick"], 1);

    send_json(
        &mut client,
        json!({ "type": "unsubscribe", "topic": "project.velocity" }),
    )
    .await;
    // Give the abort a beat, then publish again and prove only the pong
    // arrives.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    state
        .observables
        .publish(topics::PROJECT_VELOCITY, json!({ "tick": 2 }));
    send_json(&mut client, json!({ "type": "ping" })).await;

    let frame = next_json(&mut client).await;
    assert_eq!(frame["type"], "pong");
}

#[tokio::test]
async fn slow_subscriber_is_dropped_while_fast_one_keeps_order() {
    let (state, addr, _dir) = spawn_bus().await;

    let mut slow = connect(addr).await;
    authenticate(&mut slow, "test-secret").await;
    send_json(
        &mut slow,
        json!({ "type": "subscribe", "topic": "context.status" }),
    )
    .await;

    let mut fast = connect(addr).await;
    authenticate(&mut fast, "test-secret").await;
    send_json(
        &mut fast,
        json!({ "type": "subscribe", "topic": "context.status" }),
    )
    .await;

    // The slow client stops reading entirely; the publisher keeps going far
    // past the per-connection queue bound.
    let publisher = {
        let observables = state.observables.clone();
        tokio::spawn(async move {
            for i in 0..500u32 {
                observables.publish(topics::CONTEXT_STATUS, json!({ "seq": i }));
                if i % 50 == 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                }
            }
        })
    };

    // Fast subscriber: consume everything it is sent, asserting per-topic
    // publish order.
    let mut last_seq: i64 = -1;
    let mut received = 0u32;
    while received < 200 {
        let frame = next_json(&mut fast).await;
        if frame["type"] == "event" {
            let seq = frame["data"]["seq"].as_i64().unwrap();
            assert!(seq > last_seq, "order violated: {seq} after {last_seq}");
            last_seq = seq;
            received += 1;
        }
    }

    publisher.await.unwrap();

    // The slow client's connection ends once its queue overflowed.
    let mut closed = false;
    for _ in 0..1000 {
        match slow.next().await {
            None | Some(Ok(Message::Close(_))) | Some(Err(_)) => {
                closed = true;
                break;
            }
            Some(Ok(_)) => continue,
        }
    }
    assert!(closed, "slow subscriber should have been disconnected");
}
