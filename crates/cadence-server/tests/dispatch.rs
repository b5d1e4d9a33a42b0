use std::path::PathBuf;

use cadence_server::{AppState, Config, build_state};
use serde_json::{Value, json};
use tempfile::TempDir;

fn test_state() -> (AppState, TempDir) {
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
    (build_state(config).unwrap(), dir)
}

async fn call(state: &AppState, tool: &str, params: Value) -> Result<Value, cadence_types::Error> {
    state.registry.dispatch(tool, params).await
}

#[tokio::test]
async fn session_start_derives_budget_from_scope() {
    let (state, _dir) = test_state();

    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "feature",
            "scope": { "lines": 1000, "tests": 500, "docs": 200 },
        }),
    )
    .await
    .unwrap();

    assert_eq!(session["context_budget"], 23880);
    assert_eq!(session["status"], "active");
    assert_eq!(session["phase"], "planning");
}

#[tokio::test]
async fn checkpoint_scenario_records_expected_delta() {
    let (state, _dir) = test_state();
    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "feature",
            "scope": { "lines": 1000, "tests": 500, "docs": 200 },
        }),
    )
    .await
    .unwrap();
    let session_id = session["id"].as_str().unwrap();

    call(
        &state,
        "context_track",
        json!({
            "session_id": session_id,
            "phase": "planning",
            "tokens": 2000,
            "label": "plan",
        }),
    )
    .await
    .unwrap();

    let outcome = call(
        &state,
        "session_checkpoint",
        json!({
            "session_id": session_id,
            "completed_components": ["core"],
            "metrics": { "lines_written": 500, "tests_passing": 10, "context_used_percent": 35 },
        }),
    )
    .await
    .unwrap();

    assert_eq!(outcome["checkpoint_number"], 1);
    assert_eq!(outcome["snapshot"]["context_used"], 8358);

    let status = call(&state, "context_status", json!({ "session_id": session_id }))
        .await
        .unwrap();
    assert_eq!(status["used_tokens"], 8358);
    // 2000 planning + 6358 implementation
    assert_eq!(status["phase_breakdown"]["planning"], 2000);
    assert_eq!(status["phase_breakdown"]["implementation"], 6358);
}

#[tokio::test]
async fn mutating_tools_after_complete_return_invalid_state() {
    let (state, _dir) = test_state();
    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "bugfix",
            "scope": { "lines": 10, "tests": 2, "docs": 0 },
        }),
    )
    .await
    .unwrap();
    let session_id = session["id"].as_str().unwrap();

    call(&state, "session_complete", json!({ "session_id": session_id }))
        .await
        .unwrap();

    let err = call(
        &state,
        "context_track",
        json!({
            "session_id": session_id,
            "phase": "testing",
            "tokens": 100,
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "invalid_state");

    let err = call(
        &state,
        "session_checkpoint",
        json!({ "session_id": session_id }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn symbol_register_then_lookup_increments_usage_once() {
    let (state, _dir) = test_state();

    let registered = call(
        &state,
        "symbol_register",
        json!({
            "project": "demo",
            "concept": "session ledger",
            "chosen_name": "SessionLedger",
            "context_type": "class",
        }),
    )
    .await
    .unwrap();
    assert_eq!(registered["usage_count"], 1);

    let found = call(
        &state,
        "symbol_lookup",
        json!({
            "project": "demo",
            "concept": "session ledger",
            "context_type": "class",
        }),
    )
    .await
    .unwrap();
    assert_eq!(found["chosen_name"], "SessionLedger");
    assert_eq!(found["usage_count"], 2);

    let err = call(
        &state,
        "symbol_register",
        json!({
            "project": "demo",
            "concept": "session ledger",
            "chosen_name": "LedgerOfSessions",
            "context_type": "class",
        }),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "conflict");
}

#[tokio::test]
async fn list_tools_round_trips_and_every_tool_is_callable() {
    let (state, _dir) = test_state();

    let listing = call(&state, "_list_tools", json!({})).await.unwrap();
    let tools = listing["tools"].as_array().unwrap();
    assert!(tools.len() >= 30, "tool surface is missing registrations");

    for entry in tools {
        let name = entry["name"].as_str().unwrap();
        assert!(entry["input_schema"]["type"] == "object");

        // Callable means the dispatcher routes it: whatever happens next,
        // it must never be an unknown tool.
        let result = call(&state, name, json!({})).await;
        if let Err(err) = result {
            assert_ne!(err.code(), "unknown_tool", "{name} not routed");
        }
    }
}

#[tokio::test]
async fn unknown_tool_gets_suggestions() {
    let (state, _dir) = test_state();
    let err = call(&state, "session_statu", json!({})).await.unwrap_err();
    match err {
        cadence_types::Error::UnknownTool { suggestions, .. } => {
            assert!(suggestions.contains(&"session_status".to_string()));
        }
        other => panic!("expected UnknownTool, got {:?}", other),
    }
}

#[tokio::test]
async fn quick_action_runs_steps_and_reports_partial_failures() {
    let (state, _dir) = test_state();
    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "feature",
            "scope": { "lines": 100, "tests": 10, "docs": 2 },
        }),
    )
    .await
    .unwrap();
    let session_id = session["id"].as_str().unwrap();

    let outcome = call(
        &state,
        "quick_action",
        json!({ "action_id": "context-status", "session_id": session_id }),
    )
    .await
    .unwrap();

    assert_eq!(outcome["completed"], true);
    assert_eq!(outcome["results"][0]["ok"], true);
    assert_eq!(
        outcome["results"][0]["result"]["session_id"],
        json!(session_id)
    );

    // Unknown action is an InvalidState error, not a panic.
    let err = call(&state, "quick_action", json!({ "action_id": "nope" }))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_state");
}

#[tokio::test]
async fn agent_run_at_thirty_percent_emits_single_checkpoint_nudge() {
    let (state, _dir) = test_state();
    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "feature",
            "scope": { "lines": 1000, "tests": 500, "docs": 200 },
        }),
    )
    .await
    .unwrap();
    let session_id = session["id"].as_str().unwrap();

    call(
        &state,
        "context_track",
        json!({
            "session_id": session_id,
            "phase": "implementation",
            "tokens": 7164,
            "label": "build",
        }),
    )
    .await
    .unwrap();

    let result = call(&state, "agent_run", json!({ "session_id": session_id }))
        .await
        .unwrap();

    let suggestions = result["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["kind"], "checkpoint");
    assert_eq!(suggestions[0]["priority"], "medium");

    let skipped: Vec<&str> = result["skipped"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert!(skipped.contains(&"context_guardian"));
}

#[tokio::test]
async fn health_check_tool_reports_healthy_state() {
    let (state, _dir) = test_state();
    let health = call(&state, "health_check", json!({})).await.unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["checks"]["store"], "ok");
    assert!(health["checks"]["bridge"]["tools"].as_u64().unwrap() >= 30);
}

#[tokio::test]
async fn doc_generate_writes_under_data_dir() {
    let (state, dir) = test_state();
    let session = call(
        &state,
        "session_start",
        json!({
            "project": "demo",
            "kind": "documentation",
            "scope": { "lines": 0, "tests": 0, "docs": 5 },
        }),
    )
    .await
    .unwrap();
    let session_id = session["id"].as_str().unwrap();

    let document = call(
        &state,
        "doc_generate",
        json!({ "session_id": session_id, "kind": "readme" }),
    )
    .await
    .unwrap();

    let path = PathBuf::from(document["path"].as_str().unwrap());
    assert!(path.exists());
    assert!(path.components().any(|c| c.as_os_str() == "docs"));
    assert!(document["word_count"].as_u64().unwrap() > 0);
    drop(dir);
}
