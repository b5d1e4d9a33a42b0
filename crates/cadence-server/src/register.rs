use std::collections::HashMap;
use std::sync::Weak;

use cadence_agents::{AgentInput, SymbolProposal};
use cadence_core::reality::ReportedMetrics;
use cadence_core::{
    CheckpointRequest, FieldType, HandoffRequest, SideEffect, StartSessionRequest, ToolDef,
    ToolRegistry, ToolSchema, new_id, with_db,
};
use cadence_types::{
    BlockerKind, CheckKind, DocumentKind, DocumentUpdateMode, Error, QuickAction, Result,
    SessionKind, SessionPhase, SessionScope, Symbol, SymbolContextType,
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::health::health_payload;
use crate::state::AppState;

// --- param helpers -------------------------------------------------------
// Schema validation has already coerced types; these unwrap with safe
// defaults and parse domain enums.

fn req_str(params: &Value, name: &str) -> String {
    params[name].as_str().unwrap_or_default().to_string()
}

fn opt_str(params: &Value, name: &str) -> Option<String> {
    params[name].as_str().map(|s| s.to_string())
}

fn opt_i64(params: &Value, name: &str) -> Option<i64> {
    params[name].as_i64()
}

fn opt_f64(params: &Value, name: &str) -> Option<f64> {
    params[name].as_f64()
}

fn opt_bool(params: &Value, name: &str) -> Option<bool> {
    params[name].as_bool()
}

fn str_items(params: &Value, name: &str) -> Vec<String> {
    params[name]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn parse_enum<T>(raw: &str, field: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(raw).ok_or_else(|| {
        Error::invalid_parameters(vec![field.to_string()], format!("unknown value '{}'", raw))
    })
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Storage(format!("serialize result: {e}")))
}

/// Populate the registry with every component operation. Called once at
/// startup, after all services exist.
pub fn register_tools(state: &AppState) -> Result<()> {
    let registry = &state.registry;
    let registry_weak: Weak<ToolRegistry> = std::sync::Arc::downgrade(&state.registry);

    // --- session manager -------------------------------------------------

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_start",
            "Start a development session with a derived context budget",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("project", FieldType::String, "owning project name")
                .required("kind", FieldType::String, "feature|bugfix|refactor|documentation")
                .required("scope", FieldType::Object, "estimated scope {lines, tests, docs}")
                .optional("budget_override", FieldType::Integer, "explicit token budget")
                .optional("estimated_hours", FieldType::Number, "rough duration estimate"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let kind =
                        parse_enum(&req_str(&params, "kind"), "kind", SessionKind::parse)?;
                    let scope = SessionScope {
                        lines: params["scope"]["lines"].as_i64().unwrap_or(0),
                        tests: params["scope"]["tests"].as_i64().unwrap_or(0),
                        docs: params["scope"]["docs"].as_i64().unwrap_or(0),
                    };
                    let session = sessions.start(StartSessionRequest {
                        project: req_str(&params, "project"),
                        kind,
                        scope,
                        budget_override: opt_i64(&params, "budget_override")
                            .map(|b| b.max(0) as u64),
                        estimated_hours: opt_f64(&params, "estimated_hours"),
                    })?;
                    to_value(&session)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_checkpoint",
            "Record a checkpoint; metrics default to the session's current state",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("completed_components", FieldType::Array, "finished work items")
                .optional(
                    "metrics",
                    FieldType::Object,
                    "{lines_written, tests_passing, context_used_percent}",
                )
                .optional("commit_message", FieldType::String, "optional VCS commit")
                .optional("force", FieldType::Boolean, "write even if the commit fails"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let session_id = req_str(&params, "session_id");
                    let current = sessions.status(&session_id)?;
                    let metrics = &params["metrics"];

                    let outcome = sessions
                        .checkpoint(CheckpointRequest {
                            session_id,
                            completed_components: str_items(&params, "completed_components"),
                            lines_written: metrics["lines_written"]
                                .as_i64()
                                .unwrap_or(current.metrics.lines_written),
                            tests_passing: metrics["tests_passing"]
                                .as_i64()
                                .unwrap_or(current.metrics.tests_passing),
                            context_used_percent: metrics["context_used_percent"]
                                .as_f64()
                                .unwrap_or_else(|| current.usage_percent()),
                            commit_message: opt_str(&params, "commit_message"),
                            force: opt_bool(&params, "force").unwrap_or(false),
                        })
                        .await?;
                    to_value(&outcome)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_handoff",
            "Create the terminal handoff checkpoint and document",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("next_goals", FieldType::Array, "goals for the next session")
                .optional("include_context_dump", FieldType::Boolean, "embed recent samples"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let outcome = sessions
                        .handoff(HandoffRequest {
                            session_id: req_str(&params, "session_id"),
                            next_goals: str_items(&params, "next_goals"),
                            include_context_dump: opt_bool(&params, "include_context_dump")
                                .unwrap_or(false),
                        })
                        .await?;
                    to_value(&outcome)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_complete",
            "Complete a session and fold project aggregates",
            SideEffect::Mutate,
            ToolSchema::new().required("session_id", FieldType::String, "target session"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let session = sessions.complete(&req_str(&params, "session_id"))?;
                    to_value(&session)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_status",
            "Read-through session state",
            SideEffect::Read,
            ToolSchema::new().required("session_id", FieldType::String, "target session"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let session = sessions.status(&req_str(&params, "session_id"))?;
                    to_value(&session)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "session_history",
            "Sessions ordered newest first",
            SideEffect::Read,
            ToolSchema::new()
                .optional("project", FieldType::String, "filter by project")
                .optional("limit", FieldType::Integer, "max rows (default 20)"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let limit = opt_i64(&params, "limit").unwrap_or(20).clamp(1, 200) as usize;
                    let history =
                        sessions.history(opt_str(&params, "project").as_deref(), limit)?;
                    to_value(&history)
                }
            },
        ))?;
    }

    // --- context monitor -------------------------------------------------

    {
        let monitor = state.monitor.clone();
        registry.register(ToolDef::new(
            "context_track",
            "Append a token-usage sample",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .required("phase", FieldType::String, "phase tag for the sample")
                .required("tokens", FieldType::Integer, "positive token delta")
                .optional("label", FieldType::String, "operation label"),
            move |params| {
                let monitor = monitor.clone();
                async move {
                    let phase =
                        parse_enum(&req_str(&params, "phase"), "phase", SessionPhase::parse)?;
                    let tokens = opt_i64(&params, "tokens").unwrap_or(0);
                    if tokens <= 0 {
                        return Err(Error::invalid_parameters(
                            vec!["tokens".into()],
                            "tokens must be a positive delta",
                        ));
                    }
                    let status = monitor.track_usage(
                        &req_str(&params, "session_id"),
                        phase,
                        tokens as u64,
                        opt_str(&params, "label").as_deref().unwrap_or("tracked"),
                    )?;
                    to_value(&status)
                }
            },
        ))?;
    }

    {
        let monitor = state.monitor.clone();
        registry.register(ToolDef::new(
            "context_status",
            "Usage, phase breakdown, trend, and recent rate",
            SideEffect::Read,
            ToolSchema::new().required("session_id", FieldType::String, "target session"),
            move |params| {
                let monitor = monitor.clone();
                async move {
                    let status = monitor.status(&req_str(&params, "session_id"))?;
                    to_value(&status)
                }
            },
        ))?;
    }

    {
        let monitor = state.monitor.clone();
        registry.register(ToolDef::new(
            "context_predict",
            "Remaining capacity and task feasibility",
            SideEffect::Read,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("planned_tasks", FieldType::Array, "task labels to cost"),
            move |params| {
                let monitor = monitor.clone();
                async move {
                    let prediction = monitor.predict(
                        &req_str(&params, "session_id"),
                        &str_items(&params, "planned_tasks"),
                    )?;
                    to_value(&prediction)
                }
            },
        ))?;
    }

    {
        let monitor = state.monitor.clone();
        registry.register(ToolDef::new(
            "context_optimize",
            "Plan token savings in ascending-risk order",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .required("target_reduction", FieldType::Integer, "tokens to free")
                .optional(
                    "preserve_functionality",
                    FieldType::Boolean,
                    "skip high-risk strategies",
                ),
            move |params| {
                let monitor = monitor.clone();
                async move {
                    let target = opt_i64(&params, "target_reduction").unwrap_or(0);
                    if target <= 0 {
                        return Err(Error::invalid_parameters(
                            vec!["target_reduction".into()],
                            "target_reduction must be positive",
                        ));
                    }
                    let result = monitor.optimize(
                        &req_str(&params, "session_id"),
                        target as u64,
                        opt_bool(&params, "preserve_functionality").unwrap_or(true),
                    )?;
                    to_value(&result)
                }
            },
        ))?;
    }

    {
        let monitor = state.monitor.clone();
        registry.register(ToolDef::new(
            "context_analytics",
            "Per-phase averages, peaks, and efficiency",
            SideEffect::Read,
            ToolSchema::new().required("session_id", FieldType::String, "target session"),
            move |params| {
                let monitor = monitor.clone();
                async move {
                    let analytics = monitor.analytics(&req_str(&params, "session_id"))?;
                    to_value(&analytics)
                }
            },
        ))?;
    }

    // --- reality checker -------------------------------------------------

    {
        let reality = state.reality.clone();
        registry.register(ToolDef::new(
            "reality_check",
            "Compare claimed progress against the filesystem, tests, and docs",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("kind", FieldType::String, "comprehensive|quick|specific")
                .optional("focus_areas", FieldType::Array, "areas for a specific check"),
            move |params| {
                let reality = reality.clone();
                async move {
                    let kind = match opt_str(&params, "kind") {
                        Some(raw) => parse_enum(&raw, "kind", CheckKind::parse)?,
                        None => CheckKind::Quick,
                    };
                    let report = reality
                        .perform_check(
                            &req_str(&params, "session_id"),
                            kind,
                            &str_items(&params, "focus_areas"),
                        )
                        .await?;
                    to_value(&report)
                }
            },
        ))?;
    }

    {
        let reality = state.reality.clone();
        registry.register(ToolDef::new(
            "reality_fix",
            "Apply auto-fixable discrepancies from a snapshot",
            SideEffect::Destructive,
            ToolSchema::new()
                .required("snapshot_id", FieldType::String, "source snapshot")
                .required("fix_ids", FieldType::Array, "discrepancy ids to fix")
                .optional("auto_commit", FieldType::Boolean, "commit applied fixes"),
            move |params| {
                let reality = reality.clone();
                async move {
                    let outcome = reality
                        .apply_fixes(
                            &req_str(&params, "snapshot_id"),
                            &str_items(&params, "fix_ids"),
                            opt_bool(&params, "auto_commit").unwrap_or(false),
                        )
                        .await?;
                    to_value(&outcome)
                }
            },
        ))?;
    }

    {
        let reality = state.reality.clone();
        registry.register(ToolDef::new(
            "metric_validate",
            "Variance of reported metrics against observed reality",
            SideEffect::Read,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .required("reported", FieldType::Object, "metric name → reported value"),
            move |params| {
                let reality = reality.clone();
                async move {
                    let reported: ReportedMetrics =
                        serde_json::from_value(params["reported"].clone()).map_err(|e| {
                            Error::invalid_parameters(vec!["reported".into()], e.to_string())
                        })?;
                    let validations =
                        reality.validate_metrics(&req_str(&params, "session_id"), &reported)?;
                    to_value(&validations)
                }
            },
        ))?;
    }

    // --- documentation engine --------------------------------------------

    {
        let docs = state.docs.clone();
        registry.register(ToolDef::new(
            "doc_generate",
            "Render a template-driven document for a session",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "owning session")
                .required("kind", FieldType::String, "readme|api|architecture|handoff")
                .optional("include_sections", FieldType::Array, "restrict to these sections")
                .optional("context", FieldType::Object, "extra template values"),
            move |params| {
                let docs = docs.clone();
                async move {
                    let kind =
                        parse_enum(&req_str(&params, "kind"), "kind", DocumentKind::parse)?;
                    let include = params["include_sections"].as_array().map(|items| {
                        items
                            .iter()
                            .filter_map(|v| v.as_str().map(|s| s.to_string()))
                            .collect::<Vec<_>>()
                    });
                    let mut extra = HashMap::new();
                    if let Some(map) = params["context"].as_object() {
                        for (key, value) in map {
                            if let Some(text) = value.as_str() {
                                extra.insert(key.clone(), text.to_string());
                            }
                        }
                    }
                    let document = docs.generate(
                        &req_str(&params, "session_id"),
                        kind,
                        include.as_deref(),
                        extra,
                    )?;
                    to_value(&document)
                }
            },
        ))?;
    }

    {
        let docs = state.docs.clone();
        registry.register(ToolDef::new(
            "doc_update",
            "Update an existing document in place",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("file_path", FieldType::String, "document path")
                .required("mode", FieldType::String, "sync|append|restructure")
                .optional("context", FieldType::String, "content for the update"),
            move |params| {
                let docs = docs.clone();
                async move {
                    let mode = parse_enum(
                        &req_str(&params, "mode"),
                        "mode",
                        DocumentUpdateMode::parse,
                    )?;
                    let document = docs.update(
                        &req_str(&params, "file_path"),
                        mode,
                        opt_str(&params, "context").as_deref(),
                    )?;
                    to_value(&document)
                }
            },
        ))?;
    }

    {
        let docs = state.docs.clone();
        registry.register(ToolDef::new(
            "doc_status",
            "Existence and staleness for a set of paths",
            SideEffect::Read,
            ToolSchema::new().required("paths", FieldType::Array, "paths to inspect"),
            move |params| {
                let docs = docs.clone();
                async move {
                    let statuses = docs.check_status(&str_items(&params, "paths"))?;
                    to_value(&statuses)
                }
            },
        ))?;
    }

    // --- project tracker -------------------------------------------------

    {
        let tracker = state.tracker.clone();
        registry.register(ToolDef::new(
            "project_track",
            "Upsert a project and recompute aggregates",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("project", FieldType::String, "project name")
                .optional("tech_stack", FieldType::Array, "declared stack entries to merge"),
            move |params| {
                let tracker = tracker.clone();
                async move {
                    let stack = str_items(&params, "tech_stack");
                    let stack = (!stack.is_empty()).then_some(stack);
                    let project =
                        tracker.track(&req_str(&params, "project"), stack.as_deref())?;
                    to_value(&project)
                }
            },
        ))?;
    }

    {
        let tracker = state.tracker.clone();
        registry.register(ToolDef::new(
            "velocity_analyze",
            "Lines-per-day velocity with trend bands",
            SideEffect::Read,
            ToolSchema::new()
                .required("project", FieldType::String, "project name")
                .optional("window_days", FieldType::Integer, "analysis window (default 14)"),
            move |params| {
                let tracker = tracker.clone();
                async move {
                    let analysis = tracker
                        .analyze_velocity(&req_str(&params, "project"), opt_i64(&params, "window_days"))?;
                    to_value(&analysis)
                }
            },
        ))?;
    }

    {
        let tracker = state.tracker.clone();
        registry.register(ToolDef::new(
            "blocker_report",
            "Record a blocker against a session",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "blocked session")
                .required("kind", FieldType::String, "technical|context|external|unclear_requirement")
                .required("description", FieldType::String, "what is blocked")
                .required("impact", FieldType::Integer, "impact score 0-10"),
            move |params| {
                let tracker = tracker.clone();
                async move {
                    let kind =
                        parse_enum(&req_str(&params, "kind"), "kind", BlockerKind::parse)?;
                    let impact = opt_i64(&params, "impact").unwrap_or(0);
                    if !(0..=10).contains(&impact) {
                        return Err(Error::invalid_parameters(
                            vec!["impact".into()],
                            "impact must be in [0, 10]",
                        ));
                    }
                    let blocker = tracker.report_blocker(
                        &req_str(&params, "session_id"),
                        kind,
                        &req_str(&params, "description"),
                        impact as u8,
                    )?;
                    to_value(&blocker)
                }
            },
        ))?;
    }

    {
        let tracker = state.tracker.clone();
        registry.register(ToolDef::new(
            "blocker_resolve",
            "Close a blocker and record time to resolve",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("blocker_id", FieldType::String, "blocker to close")
                .required("resolution", FieldType::String, "how it was resolved"),
            move |params| {
                let tracker = tracker.clone();
                async move {
                    let blocker = tracker.resolve_blocker(
                        &req_str(&params, "blocker_id"),
                        &req_str(&params, "resolution"),
                    )?;
                    to_value(&blocker)
                }
            },
        ))?;
    }

    {
        let tracker = state.tracker.clone();
        registry.register(ToolDef::new(
            "progress_report",
            "Sessions, velocity, blockers, and optional predictions",
            SideEffect::Read,
            ToolSchema::new()
                .required("project", FieldType::String, "project name")
                .optional("time_range_days", FieldType::Integer, "restrict to recent days")
                .optional("include_predictions", FieldType::Boolean, "append forecasts"),
            move |params| {
                let tracker = tracker.clone();
                async move {
                    let report = tracker.generate_report(
                        &req_str(&params, "project"),
                        opt_i64(&params, "time_range_days"),
                        opt_bool(&params, "include_predictions").unwrap_or(false),
                    )?;
                    to_value(&report)
                }
            },
        ))?;
    }

    // --- quick actions --------------------------------------------------

    {
        let sessions = state.sessions.clone();
        let registry_weak = registry_weak.clone();
        registry.register(ToolDef::new(
            "quick_action",
            "Execute a stored tool sequence, stopping on the first error",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("action_id", FieldType::String, "quick action to run")
                .optional("params", FieldType::Object, "overrides for step templates")
                .optional("session_id", FieldType::String, "session for {{session_id}}"),
            move |params| {
                let sessions = sessions.clone();
                let registry_weak = registry_weak.clone();
                async move {
                    let dispatcher = registry_weak
                        .upgrade()
                        .ok_or_else(|| Error::Storage("tool registry shut down".into()))?;

                    let (action, steps) = sessions.prepare_quick_action(
                        &req_str(&params, "action_id"),
                        params.get("params"),
                        opt_str(&params, "session_id").as_deref(),
                    )?;

                    let mut results = Vec::new();
                    let mut completed = true;
                    for step in steps {
                        match dispatcher.dispatch(&step.tool, step.params).await {
                            Ok(result) => {
                                results.push(json!({ "tool": step.tool, "ok": true, "result": result }));
                            }
                            Err(err) => {
                                results.push(json!({
                                    "tool": step.tool,
                                    "ok": false,
                                    "error": { "code": err.code(), "message": err.to_string() },
                                }));
                                completed = false;
                                break;
                            }
                        }
                    }

                    Ok(json!({
                        "action_id": action.id,
                        "name": action.name,
                        "completed": completed,
                        "results": results,
                    }))
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "suggest_actions",
            "Rank quick actions for the session's current state",
            SideEffect::Read,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("limit", FieldType::Integer, "max suggestions (default 3)"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let limit = opt_i64(&params, "limit").unwrap_or(3).clamp(1, 10) as usize;
                    let suggestions =
                        sessions.suggest_actions(&req_str(&params, "session_id"), limit)?;
                    to_value(&suggestions)
                }
            },
        ))?;
    }

    {
        let sessions = state.sessions.clone();
        registry.register(ToolDef::new(
            "custom_action",
            "Create a user-defined quick action",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("name", FieldType::String, "display name")
                .required("steps", FieldType::Array, "ordered {tool, params} steps")
                .optional("description", FieldType::String, "what the action does")
                .optional("group", FieldType::String, "UI grouping")
                .optional("shortcut", FieldType::String, "keyboard shortcut"),
            move |params| {
                let sessions = sessions.clone();
                async move {
                    let steps = params["steps"]
                        .as_array()
                        .map(|items| {
                            items
                                .iter()
                                .filter_map(|item| {
                                    let tool = item["tool"].as_str()?;
                                    Some(cadence_types::ActionStep {
                                        tool: tool.to_string(),
                                        params: item
                                            .get("params")
                                            .cloned()
                                            .unwrap_or_else(|| json!({})),
                                    })
                                })
                                .collect::<Vec<_>>()
                        })
                        .unwrap_or_default();

                    let action = sessions.create_quick_action(QuickAction {
                        id: new_id("act"),
                        name: req_str(&params, "name"),
                        description: opt_str(&params, "description").unwrap_or_default(),
                        steps,
                        group: opt_str(&params, "group"),
                        shortcut: opt_str(&params, "shortcut"),
                        usage_count: 0,
                        last_used: None,
                    })?;
                    to_value(&action)
                }
            },
        ))?;
    }

    // --- UI state and bus-adjacent reads --------------------------------

    {
        let db = state.db.clone();
        registry.register(ToolDef::new(
            "ui_state_update",
            "Persist a UI panel state blob",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("key", FieldType::String, "panel or client key")
                .required("value", FieldType::Object, "opaque state"),
            move |params| {
                let db = db.clone();
                async move {
                    let now = Utc::now();
                    let key = req_str(&params, "key");
                    let value = params["value"].clone();
                    with_db(&db, |db| db.put_ui_state(&key, &value, &now))?;
                    Ok(json!({ "key": key, "updated_at": now.to_rfc3339() }))
                }
            },
        ))?;
    }

    {
        let observables = state.observables.clone();
        registry.register(ToolDef::new(
            "subscribe_updates",
            "List subscribable topics with their current values",
            SideEffect::Read,
            ToolSchema::new(),
            move |_params| {
                let observables = observables.clone();
                async move {
                    let mut current = serde_json::Map::new();
                    for topic in observables.topic_names() {
                        if let Some(value) = observables.current(topic) {
                            current.insert(topic.to_string(), value);
                        }
                    }
                    Ok(json!({
                        "topics": observables.topic_names(),
                        "current": current,
                    }))
                }
            },
        ))?;
    }

    {
        let health_state = state.clone();
        registry.register(ToolDef::new(
            "health_check",
            "Same payload as GET /health",
            SideEffect::Read,
            ToolSchema::new(),
            move |_params| {
                let health_state = health_state.clone();
                async move { Ok(health_payload(&health_state)) }
            },
        ))?;
    }

    // --- agents and symbols ----------------------------------------------

    {
        let orchestrator = state.orchestrator.clone();
        registry.register(ToolDef::new(
            "agent_run",
            "Run the advisory agent roster once for a session",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("session_id", FieldType::String, "target session")
                .optional("concept", FieldType::String, "concept for the symbol contractor")
                .optional("proposed_name", FieldType::String, "proposed symbol name")
                .optional("context_type", FieldType::String, "class|function|variable|constant|interface"),
            move |params| {
                let orchestrator = orchestrator.clone();
                async move {
                    let concept = opt_str(&params, "concept");
                    let proposed = opt_str(&params, "proposed_name");
                    let context_type = opt_str(&params, "context_type");

                    let symbol_proposal = match (&concept, &proposed, &context_type) {
                        (None, None, None) => None,
                        (Some(concept), Some(proposed), Some(raw)) => Some(SymbolProposal {
                            concept: concept.clone(),
                            proposed_name: proposed.clone(),
                            context_type: parse_enum(
                                raw,
                                "context_type",
                                SymbolContextType::parse,
                            )?,
                        }),
                        _ => {
                            return Err(Error::invalid_parameters(
                                vec![
                                    "concept".into(),
                                    "proposed_name".into(),
                                    "context_type".into(),
                                ],
                                "symbol proposals need all three fields",
                            ));
                        }
                    };

                    let result = orchestrator
                        .run(&req_str(&params, "session_id"), AgentInput { symbol_proposal })
                        .await?;
                    to_value(&result)
                }
            },
        ))?;
    }

    {
        let db = state.db.clone();
        registry.register(ToolDef::new(
            "symbol_register",
            "Bind a canonical name to a concept",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("project", FieldType::String, "owning project")
                .required("concept", FieldType::String, "what is being named")
                .required("chosen_name", FieldType::String, "canonical name")
                .required("context_type", FieldType::String, "class|function|variable|constant|interface")
                .optional("confidence", FieldType::Number, "confidence in [0, 1]")
                .optional("session_id", FieldType::String, "registering session"),
            move |params| {
                let db = db.clone();
                async move {
                    let context_type = parse_enum(
                        &req_str(&params, "context_type"),
                        "context_type",
                        SymbolContextType::parse,
                    )?;
                    let confidence = opt_f64(&params, "confidence").unwrap_or(0.8);
                    if !(0.0..=1.0).contains(&confidence) {
                        return Err(Error::invalid_parameters(
                            vec!["confidence".into()],
                            "confidence must be in [0, 1]",
                        ));
                    }

                    let symbol = Symbol {
                        id: new_id("sym"),
                        project: req_str(&params, "project"),
                        concept: req_str(&params, "concept"),
                        chosen_name: req_str(&params, "chosen_name"),
                        context_type,
                        confidence,
                        usage_count: 1,
                        created_by_agent: "symbol_contractor".into(),
                        session_id: opt_str(&params, "session_id"),
                        created_at: Utc::now(),
                    };

                    match with_db(&db, |db| db.register_symbol(&symbol))? {
                        cadence_store::SymbolRegistration::Created(symbol) => to_value(&symbol),
                        cadence_store::SymbolRegistration::Conflict(existing) => {
                            Err(Error::Conflict(format!(
                                "concept '{}' is already bound to '{}'",
                                existing.concept, existing.chosen_name
                            )))
                        }
                    }
                }
            },
        ))?;
    }

    {
        let db = state.db.clone();
        registry.register(ToolDef::new(
            "symbol_lookup",
            "Resolve the canonical name for a concept (counts as a use)",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("project", FieldType::String, "owning project")
                .required("concept", FieldType::String, "concept to resolve")
                .required("context_type", FieldType::String, "class|function|variable|constant|interface"),
            move |params| {
                let db = db.clone();
                async move {
                    let context_type = parse_enum(
                        &req_str(&params, "context_type"),
                        "context_type",
                        SymbolContextType::parse,
                    )?;
                    let concept = req_str(&params, "concept");
                    let found = with_db(&db, |db| {
                        db.lookup_symbol(&req_str(&params, "project"), &concept, context_type)
                    })?;
                    match found {
                        Some(symbol) => to_value(&symbol),
                        None => Err(Error::SymbolNotFound(concept)),
                    }
                }
            },
        ))?;
    }

    {
        let db = state.db.clone();
        registry.register(ToolDef::new(
            "symbol_list",
            "All symbols for a project, most used first",
            SideEffect::Read,
            ToolSchema::new().required("project", FieldType::String, "owning project"),
            move |params| {
                let db = db.clone();
                async move {
                    let symbols =
                        with_db(&db, |db| db.symbols_for_project(&req_str(&params, "project")))?;
                    to_value(&symbols)
                }
            },
        ))?;
    }

    {
        let orchestrator = state.orchestrator.clone();
        registry.register(ToolDef::new(
            "agent_status",
            "Roster health counters",
            SideEffect::Read,
            ToolSchema::new(),
            move |_params| {
                let orchestrator = orchestrator.clone();
                async move { to_value(&orchestrator.status()) }
            },
        ))?;
    }

    {
        let orchestrator = state.orchestrator.clone();
        registry.register(ToolDef::new(
            "agent_toggle",
            "Enable or disable one agent",
            SideEffect::Mutate,
            ToolSchema::new()
                .required("agent_name", FieldType::String, "agent to toggle")
                .required("enabled", FieldType::Boolean, "new state"),
            move |params| {
                let orchestrator = orchestrator.clone();
                async move {
                    let enabled = orchestrator.toggle(
                        &req_str(&params, "agent_name"),
                        opt_bool(&params, "enabled").unwrap_or(true),
                    )?;
                    Ok(json!({ "agent_name": req_str(&params, "agent_name"), "enabled": enabled }))
                }
            },
        ))?;
    }

    {
        let db = state.db.clone();
        registry.register(ToolDef::new(
            "agent_memory_query",
            "Query the append-only agent decision log",
            SideEffect::Read,
            ToolSchema::new()
                .optional("agent_name", FieldType::String, "filter by agent")
                .optional("action_type", FieldType::String, "filter by action")
                .optional("project", FieldType::String, "filter by project")
                .optional("limit", FieldType::Integer, "max rows (default 50)"),
            move |params| {
                let db = db.clone();
                async move {
                    let limit = opt_i64(&params, "limit").unwrap_or(50).clamp(1, 500) as usize;
                    let decisions = with_db(&db, |db| {
                        db.query_decisions(
                            opt_str(&params, "agent_name").as_deref(),
                            opt_str(&params, "action_type").as_deref(),
                            opt_str(&params, "project").as_deref(),
                            limit,
                        )
                    })?;
                    to_value(&decisions)
                }
            },
        ))?;
    }

    Ok(())
}
