use cadence_types::{ActionStep, QuickAction, Session, SessionPhase};
use serde::Serialize;
use serde_json::{Value, json};

/// A quick-action step with its parameter template fully resolved
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStep {
    pub tool: String,
    pub params: Value,
}

/// Ranked quick-action recommendation
#[derive(Debug, Clone, Serialize)]
pub struct ActionSuggestion {
    pub action_id: String,
    pub name: String,
    /// Confidence in [0, 1]
    pub confidence: f64,
    pub reason: String,
}

pub(crate) const ACTION_CHECKPOINT: &str = "create-checkpoint";
pub(crate) const ACTION_RUN_TESTS: &str = "run-tests";
pub(crate) const ACTION_CONTEXT_STATUS: &str = "context-status";
pub(crate) const ACTION_REALITY_CHECK: &str = "reality-check";

/// Default actions seeded on startup; id conflicts are no-ops so user
/// customizations survive.
pub(crate) fn default_actions() -> Vec<QuickAction> {
    vec![
        QuickAction {
            id: ACTION_CHECKPOINT.into(),
            name: "Create checkpoint".into(),
            description: "Snapshot current progress with a fresh continuation plan".into(),
            steps: vec![ActionStep {
                tool: "session_checkpoint".into(),
                params: json!({ "session_id": "{{session_id}}" }),
            }],
            group: Some("session".into()),
            shortcut: Some("ctrl+shift+c".into()),
            usage_count: 0,
            last_used: None,
        },
        QuickAction {
            id: ACTION_RUN_TESTS.into(),
            name: "Run tests".into(),
            description: "Reality-check the test suite against claimed metrics".into(),
            steps: vec![ActionStep {
                tool: "reality_check".into(),
                params: json!({
                    "session_id": "{{session_id}}",
                    "kind": "specific",
                    "focus_areas": ["tests"],
                }),
            }],
            group: Some("verification".into()),
            shortcut: Some("ctrl+shift+t".into()),
            usage_count: 0,
            last_used: None,
        },
        QuickAction {
            id: ACTION_CONTEXT_STATUS.into(),
            name: "Context status".into(),
            description: "Current token usage, trend, and phase breakdown".into(),
            steps: vec![ActionStep {
                tool: "context_status".into(),
                params: json!({ "session_id": "{{session_id}}" }),
            }],
            group: Some("context".into()),
            shortcut: None,
            usage_count: 0,
            last_used: None,
        },
        QuickAction {
            id: ACTION_REALITY_CHECK.into(),
            name: "Full reality check".into(),
            description: "Comprehensive filesystem, test, and documentation scan".into(),
            steps: vec![ActionStep {
                tool: "reality_check".into(),
                params: json!({
                    "session_id": "{{session_id}}",
                    "kind": "comprehensive",
                }),
            }],
            group: Some("verification".into()),
            shortcut: None,
            usage_count: 0,
            last_used: None,
        },
    ]
}

/// Template ∪ call params (call params win), then `{{session_id}}`
/// substitution through the whole tree.
pub fn merge_params(
    template: &Value,
    call_params: Option<&Value>,
    session_id: Option<&str>,
) -> Value {
    let mut merged = template.clone();

    if let (Value::Object(base), Some(Value::Object(overrides))) = (&mut merged, call_params) {
        for (key, value) in overrides {
            base.insert(key.clone(), value.clone());
        }
    }

    substitute(&mut merged, session_id);
    merged
}

fn substitute(value: &mut Value, session_id: Option<&str>) {
    match value {
        Value::String(s) if s == "{{session_id}}" => {
            *value = match session_id {
                Some(id) => Value::String(id.to_string()),
                None => Value::Null,
            };
        }
        Value::Array(items) => {
            for item in items {
                substitute(item, session_id);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                substitute(item, session_id);
            }
        }
        _ => {}
    }
}

/// Heuristics: implementation phase suggests running tests; past half the
/// budget a checkpoint becomes a near-certain recommendation; deep usage
/// also asks for a reality check.
pub(crate) fn suggest(
    session: &Session,
    available: &[QuickAction],
    limit: usize,
) -> Vec<ActionSuggestion> {
    let usage = session.usage_percent();
    let mut out = Vec::new();

    let has = |id: &str| available.iter().any(|a| a.id == id);

    if session.phase == SessionPhase::Implementation && has(ACTION_RUN_TESTS) {
        out.push(ActionSuggestion {
            action_id: ACTION_RUN_TESTS.into(),
            name: "Run tests".into(),
            confidence: 0.7,
            reason: "implementation phase benefits from early test feedback".into(),
        });
    }

    if usage > 50.0 && has(ACTION_CHECKPOINT) {
        out.push(ActionSuggestion {
            action_id: ACTION_CHECKPOINT.into(),
            name: "Create checkpoint".into(),
            confidence: (0.9f64).max(usage / 100.0).min(1.0),
            reason: format!("context usage at {:.0}%", usage),
        });
    }

    if usage > 75.0 && has(ACTION_REALITY_CHECK) {
        out.push(ActionSuggestion {
            action_id: ACTION_REALITY_CHECK.into(),
            name: "Full reality check".into(),
            confidence: 0.8,
            reason: "verify claimed progress before the budget runs out".into(),
        });
    }

    out.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    out.truncate(limit);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_types::{SessionKind, SessionMetrics, SessionScope, SessionStatus};
    use chrono::Utc;

    fn session(phase: SessionPhase, used: u64, budget: u64) -> Session {
        Session {
            id: "s-act".into(),
            project: "demo".into(),
            kind: SessionKind::Feature,
            start_time: Utc::now(),
            estimated_end: None,
            end_time: None,
            phase,
            status: SessionStatus::Active,
            scope: SessionScope::default(),
            context_budget: budget,
            context_used: used,
            metrics: SessionMetrics::default(),
        }
    }

    #[test]
    fn merge_prefers_call_params_and_fills_session_id() {
        let template = json!({ "session_id": "{{session_id}}", "kind": "quick" });
        let call = json!({ "kind": "comprehensive" });

        let merged = merge_params(&template, Some(&call), Some("sess-1"));
        assert_eq!(merged["session_id"], "sess-1");
        assert_eq!(merged["kind"], "comprehensive");
    }

    #[test]
    fn substitution_descends_into_arrays() {
        let template = json!({ "targets": ["{{session_id}}", "fixed"] });
        let merged = merge_params(&template, None, Some("sess-9"));
        assert_eq!(merged["targets"][0], "sess-9");
        assert_eq!(merged["targets"][1], "fixed");
    }

    #[test]
    fn missing_session_substitutes_null() {
        let template = json!({ "session_id": "{{session_id}}" });
        let merged = merge_params(&template, None, None);
        assert!(merged["session_id"].is_null());
    }

    #[test]
    fn implementation_phase_suggests_tests() {
        let available = default_actions();
        let suggestions = suggest(
            &session(SessionPhase::Implementation, 10, 1000),
            &available,
            5,
        );
        assert!(suggestions.iter().any(|s| s.action_id == ACTION_RUN_TESTS));
    }

    #[test]
    fn half_spent_budget_suggests_checkpoint_with_high_confidence() {
        let available = default_actions();
        let suggestions = suggest(&session(SessionPhase::Testing, 600, 1000), &available, 5);
        let checkpoint = suggestions
            .iter()
            .find(|s| s.action_id == ACTION_CHECKPOINT)
            .expect("checkpoint suggestion expected past 50%");
        assert!(checkpoint.confidence >= 0.9);
    }

    #[test]
    fn limit_keeps_highest_confidence() {
        let available = default_actions();
        let suggestions = suggest(
            &session(SessionPhase::Implementation, 800, 1000),
            &available,
            1,
        );
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].action_id, ACTION_CHECKPOINT);
    }
}
