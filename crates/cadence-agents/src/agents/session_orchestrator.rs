use async_trait::async_trait;
use cadence_types::{AgentContext, Result, Suggestion, SuggestedToolCall, SuggestionPriority};
use serde_json::json;

use crate::{Agent, AgentInput};

/// Checkpoint cadence advisor. Escalates along the 30/50/70 ladder and
/// turns critical at 85%.
pub struct SessionOrchestrator;

impl SessionOrchestrator {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SessionOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for SessionOrchestrator {
    fn name(&self) -> &'static str {
        "session_orchestrator"
    }

    fn priority(&self) -> SuggestionPriority {
        SuggestionPriority::High
    }

    fn budget_percent(&self) -> u8 {
        20
    }

    fn is_active(&self, ctx: &AgentContext) -> bool {
        ctx.context_usage_percent >= 25.0
    }

    async fn execute(&self, ctx: &AgentContext, _input: &AgentInput) -> Result<Vec<Suggestion>> {
        let usage = ctx.context_usage_percent;

        let checkpoint_call = SuggestedToolCall {
            name: "session_checkpoint".into(),
            params: json!({ "session_id": ctx.session_id }),
        };

        let suggestion = if usage >= 85.0 {
            Suggestion {
                agent_name: self.name().to_string(),
                kind: "emergency_checkpoint".into(),
                priority: SuggestionPriority::Critical,
                title: "create emergency checkpoint".into(),
                body: format!(
                    "context usage at {:.0}%; snapshot now so nothing is lost at exhaustion",
                    usage
                ),
                suggested_tool_call: Some(checkpoint_call),
                confidence: 0.95,
            }
        } else {
            let (priority, confidence) = if usage >= 70.0 {
                (SuggestionPriority::High, 0.85)
            } else if usage >= 50.0 {
                (SuggestionPriority::Medium, 0.75)
            } else if usage >= 30.0 {
                (SuggestionPriority::Medium, 0.6)
            } else {
                return Ok(Vec::new());
            };

            Suggestion {
                agent_name: self.name().to_string(),
                kind: "checkpoint".into(),
                priority,
                title: "consider a checkpoint".into(),
                body: format!("context usage crossed {:.0}%", usage),
                suggested_tool_call: Some(checkpoint_call),
                confidence,
            }
        };

        Ok(vec![suggestion])
    }
}
