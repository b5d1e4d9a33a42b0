use async_trait::async_trait;
use cadence_core::{SharedDb, with_db};
use cadence_types::{
    AgentContext, Result, Suggestion, SuggestedToolCall, SuggestionPriority,
};
use serde_json::json;

use crate::{Agent, AgentInput};

/// Keeps concept naming consistent across a project. On a conflicting
/// proposal it points at the canonical name; on a novel concept it offers
/// registration.
pub struct SymbolContractor {
    db: SharedDb,
}

impl SymbolContractor {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Agent for SymbolContractor {
    fn name(&self) -> &'static str {
        "symbol_contractor"
    }

    fn priority(&self) -> SuggestionPriority {
        SuggestionPriority::Critical
    }

    fn budget_percent(&self) -> u8 {
        15
    }

    fn is_active(&self, ctx: &AgentContext) -> bool {
        ctx.context_usage_percent < 90.0
    }

    async fn execute(&self, ctx: &AgentContext, input: &AgentInput) -> Result<Vec<Suggestion>> {
        let Some(proposal) = &input.symbol_proposal else {
            // Nothing proposed this run; no naming work to do.
            return Ok(Vec::new());
        };

        let existing = with_db(&self.db, |db| {
            db.peek_symbol(&ctx.project, &proposal.concept, proposal.context_type)
        })?;

        let suggestion = match existing {
            Some(symbol) if symbol.chosen_name != proposal.proposed_name => Suggestion {
                agent_name: self.name().to_string(),
                kind: "naming_conflict".into(),
                priority: SuggestionPriority::High,
                title: format!("use canonical name '{}'", symbol.chosen_name),
                body: format!(
                    "'{}' is already bound to '{}' ({} uses); '{}' would fork the vocabulary",
                    proposal.concept,
                    symbol.chosen_name,
                    symbol.usage_count,
                    proposal.proposed_name
                ),
                suggested_tool_call: Some(SuggestedToolCall {
                    name: "symbol_lookup".into(),
                    params: json!({
                        "project": ctx.project,
                        "concept": proposal.concept,
                        "context_type": proposal.context_type.as_str(),
                    }),
                }),
                confidence: symbol.confidence.max(0.8),
            },
            Some(_) => return Ok(Vec::new()),
            None => Suggestion {
                agent_name: self.name().to_string(),
                kind: "symbol_registration".into(),
                priority: SuggestionPriority::Medium,
                title: format!("register '{}'", proposal.proposed_name),
                body: format!(
                    "no canonical name exists for '{}' yet",
                    proposal.concept
                ),
                suggested_tool_call: Some(SuggestedToolCall {
                    name: "symbol_register".into(),
                    params: json!({
                        "project": ctx.project,
                        "concept": proposal.concept,
                        "chosen_name": proposal.proposed_name,
                        "context_type": proposal.context_type.as_str(),
                        "session_id": ctx.session_id,
                    }),
                }),
                confidence: 0.75,
            },
        };

        Ok(vec![suggestion])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SymbolProposal;
    use cadence_store::Database;
    use cadence_types::{SessionPhase, Symbol, SymbolContextType};
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn ctx(usage: f64) -> AgentContext {
        AgentContext {
            session_id: "s-1".into(),
            project: "demo".into(),
            current_phase: SessionPhase::Implementation,
            context_usage_percent: usage,
            timestamp: Utc::now(),
        }
    }

    fn contractor_with_symbol(name: &str) -> SymbolContractor {
        let mut db = Database::open_in_memory().unwrap();
        db.register_symbol(&Symbol {
            id: "sym-1".into(),
            project: "demo".into(),
            concept: "request throttle".into(),
            chosen_name: name.into(),
            context_type: SymbolContextType::Class,
            confidence: 0.9,
            usage_count: 4,
            created_by_agent: "symbol_contractor".into(),
            session_id: None,
            created_at: Utc::now(),
        })
        .unwrap();
        SymbolContractor::new(Arc::new(Mutex::new(db)))
    }

    #[test]
    fn inactive_near_exhaustion() {
        let contractor = contractor_with_symbol("Throttle");
        assert!(contractor.is_active(&ctx(89.0)));
        assert!(!contractor.is_active(&ctx(90.0)));
    }

    #[tokio::test]
    async fn no_proposal_means_no_suggestions() {
        let contractor = contractor_with_symbol("Throttle");
        let out = contractor
            .execute(&ctx(30.0), &AgentInput::default())
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn conflicting_proposal_points_at_canonical_name() {
        let contractor = contractor_with_symbol("Throttle");
        let input = AgentInput {
            symbol_proposal: Some(SymbolProposal {
                concept: "request throttle".into(),
                proposed_name: "RateLimiter".into(),
                context_type: SymbolContextType::Class,
            }),
        };

        let out = contractor.execute(&ctx(30.0), &input).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, "naming_conflict");
        assert!(out[0].title.contains("Throttle"));
        assert_eq!(out[0].priority, SuggestionPriority::High);
    }

    #[tokio::test]
    async fn matching_proposal_is_silent() {
        let contractor = contractor_with_symbol("Throttle");
        let input = AgentInput {
            symbol_proposal: Some(SymbolProposal {
                concept: "request throttle".into(),
                proposed_name: "Throttle".into(),
                context_type: SymbolContextType::Class,
            }),
        };
        let out = contractor.execute(&ctx(30.0), &input).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn novel_concept_offers_registration() {
        let contractor = contractor_with_symbol("Throttle");
        let input = AgentInput {
            symbol_proposal: Some(SymbolProposal {
                concept: "retry queue".into(),
                proposed_name: "RetryQueue".into(),
                context_type: SymbolContextType::Class,
            }),
        };

        let out = contractor.execute(&ctx(30.0), &input).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, "symbol_registration");
        let call = out[0].suggested_tool_call.as_ref().unwrap();
        assert_eq!(call.name, "symbol_register");
        assert_eq!(call.params["chosen_name"], "RetryQueue");
    }
}
