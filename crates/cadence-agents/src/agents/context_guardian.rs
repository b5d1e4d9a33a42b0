use async_trait::async_trait;
use cadence_core::{SharedDb, with_db};
use cadence_types::{
    AgentContext, ContextSample, Result, Suggestion, SuggestedToolCall, SuggestionPriority,
};
use serde_json::json;

use crate::{Agent, AgentInput};

/// Usage pattern over the recent sample window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsagePattern {
    Steady,
    Spike,
    Exponential,
}

/// Watches consumption shape and raises exhaustion risk before the budget
/// runs dry.
pub struct ContextGuardian {
    db: SharedDb,
}

impl ContextGuardian {
    pub fn new(db: SharedDb) -> Self {
        Self { db }
    }
}

/// Classify the last window of samples. Exponential growth needs three
/// consecutive >1.5x increases; a spike is one sample past 3x the median.
pub(crate) fn classify(samples: &[ContextSample]) -> UsagePattern {
    let window: Vec<u64> = samples.iter().rev().take(5).rev().map(|s| s.tokens).collect();
    if window.len() < 3 {
        return UsagePattern::Steady;
    }

    let growing = window
        .windows(2)
        .filter(|pair| pair[1] as f64 > pair[0] as f64 * 1.5)
        .count();
    if growing >= window.len() - 1 {
        return UsagePattern::Exponential;
    }

    let mut sorted = window.clone();
    sorted.sort_unstable();
    let median = sorted[sorted.len() / 2].max(1);
    if window.iter().any(|&t| t > median * 3) {
        return UsagePattern::Spike;
    }

    UsagePattern::Steady
}

#[async_trait]
impl Agent for ContextGuardian {
    fn name(&self) -> &'static str {
        "context_guardian"
    }

    fn priority(&self) -> SuggestionPriority {
        SuggestionPriority::Medium
    }

    fn budget_percent(&self) -> u8 {
        10
    }

    fn is_active(&self, ctx: &AgentContext) -> bool {
        ctx.context_usage_percent >= 40.0
    }

    async fn execute(&self, ctx: &AgentContext, _input: &AgentInput) -> Result<Vec<Suggestion>> {
        let samples = with_db(&self.db, |db| db.samples(&ctx.session_id))?;
        let pattern = classify(&samples);
        let usage = ctx.context_usage_percent;

        let mut out = Vec::new();

        if usage >= 80.0 {
            out.push(Suggestion {
                agent_name: self.name().to_string(),
                kind: "exhaustion_risk".into(),
                priority: SuggestionPriority::Critical,
                title: "context exhaustion imminent".into(),
                body: format!(
                    "usage at {:.0}% with a {} consumption pattern; optimize or hand off",
                    usage,
                    pattern_name(pattern)
                ),
                suggested_tool_call: Some(SuggestedToolCall {
                    name: "context_optimize".into(),
                    params: json!({
                        "session_id": ctx.session_id,
                        "target_reduction": 5000,
                        "preserve_functionality": true,
                    }),
                }),
                confidence: 0.9,
            });
        }

        match pattern {
            UsagePattern::Exponential => out.push(Suggestion {
                agent_name: self.name().to_string(),
                kind: "usage_pattern".into(),
                priority: SuggestionPriority::High,
                title: "token growth is accelerating".into(),
                body: "each recent step consumed well over the one before; summarize history now"
                    .into(),
                suggested_tool_call: Some(SuggestedToolCall {
                    name: "context_optimize".into(),
                    params: json!({
                        "session_id": ctx.session_id,
                        "target_reduction": 8000,
                        "preserve_functionality": false,
                    }),
                }),
                confidence: 0.8,
            }),
            UsagePattern::Spike => out.push(Suggestion {
                agent_name: self.name().to_string(),
                kind: "usage_pattern".into(),
                priority: SuggestionPriority::High,
                title: "token spike detected".into(),
                body: "one recent operation dwarfed the rest; check for oversized context loads"
                    .into(),
                suggested_tool_call: None,
                confidence: 0.7,
            }),
            UsagePattern::Steady if usage >= 60.0 => out.push(Suggestion {
                agent_name: self.name().to_string(),
                kind: "usage_pattern".into(),
                priority: SuggestionPriority::Medium,
                title: "trim low-priority context".into(),
                body: format!("steady burn at {:.0}%; a light trim buys headroom", usage),
                suggested_tool_call: None,
                confidence: 0.6,
            }),
            UsagePattern::Steady => {}
        }

        Ok(out)
    }
}

fn pattern_name(pattern: UsagePattern) -> &'static str {
    match pattern {
        UsagePattern::Steady => "steady",
        UsagePattern::Spike => "spike",
        UsagePattern::Exponential => "exponential",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_store::Database;
    use cadence_types::{
        BudgetPlan, Checkpoint, ContinuationPlan, Session, SessionKind, SessionMetrics,
        SessionPhase, SessionScope, SessionStatus,
    };
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    fn sample(tokens: u64) -> ContextSample {
        ContextSample {
            session_id: "s-1".into(),
            timestamp: Utc::now(),
            phase: SessionPhase::Implementation,
            tokens,
            label: "op".into(),
        }
    }

    #[test]
    fn classification_patterns() {
        assert_eq!(
            classify(&[sample(100), sample(110), sample(95)]),
            UsagePattern::Steady
        );
        assert_eq!(
            classify(&[sample(100), sample(200), sample(400), sample(900)]),
            UsagePattern::Exponential
        );
        assert_eq!(
            classify(&[sample(100), sample(120), sample(700), sample(110)]),
            UsagePattern::Spike
        );
        assert_eq!(classify(&[sample(10)]), UsagePattern::Steady);
    }

    fn guardian_with_usage(usage_percent: f64, sample_tokens: &[u64]) -> (ContextGuardian, AgentContext) {
        let mut db = Database::open_in_memory().unwrap();
        let scope = SessionScope {
            lines: 1000,
            tests: 100,
            docs: 10,
        };
        let budget = BudgetPlan::derive(&scope).context_budget;
        let now = Utc::now();
        let session = Session {
            id: "s-1".into(),
            project: "demo".into(),
            kind: SessionKind::Feature,
            start_time: now,
            estimated_end: None,
            end_time: None,
            phase: SessionPhase::Implementation,
            status: SessionStatus::Active,
            scope,
            context_budget: budget,
            context_used: 0,
            metrics: SessionMetrics::default(),
        };
        let cp0 = Checkpoint {
            id: "cp-0".into(),
            session_id: "s-1".into(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: Vec::new(),
            metrics: SessionMetrics::default(),
            continuation: ContinuationPlan::default(),
        };
        db.create_session(&session, &cp0).unwrap();
        for tokens in sample_tokens {
            db.track_usage(&sample(*tokens)).unwrap();
        }

        let ctx = AgentContext {
            session_id: "s-1".into(),
            project: "demo".into(),
            current_phase: SessionPhase::Implementation,
            context_usage_percent: usage_percent,
            timestamp: now,
        };
        (ContextGuardian::new(Arc::new(Mutex::new(db))), ctx)
    }

    #[test]
    fn activation_threshold_is_40_percent() {
        let (guardian, _) = guardian_with_usage(10.0, &[]);
        let below = AgentContext {
            session_id: "s-1".into(),
            project: "demo".into(),
            current_phase: SessionPhase::Implementation,
            context_usage_percent: 39.9,
            timestamp: Utc::now(),
        };
        assert!(!guardian.is_active(&below));
    }

    #[tokio::test]
    async fn critical_exhaustion_at_eighty_percent() {
        let (guardian, ctx) = guardian_with_usage(82.0, &[100, 110, 105]);
        let out = guardian.execute(&ctx, &AgentInput::default()).await.unwrap();
        assert!(out.iter().any(|s| s.kind == "exhaustion_risk"
            && s.priority == SuggestionPriority::Critical));
    }

    #[tokio::test]
    async fn steady_mid_usage_suggests_light_trim() {
        let (guardian, ctx) = guardian_with_usage(65.0, &[100, 110, 105]);
        let out = guardian.execute(&ctx, &AgentInput::default()).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].priority, SuggestionPriority::Medium);
    }

    #[tokio::test]
    async fn exponential_growth_is_flagged() {
        let (guardian, ctx) = guardian_with_usage(55.0, &[100, 200, 450, 1000]);
        let out = guardian.execute(&ctx, &AgentInput::default()).await.unwrap();
        assert!(out.iter().any(|s| s.title.contains("accelerating")));
    }
}
