mod optimize;

pub use optimize::OptimizationResult;

use std::collections::BTreeMap;

use cadence_types::{
    AgentDecision, ContextSample, ContextTrend, Error, Result, Session, SessionPhase,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::observable::{ObservableRegistry, topics};
use crate::{SharedDb, with_db};

/// Rolled-up context accounting for one session
#[derive(Debug, Clone, Serialize)]
pub struct ContextStatus {
    pub session_id: String,
    pub used_tokens: u64,
    pub total_tokens: u64,
    pub usage_percent: f64,
    pub phase_breakdown: BTreeMap<String, u64>,
    pub trend: ContextTrend,
    /// Tokens per minute over the trailing 30 minutes
    pub recent_rate: f64,
}

/// Forward-looking capacity estimate
#[derive(Debug, Clone, Serialize)]
pub struct ContextPrediction {
    pub remaining_capacity: i64,
    pub recommended_checkpoint: bool,
    pub tasks_feasible: Vec<String>,
    pub optimization_suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeakUsagePoint {
    pub timestamp: String,
    pub tokens: u64,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContextAnalytics {
    pub average_per_phase: BTreeMap<String, f64>,
    pub peak_usage_points: Vec<PeakUsagePoint>,
    /// Lines written per 1k tokens, capped at 100
    pub efficiency_score: f64,
}

/// Per-session token accounting. Depends only on the store and publishes to
/// observables; the session manager reads the same ledger through
/// [`compute_status`] rather than through this monitor.
pub struct ContextMonitor {
    db: SharedDb,
    observables: ObservableRegistry,
}

impl ContextMonitor {
    pub fn new(db: SharedDb, observables: ObservableRegistry) -> Self {
        Self { db, observables }
    }

    /// Append a sample and publish the refreshed status. Duplicate rows
    /// under retries are permitted and accounted; callers own dedup.
    pub fn track_usage(
        &self,
        session_id: &str,
        phase: SessionPhase,
        tokens: u64,
        label: &str,
    ) -> Result<ContextStatus> {
        if tokens == 0 {
            return Err(Error::invalid_parameters(
                vec!["tokens".into()],
                "tokens must be a positive delta",
            ));
        }

        let session = require_session(&self.db, session_id)?;
        if session.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "session {} is {}",
                session_id,
                session.status.as_str()
            )));
        }

        let sample = ContextSample {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            phase,
            tokens,
            label: label.to_string(),
        };
        with_db(&self.db, |db| db.track_usage(&sample).map(|_| ()))?;
        debug!(session = session_id, tokens, phase = phase.as_str(), "tracked usage");

        let status = self.status(session_id)?;
        self.observables.publish(
            topics::CONTEXT_STATUS,
            serde_json::to_value(&status).unwrap_or_default(),
        );
        Ok(status)
    }

    pub fn status(&self, session_id: &str) -> Result<ContextStatus> {
        let session = require_session(&self.db, session_id)?;
        let samples = with_db(&self.db, |db| db.samples(session_id))?;
        Ok(compute_status(&session, &samples))
    }

    pub fn predict(
        &self,
        session_id: &str,
        planned_tasks: &[String],
    ) -> Result<ContextPrediction> {
        let session = require_session(&self.db, session_id)?;
        let samples = with_db(&self.db, |db| db.samples(session_id))?;
        let status = compute_status(&session, &samples);

        let remaining = session.context_budget as i64 - session.context_used as i64;
        let safety_margin = (session.context_budget as f64 * 0.10) as i64;
        let usable = remaining - safety_margin;

        let tasks_feasible = planned_tasks
            .iter()
            .filter(|label| estimate_task_cost(label) as i64 <= usable)
            .cloned()
            .collect();

        let recommended_checkpoint =
            status.usage_percent > 60.0 || status.trend == ContextTrend::Critical;

        Ok(ContextPrediction {
            remaining_capacity: remaining,
            recommended_checkpoint,
            tasks_feasible,
            optimization_suggestions: optimize::suggestions_for(status.usage_percent),
        })
    }

    pub fn optimize(
        &self,
        session_id: &str,
        target_reduction: u64,
        preserve_functionality: bool,
    ) -> Result<OptimizationResult> {
        let session = require_session(&self.db, session_id)?;
        if session.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "session {} is {}",
                session_id,
                session.status.as_str()
            )));
        }

        let result = optimize::plan(&session, target_reduction, preserve_functionality);

        // Weak long-term memory for the optimizer; survives session churn.
        let decision = AgentDecision {
            agent_name: "context_monitor".into(),
            action_type: "optimization".into(),
            input_context: format!(
                "used {}/{} target {}",
                session.context_used, session.context_budget, target_reduction
            ),
            decision_made: result.optimizations_applied.join(", "),
            outcome: None,
            project: session.project.clone(),
            session_id: Some(session.id.clone()),
            timestamp: Utc::now(),
        };
        with_db(&self.db, |db| db.record_decision(&decision))?;

        Ok(result)
    }

    pub fn analytics(&self, session_id: &str) -> Result<ContextAnalytics> {
        let session = require_session(&self.db, session_id)?;
        let samples = with_db(&self.db, |db| db.samples(session_id))?;

        let mut totals: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        for sample in &samples {
            let entry = totals.entry(sample.phase.as_str().to_string()).or_default();
            entry.0 += sample.tokens;
            entry.1 += 1;
        }
        let average_per_phase = totals
            .into_iter()
            .map(|(phase, (sum, count))| (phase, sum as f64 / count.max(1) as f64))
            .collect();

        let mut sorted: Vec<_> = samples.iter().collect();
        sorted.sort_by(|a, b| b.tokens.cmp(&a.tokens));
        let peak_usage_points = sorted
            .into_iter()
            .take(3)
            .map(|s| PeakUsagePoint {
                timestamp: s.timestamp.to_rfc3339(),
                tokens: s.tokens,
                label: s.label.clone(),
            })
            .collect();

        let lines_per_1k = if session.context_used == 0 {
            0.0
        } else {
            session.metrics.lines_written as f64 / (session.context_used as f64 / 1000.0)
        };

        Ok(ContextAnalytics {
            average_per_phase,
            peak_usage_points,
            efficiency_score: lines_per_1k.min(100.0),
        })
    }
}

pub(crate) fn require_session(db: &SharedDb, session_id: &str) -> Result<Session> {
    with_db(db, |db| db.session(session_id))?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
}

/// Status derivation shared with the session manager, which publishes the
/// same shape after checkpoint writes.
pub fn compute_status(session: &Session, samples: &[ContextSample]) -> ContextStatus {
    let mut phase_breakdown: BTreeMap<String, u64> = BTreeMap::new();
    for sample in samples {
        *phase_breakdown
            .entry(sample.phase.as_str().to_string())
            .or_default() += sample.tokens;
    }

    ContextStatus {
        session_id: session.id.clone(),
        used_tokens: session.context_used,
        total_tokens: session.context_budget,
        usage_percent: session.usage_percent(),
        phase_breakdown,
        trend: compute_trend(session, samples),
        recent_rate: recent_rate(samples),
    }
}

/// Critical: the last 5 samples sum past 20% of budget. Rising: the
/// trailing-30-minute rate exceeds twice the session's lifetime mean rate.
fn compute_trend(session: &Session, samples: &[ContextSample]) -> ContextTrend {
    if session.context_budget > 0 && samples.len() >= 5 {
        let last_five: u64 = samples.iter().rev().take(5).map(|s| s.tokens).sum();
        if last_five as f64 > session.context_budget as f64 * 0.20 {
            return ContextTrend::Critical;
        }
    }

    let recent = recent_rate(samples);
    let mean = lifetime_rate(samples);
    if mean > 0.0 && recent > mean * 2.0 {
        return ContextTrend::Rising;
    }

    ContextTrend::Stable
}

fn recent_rate(samples: &[ContextSample]) -> f64 {
    let cutoff = Utc::now() - Duration::minutes(30);
    let recent_tokens: u64 = samples
        .iter()
        .filter(|s| s.timestamp >= cutoff)
        .map(|s| s.tokens)
        .sum();
    recent_tokens as f64 / 30.0
}

fn lifetime_rate(samples: &[ContextSample]) -> f64 {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return 0.0;
    };
    let minutes = (last.timestamp - first.timestamp).num_seconds() as f64 / 60.0;
    let total: u64 = samples.iter().map(|s| s.tokens).sum();
    total as f64 / minutes.max(1.0)
}

/// Keyword-weighted cost estimate for a planned-task label
pub(crate) fn estimate_task_cost(label: &str) -> u64 {
    let lower = label.to_lowercase();
    let base: u64 = if lower.contains("implement") || lower.contains("feature") {
        8_000
    } else if lower.contains("refactor") {
        5_000
    } else if lower.contains("fix") || lower.contains("bug") {
        3_000
    } else if lower.contains("test") {
        2_000
    } else if lower.contains("doc") {
        1_500
    } else {
        4_000
    };

    // Longer labels read as larger tasks.
    (base as f64 * (1.0 + label.len() as f64 / 200.0)) as u64
}
