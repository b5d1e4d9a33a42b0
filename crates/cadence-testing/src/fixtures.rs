use cadence_types::{
    BudgetPlan, Checkpoint, ContextSample, ContinuationPlan, Session, SessionKind, SessionMetrics,
    SessionPhase, SessionScope, SessionStatus,
};
use chrono::{DateTime, Duration, Utc};

/// The canonical test scope: budget derives to 23880 tokens
/// (ceil of 1.2 x (1000*10 + 500*15 + 200*12)).
pub fn reference_scope() -> SessionScope {
    SessionScope {
        lines: 1000,
        tests: 500,
        docs: 200,
    }
}

pub fn session(id: &str, project: &str) -> Session {
    session_at(id, project, Utc::now())
}

pub fn session_at(id: &str, project: &str, start_time: DateTime<Utc>) -> Session {
    let scope = reference_scope();
    Session {
        id: id.to_string(),
        project: project.to_string(),
        kind: SessionKind::Feature,
        start_time,
        estimated_end: None,
        end_time: None,
        phase: SessionPhase::Planning,
        status: SessionStatus::Active,
        scope,
        context_budget: BudgetPlan::derive(&scope).context_budget,
        context_used: 0,
        metrics: SessionMetrics::default(),
    }
}

pub fn checkpoint_zero(session: &Session) -> Checkpoint {
    Checkpoint {
        id: format!("{}-cp0", session.id),
        session_id: session.id.clone(),
        number: 0,
        timestamp: session.start_time,
        context_used: 0,
        commit_hash: None,
        completed_components: Vec::new(),
        metrics: SessionMetrics::default(),
        continuation: ContinuationPlan::default(),
    }
}

pub fn sample(session_id: &str, tokens: u64, minutes_ago: i64) -> ContextSample {
    ContextSample {
        session_id: session_id.to_string(),
        timestamp: Utc::now() - Duration::minutes(minutes_ago),
        phase: SessionPhase::Implementation,
        tokens,
        label: "fixture".to_string(),
    }
}
