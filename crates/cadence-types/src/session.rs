use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of development session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Feature,
    Bugfix,
    Refactor,
    Documentation,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Feature => "feature",
            SessionKind::Bugfix => "bugfix",
            SessionKind::Refactor => "refactor",
            SessionKind::Documentation => "documentation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "feature" => Some(SessionKind::Feature),
            "bugfix" => Some(SessionKind::Bugfix),
            "refactor" => Some(SessionKind::Refactor),
            "documentation" => Some(SessionKind::Documentation),
            _ => None,
        }
    }
}

/// Phase within a session, derived from context usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Planning,
    Implementation,
    Testing,
    Documentation,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Planning => "planning",
            SessionPhase::Implementation => "implementation",
            SessionPhase::Testing => "testing",
            SessionPhase::Documentation => "documentation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(SessionPhase::Planning),
            "implementation" => Some(SessionPhase::Implementation),
            "testing" => Some(SessionPhase::Testing),
            "documentation" => Some(SessionPhase::Documentation),
            _ => None,
        }
    }

    /// Phase bands over context usage: <10 planning, <60 implementation,
    /// <85 testing, else documentation.
    pub fn from_usage_percent(pct: f64) -> Self {
        if pct < 10.0 {
            SessionPhase::Planning
        } else if pct < 60.0 {
            SessionPhase::Implementation
        } else if pct < 85.0 {
            SessionPhase::Testing
        } else {
            SessionPhase::Documentation
        }
    }
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Checkpoint,
    Handoff,
    Complete,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Checkpoint => "checkpoint",
            SessionStatus::Handoff => "handoff",
            SessionStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "checkpoint" => Some(SessionStatus::Checkpoint),
            "handoff" => Some(SessionStatus::Handoff),
            "complete" => Some(SessionStatus::Complete),
            _ => None,
        }
    }

    /// Terminal statuses freeze metrics
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Handoff | SessionStatus::Complete)
    }
}

/// Estimated scope declared at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionScope {
    pub lines: i64,
    pub tests: i64,
    pub docs: i64,
}

/// Rolling metrics tracked while a session is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionMetrics {
    pub lines_written: i64,
    pub tests_written: i64,
    pub tests_passing: i64,
    pub docs_updated: i64,
    pub velocity_score: f64,
}

/// Per-phase context-token allocation, split 10/50/25/15
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAllocations {
    pub planning: u64,
    pub implementation: u64,
    pub testing: u64,
    pub documentation: u64,
}

impl PhaseAllocations {
    pub fn split(budget: u64) -> Self {
        Self {
            planning: budget * 10 / 100,
            implementation: budget * 50 / 100,
            testing: budget * 25 / 100,
            documentation: budget * 15 / 100,
        }
    }

    pub fn for_phase(&self, phase: SessionPhase) -> u64 {
        match phase {
            SessionPhase::Planning => self.planning,
            SessionPhase::Implementation => self.implementation,
            SessionPhase::Testing => self.testing,
            SessionPhase::Documentation => self.documentation,
        }
    }
}

/// Budget plan derived at session start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetPlan {
    pub context_budget: u64,
    pub allocations: PhaseAllocations,
    /// Usage percentages at which a checkpoint is suggested
    pub checkpoint_triggers: Vec<u8>,
}

impl BudgetPlan {
    pub const CHECKPOINT_TRIGGERS: [u8; 4] = [35, 60, 70, 85];

    /// Budget = ceil(1.2 * (lines*10 + tests*15 + docs*12))
    pub fn derive(scope: &SessionScope) -> Self {
        let raw = scope.lines * 10 + scope.tests * 15 + scope.docs * 12;
        let budget = (raw as f64 * 1.2).ceil() as u64;
        Self::with_budget(budget)
    }

    pub fn with_budget(budget: u64) -> Self {
        Self {
            context_budget: budget,
            allocations: PhaseAllocations::split(budget),
            checkpoint_triggers: Self::CHECKPOINT_TRIGGERS.to_vec(),
        }
    }
}

/// A bounded development task with a token budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub project: String,
    pub kind: SessionKind,
    pub start_time: DateTime<Utc>,
    pub estimated_end: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub phase: SessionPhase,
    pub status: SessionStatus,
    pub scope: SessionScope,
    pub context_budget: u64,
    /// Overflow past the budget is allowed and reported, never clamped
    pub context_used: u64,
    pub metrics: SessionMetrics,
}

impl Session {
    pub fn usage_percent(&self) -> f64 {
        if self.context_budget == 0 {
            return 0.0;
        }
        self.context_used as f64 / self.context_budget as f64 * 100.0
    }
}

/// Durable point-in-time snapshot of session progress. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    /// Contiguous per session, starting at 0 (synthesized at session start)
    pub number: u32,
    pub timestamp: DateTime<Utc>,
    pub context_used: u64,
    pub commit_hash: Option<String>,
    pub completed_components: Vec<String>,
    pub metrics: SessionMetrics,
    pub continuation: ContinuationPlan,
}

/// What the next stretch of work (or the next session) should pick up
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContinuationPlan {
    pub summary: String,
    pub next_steps: Vec<String>,
    pub open_risks: Vec<String>,
}

/// Append-only token usage record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSample {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: SessionPhase,
    pub tokens: u64,
    pub label: String,
}

/// Usage trend over recent samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTrend {
    Stable,
    Rising,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_formula_derives_from_scope() {
        let scope = SessionScope {
            lines: 1000,
            tests: 500,
            docs: 200,
        };
        let plan = BudgetPlan::derive(&scope);
        assert_eq!(plan.context_budget, 23880);
        assert_eq!(plan.allocations.planning, 2388);
        assert_eq!(plan.allocations.implementation, 11940);
        assert_eq!(plan.allocations.testing, 5970);
        assert_eq!(plan.allocations.documentation, 3582);
        assert_eq!(plan.checkpoint_triggers, vec![35, 60, 70, 85]);
    }

    #[test]
    fn phase_bands() {
        assert_eq!(SessionPhase::from_usage_percent(0.0), SessionPhase::Planning);
        assert_eq!(
            SessionPhase::from_usage_percent(35.0),
            SessionPhase::Implementation
        );
        assert_eq!(SessionPhase::from_usage_percent(60.0), SessionPhase::Testing);
        assert_eq!(
            SessionPhase::from_usage_percent(85.0),
            SessionPhase::Documentation
        );
    }

    #[test]
    fn usage_percent_reports_overflow() {
        let session = Session {
            id: "s1".into(),
            project: "demo".into(),
            kind: SessionKind::Feature,
            start_time: Utc::now(),
            estimated_end: None,
            end_time: None,
            phase: SessionPhase::Planning,
            status: SessionStatus::Active,
            scope: SessionScope::default(),
            context_budget: 1000,
            context_used: 1200,
            metrics: SessionMetrics::default(),
        };
        assert!(session.usage_percent() > 100.0);
    }
}
