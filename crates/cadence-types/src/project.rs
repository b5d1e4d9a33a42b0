use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cross-session aggregates for one project. Created implicitly on the first
/// session for the name; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub sessions_completed: i64,
    pub total_lines_written: i64,
    /// Rolling average over sessions with a non-zero velocity score
    pub average_velocity: f64,
    /// actual_lines / estimated_lines, averaged over completed sessions
    pub completion_rate: f64,
    pub common_blockers: Vec<String>,
    pub tech_stack: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            sessions_completed: 0,
            total_lines_written: 0,
            average_velocity: 0.0,
            completion_rate: 0.0,
            common_blockers: Vec::new(),
            tech_stack: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// What is holding a session up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockerKind {
    Technical,
    Context,
    External,
    UnclearRequirement,
}

impl BlockerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockerKind::Technical => "technical",
            BlockerKind::Context => "context",
            BlockerKind::External => "external",
            BlockerKind::UnclearRequirement => "unclear_requirement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(BlockerKind::Technical),
            "context" => Some(BlockerKind::Context),
            "external" => Some(BlockerKind::External),
            "unclear_requirement" => Some(BlockerKind::UnclearRequirement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    pub id: String,
    pub session_id: String,
    /// Tag derived from the owning project, kept for cross-session grouping
    pub project: String,
    pub kind: BlockerKind,
    pub description: String,
    /// Impact score in [0, 10]
    pub impact: u8,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub time_to_resolve_minutes: Option<i64>,
}

/// Velocity direction over recent vs prior window, ±20% bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityTrend {
    Improving,
    Stable,
    Declining,
}

impl VelocityTrend {
    pub fn from_window_means(recent: f64, prior: f64) -> Self {
        if prior <= f64::EPSILON {
            return VelocityTrend::Stable;
        }
        let ratio = recent / prior;
        if ratio > 1.2 {
            VelocityTrend::Improving
        } else if ratio < 0.8 {
            VelocityTrend::Declining
        } else {
            VelocityTrend::Stable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trend_bands() {
        assert_eq!(
            VelocityTrend::from_window_means(130.0, 100.0),
            VelocityTrend::Improving
        );
        assert_eq!(
            VelocityTrend::from_window_means(100.0, 100.0),
            VelocityTrend::Stable
        );
        assert_eq!(
            VelocityTrend::from_window_means(70.0, 100.0),
            VelocityTrend::Declining
        );
        assert_eq!(
            VelocityTrend::from_window_means(50.0, 0.0),
            VelocityTrend::Stable
        );
    }
}
