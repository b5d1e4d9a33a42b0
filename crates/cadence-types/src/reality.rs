use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope of a reality check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Comprehensive,
    Quick,
    Specific,
}

impl CheckKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "comprehensive" => Some(CheckKind::Comprehensive),
            "quick" => Some(CheckKind::Quick),
            "specific" => Some(CheckKind::Specific),
            _ => None,
        }
    }
}

/// What kind of drift a discrepancy describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    FileMismatch,
    TestFailure,
    DocumentationGap,
    StateDrift,
}

/// Severity, ordered info < warning < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A single item found by a reality check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Stable within the owning snapshot; used to address fixes
    pub id: String,
    pub kind: DiscrepancyKind,
    pub severity: Severity,
    pub description: String,
    pub location: Option<String>,
    pub suggested_fix: Option<String>,
    pub auto_fixable: bool,
    /// UI foregrounding priority, higher first
    pub priority: i32,
}

/// Immutable result of one reality check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealitySnapshot {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub discrepancies: Vec<Discrepancy>,
    /// 100 - 20*critical - 10*warning - 5*info, clamped to [0, 100]
    pub confidence: u8,
}

impl RealitySnapshot {
    pub fn confidence_for(discrepancies: &[Discrepancy]) -> u8 {
        let mut score: i64 = 100;
        for d in discrepancies {
            score -= match d.severity {
                Severity::Critical => 20,
                Severity::Warning => 10,
                Severity::Info => 5,
            };
        }
        score.clamp(0, 100) as u8
    }
}

/// Outcome of comparing one reported metric against observed reality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricValidation {
    pub name: String,
    pub reported: f64,
    pub actual: f64,
    pub variance_percent: f64,
    pub status: ValidationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Accurate,
    MinorVariance,
    MajorVariance,
}

impl MetricValidation {
    /// Variance = abs(reported - actual) / max(actual, 1) * 100; bands at 5 and 20.
    pub fn compare(name: impl Into<String>, reported: f64, actual: f64) -> Self {
        let variance = (reported - actual).abs() / actual.max(1.0) * 100.0;
        let status = if variance <= 5.0 {
            ValidationStatus::Accurate
        } else if variance <= 20.0 {
            ValidationStatus::MinorVariance
        } else {
            ValidationStatus::MajorVariance
        };
        Self {
            name: name.into(),
            reported,
            actual,
            variance_percent: variance,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discrepancy(severity: Severity) -> Discrepancy {
        Discrepancy {
            id: "d-0".into(),
            kind: DiscrepancyKind::FileMismatch,
            severity,
            description: "missing".into(),
            location: None,
            suggested_fix: None,
            auto_fixable: false,
            priority: 0,
        }
    }

    #[test]
    fn confidence_deductions() {
        assert_eq!(RealitySnapshot::confidence_for(&[]), 100);
        assert_eq!(
            RealitySnapshot::confidence_for(&[discrepancy(Severity::Critical)]),
            80
        );
        assert_eq!(
            RealitySnapshot::confidence_for(&[
                discrepancy(Severity::Critical),
                discrepancy(Severity::Warning),
                discrepancy(Severity::Info),
            ]),
            65
        );
    }

    #[test]
    fn confidence_clamps_at_zero() {
        let many: Vec<_> = (0..10).map(|_| discrepancy(Severity::Critical)).collect();
        assert_eq!(RealitySnapshot::confidence_for(&many), 0);
    }

    #[test]
    fn metric_variance_bands() {
        assert_eq!(
            MetricValidation::compare("lines_written", 100.0, 100.0).status,
            ValidationStatus::Accurate
        );
        assert_eq!(
            MetricValidation::compare("lines_written", 110.0, 100.0).status,
            ValidationStatus::MinorVariance
        );
        assert_eq!(
            MetricValidation::compare("lines_written", 150.0, 100.0).status,
            ValidationStatus::MajorVariance
        );
    }

    #[test]
    fn metric_variance_guards_zero_actual() {
        let v = MetricValidation::compare("tests_written", 5.0, 0.0);
        assert_eq!(v.variance_percent, 500.0);
    }
}
