use std::collections::BTreeMap;

use cadence_types::{
    Blocker, BlockerKind, Error, Project, Result, Session, SessionStatus, VelocityTrend,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::ids::new_id;
use crate::observable::{ObservableRegistry, topics};
use crate::{SharedDb, with_db};

/// Aggregates fold over this many most-recent sessions
const AGGREGATE_WINDOW: usize = 20;
const DEFAULT_VELOCITY_WINDOW_DAYS: i64 = 14;

#[derive(Debug, Clone, Serialize)]
pub struct VelocityAnalysis {
    pub project: String,
    /// Lines per elapsed day over the recent window
    pub current_velocity: f64,
    pub average_velocity: f64,
    pub trend: VelocityTrend,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionsSummary {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BlockersSummary {
    pub total: usize,
    pub by_type: BTreeMap<String, usize>,
    pub avg_time_to_resolve_minutes: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductivityMetrics {
    pub total_lines_written: i64,
    pub average_velocity: f64,
    pub completion_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportPredictions {
    pub estimated_completion_ts: Option<String>,
    pub recommended_actions: Vec<String>,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub project: String,
    pub generated_at: String,
    pub sessions_summary: SessionsSummary,
    pub velocity_analysis: VelocityAnalysis,
    pub blockers_summary: BlockersSummary,
    pub productivity_metrics: ProductivityMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predictions: Option<ReportPredictions>,
}

/// Cross-session aggregates, velocity windows, blockers, and reports.
pub struct ProjectTracker {
    db: SharedDb,
    observables: ObservableRegistry,
}

impl ProjectTracker {
    pub fn new(db: SharedDb, observables: ObservableRegistry) -> Self {
        Self { db, observables }
    }

    /// Upsert the project row and recompute aggregates from its recent
    /// sessions. The declared tech stack, when given, is merged in (it is
    /// not derivable from session rows). Publishes `project.status`.
    pub fn track(&self, project: &str, tech_stack: Option<&[String]>) -> Result<Project> {
        let now = Utc::now();
        with_db(&self.db, |db| db.ensure_project(project, &now))?;
        let mut folded = self.fold_aggregates(project)?;
        if let Some(stack) = tech_stack {
            for entry in stack {
                if !folded.tech_stack.contains(entry) {
                    folded.tech_stack.push(entry.clone());
                }
            }
        }
        with_db(&self.db, |db| db.update_project(&folded))?;

        self.observables.publish(
            topics::PROJECT_STATUS,
            serde_json::to_value(&folded).unwrap_or_default(),
        );
        Ok(folded)
    }

    /// Recompute aggregate fields from the last [`AGGREGATE_WINDOW`]
    /// sessions. The returned row is not yet persisted.
    pub fn fold_aggregates(&self, project: &str) -> Result<Project> {
        let existing = with_db(&self.db, |db| db.project(project))?
            .unwrap_or_else(|| Project::new(project, Utc::now()));
        let sessions = with_db(&self.db, |db| {
            db.list_sessions(Some(project), AGGREGATE_WINDOW)
        })?;
        let blockers = with_db(&self.db, |db| db.blockers_for_project(project))?;

        let completed: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Complete)
            .collect();

        let total_lines: i64 = completed.iter().map(|s| s.metrics.lines_written).sum();

        let velocities: Vec<f64> = completed
            .iter()
            .map(|s| s.metrics.velocity_score)
            .filter(|v| *v > 0.0)
            .collect();
        let average_velocity = if velocities.is_empty() {
            0.0
        } else {
            velocities.iter().sum::<f64>() / velocities.len() as f64
        };

        let completion_rates: Vec<f64> = completed
            .iter()
            .filter(|s| s.scope.lines > 0)
            .map(|s| s.metrics.lines_written as f64 / s.scope.lines as f64)
            .collect();
        let completion_rate = if completion_rates.is_empty() {
            0.0
        } else {
            completion_rates.iter().sum::<f64>() / completion_rates.len() as f64
        };

        let mut blocker_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for blocker in &blockers {
            *blocker_counts.entry(blocker.kind.as_str()).or_default() += 1;
        }
        let mut common_blockers: Vec<(String, usize)> = blocker_counts
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        common_blockers.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(Project {
            sessions_completed: completed.len() as i64,
            total_lines_written: total_lines,
            average_velocity,
            completion_rate,
            common_blockers: common_blockers.into_iter().map(|(k, _)| k).collect(),
            updated_at: Utc::now(),
            ..existing
        })
    }

    /// Lines per elapsed day across sessions in the window; trend compares
    /// the recent half against the prior half with ±20% bands.
    pub fn analyze_velocity(&self, project: &str, window_days: Option<i64>) -> Result<VelocityAnalysis> {
        let window = window_days.unwrap_or(DEFAULT_VELOCITY_WINDOW_DAYS);
        let now = Utc::now();
        let recent_cutoff = now - Duration::days(window);
        let prior_cutoff = now - Duration::days(window * 2);

        let sessions = with_db(&self.db, |db| {
            db.sessions_since(project, Some(&prior_cutoff), AGGREGATE_WINDOW * 2)
        })?;
        if sessions.is_empty() {
            return Ok(VelocityAnalysis {
                project: project.to_string(),
                current_velocity: 0.0,
                average_velocity: 0.0,
                trend: VelocityTrend::Stable,
                factors: vec!["no sessions in window".into()],
            });
        }

        let (recent, prior): (Vec<&Session>, Vec<&Session>) = sessions
            .iter()
            .partition(|s| s.start_time >= recent_cutoff);

        let current_velocity = lines_per_day(&recent);
        let prior_velocity = lines_per_day(&prior);
        let average_velocity = lines_per_day(&sessions.iter().collect::<Vec<_>>());
        let trend = VelocityTrend::from_window_means(current_velocity, prior_velocity);

        let mut factors = Vec::new();
        let blockers = with_db(&self.db, |db| db.blockers_for_project(project))?;
        let open_blockers = blockers.iter().filter(|b| b.resolved_at.is_none()).count();
        if open_blockers > 0 {
            factors.push(format!("{} open blockers", open_blockers));
        }
        if recent.is_empty() {
            factors.push("no sessions in the recent window".into());
        }
        if let Some(max_impact) = blockers
            .iter()
            .filter(|b| b.resolved_at.is_none())
            .map(|b| b.impact)
            .max()
            && max_impact >= 7
        {
            factors.push("high-impact blocker open".into());
        }

        let analysis = VelocityAnalysis {
            project: project.to_string(),
            current_velocity,
            average_velocity,
            trend,
            factors,
        };
        self.observables.publish(
            topics::PROJECT_VELOCITY,
            serde_json::to_value(&analysis).unwrap_or_default(),
        );
        Ok(analysis)
    }

    pub fn report_blocker(
        &self,
        session_id: &str,
        kind: BlockerKind,
        description: &str,
        impact: u8,
    ) -> Result<Blocker> {
        if impact > 10 {
            return Err(Error::invalid_parameters(
                vec!["impact".into()],
                "impact must be in [0, 10]",
            ));
        }
        let session = crate::context::require_session(&self.db, session_id)?;

        let blocker = Blocker {
            id: new_id("blk"),
            session_id: session.id.clone(),
            project: session.project.clone(),
            kind,
            description: description.to_string(),
            impact,
            created_at: Utc::now(),
            resolution: None,
            resolved_at: None,
            time_to_resolve_minutes: None,
        };
        with_db(&self.db, |db| db.insert_blocker(&blocker))?;
        info!(blocker = %blocker.id, kind = kind.as_str(), impact, "blocker reported");
        Ok(blocker)
    }

    pub fn resolve_blocker(&self, blocker_id: &str, resolution: &str) -> Result<Blocker> {
        let blocker = with_db(&self.db, |db| db.blocker(blocker_id))?
            .ok_or_else(|| Error::BlockerNotFound(blocker_id.to_string()))?;
        if blocker.resolved_at.is_some() {
            return Err(Error::InvalidState(format!(
                "blocker {} already resolved",
                blocker_id
            )));
        }

        let resolved_at = Utc::now();
        let minutes = (resolved_at - blocker.created_at).num_minutes().max(0);
        with_db(&self.db, |db| {
            db.resolve_blocker(blocker_id, resolution, &resolved_at, minutes)
        })?;

        Ok(Blocker {
            resolution: Some(resolution.to_string()),
            resolved_at: Some(resolved_at),
            time_to_resolve_minutes: Some(minutes),
            ..blocker
        })
    }

    pub fn generate_report(
        &self,
        project: &str,
        time_range_days: Option<i64>,
        include_predictions: bool,
    ) -> Result<ProgressReport> {
        let since = time_range_days.map(|days| Utc::now() - Duration::days(days));
        let sessions = match since.as_ref() {
            Some(cutoff) => with_db(&self.db, |db| {
                db.sessions_since(project, Some(cutoff), AGGREGATE_WINDOW * 4)
            })?,
            None => with_db(&self.db, |db| {
                db.list_sessions(Some(project), AGGREGATE_WINDOW * 4)
            })?,
        };

        let mut by_status: BTreeMap<String, usize> = BTreeMap::new();
        for session in &sessions {
            *by_status
                .entry(session.status.as_str().to_string())
                .or_default() += 1;
        }

        let blockers = with_db(&self.db, |db| db.blockers_for_project(project))?;
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for blocker in &blockers {
            *by_type.entry(blocker.kind.as_str().to_string()).or_default() += 1;
        }
        let resolve_times: Vec<i64> = blockers
            .iter()
            .filter_map(|b| b.time_to_resolve_minutes)
            .collect();
        let avg_time_to_resolve_minutes = if resolve_times.is_empty() {
            None
        } else {
            Some(resolve_times.iter().sum::<i64>() as f64 / resolve_times.len() as f64)
        };

        let velocity_analysis = self.analyze_velocity(project, time_range_days)?;
        let aggregates = self.fold_aggregates(project)?;

        let predictions = include_predictions.then(|| {
            self.predictions(project, &sessions, &velocity_analysis, &blockers)
        });

        Ok(ProgressReport {
            project: project.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            sessions_summary: SessionsSummary {
                total: sessions.len(),
                by_status,
            },
            velocity_analysis,
            blockers_summary: BlockersSummary {
                total: blockers.len(),
                by_type,
                avg_time_to_resolve_minutes,
            },
            productivity_metrics: ProductivityMetrics {
                total_lines_written: aggregates.total_lines_written,
                average_velocity: aggregates.average_velocity,
                completion_rate: aggregates.completion_rate,
            },
            predictions,
        })
    }

    fn predictions(
        &self,
        project: &str,
        sessions: &[Session],
        velocity: &VelocityAnalysis,
        blockers: &[Blocker],
    ) -> ReportPredictions {
        let active = sessions.iter().find(|s| s.status == SessionStatus::Active);

        let estimated_completion_ts = active.and_then(|session| {
            let remaining_lines = (session.scope.lines - session.metrics.lines_written).max(0);
            if velocity.current_velocity <= f64::EPSILON {
                return None;
            }
            let days = remaining_lines as f64 / velocity.current_velocity;
            Some((Utc::now() + Duration::seconds((days * 86_400.0) as i64)).to_rfc3339())
        });

        let mut recommended_actions = Vec::new();
        let mut risk_factors = Vec::new();

        if let Some(session) = active {
            if session.usage_percent() > 60.0 {
                recommended_actions.push("create a checkpoint before the next task".to_string());
            }
            if session.usage_percent() > 85.0 {
                risk_factors.push("context budget nearly exhausted".to_string());
            }
        }
        if velocity.trend == VelocityTrend::Declining {
            risk_factors.push("velocity declining against prior window".to_string());
            recommended_actions.push("review open blockers".to_string());
        }
        if blockers.iter().filter(|b| b.resolved_at.is_none()).count() > 0 {
            recommended_actions.push(format!("resolve open blockers for {}", project));
        }

        ReportPredictions {
            estimated_completion_ts,
            recommended_actions,
            risk_factors,
        }
    }
}

fn lines_per_day(sessions: &[&Session]) -> f64 {
    if sessions.is_empty() {
        return 0.0;
    }
    let lines: i64 = sessions.iter().map(|s| s.metrics.lines_written).sum();
    let earliest = sessions.iter().map(|s| s.start_time).min().unwrap();
    let latest = sessions
        .iter()
        .map(|s| s.end_time.unwrap_or_else(Utc::now))
        .max()
        .unwrap();
    let days = ((latest - earliest).num_seconds() as f64 / 86_400.0).max(1.0);
    lines as f64 / days
}
