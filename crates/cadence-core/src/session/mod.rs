mod actions;

pub use actions::{ActionSuggestion, ResolvedStep, merge_params};

use std::collections::HashMap;
use std::sync::Arc;

use cadence_types::{
    BudgetPlan, Checkpoint, ContextSample, ContinuationPlan, DocumentKind, Error, QuickAction,
    Result, Session, SessionKind, SessionMetrics, SessionPhase, SessionScope, SessionStatus,
};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::context::compute_status;
use crate::docs::DocumentationEngine;
use crate::ids::new_id;
use crate::observable::{ObservableRegistry, topics};
use crate::vcs::Vcs;
use crate::{SharedDb, with_db};

#[derive(Debug, Clone)]
pub struct StartSessionRequest {
    pub project: String,
    pub kind: SessionKind,
    pub scope: SessionScope,
    pub budget_override: Option<u64>,
    pub estimated_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    pub session_id: String,
    pub completed_components: Vec<String>,
    pub lines_written: i64,
    pub tests_passing: i64,
    /// Absolute usage claimed at this checkpoint, as a percentage of budget
    pub context_used_percent: f64,
    pub commit_message: Option<String>,
    pub force: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckpointOutcome {
    pub checkpoint_id: String,
    pub checkpoint_number: u32,
    pub commit_hash: Option<String>,
    pub snapshot: Checkpoint,
    pub continuation_plan: ContinuationPlan,
}

#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub session_id: String,
    pub next_goals: Vec<String>,
    pub include_context_dump: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextSessionEstimate {
    pub estimated_lines: i64,
    pub estimated_budget: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandoffOutcome {
    pub handoff_document: String,
    pub context_requirements: Vec<String>,
    pub prerequisite_checks: Vec<String>,
    pub next_session_estimate: NextSessionEstimate,
}

/// Session lifecycle, budget planning, checkpoint/handoff, and quick
/// actions. Writes go through the store in single transactions; observables
/// are published strictly after commit.
pub struct SessionManager {
    db: SharedDb,
    observables: ObservableRegistry,
    docs: Arc<DocumentationEngine>,
    workspace_root: std::path::PathBuf,
}

impl SessionManager {
    pub fn new(
        db: SharedDb,
        observables: ObservableRegistry,
        docs: Arc<DocumentationEngine>,
        workspace_root: impl Into<std::path::PathBuf>,
    ) -> Self {
        Self {
            db,
            observables,
            docs,
            workspace_root: workspace_root.into(),
        }
    }

    /// Derive the budget plan, insert session + checkpoint 0 + project row
    /// in one transaction, then publish session and context status.
    pub fn start(&self, request: StartSessionRequest) -> Result<Session> {
        let mut bad_fields = Vec::new();
        if request.scope.lines < 0 {
            bad_fields.push("scope.lines".to_string());
        }
        if request.scope.tests < 0 {
            bad_fields.push("scope.tests".to_string());
        }
        if request.scope.docs < 0 {
            bad_fields.push("scope.docs".to_string());
        }
        if !bad_fields.is_empty() {
            return Err(Error::invalid_parameters(
                bad_fields,
                "scope fields must be non-negative",
            ));
        }

        let plan = match request.budget_override {
            Some(budget) => BudgetPlan::with_budget(budget),
            None => BudgetPlan::derive(&request.scope),
        };

        let now = Utc::now();
        let session = Session {
            id: new_id("sess"),
            project: request.project.clone(),
            kind: request.kind,
            start_time: now,
            estimated_end: request
                .estimated_hours
                .map(|h| now + Duration::seconds((h * 3600.0) as i64)),
            end_time: None,
            phase: SessionPhase::Planning,
            status: SessionStatus::Active,
            scope: request.scope,
            context_budget: plan.context_budget,
            context_used: 0,
            metrics: SessionMetrics::default(),
        };

        // Checkpoint 0 is synthesized at start; it never attempts a commit.
        let checkpoint_zero = Checkpoint {
            id: new_id("cp"),
            session_id: session.id.clone(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: Vec::new(),
            metrics: SessionMetrics::default(),
            continuation: ContinuationPlan {
                summary: format!("session started for {}", session.project),
                next_steps: vec!["plan the work".into()],
                open_risks: Vec::new(),
            },
        };

        with_db(&self.db, |db| {
            db.create_session(&session, &checkpoint_zero)
        })?;

        info!(
            session = %session.id,
            project = %session.project,
            budget = session.context_budget,
            "session started"
        );
        self.publish_session_status(Some(&session));
        self.publish_context_status(&session.id)?;

        Ok(session)
    }

    /// Absolute-usage checkpoint: records the delta against the prior total
    /// as a ContextSample tagged with the recomputed phase.
    pub async fn checkpoint(&self, request: CheckpointRequest) -> Result<CheckpointOutcome> {
        let session = self.require_active(&request.session_id)?;

        if request.context_used_percent < 0.0 {
            return Err(Error::invalid_parameters(
                vec!["context_used_percent".into()],
                "usage percent cannot be negative",
            ));
        }

        let number = with_db(&self.db, |db| db.next_checkpoint_number(&session.id))?;
        // context_used is monotonic while active: a claim below the running
        // total records no delta and the total stands.
        let claimed =
            (session.context_budget as f64 * request.context_used_percent / 100.0).floor() as u64;
        let absolute_used = claimed.max(session.context_used);
        let phase = SessionPhase::from_usage_percent(request.context_used_percent);
        let now = Utc::now();

        let delta = absolute_used.saturating_sub(session.context_used);
        let delta_sample = (delta > 0).then(|| ContextSample {
            session_id: session.id.clone(),
            timestamp: now,
            phase,
            tokens: delta,
            label: format!("checkpoint {}", number),
        });

        // Optional VCS commit. Failure aborts unless forced, in which case
        // the checkpoint is still written without a hash.
        let commit_hash = match &request.commit_message {
            Some(message) => {
                let vcs = Vcs::new(&self.workspace_root);
                match vcs.commit_all(message).await {
                    Ok(hash) => Some(hash),
                    Err(err) if request.force => {
                        warn!(error = %err, "checkpoint commit failed; forced through");
                        None
                    }
                    Err(err) => return Err(err),
                }
            }
            None => None,
        };

        let elapsed_days =
            ((now - session.start_time).num_seconds() as f64 / 86_400.0).max(1.0 / 24.0);
        let metrics = SessionMetrics {
            lines_written: request.lines_written,
            tests_passing: request.tests_passing,
            velocity_score: request.lines_written as f64 / elapsed_days,
            ..session.metrics.clone()
        };

        let continuation = continuation_plan(&session, &request, phase, number);
        let checkpoint = Checkpoint {
            id: new_id("cp"),
            session_id: session.id.clone(),
            number,
            timestamp: now,
            context_used: absolute_used,
            commit_hash: commit_hash.clone(),
            completed_components: request.completed_components.clone(),
            metrics: metrics.clone(),
            continuation: continuation.clone(),
        };

        with_db(&self.db, |db| {
            db.record_checkpoint(&checkpoint, delta_sample.as_ref(), phase, &metrics)
        })?;

        info!(
            session = %session.id,
            checkpoint = number,
            context_used = absolute_used,
            "checkpoint recorded"
        );

        let refreshed = self.status(&session.id)?;
        self.publish_session_status(Some(&refreshed));
        self.publish_context_status(&session.id)?;

        Ok(CheckpointOutcome {
            checkpoint_id: checkpoint.id.clone(),
            checkpoint_number: number,
            commit_hash,
            snapshot: checkpoint,
            continuation_plan: continuation,
        })
    }

    /// Final checkpoint + handoff document + terminal status, then the
    /// active-session observable is cleared.
    pub async fn handoff(&self, request: HandoffRequest) -> Result<HandoffOutcome> {
        let session = self.require_active(&request.session_id)?;

        let final_checkpoint = self
            .checkpoint(CheckpointRequest {
                session_id: session.id.clone(),
                completed_components: vec!["session handoff".into()],
                lines_written: session.metrics.lines_written,
                tests_passing: session.metrics.tests_passing,
                context_used_percent: session.usage_percent(),
                commit_message: None,
                force: true,
            })
            .await?;

        let mut extra = HashMap::new();
        extra.insert(
            "completed".to_string(),
            bullet_list(&final_checkpoint.snapshot.completed_components),
        );
        extra.insert("next_goals".to_string(), bullet_list(&request.next_goals));
        extra.insert(
            "context_requirements".to_string(),
            bullet_list(&context_requirements(&session)),
        );
        if request.include_context_dump {
            let samples = with_db(&self.db, |db| db.samples(&session.id))?;
            let dump: Vec<String> = samples
                .iter()
                .rev()
                .take(20)
                .map(|s| format!("{}: {} tokens ({})", s.phase.as_str(), s.tokens, s.label))
                .collect();
            extra.insert("notes".to_string(), bullet_list(&dump));
        }

        let document = self
            .docs
            .generate(&session.id, DocumentKind::Handoff, None, extra)?;

        let now = Utc::now();
        with_db(&self.db, |db| {
            db.set_session_status(&session.id, SessionStatus::Handoff, Some(&now))
        })?;
        info!(session = %session.id, document = %document.path, "session handed off");

        let still_active = with_db(&self.db, |db| db.latest_active_session(None))?;
        self.publish_session_status(still_active.as_ref());

        let remaining_lines = (session.scope.lines - session.metrics.lines_written).max(0);
        let next_scope = SessionScope {
            lines: remaining_lines,
            tests: (session.scope.tests - session.metrics.tests_written).max(0),
            docs: (session.scope.docs - session.metrics.docs_updated).max(0),
        };

        Ok(HandoffOutcome {
            handoff_document: document.path,
            context_requirements: context_requirements(&session),
            prerequisite_checks: vec![
                "read the handoff document".into(),
                "run a quick reality check".into(),
                "confirm the test suite passes".into(),
            ],
            next_session_estimate: NextSessionEstimate {
                estimated_lines: remaining_lines,
                estimated_budget: BudgetPlan::derive(&next_scope).context_budget,
            },
        })
    }

    /// Terminal completion: freeze metrics and fold project aggregates in
    /// the same transaction that flips the status.
    pub fn complete(&self, session_id: &str) -> Result<Session> {
        let session = self.require_active(session_id)?;
        let now = Utc::now();

        // Aggregates are folded over the session list with this session
        // already counted as complete, so the transaction writes a
        // consistent pair.
        let mut sessions = with_db(&self.db, |db| db.list_sessions(Some(&session.project), 20))?;
        for s in &mut sessions {
            if s.id == session.id {
                s.status = SessionStatus::Complete;
                s.end_time = Some(now);
            }
        }

        let mut project = with_db(&self.db, |db| db.project(&session.project))?
            .unwrap_or_else(|| cadence_types::Project::new(&session.project, now));

        let completed: Vec<&Session> = sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Complete)
            .collect();
        project.sessions_completed = completed.len() as i64;
        project.total_lines_written = completed.iter().map(|s| s.metrics.lines_written).sum();
        let velocities: Vec<f64> = completed
            .iter()
            .map(|s| s.metrics.velocity_score)
            .filter(|v| *v > 0.0)
            .collect();
        project.average_velocity = if velocities.is_empty() {
            0.0
        } else {
            velocities.iter().sum::<f64>() / velocities.len() as f64
        };
        let rates: Vec<f64> = completed
            .iter()
            .filter(|s| s.scope.lines > 0)
            .map(|s| s.metrics.lines_written as f64 / s.scope.lines as f64)
            .collect();
        project.completion_rate = if rates.is_empty() {
            0.0
        } else {
            rates.iter().sum::<f64>() / rates.len() as f64
        };
        project.updated_at = now;

        with_db(&self.db, |db| {
            db.finish_session(session_id, SessionStatus::Complete, &now, &project)
        })?;
        info!(session = session_id, project = %session.project, "session complete");

        let still_active = with_db(&self.db, |db| db.latest_active_session(None))?;
        self.publish_session_status(still_active.as_ref());
        self.observables.publish(
            topics::PROJECT_STATUS,
            serde_json::to_value(&project).unwrap_or_default(),
        );

        self.status(session_id)
    }

    pub fn status(&self, session_id: &str) -> Result<Session> {
        with_db(&self.db, |db| db.session(session_id))?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    pub fn history(&self, project: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        with_db(&self.db, |db| db.list_sessions(project, limit))
    }

    pub fn active_session(&self, project: Option<&str>) -> Result<Option<Session>> {
        with_db(&self.db, |db| db.latest_active_session(project))
    }

    pub fn checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        self.status(session_id)?;
        with_db(&self.db, |db| db.checkpoints(session_id))
    }

    // --- quick actions ---

    /// Install the default quick actions. Existing rows win (id conflict is
    /// a no-op), so user edits survive restarts.
    pub fn seed_quick_actions(&self) -> Result<()> {
        for action in actions::default_actions() {
            with_db(&self.db, |db| db.insert_quick_action(&action))?;
        }
        Ok(())
    }

    pub fn quick_actions(&self) -> Result<Vec<QuickAction>> {
        with_db(&self.db, |db| db.list_quick_actions())
    }

    pub fn create_quick_action(&self, action: QuickAction) -> Result<QuickAction> {
        if action.steps.is_empty() {
            return Err(Error::invalid_parameters(
                vec!["steps".into()],
                "an action needs at least one tool step",
            ));
        }
        with_db(&self.db, |db| db.insert_quick_action(&action))?;
        Ok(action)
    }

    /// Resolve an action's steps against call params and the invoking
    /// session, recording the use. Execution belongs to the dispatcher.
    pub fn prepare_quick_action(
        &self,
        action_id: &str,
        call_params: Option<&serde_json::Value>,
        session_id: Option<&str>,
    ) -> Result<(QuickAction, Vec<ResolvedStep>)> {
        let action = with_db(&self.db, |db| db.quick_action(action_id))?
            .ok_or_else(|| Error::InvalidState(format!("unknown quick action: {}", action_id)))?;

        let session_id = match session_id {
            Some(explicit) => Some(explicit.to_string()),
            None => self.active_session(None)?.map(|s| s.id),
        };

        let steps = action
            .steps
            .iter()
            .map(|step| ResolvedStep {
                tool: step.tool.clone(),
                params: merge_params(&step.params, call_params, session_id.as_deref()),
            })
            .collect();

        let now = Utc::now();
        with_db(&self.db, |db| db.record_action_use(action_id, &now))?;

        Ok((action, steps))
    }

    /// Heuristic ranking of quick actions for the current session state.
    pub fn suggest_actions(&self, session_id: &str, limit: usize) -> Result<Vec<ActionSuggestion>> {
        let session = self.status(session_id)?;
        let available = self.quick_actions()?;
        Ok(actions::suggest(&session, &available, limit))
    }

    // --- internals ---

    fn require_active(&self, session_id: &str) -> Result<Session> {
        let session = self.status(session_id)?;
        if session.status != SessionStatus::Active {
            return Err(Error::InvalidState(format!(
                "session {} is {}, not active",
                session_id,
                session.status.as_str()
            )));
        }
        Ok(session)
    }

    fn publish_session_status(&self, active: Option<&Session>) {
        self.observables.publish(
            topics::SESSION_STATUS,
            json!({ "active_session": active }),
        );
    }

    fn publish_context_status(&self, session_id: &str) -> Result<()> {
        let session = self.status(session_id)?;
        let samples = with_db(&self.db, |db| db.samples(session_id))?;
        let status = compute_status(&session, &samples);
        self.observables.publish(
            topics::CONTEXT_STATUS,
            serde_json::to_value(&status).unwrap_or_default(),
        );
        Ok(())
    }
}

fn continuation_plan(
    session: &Session,
    request: &CheckpointRequest,
    phase: SessionPhase,
    number: u32,
) -> ContinuationPlan {
    let mut next_steps = Vec::new();
    match phase {
        SessionPhase::Planning => next_steps.push("begin implementation".to_string()),
        SessionPhase::Implementation => {
            next_steps.push("continue implementation".to_string());
            next_steps.push("start writing tests".to_string());
        }
        SessionPhase::Testing => next_steps.push("drive the test suite green".to_string()),
        SessionPhase::Documentation => next_steps.push("finish docs and hand off".to_string()),
    }
    next_steps.push(format!("resume from checkpoint {}", number));

    let mut open_risks = Vec::new();
    if request.context_used_percent >= 85.0 {
        open_risks.push("context budget nearly exhausted".to_string());
    }
    if request.lines_written > session.scope.lines {
        open_risks.push("scope exceeded the original estimate".to_string());
    }

    ContinuationPlan {
        summary: format!(
            "{} components done at {:.0}% context usage",
            request.completed_components.len(),
            request.context_used_percent
        ),
        next_steps,
        open_risks,
    }
}

fn context_requirements(session: &Session) -> Vec<String> {
    vec![
        format!("project: {}", session.project),
        format!(
            "prior session used {} of {} tokens",
            session.context_used, session.context_budget
        ),
        "load the latest checkpoint's continuation plan".to_string(),
    ]
}

fn bullet_list(items: &[String]) -> String {
    if items.is_empty() {
        return "- none".to_string();
    }
    items
        .iter()
        .map(|i| format!("- {}", i))
        .collect::<Vec<_>>()
        .join("\n")
}
