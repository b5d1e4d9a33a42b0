use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use cadence_core::{ObservableRegistry, SharedDb, topics, with_db};
use cadence_types::{
    AgentContext, AgentDecision, AgentHealth, Error, Result, Suggestion, SuggestionPriority,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::{Agent, AgentInput};

/// Per-agent wall clock. Timeout or panic-free error skips the agent and
/// orchestration continues.
pub const AGENT_TIMEOUT: Duration = Duration::from_millis(200);

/// Roster-wide cap on summed context_budget_percent
const BUDGET_CAP: u8 = 50;

struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    health: Mutex<AgentHealth>,
    enabled: AtomicBool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentStatusEntry {
    pub name: String,
    pub priority: SuggestionPriority,
    pub budget_percent: u8,
    pub enabled: bool,
    pub health: AgentHealth,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRunResult {
    pub session_id: String,
    pub project: String,
    pub suggestions: Vec<Suggestion>,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Executes the roster strictly sequentially in non-increasing priority
/// order, one run at a time per session.
pub struct AgentOrchestrator {
    db: SharedDb,
    observables: ObservableRegistry,
    agents: RwLock<Vec<Arc<RegisteredAgent>>>,
    in_flight: Mutex<HashSet<String>>,
}

impl AgentOrchestrator {
    pub fn new(db: SharedDb, observables: ObservableRegistry) -> Self {
        Self {
            db,
            observables,
            agents: RwLock::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Register an agent, rejecting rosters whose summed budget share would
    /// pass the cap.
    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let mut agents = self
            .agents
            .write()
            .map_err(|_| Error::Storage("agent roster lock poisoned".into()))?;

        let current: u16 = agents
            .iter()
            .map(|r| r.agent.budget_percent() as u16)
            .sum();
        let requested = current + agent.budget_percent() as u16;
        if requested > BUDGET_CAP as u16 {
            return Err(Error::InvalidState(format!(
                "agent budget cap exceeded: {}% requested, {}% allowed",
                requested, BUDGET_CAP
            )));
        }
        if agents.iter().any(|r| r.agent.name() == agent.name()) {
            return Err(Error::Conflict(format!(
                "agent {} already registered",
                agent.name()
            )));
        }

        agents.push(Arc::new(RegisteredAgent {
            agent,
            health: Mutex::new(AgentHealth::default()),
            enabled: AtomicBool::new(true),
        }));

        // Keep the roster in execution order; stable sort preserves
        // registration order within a priority band.
        agents.sort_by(|a, b| b.agent.priority().cmp(&a.agent.priority()));
        Ok(())
    }

    pub fn status(&self) -> Vec<AgentStatusEntry> {
        let agents = match self.agents.read() {
            Ok(agents) => agents,
            Err(_) => return Vec::new(),
        };
        agents
            .iter()
            .map(|r| AgentStatusEntry {
                name: r.agent.name().to_string(),
                priority: r.agent.priority(),
                budget_percent: r.agent.budget_percent(),
                enabled: r.enabled.load(Ordering::Relaxed),
                health: r
                    .health
                    .lock()
                    .map(|h| h.clone())
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn toggle(&self, name: &str, enabled: bool) -> Result<bool> {
        let agents = self
            .agents
            .read()
            .map_err(|_| Error::Storage("agent roster lock poisoned".into()))?;
        let Some(entry) = agents.iter().find(|r| r.agent.name() == name) else {
            return Err(Error::invalid_parameters(
                vec!["agent_name".into()],
                format!("unknown agent: {}", name),
            ));
        };
        entry.enabled.store(enabled, Ordering::Relaxed);
        Ok(enabled)
    }

    /// One full pass over the roster for a session. A concurrent run for
    /// the same session is refused.
    pub async fn run(&self, session_id: &str, input: AgentInput) -> Result<AgentRunResult> {
        let session = with_db(&self.db, |db| db.session(session_id))?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        {
            let mut in_flight = self
                .in_flight
                .lock()
                .map_err(|_| Error::Storage("in-flight lock poisoned".into()))?;
            if !in_flight.insert(session_id.to_string()) {
                return Err(Error::InvalidState(format!(
                    "agent run already in progress for session {}",
                    session_id
                )));
            }
        }
        let _guard = InFlightGuard {
            in_flight: &self.in_flight,
            session_id: session_id.to_string(),
        };

        let ctx = AgentContext {
            session_id: session.id.clone(),
            project: session.project.clone(),
            current_phase: session.phase,
            context_usage_percent: session.usage_percent(),
            timestamp: Utc::now(),
        };

        let roster: Vec<Arc<RegisteredAgent>> = self
            .agents
            .read()
            .map_err(|_| Error::Storage("agent roster lock poisoned".into()))?
            .clone();

        let mut suggestions = Vec::new();
        let mut executed = Vec::new();
        let mut skipped = Vec::new();

        for entry in roster {
            let name = entry.agent.name();
            if !entry.enabled.load(Ordering::Relaxed) {
                skipped.push(name.to_string());
                continue;
            }
            if !entry.agent.is_active(&ctx) {
                skipped.push(name.to_string());
                continue;
            }

            let started = Instant::now();
            let outcome = tokio::time::timeout(AGENT_TIMEOUT, entry.agent.execute(&ctx, &input)).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let produced = match outcome {
                Ok(Ok(list)) => {
                    self.update_health(&entry, elapsed_ms, None, false);
                    executed.push(name.to_string());
                    list
                }
                Ok(Err(err)) => {
                    warn!(agent = name, error = %err, "agent failed; skipping");
                    self.update_health(&entry, elapsed_ms, Some(err.to_string()), false);
                    skipped.push(name.to_string());
                    continue;
                }
                Err(_) => {
                    warn!(agent = name, "agent timed out; skipping");
                    self.update_health(&entry, elapsed_ms, Some("timeout".into()), true);
                    skipped.push(name.to_string());
                    continue;
                }
            };

            debug!(agent = name, count = produced.len(), "agent produced suggestions");

            // Best-effort memory: FK is relaxed so this survives session
            // churn and must never fail the run.
            let decision = AgentDecision {
                agent_name: name.to_string(),
                action_type: "agent_run".into(),
                input_context: format!(
                    "phase={} usage={:.1}%",
                    ctx.current_phase.as_str(),
                    ctx.context_usage_percent
                ),
                decision_made: format!("{} suggestions", produced.len()),
                outcome: None,
                project: ctx.project.clone(),
                session_id: Some(ctx.session_id.clone()),
                timestamp: Utc::now(),
            };
            if let Err(err) = with_db(&self.db, |db| db.record_decision(&decision)) {
                warn!(agent = name, error = %err, "decision record dropped");
            }

            suggestions.extend(produced);
        }

        if !suggestions.is_empty() {
            self.observables.publish(
                topics::AGENT_SUGGESTIONS,
                json!({
                    "suggestions": suggestions,
                    "session_id": ctx.session_id,
                    "project_id": ctx.project,
                }),
            );
        }

        Ok(AgentRunResult {
            session_id: ctx.session_id,
            project: ctx.project,
            suggestions,
            executed,
            skipped,
        })
    }

    fn update_health(
        &self,
        entry: &RegisteredAgent,
        elapsed_ms: u64,
        error: Option<String>,
        timed_out: bool,
    ) {
        if let Ok(mut health) = entry.health.lock() {
            health.runs += 1;
            health.total_time_ms += elapsed_ms;
            if timed_out {
                health.timeouts += 1;
            }
            if let Some(message) = error {
                health.errors += 1;
                health.last_error = Some(message);
            }
        }
    }
}

struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    session_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(&self.session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cadence_store::Database;
    use cadence_types::{
        BudgetPlan, Checkpoint, ContinuationPlan, Session, SessionKind, SessionMetrics,
        SessionPhase, SessionScope, SessionStatus,
    };

    struct StubAgent {
        name: &'static str,
        priority: SuggestionPriority,
        budget: u8,
        delay: Duration,
    }

    #[async_trait]
    impl Agent for StubAgent {
        fn name(&self) -> &'static str {
            self.name
        }
        fn priority(&self) -> SuggestionPriority {
            self.priority
        }
        fn budget_percent(&self) -> u8 {
            self.budget
        }
        fn is_active(&self, _ctx: &AgentContext) -> bool {
            true
        }
        async fn execute(
            &self,
            _ctx: &AgentContext,
            _input: &AgentInput,
        ) -> Result<Vec<Suggestion>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Suggestion {
                agent_name: self.name.to_string(),
                kind: "stub".into(),
                priority: self.priority,
                title: "stub".into(),
                body: "stub".into(),
                suggested_tool_call: None,
                confidence: 0.5,
            }])
        }
    }

    fn orchestrator_with_session(usage_percent: f64) -> (AgentOrchestrator, String) {
        let mut db = Database::open_in_memory().unwrap();
        let scope = SessionScope {
            lines: 100,
            tests: 10,
            docs: 2,
        };
        let budget = BudgetPlan::derive(&scope).context_budget;
        let now = Utc::now();
        let session = Session {
            id: "s-agent".into(),
            project: "demo".into(),
            kind: SessionKind::Feature,
            start_time: now,
            estimated_end: None,
            end_time: None,
            phase: SessionPhase::Implementation,
            status: SessionStatus::Active,
            scope,
            context_budget: budget,
            context_used: (budget as f64 * usage_percent / 100.0) as u64,
            metrics: SessionMetrics::default(),
        };
        let cp0 = Checkpoint {
            id: "cp-0".into(),
            session_id: session.id.clone(),
            number: 0,
            timestamp: now,
            context_used: 0,
            commit_hash: None,
            completed_components: Vec::new(),
            metrics: SessionMetrics::default(),
            continuation: ContinuationPlan::default(),
        };
        db.create_session(&session, &cp0).unwrap();

        let orchestrator = AgentOrchestrator::new(
            Arc::new(Mutex::new(db)),
            ObservableRegistry::new(),
        );
        (orchestrator, "s-agent".into())
    }

    #[test]
    fn budget_cap_rejects_oversubscription() {
        let (orchestrator, _) = orchestrator_with_session(10.0);
        orchestrator
            .register(Arc::new(StubAgent {
                name: "a",
                priority: SuggestionPriority::High,
                budget: 30,
                delay: Duration::ZERO,
            }))
            .unwrap();
        orchestrator
            .register(Arc::new(StubAgent {
                name: "b",
                priority: SuggestionPriority::Medium,
                budget: 20,
                delay: Duration::ZERO,
            }))
            .unwrap();

        let err = orchestrator
            .register(Arc::new(StubAgent {
                name: "c",
                priority: SuggestionPriority::Low,
                budget: 1,
                delay: Duration::ZERO,
            }))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_state");
    }

    #[tokio::test]
    async fn agents_run_in_non_increasing_priority_order() {
        let (orchestrator, session_id) = orchestrator_with_session(10.0);
        orchestrator
            .register(Arc::new(StubAgent {
                name: "low",
                priority: SuggestionPriority::Low,
                budget: 5,
                delay: Duration::ZERO,
            }))
            .unwrap();
        orchestrator
            .register(Arc::new(StubAgent {
                name: "critical",
                priority: SuggestionPriority::Critical,
                budget: 5,
                delay: Duration::ZERO,
            }))
            .unwrap();
        orchestrator
            .register(Arc::new(StubAgent {
                name: "medium",
                priority: SuggestionPriority::Medium,
                budget: 5,
                delay: Duration::ZERO,
            }))
            .unwrap();

        let result = orchestrator.run(&session_id, AgentInput::default()).await.unwrap();
        assert_eq!(result.executed, vec!["critical", "medium", "low"]);
    }

    #[tokio::test]
    async fn slow_agent_is_skipped_and_health_updated() {
        let (orchestrator, session_id) = orchestrator_with_session(10.0);
        orchestrator
            .register(Arc::new(StubAgent {
                name: "sloth",
                priority: SuggestionPriority::High,
                budget: 5,
                delay: Duration::from_millis(500),
            }))
            .unwrap();
        orchestrator
            .register(Arc::new(StubAgent {
                name: "snappy",
                priority: SuggestionPriority::Low,
                budget: 5,
                delay: Duration::ZERO,
            }))
            .unwrap();

        let result = orchestrator.run(&session_id, AgentInput::default()).await.unwrap();
        assert_eq!(result.executed, vec!["snappy"]);
        assert_eq!(result.skipped, vec!["sloth"]);

        let status = orchestrator.status();
        let sloth = status.iter().find(|s| s.name == "sloth").unwrap();
        assert_eq!(sloth.health.timeouts, 1);
        assert_eq!(sloth.health.errors, 1);
    }

    #[tokio::test]
    async fn disabled_agents_are_skipped() {
        let (orchestrator, session_id) = orchestrator_with_session(10.0);
        orchestrator
            .register(Arc::new(StubAgent {
                name: "muted",
                priority: SuggestionPriority::High,
                budget: 5,
                delay: Duration::ZERO,
            }))
            .unwrap();
        orchestrator.toggle("muted", false).unwrap();

        let result = orchestrator.run(&session_id, AgentInput::default()).await.unwrap();
        assert!(result.executed.is_empty());
        assert_eq!(result.skipped, vec!["muted"]);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (orchestrator, _) = orchestrator_with_session(10.0);
        let err = orchestrator
            .run("sess-none", AgentInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "session_not_found");
    }

    #[tokio::test]
    async fn toggle_unknown_agent_is_invalid_parameters() {
        let (orchestrator, _) = orchestrator_with_session(10.0);
        let err = orchestrator.toggle("ghost", true).unwrap_err();
        assert_eq!(err.code(), "invalid_parameters");
    }
}
