use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Instant;

use anyhow::Context;
use cadence_agents::AgentOrchestrator;
use cadence_agents::agents::register_default_agents;
use cadence_core::{
    ContextMonitor, DocumentationEngine, ObservableRegistry, ProjectTracker, RealityChecker,
    SessionManager, SharedDb, ToolRegistry,
};
use cadence_store::Database;

use crate::config::Config;
use crate::register::register_tools;

/// Process-lifecycle services, injected into components at startup.
/// Cloning shares the same underlying services.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: SharedDb,
    pub observables: ObservableRegistry,
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<SessionManager>,
    pub monitor: Arc<ContextMonitor>,
    pub reality: Arc<RealityChecker>,
    pub docs: Arc<DocumentationEngine>,
    pub tracker: Arc<ProjectTracker>,
    pub orchestrator: Arc<AgentOrchestrator>,
    pub started_at: Instant,
    pub connected_clients: Arc<AtomicUsize>,
}

/// Open the store, wire every component, seed quick actions and the agent
/// roster, and populate the tool registry.
pub fn build_state(config: Config) -> anyhow::Result<AppState> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    let db: SharedDb = Arc::new(std::sync::Mutex::new(
        Database::open(&config.db_path).context("store unavailable")?,
    ));
    let observables = ObservableRegistry::new();

    let docs = Arc::new(DocumentationEngine::new(
        db.clone(),
        observables.clone(),
        config.data_dir.join("docs"),
    ));
    let sessions = Arc::new(SessionManager::new(
        db.clone(),
        observables.clone(),
        docs.clone(),
        config.workspace_root.clone(),
    ));
    let monitor = Arc::new(ContextMonitor::new(db.clone(), observables.clone()));
    let reality = Arc::new(RealityChecker::new(
        db.clone(),
        observables.clone(),
        config.workspace_root.clone(),
    ));
    let tracker = Arc::new(ProjectTracker::new(db.clone(), observables.clone()));
    let orchestrator = Arc::new(AgentOrchestrator::new(db.clone(), observables.clone()));

    sessions
        .seed_quick_actions()
        .map_err(|e| anyhow::anyhow!("seeding quick actions failed: {e}"))?;
    register_default_agents(&orchestrator, db.clone())
        .map_err(|e| anyhow::anyhow!("agent registration failed: {e}"))?;

    let state = AppState {
        config: Arc::new(config),
        db,
        observables,
        registry: Arc::new(ToolRegistry::new()),
        sessions,
        monitor,
        reality,
        docs,
        tracker,
        orchestrator,
        started_at: Instant::now(),
        connected_clients: Arc::new(AtomicUsize::new(0)),
    };

    register_tools(&state).map_err(|e| anyhow::anyhow!("tool registration failed: {e}"))?;
    Ok(state)
}
