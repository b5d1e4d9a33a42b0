// Internal modules (not exposed to external crates)
pub(crate) mod vcs;

// Component modules (public surface of the coordination engine)
pub mod context;
pub mod docs;
pub mod observable;
pub mod project;
pub mod reality;
pub mod session;
pub mod tools;

mod ids;
mod testcmd;

pub use context::{ContextAnalytics, ContextMonitor, ContextPrediction, ContextStatus, OptimizationResult};
pub use docs::{DocStatus, DocumentationEngine, GeneratedDocument};
pub use ids::new_id;
pub use observable::{ObservableRegistry, Subscription, topics};
pub use project::{ProgressReport, ProjectTracker, VelocityAnalysis};
pub use reality::{FixOutcome, RealityChecker, RealityReport};
pub use session::{
    ActionSuggestion, CheckpointOutcome, CheckpointRequest, HandoffOutcome, HandoffRequest,
    SessionManager, StartSessionRequest,
};
pub use testcmd::{TestCommand, TestOutcome};
pub use tools::{FieldSpec, FieldType, SideEffect, ToolDef, ToolRegistry, ToolSchema};
pub use vcs::Vcs;

use std::sync::{Arc, Mutex};

use cadence_store::Database;

/// Shared handle to the single-writer store
pub type SharedDb = Arc<Mutex<Database>>;

/// Run a closure against the store, translating store errors into the
/// operation error taxonomy. Lock poisoning counts as a storage failure.
pub fn with_db<T>(
    db: &SharedDb,
    f: impl FnOnce(&mut Database) -> cadence_store::Result<T>,
) -> cadence_types::Result<T> {
    let mut guard = db
        .lock()
        .map_err(|_| cadence_types::Error::Storage("store lock poisoned".into()))?;
    f(&mut guard).map_err(Into::into)
}
