mod context_guardian;
mod session_orchestrator;
mod symbol_contractor;

pub use context_guardian::ContextGuardian;
pub use session_orchestrator::SessionOrchestrator;
pub use symbol_contractor::SymbolContractor;

use std::sync::Arc;

use cadence_core::SharedDb;
use cadence_types::Result;

use crate::AgentOrchestrator;

/// Install the reference roster. The roster is an extension point; this
/// set stays comfortably inside the 50% budget cap.
pub fn register_default_agents(orchestrator: &AgentOrchestrator, db: SharedDb) -> Result<()> {
    orchestrator.register(Arc::new(SymbolContractor::new(db.clone())))?;
    orchestrator.register(Arc::new(SessionOrchestrator::new()))?;
    orchestrator.register(Arc::new(ContextGuardian::new(db)))?;
    Ok(())
}
