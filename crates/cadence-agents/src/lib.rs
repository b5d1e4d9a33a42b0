mod orchestrator;

pub mod agents;

pub use orchestrator::{AgentOrchestrator, AgentRunResult, AgentStatusEntry};

use async_trait::async_trait;
use cadence_types::{AgentContext, Result, Suggestion, SuggestionPriority, SymbolContextType};

/// Per-run input beyond the activation context. Extension point for agents
/// that act on caller-supplied material.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub symbol_proposal: Option<SymbolProposal>,
}

/// A proposed name for a concept, offered to the symbol contractor
#[derive(Debug, Clone)]
pub struct SymbolProposal {
    pub concept: String,
    pub proposed_name: String,
    pub context_type: SymbolContextType,
}

/// A bounded advisory procedure. Implementations must keep `execute` well
/// under the orchestrator's 200 ms wall clock; anything slower is skipped.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;

    fn priority(&self) -> SuggestionPriority;

    /// Share of the session's context pool this agent may consume.
    /// The orchestrator caps the roster total at 50.
    fn budget_percent(&self) -> u8;

    fn is_active(&self, ctx: &AgentContext) -> bool;

    async fn execute(&self, ctx: &AgentContext, input: &AgentInput) -> Result<Vec<Suggestion>>;
}
