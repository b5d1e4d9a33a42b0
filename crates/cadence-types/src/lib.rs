mod action;
mod agent;
mod docs;
mod error;
mod project;
mod reality;
mod session;

pub use action::{ActionStep, QuickAction};
pub use agent::{
    AgentContext, AgentDecision, AgentHealth, Suggestion, SuggestionPriority, SuggestedToolCall,
    Symbol, SymbolContextType,
};
pub use docs::{DocumentKind, DocumentMeta, DocumentUpdateMode};
pub use error::{Error, Result};
pub use project::{Blocker, BlockerKind, Project, VelocityTrend};
pub use reality::{
    CheckKind, Discrepancy, DiscrepancyKind, MetricValidation, RealitySnapshot, Severity,
    ValidationStatus,
};
pub use session::{
    BudgetPlan, Checkpoint, ContextSample, ContextTrend, ContinuationPlan, PhaseAllocations,
    Session, SessionKind, SessionMetrics, SessionPhase, SessionScope, SessionStatus,
};
