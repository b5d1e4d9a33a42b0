use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::SessionPhase;

/// Suggestion priority, ordered critical > high > medium > low
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl SuggestionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionPriority::Critical => "critical",
            SuggestionPriority::High => "high",
            SuggestionPriority::Medium => "medium",
            SuggestionPriority::Low => "low",
        }
    }
}

/// A concrete tool invocation a suggestion can be bound to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedToolCall {
    pub name: String,
    pub params: serde_json::Value,
}

/// A prioritized, optionally actionable recommendation emitted by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub agent_name: String,
    pub kind: String,
    pub priority: SuggestionPriority,
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_tool_call: Option<SuggestedToolCall>,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

/// Snapshot of observable session state handed to each agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub session_id: String,
    pub project: String,
    pub current_phase: SessionPhase,
    pub context_usage_percent: f64,
    pub timestamp: DateTime<Utc>,
}

/// Append-only record of an agent run; weak long-term memory.
/// Survives session deletion (no FK to sessions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDecision {
    pub agent_name: String,
    pub action_type: String,
    pub input_context: String,
    pub decision_made: String,
    /// Whether the decision worked out, when known
    pub outcome: Option<bool>,
    pub project: String,
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Per-agent health counters composed into every agent
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentHealth {
    pub runs: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub total_time_ms: u64,
    pub last_error: Option<String>,
}

/// Naming context for a registered symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolContextType {
    Class,
    Function,
    Variable,
    Constant,
    Interface,
}

impl SymbolContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolContextType::Class => "class",
            SymbolContextType::Function => "function",
            SymbolContextType::Variable => "variable",
            SymbolContextType::Constant => "constant",
            SymbolContextType::Interface => "interface",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "class" => Some(SymbolContextType::Class),
            "function" => Some(SymbolContextType::Function),
            "variable" => Some(SymbolContextType::Variable),
            "constant" => Some(SymbolContextType::Constant),
            "interface" => Some(SymbolContextType::Interface),
            _ => None,
        }
    }
}

/// A canonical name assigned to a concept within a project.
/// (project, concept, context_type) is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub project: String,
    pub concept: String,
    pub chosen_name: String,
    pub context_type: SymbolContextType,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Starts at 1; incremented on every lookup
    pub usage_count: i64,
    pub created_by_agent: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_non_increasing_for_scheduler() {
        let mut priorities = vec![
            SuggestionPriority::Medium,
            SuggestionPriority::Critical,
            SuggestionPriority::Low,
            SuggestionPriority::High,
        ];
        priorities.sort_by(|a, b| b.cmp(a));
        assert_eq!(
            priorities,
            vec![
                SuggestionPriority::Critical,
                SuggestionPriority::High,
                SuggestionPriority::Medium,
                SuggestionPriority::Low,
            ]
        );
    }

    #[test]
    fn symbol_context_round_trips() {
        for raw in ["class", "function", "variable", "constant", "interface"] {
            let parsed = SymbolContextType::parse(raw).unwrap();
            assert_eq!(parsed.as_str(), raw);
        }
        assert!(SymbolContextType::parse("module").is_none());
    }
}
