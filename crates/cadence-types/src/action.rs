use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One step of a quick action: a tool plus a parameter template.
/// Template values may reference `{{session_id}}` of the invoking session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionStep {
    pub tool: String,
    pub params: serde_json::Value,
}

/// A named, ordered tool sequence exposed to UIs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuickAction {
    pub id: String,
    pub name: String,
    pub description: String,
    pub steps: Vec<ActionStep>,
    pub group: Option<String>,
    pub shortcut: Option<String>,
    pub usage_count: i64,
    pub last_used: Option<DateTime<Utc>>,
}
