use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported generated-document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Readme,
    Api,
    Architecture,
    Handoff,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Readme => "readme",
            DocumentKind::Api => "api",
            DocumentKind::Architecture => "architecture",
            DocumentKind::Handoff => "handoff",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "readme" => Some(DocumentKind::Readme),
            "api" => Some(DocumentKind::Api),
            "architecture" => Some(DocumentKind::Architecture),
            "handoff" => Some(DocumentKind::Handoff),
            _ => None,
        }
    }
}

/// How an existing document is updated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentUpdateMode {
    Sync,
    Append,
    Restructure,
}

impl DocumentUpdateMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sync" => Some(DocumentUpdateMode::Sync),
            "append" => Some(DocumentUpdateMode::Append),
            "restructure" => Some(DocumentUpdateMode::Restructure),
            _ => None,
        }
    }
}

/// Metadata recorded for every generated or updated document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub path: String,
    pub session_id: String,
    pub kind: DocumentKind,
    pub generated_at: DateTime<Utc>,
    pub word_count: usize,
    pub sections: Vec<String>,
    pub references: Vec<String>,
    pub updated_at: DateTime<Utc>,
}
