use std::fmt;

/// Result type for cadence operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types surfaced by component operations and tool dispatch
#[derive(Debug, Clone)]
pub enum Error {
    /// Schema or domain-range violation; carries the offending fields
    InvalidParameters {
        fields: Vec<String>,
        message: String,
    },

    /// Session lookup miss
    SessionNotFound(String),

    /// Blocker lookup miss
    BlockerNotFound(String),

    /// Symbol lookup miss
    SymbolNotFound(String),

    /// Document lookup miss
    DocumentNotFound(String),

    /// Operation not permitted in the current session/agent state
    InvalidState(String),

    /// Uniqueness violation (e.g. symbol registration collision)
    Conflict(String),

    /// Transaction failure; transient, callers may retry
    Storage(String),

    /// VCS or test subprocess failed; includes captured stderr
    ExternalTool { message: String, stderr: String },

    /// Agent or tool execution exceeded its wall clock
    Timeout(String),

    /// Tool name not present in the registry
    UnknownTool {
        name: String,
        suggestions: Vec<String>,
    },
}

impl Error {
    pub fn invalid_parameters(fields: Vec<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameters {
            fields,
            message: message.into(),
        }
    }

    /// Stable wire code used in `{error: {code, ...}}` payloads
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidParameters { .. } => "invalid_parameters",
            Error::SessionNotFound(_) => "session_not_found",
            Error::BlockerNotFound(_) => "blocker_not_found",
            Error::SymbolNotFound(_) => "symbol_not_found",
            Error::DocumentNotFound(_) => "document_not_found",
            Error::InvalidState(_) => "invalid_state",
            Error::Conflict(_) => "conflict",
            Error::Storage(_) => "storage_error",
            Error::ExternalTool { .. } => "external_tool_error",
            Error::Timeout(_) => "timeout",
            Error::UnknownTool { .. } => "unknown_tool",
        }
    }

    /// Caller-facing hints attached to the wire error, when any exist
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::UnknownTool { suggestions, .. } => suggestions.clone(),
            Error::InvalidParameters { fields, .. } => fields
                .iter()
                .map(|f| format!("check field '{}'", f))
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameters { fields, message } => {
                if fields.is_empty() {
                    write!(f, "Invalid parameters: {}", message)
                } else {
                    write!(
                        f,
                        "Invalid parameters ({}): {}",
                        fields.join(", "),
                        message
                    )
                }
            }
            Error::SessionNotFound(id) => write!(f, "Session not found: {}", id),
            Error::BlockerNotFound(id) => write!(f, "Blocker not found: {}", id),
            Error::SymbolNotFound(id) => write!(f, "Symbol not found: {}", id),
            Error::DocumentNotFound(path) => write!(f, "Document not found: {}", path),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::ExternalTool { message, stderr } => {
                if stderr.is_empty() {
                    write!(f, "External tool error: {}", message)
                } else {
                    write!(f, "External tool error: {} ({})", message, stderr.trim())
                }
            }
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::UnknownTool { name, .. } => write!(f, "Unknown tool: {}", name),
        }
    }
}

impl std::error::Error for Error {}
