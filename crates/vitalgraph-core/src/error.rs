use thiserror::Error;

#[derive(Debug, Error)]
pub enum VitalError {
    // Validation errors (malformed input, no state mutated)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // Graph invariant errors (mutation rejected atomically)
    #[error("Edge {from_node} -> {to_node} would create a cycle")]
    Cycle { from_node: String, to_node: String },

    #[error("Self-loop rejected on node {0}")]
    SelfLoop(String),

    #[error("Duplicate edge {from_node} -> {to_node}")]
    DuplicateEdge { from_node: String, to_node: String },

    #[error("Edge references missing node: {0}")]
    DanglingNode(String),

    // Execution errors (terminal run state, never unwinds editor state)
    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run timed out after {0}s")]
    Timeout(u64),

    // Transport errors (stream loss with indeterminate outcome)
    #[error("Transport error: {0}")]
    Transport(String),

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VitalError {
    /// True for graph invariant violations (cycle, self-loop, duplicate,
    /// dangling reference). These are always rejected before any mutation.
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. } | Self::SelfLoop(_) | Self::DuplicateEdge { .. } | Self::DanglingNode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, VitalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_classification() {
        assert!(VitalError::SelfLoop("n1".into()).is_invariant());
        assert!(VitalError::Cycle {
            from_node: "a".into(),
            to_node: "b".into()
        }
        .is_invariant());
        assert!(!VitalError::Validation("empty name".into()).is_invariant());
        assert!(!VitalError::Cancelled.is_invariant());
    }

    #[test]
    fn test_display_carries_endpoints() {
        let err = VitalError::DuplicateEdge {
            from_node: "research".into(),
            to_node: "synthesis".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("research"));
        assert!(msg.contains("synthesis"));
    }

    #[test]
    fn test_graph_errors_have_no_source_chain() {
        // Invariant variants carry node ids as plain data, not a wrapped
        // error cause.
        let err = VitalError::Cycle {
            from_node: "a".into(),
            to_node: "b".into(),
        };
        assert!(std::error::Error::source(&err).is_none());
    }
}
