use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_str(s: &str) -> Self {
                Self(s.to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Unique agent identifier.
    AgentId
);
id_type!(
    /// Unique workflow identifier.
    WorkflowId
);
id_type!(
    /// Node identifier, unique within one workflow.
    NodeId
);
id_type!(
    /// Edge identifier, unique within one workflow.
    EdgeId
);
id_type!(
    /// Identifier for one execution run or single-agent test.
    RunId
);

/// Functional category of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    Analysis,
    Research,
    Synthesis,
    Explanation,
    Internal,
}

/// Canvas position of a node (floating-point coordinates).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Lifecycle status of a run.
///
/// `Running -> Idle` is unreachable; a started run only ends in `Success`
/// or `Error` (cancellation surfaces as `Error` with a "cancelled" reason).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Idle,
    Running,
    Success,
    Error,
}

impl RunStatus {
    /// A terminal run is immutable; a new run is a new entity.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Per-entry status reported by the execution backend for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Starting,
    Running,
    Complete,
    Error,
    Warning,
}

/// One entry in a run's log timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub status: LogStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Save status of an open workflow tab.
///
/// Four states rather than a dirty bool so a failed save is distinguishable
/// from "never attempted".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveState {
    Saved,
    Saving,
    Unsaved,
    Error,
}

impl SaveState {
    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Unsaved | Self::Error)
    }
}
