use serde::{Deserialize, Serialize};

use vitalgraph_core::types::{AgentId, NodeId, Position};

/// A placed agent instance on the workflow canvas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within the owning workflow.
    pub id: NodeId,
    /// The agent this node instantiates.
    pub agent_id: AgentId,
    /// Canvas position.
    pub position: Position,
    /// Transient UI selection state; never persisted.
    #[serde(skip)]
    pub selected: bool,
}

impl Node {
    /// Create a new node with a fresh id.
    pub fn new(agent_id: AgentId, position: Position) -> Self {
        Self {
            id: NodeId::new(),
            agent_id,
            position,
            selected: false,
        }
    }

    /// Create a node with a caller-supplied id (history replay, duplication).
    pub fn with_id(id: NodeId, agent_id: AgentId, position: Position) -> Self {
        Self {
            id,
            agent_id,
            position,
            selected: false,
        }
    }
}
