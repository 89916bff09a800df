use serde::{Deserialize, Serialize};

use vitalgraph_core::types::{EdgeId, NodeId};

/// A directed connection between two nodes.
///
/// An edge (A -> B) encodes execution order: B may only start once A has
/// completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    /// Create a new edge with a fresh id.
    pub fn new(source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
        }
    }

    /// True if this edge touches the given node at either endpoint.
    pub fn touches(&self, node: &NodeId) -> bool {
        &self.source == node || &self.target == node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touches() {
        let a = NodeId::from_str("a");
        let b = NodeId::from_str("b");
        let c = NodeId::from_str("c");

        let edge = Edge::new(a.clone(), b.clone());
        assert!(edge.touches(&a));
        assert!(edge.touches(&b));
        assert!(!edge.touches(&c));
    }
}
