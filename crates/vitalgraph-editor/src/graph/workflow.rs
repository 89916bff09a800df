use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vitalgraph_core::error::{Result, VitalError};
use vitalgraph_core::types::{AgentId, EdgeId, NodeId, Position, WorkflowId};

use super::edge::Edge;
use super::node::Node;

/// A workflow: a named, acyclic graph of agent nodes.
///
/// Nodes and edges are kept in insertion order. Mutations go through the
/// checked `insert_*` / `remove_*` methods; a rejected mutation leaves the
/// graph untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    pub color: String,
    /// System workflows cannot be deleted or closed.
    #[serde(default)]
    pub is_default: bool,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            color: "#4a90d9".to_string(),
            is_default: false,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Mark this workflow as a system default.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Set the display color.
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| &n.id == id)
    }

    pub fn edge(&self, id: &EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| &e.id == id)
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.node(id).is_some()
    }

    /// True if any node instantiates the given agent.
    pub fn references_agent(&self, agent: &AgentId) -> bool {
        self.nodes.iter().any(|n| &n.agent_id == agent)
    }

    /// Insert a fully-formed node. Fails if the id is already taken.
    pub fn insert_node(&mut self, node: Node) -> Result<()> {
        if self.contains_node(&node.id) {
            return Err(VitalError::Validation(format!(
                "node id '{}' already exists in workflow '{}'",
                node.id, self.name
            )));
        }
        debug!(workflow = %self.name, node_id = %node.id, agent_id = %node.agent_id, "Node inserted");
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node, cascading to every edge that touches it.
    ///
    /// Returns the removed node and edges so the operation can be inverted.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<(Node, Vec<Edge>)> {
        let index = self
            .nodes
            .iter()
            .position(|n| &n.id == id)
            .ok_or_else(|| VitalError::NotFound(format!("node '{}'", id)))?;

        let node = self.nodes.remove(index);
        let mut removed_edges = Vec::new();
        self.edges.retain(|e| {
            if e.touches(id) {
                removed_edges.push(e.clone());
                false
            } else {
                true
            }
        });

        debug!(
            workflow = %self.name,
            node_id = %id,
            cascaded_edges = removed_edges.len(),
            "Node removed"
        );
        Ok((node, removed_edges))
    }

    /// Move a node to a new position. Returns the previous position.
    pub fn move_node(&mut self, id: &NodeId, position: Position) -> Result<Position> {
        let node = self
            .node_mut(id)
            .ok_or_else(|| VitalError::NotFound(format!("node '{}'", id)))?;
        let previous = node.position;
        node.position = position;
        Ok(previous)
    }

    /// Insert an edge, enforcing every graph invariant.
    ///
    /// Checks, in order: self-loop, dangling endpoints, duplicate ordered
    /// pair, and acyclicity (reachability search from target back to source).
    pub fn insert_edge(&mut self, edge: Edge) -> Result<()> {
        if edge.source == edge.target {
            warn!(workflow = %self.name, node_id = %edge.source, "Self-loop rejected");
            return Err(VitalError::SelfLoop(edge.source.to_string()));
        }
        for endpoint in [&edge.source, &edge.target] {
            if !self.contains_node(endpoint) {
                return Err(VitalError::DanglingNode(endpoint.to_string()));
            }
        }
        if self
            .edges
            .iter()
            .any(|e| e.source == edge.source && e.target == edge.target)
        {
            return Err(VitalError::DuplicateEdge {
                from_node: edge.source.to_string(),
                to_node: edge.target.to_string(),
            });
        }
        if self.is_reachable(&edge.target, &edge.source) {
            warn!(
                workflow = %self.name,
                source = %edge.source,
                target = %edge.target,
                "Edge rejected: would create a cycle"
            );
            return Err(VitalError::Cycle {
                from_node: edge.source.to_string(),
                to_node: edge.target.to_string(),
            });
        }

        debug!(workflow = %self.name, source = %edge.source, target = %edge.target, "Edge inserted");
        self.edges.push(edge);
        Ok(())
    }

    /// Remove an edge by id, returning it for inversion.
    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<Edge> {
        let index = self
            .edges
            .iter()
            .position(|e| &e.id == id)
            .ok_or_else(|| VitalError::NotFound(format!("edge '{}'", id)))?;
        Ok(self.edges.remove(index))
    }

    /// Rename the workflow. Returns the previous name.
    pub fn rename(&mut self, name: impl Into<String>) -> String {
        std::mem::replace(&mut self.name, name.into())
    }

    /// Breadth-first reachability over directed edges.
    fn is_reachable(&self, from: &NodeId, to: &NodeId) -> bool {
        if from == to {
            return true;
        }
        let mut seen: HashSet<&NodeId> = HashSet::new();
        let mut queue: VecDeque<&NodeId> = VecDeque::new();
        queue.push_back(from);
        seen.insert(from);

        while let Some(current) = queue.pop_front() {
            for edge in self.edges.iter().filter(|e| &e.source == current) {
                if &edge.target == to {
                    return true;
                }
                if seen.insert(&edge.target) {
                    queue.push_back(&edge.target);
                }
            }
        }
        false
    }

    /// Topological execution order (Kahn's algorithm).
    ///
    /// On a maintained graph this always succeeds; a cycle can only mean the
    /// graph was deserialized from a corrupted source, and is reported as an
    /// invariant error.
    pub fn topo_order(&self) -> Result<Vec<NodeId>> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.nodes.iter().map(|n| (&n.id, 0)).collect();
        for edge in &self.edges {
            if let Some(count) = in_degree.get_mut(&edge.target) {
                *count += 1;
            }
        }

        // Seed with roots in insertion order so ordering is deterministic
        let mut ready: VecDeque<&NodeId> = self
            .nodes
            .iter()
            .filter(|n| in_degree[&n.id] == 0)
            .map(|n| &n.id)
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = ready.pop_front() {
            order.push(id.clone());
            for edge in self.edges.iter().filter(|e| &e.source == id) {
                if let Some(count) = in_degree.get_mut(&edge.target) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(&edge.target);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(VitalError::Cycle {
                from_node: "unknown".to_string(),
                to_node: "unknown".to_string(),
            });
        }
        Ok(order)
    }

    /// Direct predecessors of a node.
    pub fn predecessors(&self, id: &NodeId) -> Vec<&NodeId> {
        self.edges
            .iter()
            .filter(|e| &e.target == id)
            .map(|e| &e.source)
            .collect()
    }

    /// Deep-copy this workflow with fresh node, edge, and workflow ids.
    pub fn duplicate(&self, name: impl Into<String>) -> Workflow {
        let mut id_map: HashMap<&NodeId, NodeId> = HashMap::new();
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                let fresh = NodeId::new();
                id_map.insert(&n.id, fresh.clone());
                Node::with_id(fresh, n.agent_id.clone(), n.position)
            })
            .collect();
        let edges = self
            .edges
            .iter()
            .map(|e| Edge::new(id_map[&e.source].clone(), id_map[&e.target].clone()))
            .collect();

        Workflow {
            id: WorkflowId::new(),
            name: name.into(),
            color: self.color.clone(),
            is_default: false,
            nodes,
            edges,
        }
    }
}
