//! Command-based edit history with bounded undo/redo.
//!
//! Every graph mutation is expressed as an `EditCommand` carrying enough
//! information to invert itself, so undo/redo is a structural guarantee
//! rather than a reconstructed snapshot diff.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use vitalgraph_core::error::Result;
use vitalgraph_core::types::{NodeId, Position};

use crate::graph::{Edge, Node, Workflow};

/// A reversible mutation over one workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EditCommand {
    AddNode {
        node: Node,
    },
    /// Removal carries the cascaded edges so inversion can restore them.
    RemoveNode {
        node: Node,
        edges: Vec<Edge>,
    },
    /// Inverse of `RemoveNode`: reinsert the node and its edges.
    RestoreNode {
        node: Node,
        edges: Vec<Edge>,
    },
    MoveNode {
        id: NodeId,
        from: Position,
        to: Position,
    },
    AddEdge {
        edge: Edge,
    },
    RemoveEdge {
        edge: Edge,
    },
    Rename {
        from: String,
        to: String,
    },
}

impl EditCommand {
    /// The command that exactly undoes this one.
    pub fn invert(&self) -> EditCommand {
        match self {
            Self::AddNode { node } => Self::RemoveNode {
                node: node.clone(),
                edges: Vec::new(),
            },
            Self::RemoveNode { node, edges } => Self::RestoreNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            Self::RestoreNode { node, edges } => Self::RemoveNode {
                node: node.clone(),
                edges: edges.clone(),
            },
            Self::MoveNode { id, from, to } => Self::MoveNode {
                id: id.clone(),
                from: *to,
                to: *from,
            },
            Self::AddEdge { edge } => Self::RemoveEdge { edge: edge.clone() },
            Self::RemoveEdge { edge } => Self::AddEdge { edge: edge.clone() },
            Self::Rename { from, to } => Self::Rename {
                from: to.clone(),
                to: from.clone(),
            },
        }
    }

    /// Apply this command to a workflow.
    ///
    /// Fails fast without mutating on any invariant violation.
    pub fn apply(&self, workflow: &mut Workflow) -> Result<()> {
        match self {
            Self::AddNode { node } => workflow.insert_node(node.clone()),
            Self::RemoveNode { node, .. } => {
                workflow.remove_node(&node.id)?;
                Ok(())
            }
            Self::RestoreNode { node, edges } => {
                workflow.insert_node(node.clone())?;
                for edge in edges {
                    workflow.insert_edge(edge.clone())?;
                }
                Ok(())
            }
            Self::MoveNode { id, to, .. } => {
                workflow.move_node(id, *to)?;
                Ok(())
            }
            Self::AddEdge { edge } => workflow.insert_edge(edge.clone()),
            Self::RemoveEdge { edge } => {
                workflow.remove_edge(&edge.id)?;
                Ok(())
            }
            Self::Rename { to, .. } => {
                workflow.rename(to.clone());
                Ok(())
            }
        }
    }

    /// Short label for logs.
    fn label(&self) -> &'static str {
        match self {
            Self::AddNode { .. } => "add_node",
            Self::RemoveNode { .. } => "remove_node",
            Self::RestoreNode { .. } => "restore_node",
            Self::MoveNode { .. } => "move_node",
            Self::AddEdge { .. } => "add_edge",
            Self::RemoveEdge { .. } => "remove_edge",
            Self::Rename { .. } => "rename",
        }
    }
}

/// Bounded linear history over one workflow.
///
/// New commands clear the redo stack (no redo after a fork); exceeding the
/// depth bound evicts the oldest entry silently.
pub struct EditHistory {
    undo: VecDeque<EditCommand>,
    redo: Vec<EditCommand>,
    depth: usize,
}

impl EditHistory {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Apply a new command and record it.
    pub fn apply(&mut self, workflow: &mut Workflow, command: EditCommand) -> Result<()> {
        command.apply(workflow)?;
        debug!(command = command.label(), "Edit applied");

        self.redo.clear();
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(command);
        Ok(())
    }

    /// Undo the most recent command. Returns false if there is nothing to undo.
    pub fn undo(&mut self, workflow: &mut Workflow) -> Result<bool> {
        let Some(command) = self.undo.pop_back() else {
            return Ok(false);
        };
        command.invert().apply(workflow)?;
        debug!(command = command.label(), "Edit undone");
        self.redo.push(command);
        Ok(true)
    }

    /// Reapply the most recently undone command.
    pub fn redo(&mut self, workflow: &mut Workflow) -> Result<bool> {
        let Some(command) = self.redo.pop() else {
            return Ok(false);
        };
        command.apply(workflow)?;
        debug!(command = command.label(), "Edit redone");
        self.undo.push_back(command);
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn len(&self) -> usize {
        self.undo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo.is_empty()
    }
}
