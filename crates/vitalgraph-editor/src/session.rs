//! Multi-tab workflow sessions.
//!
//! Each open workflow tab carries its own graph, history, save status,
//! viewport, and selection. State is keyed by workflow id; nothing is shared
//! between tabs, so one tab can never leak selection or dirty state into
//! another.

use std::collections::HashMap;

use tracing::{debug, info};

use vitalgraph_core::config::EditorConfig;
use vitalgraph_core::error::{Result, VitalError};
use vitalgraph_core::types::{AgentId, EdgeId, NodeId, Position, SaveState, WorkflowId};

use crate::graph::{Edge, Node, Workflow};
use crate::history::{EditCommand, EditHistory};

/// Per-tab editor state.
pub struct TabState {
    pub workflow: Workflow,
    history: EditHistory,
    pub save_state: SaveState,
    pub zoom: f64,
    pub pan: Position,
    pub selected_node: Option<NodeId>,
}

impl TabState {
    fn new(workflow: Workflow, history_depth: usize) -> Self {
        Self {
            workflow,
            history: EditHistory::new(history_depth),
            save_state: SaveState::Saved,
            zoom: 1.0,
            pan: Position::default(),
            selected_node: None,
        }
    }

    /// Route a command through the tab's history; any accepted mutation
    /// makes the tab unsaved.
    pub fn apply(&mut self, command: EditCommand) -> Result<()> {
        self.history.apply(&mut self.workflow, command)?;
        self.save_state = SaveState::Unsaved;
        Ok(())
    }

    /// Place a new node for an agent. Returns the node id.
    pub fn add_node(&mut self, agent_id: AgentId, position: Position) -> Result<NodeId> {
        let node = Node::new(agent_id, position);
        let id = node.id.clone();
        self.apply(EditCommand::AddNode { node })?;
        Ok(id)
    }

    /// Remove a node, cascading its edges.
    pub fn remove_node(&mut self, id: &NodeId) -> Result<()> {
        let node = self
            .workflow
            .node(id)
            .cloned()
            .ok_or_else(|| VitalError::NotFound(format!("node '{}'", id)))?;
        let edges: Vec<Edge> = self
            .workflow
            .edges()
            .iter()
            .filter(|e| e.touches(id))
            .cloned()
            .collect();
        if self.selected_node.as_ref() == Some(id) {
            self.selected_node = None;
        }
        self.apply(EditCommand::RemoveNode { node, edges })
    }

    pub fn move_node(&mut self, id: &NodeId, to: Position) -> Result<()> {
        let from = self
            .workflow
            .node(id)
            .map(|n| n.position)
            .ok_or_else(|| VitalError::NotFound(format!("node '{}'", id)))?;
        self.apply(EditCommand::MoveNode {
            id: id.clone(),
            from,
            to,
        })
    }

    /// Connect two nodes. All graph invariants are checked before anything
    /// is recorded.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> Result<EdgeId> {
        let edge = Edge::new(source, target);
        let id = edge.id.clone();
        self.apply(EditCommand::AddEdge { edge })?;
        Ok(id)
    }

    pub fn remove_edge(&mut self, id: &EdgeId) -> Result<()> {
        let edge = self
            .workflow
            .edge(id)
            .cloned()
            .ok_or_else(|| VitalError::NotFound(format!("edge '{}'", id)))?;
        self.apply(EditCommand::RemoveEdge { edge })
    }

    pub fn rename(&mut self, name: impl Into<String>) -> Result<()> {
        self.apply(EditCommand::Rename {
            from: self.workflow.name.clone(),
            to: name.into(),
        })
    }

    pub fn undo(&mut self) -> Result<bool> {
        let undone = self.history.undo(&mut self.workflow)?;
        if undone {
            self.save_state = SaveState::Unsaved;
        }
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool> {
        let redone = self.history.redo(&mut self.workflow)?;
        if redone {
            self.save_state = SaveState::Unsaved;
        }
        Ok(redone)
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn is_dirty(&self) -> bool {
        self.save_state.is_dirty()
    }
}

/// Manages the set of open workflow tabs and the active selection.
pub struct SessionManager {
    config: EditorConfig,
    states: HashMap<WorkflowId, TabState>,
    /// Tab display order.
    order: Vec<WorkflowId>,
    active: Option<WorkflowId>,
}

impl SessionManager {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
            order: Vec::new(),
            active: None,
        }
    }

    /// Open a tab for an existing workflow (e.g. fetched from the backend).
    pub fn open_tab(&mut self, workflow: Workflow) -> WorkflowId {
        let id = workflow.id.clone();
        if !self.states.contains_key(&id) {
            info!(workflow_id = %id, name = %workflow.name, "Tab opened");
            self.states
                .insert(id.clone(), TabState::new(workflow, self.config.history.depth));
            self.order.push(id.clone());
        }
        self.active = Some(id.clone());
        id
    }

    /// Create a fresh empty workflow tab.
    pub fn create_tab(&mut self, name: impl Into<String>) -> WorkflowId {
        self.open_tab(Workflow::new(name))
    }

    pub fn select_tab(&mut self, id: &WorkflowId) -> Result<()> {
        if !self.states.contains_key(id) {
            return Err(VitalError::NotFound(format!("tab '{}'", id)));
        }
        self.active = Some(id.clone());
        Ok(())
    }

    /// Close a tab. Default (system) workflows cannot be closed.
    pub fn close_tab(&mut self, id: &WorkflowId) -> Result<Workflow> {
        let state = self
            .states
            .get(id)
            .ok_or_else(|| VitalError::NotFound(format!("tab '{}'", id)))?;
        if state.workflow.is_default {
            return Err(VitalError::Conflict(format!(
                "workflow '{}' is a system default and cannot be closed",
                state.workflow.name
            )));
        }

        let state = self
            .states
            .remove(id)
            .ok_or_else(|| VitalError::NotFound(format!("tab '{}'", id)))?;
        self.order.retain(|t| t != id);
        if self.active.as_ref() == Some(id) {
            self.active = self.order.last().cloned();
        }
        info!(workflow_id = %id, "Tab closed");
        Ok(state.workflow)
    }

    /// Deep-copy a tab's workflow into a new tab with fresh ids.
    /// The copy starts unsaved.
    pub fn duplicate_tab(&mut self, id: &WorkflowId) -> Result<WorkflowId> {
        let source = self
            .states
            .get(id)
            .ok_or_else(|| VitalError::NotFound(format!("tab '{}'", id)))?;
        let copy = source
            .workflow
            .duplicate(format!("{} (copy)", source.workflow.name));
        let new_id = self.open_tab(copy);
        self.tab_mut(&new_id)?.save_state = SaveState::Unsaved;
        debug!(source = %id, copy = %new_id, "Tab duplicated");
        Ok(new_id)
    }

    pub fn tab(&self, id: &WorkflowId) -> Option<&TabState> {
        self.states.get(id)
    }

    pub fn tab_mut(&mut self, id: &WorkflowId) -> Result<&mut TabState> {
        self.states
            .get_mut(id)
            .ok_or_else(|| VitalError::NotFound(format!("tab '{}'", id)))
    }

    pub fn active_tab(&self) -> Option<&TabState> {
        self.active.as_ref().and_then(|id| self.states.get(id))
    }

    pub fn active_id(&self) -> Option<&WorkflowId> {
        self.active.as_ref()
    }

    /// Tab ids in display order.
    pub fn tab_order(&self) -> &[WorkflowId] {
        &self.order
    }

    /// Save lifecycle. A graph mutation after `mark_saved` flips the tab
    /// back to unsaved via `TabState::apply`.
    pub fn mark_saving(&mut self, id: &WorkflowId) -> Result<()> {
        self.tab_mut(id)?.save_state = SaveState::Saving;
        Ok(())
    }

    pub fn mark_saved(&mut self, id: &WorkflowId) -> Result<()> {
        self.tab_mut(id)?.save_state = SaveState::Saved;
        Ok(())
    }

    pub fn mark_save_failed(&mut self, id: &WorkflowId) -> Result<()> {
        self.tab_mut(id)?.save_state = SaveState::Error;
        Ok(())
    }

    /// Set the tab's zoom, clamped to the configured range.
    pub fn set_zoom(&mut self, id: &WorkflowId, zoom: f64) -> Result<f64> {
        let clamped = self.config.viewport.clamp_zoom(zoom);
        self.tab_mut(id)?.zoom = clamped;
        Ok(clamped)
    }

    pub fn set_pan(&mut self, id: &WorkflowId, pan: Position) -> Result<()> {
        self.tab_mut(id)?.pan = pan;
        Ok(())
    }

    pub fn select_node(&mut self, id: &WorkflowId, node: Option<NodeId>) -> Result<()> {
        let tab = self.tab_mut(id)?;
        if let Some(ref node_id) = node {
            if !tab.workflow.contains_node(node_id) {
                return Err(VitalError::NotFound(format!("node '{}'", node_id)));
            }
        }
        tab.selected_node = node;
        Ok(())
    }

    /// True if any open workflow references the agent. Used by the registry's
    /// delete-while-referenced check.
    pub fn agent_in_use(&self, agent: &AgentId) -> bool {
        self.states.values().any(|t| t.workflow.references_agent(agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(EditorConfig::default())
    }

    #[test]
    fn test_create_and_select_tabs() {
        let mut sessions = manager();
        let a = sessions.create_tab("Country report");
        let b = sessions.create_tab("Scratch");

        assert_eq!(sessions.tab_order().len(), 2);
        assert_eq!(sessions.active_id(), Some(&b));

        sessions.select_tab(&a).unwrap();
        assert_eq!(sessions.active_id(), Some(&a));
    }

    #[test]
    fn test_close_default_tab_refused() {
        let mut sessions = manager();
        let id = sessions.open_tab(Workflow::new("Standard report").as_default());

        let err = sessions.close_tab(&id).unwrap_err();
        assert!(matches!(err, VitalError::Conflict(_)));
        assert!(sessions.tab(&id).is_some());
    }

    #[test]
    fn test_close_moves_active() {
        let mut sessions = manager();
        let a = sessions.create_tab("A");
        let b = sessions.create_tab("B");

        sessions.close_tab(&b).unwrap();
        assert_eq!(sessions.active_id(), Some(&a));
    }

    #[test]
    fn test_mutation_marks_unsaved() {
        let mut sessions = manager();
        let id = sessions.create_tab("A");
        sessions.mark_saved(&id).unwrap();

        let tab = sessions.tab_mut(&id).unwrap();
        tab.add_node(AgentId::from_str("data"), Position::new(0.0, 0.0))
            .unwrap();
        assert_eq!(tab.save_state, SaveState::Unsaved);
    }

    #[test]
    fn test_save_lifecycle_states() {
        let mut sessions = manager();
        let id = sessions.create_tab("A");

        sessions.mark_saving(&id).unwrap();
        assert_eq!(sessions.tab(&id).unwrap().save_state, SaveState::Saving);
        sessions.mark_save_failed(&id).unwrap();
        assert_eq!(sessions.tab(&id).unwrap().save_state, SaveState::Error);
        sessions.mark_saved(&id).unwrap();
        assert!(!sessions.tab(&id).unwrap().is_dirty());
    }

    #[test]
    fn test_duplicate_is_unsaved_with_fresh_ids() {
        let mut sessions = manager();
        let id = sessions.create_tab("A");
        sessions
            .tab_mut(&id)
            .unwrap()
            .add_node(AgentId::from_str("data"), Position::new(1.0, 2.0))
            .unwrap();
        sessions.mark_saved(&id).unwrap();

        let copy_id = sessions.duplicate_tab(&id).unwrap();
        assert_ne!(copy_id, id);
        let copy = sessions.tab(&copy_id).unwrap();
        assert_eq!(copy.save_state, SaveState::Unsaved);
        assert_eq!(copy.workflow.nodes().len(), 1);
        // Source tab untouched
        assert_eq!(sessions.tab(&id).unwrap().save_state, SaveState::Saved);
    }

    #[test]
    fn test_zoom_clamped_per_tab() {
        let mut sessions = manager();
        let a = sessions.create_tab("A");
        let b = sessions.create_tab("B");

        assert_eq!(sessions.set_zoom(&a, 10.0).unwrap(), 2.5);
        assert_eq!(sessions.set_zoom(&b, 0.0).unwrap(), 0.25);
        // Independent viewports
        assert_eq!(sessions.tab(&a).unwrap().zoom, 2.5);
        assert_eq!(sessions.tab(&b).unwrap().zoom, 0.25);
    }

    #[test]
    fn test_selection_independent_per_tab() {
        let mut sessions = manager();
        let a = sessions.create_tab("A");
        let b = sessions.create_tab("B");

        let node = sessions
            .tab_mut(&a)
            .unwrap()
            .add_node(AgentId::from_str("data"), Position::new(0.0, 0.0))
            .unwrap();

        sessions.select_node(&a, Some(node.clone())).unwrap();
        assert_eq!(sessions.tab(&a).unwrap().selected_node, Some(node.clone()));
        assert_eq!(sessions.tab(&b).unwrap().selected_node, None);

        // Selecting a node from another tab's graph is rejected
        let err = sessions.select_node(&b, Some(node)).unwrap_err();
        assert!(matches!(err, VitalError::NotFound(_)));
    }

    #[test]
    fn test_removing_selected_node_clears_selection() {
        let mut sessions = manager();
        let id = sessions.create_tab("A");
        let tab = sessions.tab_mut(&id).unwrap();
        let node = tab
            .add_node(AgentId::from_str("data"), Position::new(0.0, 0.0))
            .unwrap();
        tab.selected_node = Some(node.clone());

        tab.remove_node(&node).unwrap();
        assert_eq!(tab.selected_node, None);
    }

    #[test]
    fn test_agent_in_use_across_tabs() {
        let mut sessions = manager();
        let a = sessions.create_tab("A");
        sessions.create_tab("B");

        let agent = AgentId::from_str("synthesis");
        sessions
            .tab_mut(&a)
            .unwrap()
            .add_node(agent.clone(), Position::new(0.0, 0.0))
            .unwrap();

        assert!(sessions.agent_in_use(&agent));
        assert!(!sessions.agent_in_use(&AgentId::from_str("unused")));
    }

    #[test]
    fn test_undo_redo_through_tab() {
        let mut sessions = manager();
        let id = sessions.create_tab("A");
        let tab = sessions.tab_mut(&id).unwrap();

        let node = tab
            .add_node(AgentId::from_str("data"), Position::new(0.0, 0.0))
            .unwrap();
        assert!(tab.can_undo());

        tab.undo().unwrap();
        assert!(!tab.workflow.contains_node(&node));
        tab.redo().unwrap();
        assert!(tab.workflow.contains_node(&node));
    }
}
