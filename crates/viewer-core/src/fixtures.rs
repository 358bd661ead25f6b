//! Node collections for unit tests.

use crate::node::{CollectionKind, NodeCollection};
use crate::providers::Label;
use crate::{NodeError, NodeId};

/// Flat rows with check state, enough to drive the engine without a widget
/// crate.
#[derive(Default)]
pub(crate) struct Rows {
    rows: Vec<(NodeId, Option<&'static str>, bool)>,
    selected: Vec<NodeId>,
    next: NodeId,
}

impl NodeCollection<&'static str> for Rows {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Table
    }
    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            None => self.rows.iter().map(|row| row.0).collect(),
            Some(_) => Vec::new(),
        }
    }
    fn parent(&self, _node: NodeId) -> Option<NodeId> {
        None
    }
    fn contains(&self, node: NodeId) -> bool {
        self.rows.iter().any(|row| row.0 == node)
    }
    fn create(&mut self, _parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
        let id = self.next;
        self.next += 1;
        let index = index.min(self.rows.len());
        self.rows.insert(index, (id, None, false));
        Ok(id)
    }
    fn dispose(&mut self, node: NodeId) -> Result<(), NodeError> {
        self.rows.retain(|row| row.0 != node);
        self.selected.retain(|selected| *selected != node);
        Ok(())
    }
    fn element(&self, node: NodeId) -> Option<&&'static str> {
        self.rows.iter().find(|row| row.0 == node)?.1.as_ref()
    }
    fn set_element(&mut self, node: NodeId, element: Option<&'static str>) -> Result<(), NodeError> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.0 == node)
            .ok_or(NodeError::Missing { id: node })?;
        row.1 = element;
        Ok(())
    }
    fn set_label(&mut self, _node: NodeId, _label: Label) -> Result<(), NodeError> {
        Ok(())
    }
    fn clear(&mut self, _node: NodeId) -> Result<(), NodeError> {
        Ok(())
    }
    fn selection(&self) -> Vec<NodeId> {
        self.selected.clone()
    }
    fn set_selection(&mut self, nodes: &[NodeId]) {
        self.selected = nodes.to_vec();
    }
    fn supports_check_state(&self) -> bool {
        true
    }
    fn is_checked(&self, node: NodeId) -> bool {
        self.rows.iter().any(|row| row.0 == node && row.2)
    }
    fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<(), NodeError> {
        if let Some(row) = self.rows.iter_mut().find(|row| row.0 == node) {
            row.2 = checked;
        }
        Ok(())
    }
}
