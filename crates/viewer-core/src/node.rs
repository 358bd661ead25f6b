//! The [`NodeCollection`] capability: everything the engine needs from a
//! concrete control (list, table or tree) to create, inspect and dispose
//! nodes. Controls own their nodes; the engine only holds [`NodeId`]s.

use crate::providers::Label;
use crate::{NodeError, NodeId};

/// Which family of control a collection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Table,
    Tree,
}

impl CollectionKind {
    #[inline]
    pub fn is_hierarchical(self) -> bool {
        matches!(self, CollectionKind::Tree)
    }
}

/// Node storage and per-node UI state of a control.
///
/// `parent == None` addresses the control itself (the top level). Flat
/// collections report no children below a node and reject `create` with a
/// node parent.
pub trait NodeCollection<E> {
    fn kind(&self) -> CollectionKind;

    /// Children of `parent` in display order.
    fn children(&self, parent: Option<NodeId>) -> Vec<NodeId>;

    fn child_count(&self, parent: Option<NodeId>) -> usize {
        self.children(parent).len()
    }

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn contains(&self, node: NodeId) -> bool;

    /// Creates an elementless node at `index` below `parent`. An index past
    /// the end appends.
    fn create(&mut self, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError>;

    /// Disposes `node` and, recursively, all of its descendants.
    fn dispose(&mut self, node: NodeId) -> Result<(), NodeError>;

    fn element(&self, node: NodeId) -> Option<&E>;

    fn set_element(&mut self, node: NodeId, element: Option<E>) -> Result<(), NodeError>;

    fn set_label(&mut self, node: NodeId, label: Label) -> Result<(), NodeError>;

    /// Label last applied to `node`, if the collection keeps it.
    fn label(&self, _node: NodeId) -> Option<&Label> {
        None
    }

    /// Resets the visual state of `node` (text, image, cells) to defaults.
    fn clear(&mut self, node: NodeId) -> Result<(), NodeError>;

    fn selection(&self) -> Vec<NodeId>;

    fn set_selection(&mut self, nodes: &[NodeId]);

    fn column_count(&self) -> usize {
        1
    }

    fn is_expanded(&self, _node: NodeId) -> bool {
        false
    }

    fn set_expanded(&mut self, _node: NodeId, _expanded: bool) -> Result<(), NodeError> {
        Err(NodeError::NotHierarchical)
    }

    fn supports_check_state(&self) -> bool {
        false
    }

    fn is_checked(&self, _node: NodeId) -> bool {
        false
    }

    fn set_checked(&mut self, _node: NodeId, _checked: bool) -> Result<(), NodeError> {
        Ok(())
    }

    fn is_grayed(&self, _node: NodeId) -> bool {
        false
    }

    fn set_grayed(&mut self, _node: NodeId, _grayed: bool) -> Result<(), NodeError> {
        Ok(())
    }
}

/// Position of `node` among its siblings.
pub fn index_of<E>(nodes: &dyn NodeCollection<E>, node: NodeId) -> Option<usize> {
    nodes
        .children(nodes.parent(node))
        .iter()
        .position(|candidate| *candidate == node)
}

/// Pre-order walk over every node below `parent`, the parent itself excluded.
pub fn walk_preorder<E>(
    nodes: &dyn NodeCollection<E>,
    parent: Option<NodeId>,
    visit: &mut dyn FnMut(NodeId),
) {
    for child in nodes.children(parent) {
        visit(child);
        walk_preorder(nodes, Some(child), visit);
    }
}
