use indexmap::IndexSet;
use viewer_core::{Label, NodeError, NodeId};

pub(crate) struct Row<E> {
    pub(crate) element: Option<E>,
    pub(crate) label: Label,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: IndexSet<NodeId>,
    pub(crate) expanded: bool,
    pub(crate) checked: bool,
    pub(crate) grayed: bool,
}

impl<E> Row<E> {
    fn new(parent: Option<NodeId>) -> Self {
        Self {
            element: None,
            label: Label::default(),
            parent,
            children: IndexSet::new(),
            expanded: false,
            checked: false,
            grayed: false,
        }
    }
}

/// Row storage shared by the controls. Ids are never reused, so a stale id
/// held by a test or a listener reads as missing instead of aliasing a new
/// row.
pub(crate) struct Arena<E> {
    rows: Vec<Option<Row<E>>>,
    top: IndexSet<NodeId>,
    selection: Vec<NodeId>,
}

impl<E> Arena<E> {
    pub(crate) fn new() -> Self {
        Self {
            rows: Vec::new(),
            top: IndexSet::new(),
            selection: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.iter().filter(|row| row.is_some()).count()
    }

    pub(crate) fn row(&self, id: NodeId) -> Option<&Row<E>> {
        self.rows.get(id)?.as_ref()
    }

    pub(crate) fn row_mut(&mut self, id: NodeId) -> Result<&mut Row<E>, NodeError> {
        self.rows
            .get_mut(id)
            .ok_or(NodeError::Missing { id })?
            .as_mut()
            .ok_or(NodeError::Missing { id })
    }

    fn siblings(&self, parent: Option<NodeId>) -> Option<&IndexSet<NodeId>> {
        match parent {
            None => Some(&self.top),
            Some(id) => self.row(id).map(|row| &row.children),
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Result<&mut IndexSet<NodeId>, NodeError> {
        match parent {
            None => Ok(&mut self.top),
            Some(id) => Ok(&mut self.row_mut(id)?.children),
        }
    }

    pub(crate) fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        self.siblings(parent)
            .map(|children| children.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn child_count(&self, parent: Option<NodeId>) -> usize {
        self.siblings(parent).map_or(0, IndexSet::len)
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.row(id)?.parent
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.row(id).is_some()
    }

    pub(crate) fn create(&mut self, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
        let id = self.rows.len();
        let siblings = self.siblings_mut(parent)?;
        let index = index.min(siblings.len());
        siblings.shift_insert(index, id);
        self.rows.push(Some(Row::new(parent)));
        Ok(id)
    }

    pub(crate) fn dispose(&mut self, id: NodeId) -> Result<(), NodeError> {
        let parent = self.row_mut(id)?.parent;
        if let Ok(siblings) = self.siblings_mut(parent) {
            siblings.shift_remove(&id);
        }
        self.remove_subtree(id);
        let rows = &self.rows;
        self.selection
            .retain(|selected| rows.get(*selected).is_some_and(Option::is_some));
        Ok(())
    }

    fn remove_subtree(&mut self, id: NodeId) {
        let Some(row) = self.rows.get_mut(id).and_then(Option::take) else {
            return;
        };
        for child in row.children {
            self.remove_subtree(child);
        }
    }

    /// Selected rows in display order.
    pub(crate) fn selection(&self) -> Vec<NodeId> {
        let mut ordered = Vec::with_capacity(self.selection.len());
        self.collect_selected(None, &mut ordered);
        ordered
    }

    fn collect_selected(&self, parent: Option<NodeId>, ordered: &mut Vec<NodeId>) {
        let Some(children) = self.siblings(parent) else {
            return;
        };
        for &child in children {
            if ordered.len() == self.selection.len() {
                return;
            }
            if self.selection.contains(&child) {
                ordered.push(child);
            }
            self.collect_selected(Some(child), ordered);
        }
    }

    pub(crate) fn set_selection(&mut self, nodes: &[NodeId]) {
        self.selection.clear();
        for node in nodes {
            if !self.contains(*node) {
                log::trace!("ignoring selection of missing node {node}");
                continue;
            }
            if !self.selection.contains(node) {
                self.selection.push(*node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_inserts_at_index_and_clamps() {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.create(None, 0).unwrap();
        let b = arena.create(None, 0).unwrap();
        let c = arena.create(None, 10).unwrap();
        assert_eq!(arena.children(None), vec![b, a, c]);
    }

    #[test]
    fn dispose_removes_subtree_and_selection() {
        let mut arena: Arena<u32> = Arena::new();
        let root = arena.create(None, 0).unwrap();
        let child = arena.create(Some(root), 0).unwrap();
        let grandchild = arena.create(Some(child), 0).unwrap();
        arena.set_selection(&[grandchild, root]);
        assert_eq!(arena.selection(), vec![root, grandchild]);

        arena.dispose(child).unwrap();

        assert!(!arena.contains(child));
        assert!(!arena.contains(grandchild));
        assert_eq!(arena.children(Some(root)), Vec::<NodeId>::new());
        assert_eq!(arena.selection(), vec![root]);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut arena: Arena<u32> = Arena::new();
        let first = arena.create(None, 0).unwrap();
        arena.dispose(first).unwrap();
        let second = arena.create(None, 0).unwrap();
        assert_ne!(first, second);
        assert_eq!(arena.dispose(first), Err(NodeError::Missing { id: first }));
    }
}
