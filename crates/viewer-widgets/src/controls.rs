//! The three control kinds. All of them keep their rows in an [`Arena`];
//! they differ in nesting, columns and check boxes.

use viewer_core::{CollectionKind, Label, NodeCollection, NodeError, NodeId};

use crate::arena::Arena;

/// Forwards the storage half of [`NodeCollection`] to the arena.
macro_rules! arena_rows {
    () => {
        fn children(&self, parent: Option<NodeId>) -> Vec<NodeId> {
            self.rows.children(parent)
        }

        fn child_count(&self, parent: Option<NodeId>) -> usize {
            self.rows.child_count(parent)
        }

        fn parent(&self, node: NodeId) -> Option<NodeId> {
            self.rows.parent(node)
        }

        fn contains(&self, node: NodeId) -> bool {
            self.rows.contains(node)
        }

        fn dispose(&mut self, node: NodeId) -> Result<(), NodeError> {
            self.rows.dispose(node)
        }

        fn element(&self, node: NodeId) -> Option<&E> {
            self.rows.row(node)?.element.as_ref()
        }

        fn set_element(&mut self, node: NodeId, element: Option<E>) -> Result<(), NodeError> {
            self.rows.row_mut(node)?.element = element;
            Ok(())
        }

        fn set_label(&mut self, node: NodeId, label: Label) -> Result<(), NodeError> {
            self.rows.row_mut(node)?.label = label;
            Ok(())
        }

        fn label(&self, node: NodeId) -> Option<&Label> {
            self.rows.row(node).map(|row| &row.label)
        }

        fn clear(&mut self, node: NodeId) -> Result<(), NodeError> {
            self.rows.row_mut(node)?.label = Label::default();
            Ok(())
        }

        fn selection(&self) -> Vec<NodeId> {
            self.rows.selection()
        }

        fn set_selection(&mut self, nodes: &[NodeId]) {
            self.rows.set_selection(nodes)
        }
    };
}

/// Forwards check and gray state, for controls created with check boxes.
macro_rules! check_boxes {
    () => {
        fn supports_check_state(&self) -> bool {
            self.checkable
        }

        fn is_checked(&self, node: NodeId) -> bool {
            self.rows.row(node).is_some_and(|row| row.checked)
        }

        fn set_checked(&mut self, node: NodeId, checked: bool) -> Result<(), NodeError> {
            if self.checkable {
                self.rows.row_mut(node)?.checked = checked;
            }
            Ok(())
        }

        fn is_grayed(&self, node: NodeId) -> bool {
            self.rows.row(node).is_some_and(|row| row.grayed)
        }

        fn set_grayed(&mut self, node: NodeId, grayed: bool) -> Result<(), NodeError> {
            if self.checkable {
                self.rows.row_mut(node)?.grayed = grayed;
            }
            Ok(())
        }
    };
}

fn flat_create<E>(rows: &mut Arena<E>, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
    if parent.is_some() {
        return Err(NodeError::NotHierarchical);
    }
    rows.create(None, index)
}

/// A single-column list.
pub struct ListControl<E> {
    rows: Arena<E>,
}

impl<E> ListControl<E> {
    pub fn new() -> Self {
        Self { rows: Arena::new() }
    }

    /// Live rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for ListControl<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> NodeCollection<E> for ListControl<E> {
    fn kind(&self) -> CollectionKind {
        CollectionKind::List
    }

    fn create(&mut self, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
        flat_create(&mut self.rows, parent, index)
    }

    arena_rows!();
}

/// Rows with a fixed number of columns and optional check boxes.
pub struct TableControl<E> {
    rows: Arena<E>,
    columns: usize,
    checkable: bool,
}

impl<E> TableControl<E> {
    pub fn new(columns: usize) -> Self {
        Self {
            rows: Arena::new(),
            columns: columns.max(1),
            checkable: false,
        }
    }

    pub fn with_check_boxes(mut self) -> Self {
        self.checkable = true;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> NodeCollection<E> for TableControl<E> {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Table
    }

    fn create(&mut self, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
        flat_create(&mut self.rows, parent, index)
    }

    fn column_count(&self) -> usize {
        self.columns
    }

    arena_rows!();
    check_boxes!();
}

/// Nested rows with expansion state and optional check boxes.
pub struct TreeControl<E> {
    rows: Arena<E>,
    checkable: bool,
}

impl<E> TreeControl<E> {
    pub fn new() -> Self {
        Self {
            rows: Arena::new(),
            checkable: false,
        }
    }

    pub fn with_check_boxes(mut self) -> Self {
        self.checkable = true;
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E> Default for TreeControl<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> NodeCollection<E> for TreeControl<E> {
    fn kind(&self) -> CollectionKind {
        CollectionKind::Tree
    }

    fn create(&mut self, parent: Option<NodeId>, index: usize) -> Result<NodeId, NodeError> {
        self.rows.create(parent, index)
    }

    fn is_expanded(&self, node: NodeId) -> bool {
        self.rows.row(node).is_some_and(|row| row.expanded)
    }

    fn set_expanded(&mut self, node: NodeId, expanded: bool) -> Result<(), NodeError> {
        self.rows.row_mut(node)?.expanded = expanded;
        Ok(())
    }

    arena_rows!();
    check_boxes!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_controls_reject_nested_rows() {
        let mut list: ListControl<u32> = ListControl::new();
        let row = list.create(None, 0).unwrap();
        assert_eq!(list.create(Some(row), 0), Err(NodeError::NotHierarchical));
        assert_eq!(list.set_expanded(row, true), Err(NodeError::NotHierarchical));
    }

    #[test]
    fn clear_resets_label_but_keeps_element() {
        let mut table: TableControl<u32> = TableControl::new(2);
        let row = table.create(None, 0).unwrap();
        table.set_element(row, Some(7)).unwrap();
        table.set_label(row, Label::text("seven")).unwrap();
        table.clear(row).unwrap();
        assert_eq!(table.element(row), Some(&7));
        assert_eq!(table.label(row), Some(&Label::default()));
        assert_eq!(table.column_count(), 2);
    }

    #[test]
    fn check_state_requires_check_boxes() {
        let mut plain: TreeControl<u32> = TreeControl::new();
        let row = plain.create(None, 0).unwrap();
        plain.set_checked(row, true).unwrap();
        assert!(!plain.is_checked(row));

        let mut checkable: TreeControl<u32> = TreeControl::new().with_check_boxes();
        let row = checkable.create(None, 0).unwrap();
        checkable.set_checked(row, true).unwrap();
        checkable.set_grayed(row, true).unwrap();
        assert!(checkable.supports_check_state());
        assert!(checkable.is_checked(row));
        assert!(checkable.is_grayed(row));
    }

    #[test]
    fn tree_rows_nest_and_expand() {
        let mut tree: TreeControl<u32> = TreeControl::new();
        let root = tree.create(None, 0).unwrap();
        let child = tree.create(Some(root), 0).unwrap();
        tree.set_expanded(root, true).unwrap();
        assert_eq!(tree.parent(child), Some(root));
        assert_eq!(tree.children(Some(root)), vec![child]);
        assert!(tree.is_expanded(root));
        assert!(!tree.is_expanded(child));
    }
}
