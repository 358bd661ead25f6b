//! State preservation around structural passes.
//!
//! Nodes may be disposed and recreated by a pass, so selection and check
//! state are captured as elements and resolved back to nodes through the
//! registry afterwards. Tree selections also keep their paths, which tell
//! apart nodes showing equal elements.

use crate::element::{same_elements, Element, ElementSet, SharedEquivalence};
use crate::node::{walk_preorder, NodeCollection};
use crate::registry::ElementRegistry;
use crate::session::{Notification, ReconcileSession};
use crate::structure::ViewerState;
use crate::tree::{find_by_path, path_of};
use crate::tree_path::TreePath;
use crate::{NodeError, NodeId, ViewerError};

/// Selected elements in control order.
#[derive(Debug, Clone)]
pub struct SelectionSnapshot<E> {
    elements: Vec<E>,
    /// Path of each selected element; only kept for trees.
    paths: Option<Vec<TreePath<E>>>,
}

impl<E: Element> SelectionSnapshot<E> {
    pub fn capture(nodes: &dyn NodeCollection<E>) -> Self {
        let selected: Vec<NodeId> = nodes
            .selection()
            .into_iter()
            .filter(|node| nodes.element(*node).is_some())
            .collect();
        let elements = selected
            .iter()
            .filter_map(|node| nodes.element(*node).cloned())
            .collect();
        let paths = nodes
            .kind()
            .is_hierarchical()
            .then(|| selected.iter().map(|node| path_of(nodes, *node)).collect());
        Self { elements, paths }
    }

    pub fn elements(&self) -> &[E] {
        &self.elements
    }

    /// Selects the nodes now showing the captured elements and returns the
    /// elements that could be restored. A captured path is tried first; an
    /// element whose path is gone falls back to any node showing it.
    /// Elements without a node are dropped.
    pub fn restore(
        &self,
        registry: &ElementRegistry<E>,
        nodes: &mut dyn NodeCollection<E>,
    ) -> Vec<E> {
        let strategy = registry.strategy().clone();
        let mut selected = Vec::with_capacity(self.elements.len());
        let mut restored = Vec::with_capacity(self.elements.len());
        for (index, element) in self.elements.iter().enumerate() {
            let by_path = self
                .paths
                .as_ref()
                .and_then(|paths| paths.get(index))
                .and_then(|path| find_by_path(&*nodes, strategy.as_ref(), path));
            let node = by_path.or_else(|| {
                registry
                    .lookup(element)
                    .iter()
                    .copied()
                    .find(|node| !selected.contains(node))
            });
            if let Some(node) = node {
                if selected.contains(&node) {
                    continue;
                }
                selected.push(node);
                restored.push(nodes.element(node).cloned().unwrap_or_else(|| element.clone()));
            }
        }
        nodes.set_selection(&selected);
        restored
    }
}

/// Checked and grayed elements of a check-capable collection.
pub struct CheckSnapshot<E> {
    checked: ElementSet<E>,
    grayed: ElementSet<E>,
}

impl<E: Element> CheckSnapshot<E> {
    pub fn capture(nodes: &dyn NodeCollection<E>, strategy: SharedEquivalence<E>) -> Self {
        let mut checked = ElementSet::new(strategy.clone());
        let mut grayed = ElementSet::new(strategy);
        walk_preorder(nodes, None, &mut |node| {
            let Some(element) = nodes.element(node) else {
                return;
            };
            if nodes.is_checked(node) {
                checked.insert(element.clone());
            }
            if nodes.is_grayed(node) {
                grayed.insert(element.clone());
            }
        });
        Self { checked, grayed }
    }

    pub fn checked(&self) -> &ElementSet<E> {
        &self.checked
    }

    pub fn grayed(&self) -> &ElementSet<E> {
        &self.grayed
    }

    /// Sets the check and gray state of every node from the snapshot.
    pub fn reapply(&self, nodes: &mut dyn NodeCollection<E>) -> Result<(), NodeError> {
        let mut all = Vec::new();
        walk_preorder(&*nodes, None, &mut |node| all.push(node));
        for node in all {
            let Some(element) = nodes.element(node).cloned() else {
                continue;
            };
            nodes.set_checked(node, self.checked.contains(&element))?;
            nodes.set_grayed(node, self.grayed.contains(&element))?;
        }
        Ok(())
    }
}

/// Runs `operation` so that selection and check state survive it.
///
/// Only the outermost of nested preserving blocks in a session captures and
/// restores; inner blocks leave it to the outer one. A selection requested
/// while the block ran replaces the restore. When the restored selection
/// differs from the captured one an [`Notification::InvalidSelection`] is
/// queued.
pub(crate) fn preserving<E, R>(
    state: &mut ViewerState<E>,
    session: &mut ReconcileSession<'_, E>,
    operation: impl FnOnce(&mut ViewerState<E>, &mut ReconcileSession<'_, E>) -> Result<R, ViewerError>,
) -> Result<R, ViewerError>
where
    E: Element,
{
    let outermost = session.enter_preserving();
    let selection = (outermost && state.options.preserve_selection)
        .then(|| SelectionSnapshot::capture(state.nodes.as_ref()));
    let checks = (outermost && state.nodes.supports_check_state()).then(|| {
        CheckSnapshot::capture(state.nodes.as_ref(), state.registry.strategy().clone())
    });

    let result = operation(state, session);

    if let Some(checks) = checks {
        if let Err(err) = checks.reapply(state.nodes.as_mut()) {
            log::warn!("could not restore check state: {err}");
        }
    }
    let requested = state.apply_requested_selection(session);
    let restore = session.leave_preserving();
    if restore {
        if let Some(snapshot) = selection {
            let restored = snapshot.restore(&state.registry, state.nodes.as_mut());
            let strategy = state.registry.strategy().clone();
            if !same_elements(strategy.as_ref(), snapshot.elements(), &restored) {
                session.notify(Notification::InvalidSelection {
                    previous: snapshot.elements,
                    restored,
                });
            }
        }
    }
    requested?;
    result
}
