//! The reconciliation engine.
//!
//! [`Reconciler::reconcile`] turns the nodes below one parent into nodes
//! showing a new, already sorted and filtered element list while disposing
//! as few nodes as possible. The passes run in a fixed order:
//!
//! 1. expansion state of the old nodes is captured (trees only);
//! 2. surplus nodes are disposed, preferring nodes whose element is gone;
//! 3. head nodes are compared with the new elements position by position and
//!    either kept, re-pointed at an equal instance, or emptied;
//! 4. emptied head nodes are associated with their new element;
//! 5. expansion is restored on the head nodes;
//! 6. nodes for the remaining elements are created at the end.
//!
//! Every disassociation happens before the first association. Doing it the
//! other way round lets a late disassociate wipe a mapping that an earlier
//! associate just made, e.g. when `(a, b)` becomes `(b, a)`.

use crate::element::{Element, ElementSet};
use crate::node::{walk_preorder, NodeCollection};
use crate::pipeline::SortFilterPipeline;
use crate::providers::{ContentProvider, Label, LabelProvider, LazyContentProvider};
use crate::registry::{Association, ElementRegistry};
use crate::session::{Notification, ReconcileSession};
use crate::{InvariantViolation, NodeId, ViewerError};

/// Borrowed view of everything one structural pass touches.
pub struct Reconciler<'v, 's, E: Element> {
    pub(crate) registry: &'v mut ElementRegistry<E>,
    pub(crate) nodes: &'v mut dyn NodeCollection<E>,
    pub(crate) pipeline: &'v SortFilterPipeline<E>,
    pub(crate) labels: &'v dyn LabelProvider<E>,
    pub(crate) content: Option<&'v dyn ContentProvider<E>>,
    pub(crate) lazy_content: Option<&'v dyn LazyContentProvider<E>>,
    pub(crate) session: &'v mut ReconcileSession<'s, E>,
    /// Child counts of virtual nodes expanded during the pass, for the
    /// lazy controller to declare.
    declared: Vec<(NodeId, usize)>,
}

impl<'v, 's, E: Element> Reconciler<'v, 's, E> {
    pub fn new(
        registry: &'v mut ElementRegistry<E>,
        nodes: &'v mut dyn NodeCollection<E>,
        pipeline: &'v SortFilterPipeline<E>,
        labels: &'v dyn LabelProvider<E>,
        session: &'v mut ReconcileSession<'s, E>,
    ) -> Self {
        Self {
            registry,
            nodes,
            pipeline,
            labels,
            content: None,
            lazy_content: None,
            session,
            declared: Vec::new(),
        }
    }

    /// Content provider consulted for tree children and expandability.
    pub fn with_content(mut self, content: Option<&'v dyn ContentProvider<E>>) -> Self {
        self.content = content;
        self
    }

    /// Lazy provider asked for the child counts of virtual tree nodes.
    pub fn with_lazy_content(mut self, content: Option<&'v dyn LazyContentProvider<E>>) -> Self {
        self.lazy_content = content;
        self
    }

    pub(crate) fn declare_count(&mut self, node: NodeId, count: usize) {
        self.declared.push((node, count));
    }

    /// Child counts declared since the last call.
    pub fn take_declared_counts(&mut self) -> Vec<(NodeId, usize)> {
        std::mem::take(&mut self.declared)
    }

    pub fn session(&mut self) -> &mut ReconcileSession<'s, E> {
        &mut *self.session
    }

    pub fn nodes(&self) -> &dyn NodeCollection<E> {
        &*self.nodes
    }

    pub fn registry(&self) -> &ElementRegistry<E> {
        &*self.registry
    }

    /// Makes the children of `parent` show `elements`, in order.
    pub fn reconcile(
        &mut self,
        parent: Option<NodeId>,
        elements: &[E],
        update_labels: bool,
    ) -> Result<(), ViewerError> {
        let strategy = self.registry.strategy().clone();
        let hierarchical = self.nodes.kind().is_hierarchical();
        let mut old = self.nodes.children(parent);

        let mut expanded = ElementSet::new(strategy.clone());
        if hierarchical {
            for &node in &old {
                if self.nodes.is_expanded(node) {
                    if let Some(element) = self.nodes.element(node) {
                        expanded.insert(element.clone());
                    }
                }
            }
        }

        let min = old.len().min(elements.len());

        let mut surplus = old.len() - min;
        if surplus > 0 {
            let wanted = ElementSet::from_elements(strategy.clone(), elements);
            let mut index = 0;
            while surplus > 0 && index < old.len() {
                let node = old[index];
                let reusable = old.len() - index > surplus
                    && self
                        .nodes
                        .element(node)
                        .is_some_and(|element| wanted.contains(element));
                if reusable {
                    index += 1;
                } else {
                    self.dispose(node)?;
                    old.remove(index);
                    surplus -= 1;
                }
            }
        }

        for (index, new) in elements.iter().enumerate().take(min) {
            let node = old[index];
            let Some(current) = self.nodes.element(node).cloned() else {
                continue;
            };
            if current.same_instance(new) {
                continue;
            }
            if strategy.equals(&current, new) {
                let outcome = self.registry.reassociate(&mut *self.nodes, new.clone(), node);
                if self.tolerate(node, outcome)? {
                    self.session.report.reassociated.push(node);
                }
            } else {
                self.registry.disassociate(&mut *self.nodes, node)?;
                self.session.notify(Notification::Disassociated(node));
                self.dispose_children(node)?;
                self.nodes.clear(node)?;
            }
        }

        for (index, new) in elements.iter().enumerate().take(min) {
            let node = old[index];
            if self.nodes.element(node).is_none() {
                if self.bind(node, new)? {
                    self.update_plus(node, new)?;
                    self.update_item(node, new)?;
                }
            } else {
                self.update_plus(node, new)?;
                if update_labels {
                    self.update_item(node, new)?;
                }
            }
        }

        if hierarchical {
            for (index, new) in elements.iter().enumerate().take(min) {
                let node = old[index];
                if self.nodes.element(node).is_some() {
                    self.set_node_expanded(node, new, expanded.contains(new))?;
                }
            }
        }

        for (index, new) in elements.iter().enumerate().skip(min) {
            let node = self.create_node(parent, index, new)?;
            if hierarchical && expanded.contains(new) && self.nodes.element(node).is_some() {
                self.set_node_expanded(node, new, true)?;
            }
        }
        Ok(())
    }

    /// Creates a node for `element` at `index` below `parent`.
    pub fn create_node(
        &mut self,
        parent: Option<NodeId>,
        index: usize,
        element: &E,
    ) -> Result<NodeId, ViewerError> {
        let node = self.create_empty(parent, index)?;
        if self.bind(node, element)? {
            self.update_item(node, element)?;
            self.update_plus(node, element)?;
        }
        Ok(node)
    }

    /// Creates an elementless node, e.g. a virtual row that is not resolved
    /// yet.
    pub fn create_empty(
        &mut self,
        parent: Option<NodeId>,
        index: usize,
    ) -> Result<NodeId, ViewerError> {
        let node = self.nodes.create(parent, index)?;
        self.session.report.created.push(node);
        Ok(node)
    }

    /// Points `node` at `element` (rebinding it if it showed something else)
    /// and refreshes its label.
    pub fn refresh_item(&mut self, node: NodeId, element: &E) -> Result<bool, ViewerError> {
        if !self.bind(node, element)? {
            return Ok(false);
        }
        self.update_item(node, element)?;
        self.update_plus(node, element)?;
        Ok(true)
    }

    /// Swaps in a fresh instance of the element `node` already shows.
    pub fn reassociate(&mut self, node: NodeId, element: &E) -> Result<(), ViewerError> {
        if self
            .nodes
            .element(node)
            .is_some_and(|current| current.same_instance(element))
        {
            return Ok(());
        }
        let outcome = self.registry.reassociate(&mut *self.nodes, element.clone(), node);
        if self.tolerate(node, outcome)? {
            self.session.report.reassociated.push(node);
        }
        Ok(())
    }

    /// Associates `node` with `element`. A node whose element is already
    /// shown elsewhere in a single-valued registry is left empty and recorded
    /// as skipped; `Ok(false)` is returned for it.
    pub(crate) fn bind(&mut self, node: NodeId, element: &E) -> Result<bool, ViewerError> {
        match self.registry.associate(&mut *self.nodes, element.clone(), node) {
            Ok(Association::Refreshed) => Ok(true),
            Ok(Association::Bound) => {
                self.session
                    .notify(Notification::Associated(element.clone(), node));
                Ok(true)
            }
            Ok(Association::Rebound) => {
                self.session.notify(Notification::Disassociated(node));
                self.session
                    .notify(Notification::Associated(element.clone(), node));
                Ok(true)
            }
            Err(err) => self.tolerate(node, Err(err)),
        }
    }

    fn tolerate(
        &mut self,
        node: NodeId,
        outcome: Result<(), ViewerError>,
    ) -> Result<bool, ViewerError> {
        match outcome {
            Ok(()) => Ok(true),
            Err(ViewerError::Invariant(violation @ InvariantViolation::DuplicateElement { .. })) => {
                log::warn!("leaving node {node} empty: {violation}");
                self.session.report.skipped.push(node);
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Empties `node` without disposing it and resets its visual state.
    pub fn clear_node(&mut self, node: NodeId) -> Result<(), ViewerError> {
        if self.nodes.element(node).is_some() {
            self.registry.disassociate(&mut *self.nodes, node)?;
            self.session.notify(Notification::Disassociated(node));
        }
        self.nodes.clear(node)?;
        Ok(())
    }

    /// Applies the label provider's output to `node`. Provider failures are
    /// logged and leave the previous label in place.
    pub fn update_item(&mut self, node: NodeId, element: &E) -> Result<(), ViewerError> {
        let labels = self.labels;
        let text = match labels.text(element) {
            Ok(text) => text,
            Err(err) => {
                log::warn!("label provider failed for {element:?}: {err}");
                return Ok(());
            }
        };
        let column_count = self.nodes.column_count();
        let columns = if column_count > 1 {
            (0..column_count)
                .map(|column| {
                    labels.column_text(element, column).unwrap_or_else(|err| {
                        log::warn!("label provider failed for {element:?} column {column}: {err}");
                        String::new()
                    })
                })
                .collect()
        } else {
            Vec::new()
        };
        let label = Label {
            text,
            image: labels.image(element),
            columns,
        };
        self.nodes.set_label(node, label)?;
        self.session.report.relabeled += 1;
        Ok(())
    }

    /// Disposes `node` and its subtree, dropping every registry entry that
    /// pointed into it.
    pub fn dispose(&mut self, node: NodeId) -> Result<(), ViewerError> {
        self.forget_subtree(node);
        self.nodes.dispose(node)?;
        self.session.report.disposed.push(node);
        Ok(())
    }

    pub(crate) fn dispose_children(&mut self, node: NodeId) -> Result<(), ViewerError> {
        for child in self.nodes.children(Some(node)) {
            if self.nodes.element(child).is_none() && self.nodes.child_count(Some(child)) == 0 {
                self.nodes.dispose(child)?;
            } else {
                self.dispose(child)?;
            }
        }
        Ok(())
    }

    fn forget_subtree(&mut self, node: NodeId) {
        let mut doomed = vec![node];
        walk_preorder(&*self.nodes, Some(node), &mut |child| doomed.push(child));
        for node in doomed {
            let Some(element) = self.nodes.element(node).cloned() else {
                continue;
            };
            if self.registry.unmap(&element, node) {
                self.session.notify(Notification::Disassociated(node));
            }
        }
    }
}
