//! Tree-only parts of the engine: children on demand, placeholder children
//! of collapsed nodes, expansion and path lookups.

use crate::element::{Element, EquivalenceStrategy};
use crate::node::{walk_preorder, NodeCollection};
use crate::providers::LazyContentProvider;
use crate::reconcile::Reconciler;
use crate::session::Notification;
use crate::tree_path::TreePath;
use crate::{NodeId, ViewerError};

/// Expansion depth meaning "every level".
pub const ALL_LEVELS: usize = usize::MAX;

/// Where an element was found by [`Reconciler::locate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Located {
    /// The element is the viewer input.
    Root,
    Node(NodeId),
}

/// Elements from the top level down to `node`.
pub(crate) fn path_of<E: Clone>(nodes: &dyn NodeCollection<E>, node: NodeId) -> TreePath<E> {
    let mut segments = Vec::new();
    let mut cursor = Some(node);
    while let Some(current) = cursor {
        if let Some(element) = nodes.element(current) {
            segments.push(element.clone());
        }
        cursor = nodes.parent(current);
    }
    segments.reverse();
    TreePath::new(segments)
}

/// Walks `path` from the top level; `None` if any segment has no node.
pub(crate) fn find_by_path<E>(
    nodes: &dyn NodeCollection<E>,
    strategy: &dyn EquivalenceStrategy<E>,
    path: &TreePath<E>,
) -> Option<NodeId> {
    let mut parent = None;
    for segment in path.segments() {
        let child = nodes.children(parent).into_iter().find(|child| {
            nodes
                .element(*child)
                .is_some_and(|element| strategy.equals(element, segment))
        })?;
        parent = Some(child);
    }
    parent
}

/// Elements of every expanded node, pre-order.
pub(crate) fn expanded_elements<E: Clone>(nodes: &dyn NodeCollection<E>) -> Vec<E> {
    let mut expanded = Vec::new();
    walk_preorder(nodes, None, &mut |node| {
        if nodes.is_expanded(node) {
            if let Some(element) = nodes.element(node) {
                expanded.push(element.clone());
            }
        }
    });
    expanded
}

impl<'v, E: Element> Reconciler<'v, '_, E> {
    fn context_path(&self, parent: Option<NodeId>) -> TreePath<E> {
        match parent {
            Some(node) => path_of(&*self.nodes, node),
            None => TreePath::default(),
        }
    }

    /// Model children of `element` below `path`, filtered and sorted.
    /// Filtered-out elements are reported to association listeners.
    pub fn sorted_children(&mut self, path: &TreePath<E>, element: &E) -> Vec<E> {
        let Some(content) = self.content else {
            return Vec::new();
        };
        let raw = content.children(element);
        let mut dropped = Vec::new();
        let visible = self
            .pipeline
            .compute_visible(raw, path, &mut |element| dropped.push(element.clone()));
        for element in dropped {
            self.session.notify(Notification::FilteredOut(element));
        }
        visible
    }

    /// The lazy provider, when children come from it rather than from an
    /// eager content provider.
    fn lazy_children(&self) -> Option<&'v dyn LazyContentProvider<E>> {
        match self.content {
            Some(_) => None,
            None => self.lazy_content,
        }
    }

    fn has_children(&self, element: &E) -> bool {
        if !self.nodes.kind().is_hierarchical() {
            return false;
        }
        match (self.content, self.lazy_content) {
            (Some(content), _) => content.has_children(element),
            (None, Some(lazy)) => lazy.child_count(element) > 0,
            (None, None) => false,
        }
    }

    /// Keeps the expandability of `node` in step with the model: an
    /// expandable node without children gets a placeholder child, a node the
    /// model reports as childless loses its children and collapses.
    pub fn update_plus(&mut self, node: NodeId, element: &E) -> Result<(), ViewerError> {
        if !self.nodes.kind().is_hierarchical() {
            return Ok(());
        }
        let needs_plus = self.has_children(element);
        let has_plus = self.nodes.child_count(Some(node)) > 0;
        if needs_plus && !has_plus {
            self.nodes.create(Some(node), 0)?;
        } else if !needs_plus && has_plus {
            self.dispose_children(node)?;
            if self.nodes.is_expanded(node) {
                self.nodes.set_expanded(node, false)?;
            }
        }
        Ok(())
    }

    /// Replaces the placeholder child of `node` with real children. Does
    /// nothing when real children exist already.
    pub fn create_children(&mut self, node: NodeId, element: &E) -> Result<(), ViewerError> {
        if self.lazy_children().is_some() {
            return Ok(());
        }
        let existing = self.nodes.children(Some(node));
        if existing
            .iter()
            .any(|child| self.nodes.element(*child).is_some())
        {
            return Ok(());
        }
        for child in existing {
            self.nodes.dispose(child)?;
        }
        let path = path_of(&*self.nodes, node);
        let children = self.sorted_children(&path, element);
        for (index, child) in children.iter().enumerate() {
            self.create_node(Some(node), index, child)?;
        }
        Ok(())
    }

    /// Expanding creates children first; a node that turns out to have none
    /// stays collapsed.
    pub fn set_node_expanded(
        &mut self,
        node: NodeId,
        element: &E,
        expanded: bool,
    ) -> Result<(), ViewerError> {
        if expanded {
            if let Some(lazy) = self.lazy_children() {
                return self.expand_virtual(node, element, lazy);
            }
            self.create_children(node, element)?;
            if self.nodes.child_count(Some(node)) > 0 && !self.nodes.is_expanded(node) {
                self.nodes.set_expanded(node, true)?;
            }
        } else if self.nodes.is_expanded(node) {
            self.nodes.set_expanded(node, false)?;
        }
        Ok(())
    }

    /// Virtual children are only counted here; the placeholder goes away so
    /// that materialized children line up with their indices.
    fn expand_virtual(
        &mut self,
        node: NodeId,
        element: &E,
        lazy: &dyn LazyContentProvider<E>,
    ) -> Result<(), ViewerError> {
        if self.nodes.is_expanded(node) {
            return Ok(());
        }
        let count = lazy.child_count(element);
        for child in self.nodes.children(Some(node)) {
            if self.nodes.element(child).is_none() && self.nodes.child_count(Some(child)) == 0 {
                self.nodes.dispose(child)?;
            }
        }
        self.declare_count(node, count);
        if count > 0 {
            self.nodes.set_expanded(node, true)?;
        }
        Ok(())
    }

    /// Structural refresh of everything below `parent`, which shows
    /// `element` (the input for `None`). Collapsed subtrees are pruned back
    /// to a placeholder instead of being diffed.
    pub fn refresh_children(
        &mut self,
        parent: Option<NodeId>,
        element: &E,
        update_labels: bool,
    ) -> Result<(), ViewerError> {
        let hierarchical = self.nodes.kind().is_hierarchical();
        if let Some(node) = parent {
            if !hierarchical {
                return Ok(());
            }
            if !self.nodes.is_expanded(node) && self.prune_collapsed(node, element)? {
                return Ok(());
            }
        }
        let path = self.context_path(parent);
        let children = self.sorted_children(&path, element);
        self.reconcile(parent, &children, update_labels)?;
        if hierarchical {
            for child in self.nodes.children(parent) {
                if let Some(child_element) = self.nodes.element(child).cloned() {
                    self.refresh_children(Some(child), &child_element, update_labels)?;
                }
            }
        }
        Ok(())
    }

    /// Returns `true` when the collapsed `node` needs no further work.
    ///
    /// Check-capable trees keep the real children of collapsed nodes so the
    /// check state of hidden elements survives.
    pub(crate) fn prune_collapsed(&mut self, node: NodeId, element: &E) -> Result<bool, ViewerError> {
        let needs_placeholder = self.has_children(element);
        let children = self.nodes.children(Some(node));
        if self.nodes.supports_check_state() {
            if !needs_placeholder {
                self.dispose_children(node)?;
                return Ok(true);
            }
            if children.is_empty() {
                self.nodes.create(Some(node), 0)?;
                return Ok(true);
            }
            return Ok(children.len() == 1 && self.nodes.element(children[0]).is_none());
        }
        let mut have_placeholder = false;
        for child in children {
            if needs_placeholder && !have_placeholder && self.nodes.element(child).is_none() {
                have_placeholder = true;
            } else if self.nodes.element(child).is_none() {
                self.nodes.dispose(child)?;
            } else {
                self.dispose(child)?;
            }
        }
        if needs_placeholder && !have_placeholder {
            self.nodes.create(Some(node), 0)?;
        }
        Ok(true)
    }

    /// Expands `level` levels below `parent`; level 1 is `parent` itself.
    pub fn expand_to_level(
        &mut self,
        parent: Option<NodeId>,
        level: usize,
    ) -> Result<(), ViewerError> {
        if level == 0 {
            return Ok(());
        }
        if let Some(node) = parent {
            if let Some(element) = self.nodes.element(node).cloned() {
                self.set_node_expanded(node, &element, true)?;
            }
        }
        if level > 1 {
            let next = if level == ALL_LEVELS { level } else { level - 1 };
            for child in self.nodes.children(parent) {
                if self.nodes.element(child).is_some() {
                    self.expand_to_level(Some(child), next)?;
                }
            }
        }
        Ok(())
    }

    pub fn collapse_all(&mut self) -> Result<(), ViewerError> {
        let mut expanded = Vec::new();
        walk_preorder(&*self.nodes, None, &mut |node| expanded.push(node));
        for node in expanded {
            if self.nodes.is_expanded(node) {
                self.nodes.set_expanded(node, false)?;
            }
        }
        Ok(())
    }

    /// Finds the node showing `element`, creating the children of its
    /// ancestors (found through [`ContentProvider::parent`]) on the way. With
    /// `expand` the ancestors are expanded top-down as well.
    ///
    /// [`ContentProvider::parent`]: crate::ContentProvider::parent
    pub(crate) fn locate(
        &mut self,
        element: &E,
        input: Option<&E>,
        expand: bool,
    ) -> Result<Option<Located>, ViewerError> {
        self.locate_at_depth(element, input, expand, 0)
    }

    /// Walks `path` from the top level, creating children below each segment
    /// (expanding them with `expand`). `None` once a segment has no node.
    pub(crate) fn locate_path(
        &mut self,
        path: &TreePath<E>,
        expand: bool,
    ) -> Result<Option<NodeId>, ViewerError> {
        let strategy = self.registry.strategy().clone();
        let mut reached: Option<(NodeId, E)> = None;
        for segment in path.segments() {
            if let Some((node, element)) = &reached {
                if expand {
                    self.set_node_expanded(*node, element, true)?;
                } else {
                    self.create_children(*node, element)?;
                }
            }
            let parent = reached.as_ref().map(|(node, _)| *node);
            let child = self.nodes.children(parent).into_iter().find(|child| {
                self.nodes
                    .element(*child)
                    .is_some_and(|element| strategy.equals(element, segment))
            });
            match child {
                Some(child) => reached = Some((child, segment.clone())),
                None => return Ok(None),
            }
        }
        Ok(reached.map(|(node, _)| node))
    }

    fn locate_at_depth(
        &mut self,
        element: &E,
        input: Option<&E>,
        expand: bool,
        depth: usize,
    ) -> Result<Option<Located>, ViewerError> {
        let strategy = self.registry.strategy().clone();
        if let Some(&node) = self.registry.lookup(element).first() {
            if expand {
                self.expand_ancestors(node)?;
            }
            return Ok(Some(Located::Node(node)));
        }
        if input.is_some_and(|input| strategy.equals(input, element)) {
            return Ok(Some(Located::Root));
        }
        // A parent chain longer than any sane tree is a cycle in the model.
        if depth > 4096 || !self.nodes.kind().is_hierarchical() {
            return Ok(None);
        }
        let Some(parent) = self.content.and_then(|content| content.parent(element)) else {
            return Ok(None);
        };
        let parent_node = match self.locate_at_depth(&parent, input, expand, depth + 1)? {
            Some(Located::Node(node)) => node,
            Some(Located::Root) | None => return Ok(None),
        };
        self.create_children(parent_node, &parent)?;
        if expand {
            self.set_node_expanded(parent_node, &parent, true)?;
        }
        let found = self
            .nodes
            .children(Some(parent_node))
            .into_iter()
            .find(|child| {
                self.nodes
                    .element(*child)
                    .is_some_and(|candidate| strategy.equals(candidate, element))
            });
        Ok(found.map(Located::Node))
    }

    /// Expands every collapsed ancestor of `node`, outermost first.
    fn expand_ancestors(&mut self, node: NodeId) -> Result<(), ViewerError> {
        let mut collapsed = Vec::new();
        let mut cursor = self.nodes.parent(node);
        while let Some(ancestor) = cursor {
            if !self.nodes.is_expanded(ancestor) {
                collapsed.push(ancestor);
            }
            cursor = self.nodes.parent(ancestor);
        }
        for ancestor in collapsed.into_iter().rev() {
            if let Some(element) = self.nodes.element(ancestor).cloned() {
                self.set_node_expanded(ancestor, &element, true)?;
            }
        }
        Ok(())
    }

    /// Checks `node` and every node below it, creating children down the
    /// whole subtree first.
    pub fn set_subtree_checked(&mut self, node: NodeId, checked: bool) -> Result<(), ViewerError> {
        if let Some(element) = self.nodes.element(node).cloned() {
            self.create_children(node, &element)?;
        }
        self.nodes.set_checked(node, checked)?;
        self.nodes.set_grayed(node, false)?;
        for child in self.nodes.children(Some(node)) {
            if self.nodes.element(child).is_some() {
                self.set_subtree_checked(child, checked)?;
            }
        }
        Ok(())
    }
}
