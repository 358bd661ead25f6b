//! Viewer state and the structural operations behind [`Viewer`]. Every
//! method taking a session runs inside one; the facade opens it.
//!
//! [`Viewer`]: crate::Viewer

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use crate::element::{Element, ElementSet, SharedEquivalence};
use crate::lazy::{LazyController, ParentKey};
use crate::node::{walk_preorder, NodeCollection};
use crate::pipeline::SortFilterPipeline;
use crate::providers::{
    Comparator, ContentProvider, DebugLabels, LabelProvider, LazyContentProvider,
};
use crate::reconcile::Reconciler;
use crate::registry::ElementRegistry;
use crate::session::{Notification, ReconcileSession};
use crate::state::{preserving, SelectionSnapshot};
use crate::tree::{expanded_elements, find_by_path, path_of, Located};
use crate::tree_path::TreePath;
use crate::viewer::ViewerOptions;
use crate::{InvariantViolation, NodeId, ViewerError};

/// A selection asked for while the viewer was busy.
#[derive(Debug, Clone)]
pub(crate) enum Selection<E> {
    Elements(Vec<E>),
    Paths(Vec<TreePath<E>>),
}

pub(crate) type SelectionRequest<E> = Rc<RefCell<Option<Selection<E>>>>;

pub(crate) struct ViewerState<E: Element> {
    pub(crate) nodes: Box<dyn NodeCollection<E>>,
    pub(crate) registry: ElementRegistry<E>,
    pub(crate) pipeline: SortFilterPipeline<E>,
    pub(crate) labels: Rc<dyn LabelProvider<E>>,
    pub(crate) content: Option<Rc<dyn ContentProvider<E>>>,
    pub(crate) lazy_content: Option<Rc<dyn LazyContentProvider<E>>>,
    pub(crate) lazy: LazyController<E>,
    pub(crate) input: Option<E>,
    pub(crate) options: ViewerOptions,
    /// Selection asked for while the viewer was busy; applied before the
    /// session ends and wins over a preserved selection.
    pub(crate) selection_request: SelectionRequest<E>,
}

impl<E: Element> ViewerState<E> {
    pub(crate) fn new(
        nodes: Box<dyn NodeCollection<E>>,
        strategy: SharedEquivalence<E>,
        options: ViewerOptions,
        selection_request: SelectionRequest<E>,
    ) -> Self {
        Self {
            nodes,
            registry: ElementRegistry::new(strategy, options.registry_mode),
            pipeline: SortFilterPipeline::new(),
            labels: Rc::new(DebugLabels),
            content: None,
            lazy_content: None,
            lazy: LazyController::new(),
            input: None,
            options,
            selection_request,
        }
    }

    fn engine<'v, 's>(
        &'v mut self,
        session: &'v mut ReconcileSession<'s, E>,
    ) -> (Reconciler<'v, 's, E>, &'v mut LazyController<E>) {
        let reconciler = Reconciler::new(
            &mut self.registry,
            self.nodes.as_mut(),
            &self.pipeline,
            &*self.labels,
            session,
        )
        .with_content(self.content.as_deref())
        .with_lazy_content(self.lazy_content.as_deref());
        (reconciler, &mut self.lazy)
    }

    /// Runs `step` on the engine, then declares the child counts of the
    /// virtual nodes it expanded.
    fn with_engine<R>(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        step: impl FnOnce(&mut Reconciler<'_, '_, E>) -> Result<R, ViewerError>,
    ) -> Result<R, ViewerError> {
        let (mut reconciler, lazy) = self.engine(session);
        let result = step(&mut reconciler);
        for (node, count) in reconciler.take_declared_counts() {
            lazy.set_count(&mut reconciler, Some(node), count)?;
        }
        result
    }

    fn is_input(&self, element: &E) -> bool {
        self.input
            .as_ref()
            .is_some_and(|input| self.registry.strategy().equals(input, element))
    }

    pub(crate) fn nodes_for(&self, element: &E) -> Vec<NodeId> {
        self.registry.lookup(element).to_vec()
    }

    /// Nodes that act as `parent`: the top level for `None` or the input,
    /// otherwise every node showing the element.
    fn parent_nodes(&self, parent: Option<&E>) -> Vec<Option<NodeId>> {
        match parent {
            Some(parent) if !self.is_input(parent) => {
                self.nodes_for(parent).into_iter().map(Some).collect()
            }
            _ => vec![None],
        }
    }

    fn parent_key(&self, parent: Option<&E>) -> Option<ParentKey> {
        self.parent_nodes(parent).into_iter().next()
    }

    fn element_of(&self, parent: ParentKey) -> Option<E> {
        match parent {
            Some(node) => self.nodes.element(node).cloned(),
            None => self.input.clone(),
        }
    }

    fn require_content(&self) -> Result<(), ViewerError> {
        if self.input.is_some() && self.content.is_none() && self.lazy_content.is_none() {
            return Err(InvariantViolation::MissingContentProvider.into());
        }
        Ok(())
    }

    /// Bookkeeping after every session.
    pub(crate) fn after_session(&mut self) {
        let nodes = &self.nodes;
        self.lazy.retain_parents(|node| nodes.contains(node));
    }

    // ---- providers and configuration ----

    pub(crate) fn set_content_provider(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        content: Rc<dyn ContentProvider<E>>,
    ) -> Result<(), ViewerError> {
        self.content = Some(content);
        self.lazy_content = None;
        self.reload(session)
    }

    pub(crate) fn set_lazy_content_provider(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        content: Rc<dyn LazyContentProvider<E>>,
    ) -> Result<(), ViewerError> {
        if !self.options.virtual_mode {
            return Err(InvariantViolation::VirtualModeRequired.into());
        }
        self.lazy_content = Some(content);
        self.content = None;
        self.reload(session)
    }

    /// A new content provider invalidates every node.
    fn reload(&mut self, session: &mut ReconcileSession<'_, E>) -> Result<(), ViewerError> {
        if self.input.is_some() {
            let input = self.input.clone();
            self.set_input(session, input)?;
        }
        Ok(())
    }

    pub(crate) fn set_label_provider(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        labels: Rc<dyn LabelProvider<E>>,
    ) -> Result<(), ViewerError> {
        self.labels = labels;
        self.refresh(session, None, true)
    }

    pub(crate) fn set_equivalence(&mut self, strategy: SharedEquivalence<E>) {
        self.registry.rebuild(strategy, self.nodes.as_ref());
    }

    pub(crate) fn set_comparator(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        comparator: Option<Rc<dyn Comparator<E>>>,
    ) -> Result<(), ViewerError> {
        self.pipeline.set_comparator(comparator);
        self.refresh(session, None, true)
    }

    pub(crate) fn change_filters(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        change: impl FnOnce(&mut SortFilterPipeline<E>) -> bool,
    ) -> Result<(), ViewerError> {
        if change(&mut self.pipeline) {
            self.refresh(session, None, true)?;
        }
        Ok(())
    }

    // ---- input and refresh ----

    pub(crate) fn set_input(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        input: Option<E>,
    ) -> Result<(), ViewerError> {
        preserving(self, session, |state, session| {
            {
                let (mut reconciler, lazy) = state.engine(session);
                for node in reconciler.nodes().children(None) {
                    reconciler.dispose(node)?;
                }
                lazy.clear();
            }
            state.registry.clear_all();
            state.input = input;
            state.refresh_structure(session, true)?;
            let level = state.options.auto_expand_level;
            if level > 0 && state.nodes.kind().is_hierarchical() {
                state.with_engine(session, |reconciler| reconciler.expand_to_level(None, level))?;
            }
            Ok(())
        })
    }

    /// Preserving refresh of the whole view (`None` or the input) or of the
    /// subtrees below every node showing `element`.
    pub(crate) fn refresh(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: Option<E>,
        update_labels: bool,
    ) -> Result<(), ViewerError> {
        preserving(self, session, |state, session| match element {
            Some(element) if !state.is_input(&element) => {
                state.refresh_element(session, &element, update_labels)
            }
            _ => state.refresh_structure(session, update_labels),
        })
    }

    fn refresh_structure(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        update_labels: bool,
    ) -> Result<(), ViewerError> {
        self.require_content()?;
        if self.options.virtual_mode {
            return self.refresh_virtual(session);
        }
        let input = self.input.clone();
        let (mut reconciler, _) = self.engine(session);
        match input {
            Some(input) => reconciler.refresh_children(None, &input, update_labels),
            None => {
                for node in reconciler.nodes().children(None) {
                    reconciler.dispose(node)?;
                }
                Ok(())
            }
        }
    }

    /// Re-declares the top-level count, forgets what was resolved and
    /// resolves the previously materialized indices again.
    fn refresh_virtual(&mut self, session: &mut ReconcileSession<'_, E>) -> Result<(), ViewerError> {
        let input = self.input.clone();
        let provider = self.lazy_content.clone();
        let (mut reconciler, lazy) = self.engine(session);
        let Some(input) = input else {
            for node in reconciler.nodes().children(None) {
                reconciler.dispose(node)?;
            }
            lazy.clear();
            return Ok(());
        };
        let visible = lazy.materialized_indices(None);
        match &provider {
            Some(provider) => {
                let count = provider.child_count(&input);
                lazy.set_count(&mut reconciler, None, count)?;
            }
            None => {
                let children = reconciler.sorted_children(&TreePath::default(), &input);
                lazy.cache_elements(&mut reconciler, None, children)?;
            }
        }
        lazy.invalidate_from(&mut reconciler, None, 0)?;
        let count = lazy.count(None);
        for index in visible.into_iter().filter(|index| *index < count) {
            lazy.materialize(
                &mut reconciler,
                None,
                Some(&input),
                index..index + 1,
                provider.as_deref(),
            )?;
        }
        Ok(())
    }

    fn refresh_element(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        update_labels: bool,
    ) -> Result<(), ViewerError> {
        let targets = self.nodes_for(element);
        let structural = !self.options.virtual_mode;
        let (mut reconciler, _) = self.engine(session);
        for node in targets {
            if !reconciler.nodes().contains(node) {
                continue;
            }
            reconciler.reassociate(node, element)?;
            if update_labels {
                reconciler.update_item(node, element)?;
            }
            if structural {
                reconciler.update_plus(node, element)?;
                reconciler.refresh_children(Some(node), element, update_labels)?;
            }
        }
        Ok(())
    }

    /// Relabels the nodes of `elements`. A property that affects sorting or
    /// filtering turns this into a full refresh; properties that do not
    /// affect the label are ignored.
    pub(crate) fn update(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        elements: &[E],
        properties: Option<&[&str]>,
    ) -> Result<(), ViewerError> {
        if let Some(properties) = properties {
            if elements
                .iter()
                .any(|element| self.pipeline.needs_refilter(element, properties))
            {
                return self.refresh(session, None, true);
            }
        }
        for element in elements {
            let relabel = properties.map_or(true, |properties| {
                properties
                    .iter()
                    .any(|property| self.labels.is_label_property(element, property))
            });
            if !relabel {
                continue;
            }
            let targets = self.nodes_for(element);
            let (mut reconciler, _) = self.engine(session);
            for node in targets {
                reconciler.reassociate(node, element)?;
                reconciler.update_item(node, element)?;
            }
        }
        Ok(())
    }

    // ---- incremental changes ----

    pub(crate) fn add(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        elements: &[E],
    ) -> Result<(), ViewerError> {
        if elements.is_empty() {
            return Ok(());
        }
        let parents = self.parent_nodes(parent);
        if parents.is_empty() {
            log::debug!("add below {parent:?} ignored: parent is not shown");
            return Ok(());
        }
        preserving(self, session, |state, session| {
            for parent in parents {
                if parent.is_none() && state.options.virtual_mode {
                    state.add_virtual(session, elements);
                } else {
                    state.add_below(session, parent, elements)?;
                }
            }
            Ok(())
        })
    }

    pub(crate) fn add_at_path(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        path: &TreePath<E>,
        elements: &[E],
    ) -> Result<(), ViewerError> {
        if path.is_empty() {
            return self.add(session, None, elements);
        }
        let Some(node) = find_by_path(self.nodes.as_ref(), self.registry.strategy().as_ref(), path)
        else {
            log::debug!("add below {path:?} ignored: path is not shown");
            return Ok(());
        };
        preserving(self, session, |state, session| {
            state.add_below(session, Some(node), elements)
        })
    }

    fn add_below(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: ParentKey,
        elements: &[E],
    ) -> Result<(), ViewerError> {
        let Some(parent_element) = self.element_of(parent) else {
            return Ok(());
        };
        let strategy = self.registry.strategy().clone();
        let (mut reconciler, _) = self.engine(session);
        if let Some(node) = parent {
            if !reconciler.nodes().is_expanded(node)
                && reconciler.prune_collapsed(node, &parent_element)?
            {
                return Ok(());
            }
        }
        let path = match parent {
            Some(node) => path_of(reconciler.nodes(), node),
            None => TreePath::default(),
        };
        let mut dropped = Vec::new();
        let mut accepted =
            reconciler
                .pipeline
                .filter(elements.to_vec(), &path, &mut |element| dropped.push(element.clone()));
        for element in dropped {
            reconciler
                .session()
                .notify(Notification::FilteredOut(element));
        }
        reconciler.pipeline.sort(&mut accepted, &path);

        for element in accepted {
            let children = reconciler.nodes().children(parent);
            let shown: Vec<(usize, E)> = children
                .iter()
                .enumerate()
                .filter_map(|(position, child)| {
                    reconciler
                        .nodes()
                        .element(*child)
                        .map(|element| (position, element.clone()))
                })
                .collect();
            if let Some((position, _)) = shown
                .iter()
                .find(|(_, existing)| strategy.equals(existing, &element))
            {
                let node = children[*position];
                reconciler.reassociate(node, &element)?;
                reconciler.update_item(node, &element)?;
                continue;
            }
            let visible: Vec<E> = shown.iter().map(|(_, element)| element.clone()).collect();
            let index = reconciler.pipeline.insertion_index(&visible, &path, &element);
            let position = shown
                .get(index)
                .map_or(children.len(), |(position, _)| *position);
            reconciler.create_node(parent, position, &element)?;
        }
        Ok(())
    }

    /// Not visible yet: only the cache and the count change.
    fn add_virtual(&mut self, session: &mut ReconcileSession<'_, E>, elements: &[E]) {
        let path = TreePath::default();
        let mut dropped = Vec::new();
        let mut accepted = self
            .pipeline
            .filter(elements.to_vec(), &path, &mut |element| dropped.push(element.clone()));
        for element in dropped {
            session.notify(Notification::FilteredOut(element));
        }
        self.pipeline.sort(&mut accepted, &path);
        let strategy = self.registry.strategy().clone();
        for element in accepted {
            if self.lazy.find(None, &element, strategy.as_ref()).is_some() {
                continue;
            }
            let cached = self.lazy.cached_elements(None);
            let visible: Vec<E> = cached.iter().map(|(_, element)| element.clone()).collect();
            let index = self.pipeline.insertion_index(&visible, &path, &element);
            let slot = cached
                .get(index)
                .map_or(self.lazy.count(None), |(slot, _)| *slot);
            self.lazy.insert_cached(None, slot, element);
        }
    }

    /// Creates `element` at `position` below `parent`. With a comparator or
    /// filters the position is ignored and this behaves like [`Self::add`].
    pub(crate) fn insert(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        element: E,
        position: usize,
    ) -> Result<(), ViewerError> {
        if self.pipeline.comparator().is_some() || self.pipeline.has_filters() {
            return self.add(session, parent, &[element]);
        }
        let parents = self.parent_nodes(parent);
        preserving(self, session, |state, session| {
            for parent in parents {
                if parent.is_none() && state.options.virtual_mode {
                    state.lazy.insert_cached(None, position, element.clone());
                    continue;
                }
                let parent_element = state.element_of(parent);
                let (mut reconciler, _) = state.engine(session);
                if let (Some(node), Some(parent_element)) = (parent, &parent_element) {
                    if !reconciler.nodes().is_expanded(node)
                        && reconciler.prune_collapsed(node, parent_element)?
                    {
                        continue;
                    }
                }
                let count = reconciler.nodes().child_count(parent);
                reconciler.create_node(parent, position.min(count), &element)?;
            }
            Ok(())
        })
    }

    /// Disposes exactly the nodes of `elements`. Removing the input clears
    /// the whole view.
    pub(crate) fn remove(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        elements: &[E],
    ) -> Result<(), ViewerError> {
        if elements.iter().any(|element| self.is_input(element)) {
            return self.set_input(session, None);
        }
        preserving(self, session, |state, session| {
            let strategy = state.registry.strategy().clone();
            let virtual_mode = state.options.virtual_mode;
            let mut emptied = Vec::new();
            for element in elements {
                let targets = state.nodes_for(element);
                let (mut reconciler, lazy) = state.engine(session);
                if targets.is_empty() && virtual_mode {
                    if let Some(index) = lazy.find(None, element, strategy.as_ref()) {
                        lazy.remove_index(&mut reconciler, None, index)?;
                    }
                    continue;
                }
                for node in targets {
                    if !reconciler.nodes().contains(node) {
                        continue;
                    }
                    let parent = reconciler.nodes().parent(node);
                    if virtual_mode {
                        if let Some(index) = lazy.index_of_node(parent, node) {
                            lazy.remove_index(&mut reconciler, parent, index)?;
                            continue;
                        }
                    }
                    reconciler.dispose(node)?;
                    lazy.forget_node(node);
                    if let Some(parent) = parent {
                        emptied.push(parent);
                    }
                }
            }
            let (mut reconciler, _) = state.engine(session);
            for parent in emptied {
                if !reconciler.nodes().contains(parent)
                    || reconciler.nodes().child_count(Some(parent)) > 0
                {
                    continue;
                }
                if let Some(element) = reconciler.nodes().element(parent).cloned() {
                    reconciler.update_plus(parent, &element)?;
                }
            }
            Ok(())
        })
    }

    pub(crate) fn remove_path(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        path: &TreePath<E>,
    ) -> Result<(), ViewerError> {
        let Some(node) = find_by_path(self.nodes.as_ref(), self.registry.strategy().as_ref(), path)
        else {
            return Ok(());
        };
        preserving(self, session, |state, session| {
            let parent = state.nodes.parent(node);
            let (mut reconciler, lazy) = state.engine(session);
            reconciler.dispose(node)?;
            lazy.forget_node(node);
            if let Some(parent) = parent {
                if let Some(element) = reconciler.nodes().element(parent).cloned() {
                    if reconciler.nodes().child_count(Some(parent)) == 0 {
                        reconciler.update_plus(parent, &element)?;
                    }
                }
            }
            Ok(())
        })
    }

    // ---- selection ----

    pub(crate) fn selection(&self) -> Vec<E> {
        SelectionSnapshot::capture(self.nodes.as_ref())
            .elements()
            .to_vec()
    }

    pub(crate) fn selected_paths(&self) -> Vec<TreePath<E>> {
        self.nodes
            .selection()
            .into_iter()
            .map(|node| path_of(self.nodes.as_ref(), node))
            .collect()
    }

    /// Selects the nodes of `elements`, creating tree nodes on the way (and
    /// expanding their ancestors with `reveal`). Unknown elements are
    /// ignored. Cancels a pending selection restore.
    pub(crate) fn select_elements(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        elements: &[E],
        reveal: bool,
    ) -> Result<(), ViewerError> {
        let input = self.input.clone();
        self.select_with(session, |reconciler| {
            let mut found = Vec::with_capacity(elements.len());
            for element in elements {
                if let Some(Located::Node(node)) =
                    reconciler.locate(element, input.as_ref(), reveal)?
                {
                    found.push(node);
                }
            }
            Ok(found)
        })
    }

    /// Like [`Self::select_elements`], but addresses nodes by path so one
    /// of several nodes showing equal elements can be picked.
    pub(crate) fn select_paths(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        paths: &[TreePath<E>],
        reveal: bool,
    ) -> Result<(), ViewerError> {
        self.select_with(session, |reconciler| {
            let mut found = Vec::with_capacity(paths.len());
            for path in paths {
                if let Some(node) = reconciler.locate_path(path, reveal)? {
                    found.push(node);
                }
            }
            Ok(found)
        })
    }

    fn select_with(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        resolve: impl FnOnce(&mut Reconciler<'_, '_, E>) -> Result<Vec<NodeId>, ViewerError>,
    ) -> Result<(), ViewerError> {
        session.cancel_restore();
        let found = self.with_engine(session, resolve)?;
        let mut selected = Vec::with_capacity(found.len());
        for node in found {
            if !selected.contains(&node) {
                selected.push(node);
            }
        }
        self.nodes.set_selection(&selected);
        let current = self.selection();
        session.notify(Notification::SelectionChanged(current));
        Ok(())
    }

    pub(crate) fn apply_requested_selection(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
    ) -> Result<(), ViewerError> {
        let requested = self.selection_request.borrow_mut().take();
        match requested {
            Some(Selection::Elements(elements)) => self.select_elements(session, &elements, false),
            Some(Selection::Paths(paths)) => self.select_paths(session, &paths, false),
            None => Ok(()),
        }
    }

    // ---- expansion ----

    fn locate_node(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        expand: bool,
    ) -> Result<Option<NodeId>, ViewerError> {
        let input = self.input.clone();
        let located = self.with_engine(session, |reconciler| {
            reconciler.locate(element, input.as_ref(), expand)
        })?;
        Ok(match located {
            Some(Located::Node(node)) => Some(node),
            Some(Located::Root) | None => None,
        })
    }

    pub(crate) fn set_expanded(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        expanded: bool,
    ) -> Result<bool, ViewerError> {
        let Some(node) = self.locate_node(session, element, false)? else {
            return Ok(false);
        };
        self.with_engine(session, |reconciler| {
            reconciler.set_node_expanded(node, element, expanded)
        })?;
        Ok(self.nodes.is_expanded(node) == expanded)
    }

    pub(crate) fn is_expanded(&self, element: &E) -> bool {
        self.registry
            .lookup(element)
            .iter()
            .any(|node| self.nodes.is_expanded(*node))
    }

    pub(crate) fn expanded_elements(&self) -> Vec<E> {
        expanded_elements(self.nodes.as_ref())
    }

    /// Expands exactly the nodes of `elements` among the nodes walked,
    /// collapsing every other expanded node.
    pub(crate) fn set_expanded_elements(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        elements: &[E],
    ) -> Result<(), ViewerError> {
        for element in elements {
            self.locate_node(session, element, false)?;
        }
        let mut wanted = ElementSet::from_elements(self.registry.strategy().clone(), elements);
        self.with_engine(session, |reconciler| set_expanded_below(reconciler, None, &mut wanted))
    }

    pub(crate) fn expand_to_level(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: Option<&E>,
        level: usize,
    ) -> Result<(), ViewerError> {
        let start = match element {
            Some(element) if !self.is_input(element) => {
                match self.locate_node(session, element, false)? {
                    Some(node) => Some(node),
                    None => return Ok(()),
                }
            }
            _ => None,
        };
        self.with_engine(session, |reconciler| reconciler.expand_to_level(start, level))
    }

    pub(crate) fn collapse_all(&mut self, session: &mut ReconcileSession<'_, E>) -> Result<(), ViewerError> {
        let (mut reconciler, _) = self.engine(session);
        reconciler.collapse_all()
    }

    pub(crate) fn reveal(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
    ) -> Result<bool, ViewerError> {
        Ok(self.locate_node(session, element, true)?.is_some())
    }

    pub(crate) fn find_node_by_path(&self, path: &TreePath<E>) -> Option<NodeId> {
        find_by_path(self.nodes.as_ref(), self.registry.strategy().as_ref(), path)
    }

    pub(crate) fn tree_path(&self, node: NodeId) -> Option<TreePath<E>> {
        self.nodes
            .contains(node)
            .then(|| path_of(self.nodes.as_ref(), node))
    }

    // ---- check state ----

    fn resolve_target(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
    ) -> Result<Option<NodeId>, ViewerError> {
        if self.nodes.kind().is_hierarchical() {
            self.locate_node(session, element, false)
        } else {
            Ok(self.registry.lookup(element).first().copied())
        }
    }

    pub(crate) fn set_checked(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        checked: bool,
    ) -> Result<bool, ViewerError> {
        if !self.nodes.supports_check_state() {
            return Ok(false);
        }
        let Some(node) = self.resolve_target(session, element)? else {
            return Ok(false);
        };
        self.nodes.set_checked(node, checked)?;
        Ok(true)
    }

    pub(crate) fn set_grayed(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        grayed: bool,
    ) -> Result<bool, ViewerError> {
        if !self.nodes.supports_check_state() {
            return Ok(false);
        }
        let Some(node) = self.resolve_target(session, element)? else {
            return Ok(false);
        };
        self.nodes.set_grayed(node, grayed)?;
        Ok(true)
    }

    pub(crate) fn is_checked(&self, element: &E) -> bool {
        self.registry
            .lookup(element)
            .first()
            .is_some_and(|node| self.nodes.is_checked(*node))
    }

    pub(crate) fn is_grayed(&self, element: &E) -> bool {
        self.registry
            .lookup(element)
            .first()
            .is_some_and(|node| self.nodes.is_grayed(*node))
    }

    fn collect_where(&self, keep: impl Fn(&dyn NodeCollection<E>, NodeId) -> bool) -> Vec<E> {
        let nodes = self.nodes.as_ref();
        let mut found = Vec::new();
        walk_preorder(nodes, None, &mut |node| {
            if keep(nodes, node) {
                if let Some(element) = nodes.element(node) {
                    found.push(element.clone());
                }
            }
        });
        found
    }

    pub(crate) fn checked_elements(&self) -> Vec<E> {
        self.collect_where(|nodes, node| nodes.is_checked(node))
    }

    pub(crate) fn grayed_elements(&self) -> Vec<E> {
        self.collect_where(|nodes, node| nodes.is_grayed(node))
    }

    /// Sets the check (or gray) state of every node: on for `elements`, off
    /// for everything else.
    pub(crate) fn set_marked_elements(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        elements: &[E],
        grayed: bool,
    ) -> Result<(), ViewerError> {
        if !self.nodes.supports_check_state() {
            return Ok(());
        }
        for element in elements {
            self.resolve_target(session, element)?;
        }
        let marked = ElementSet::from_elements(self.registry.strategy().clone(), elements);
        let mut all = Vec::new();
        walk_preorder(self.nodes.as_ref(), None, &mut |node| all.push(node));
        for node in all {
            let on = self
                .nodes
                .element(node)
                .is_some_and(|element| marked.contains(element));
            if grayed {
                self.nodes.set_grayed(node, on)?;
            } else {
                self.nodes.set_checked(node, on)?;
            }
        }
        Ok(())
    }

    pub(crate) fn set_all_checked(&mut self, checked: bool) -> Result<(), ViewerError> {
        let mut all = Vec::new();
        walk_preorder(self.nodes.as_ref(), None, &mut |node| all.push(node));
        for node in all {
            if self.nodes.element(node).is_some() {
                self.nodes.set_checked(node, checked)?;
            }
        }
        Ok(())
    }

    pub(crate) fn set_subtree_checked(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        element: &E,
        checked: bool,
    ) -> Result<bool, ViewerError> {
        if !self.nodes.supports_check_state() {
            return Ok(false);
        }
        let Some(node) = self.resolve_target(session, element)? else {
            return Ok(false);
        };
        let (mut reconciler, _) = self.engine(session);
        reconciler.set_subtree_checked(node, checked)?;
        Ok(true)
    }

    // ---- virtual mode ----

    fn require_virtual(&self) -> Result<(), ViewerError> {
        if self.options.virtual_mode {
            Ok(())
        } else {
            Err(InvariantViolation::VirtualModeRequired.into())
        }
    }

    pub(crate) fn set_count(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        count: usize,
    ) -> Result<(), ViewerError> {
        self.require_virtual()?;
        let Some(key) = self.parent_key(parent) else {
            return Ok(());
        };
        let (mut reconciler, lazy) = self.engine(session);
        lazy.set_count(&mut reconciler, key, count)
    }

    pub(crate) fn item_count(&self, parent: Option<&E>) -> usize {
        match self.parent_key(parent) {
            Some(key) if self.options.virtual_mode => self.lazy.count(key),
            Some(key) => self.nodes.child_count(key),
            None => 0,
        }
    }

    pub(crate) fn replace(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        index: usize,
        element: &E,
    ) -> Result<(), ViewerError> {
        self.require_virtual()?;
        let Some(key) = self.parent_key(parent) else {
            return Ok(());
        };
        preserving(self, session, |state, session| {
            let (mut reconciler, lazy) = state.engine(session);
            lazy.replace(&mut reconciler, key, index, element)
        })
    }

    pub(crate) fn clear_index(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        index: usize,
    ) -> Result<(), ViewerError> {
        self.require_virtual()?;
        let Some(key) = self.parent_key(parent) else {
            return Ok(());
        };
        let (mut reconciler, lazy) = self.engine(session);
        lazy.clear_index(&mut reconciler, key, index)
    }

    /// The visibility pass: indices in `range` below `parent` are about to
    /// be shown.
    pub(crate) fn materialize(
        &mut self,
        session: &mut ReconcileSession<'_, E>,
        parent: Option<&E>,
        range: Range<usize>,
    ) -> Result<(), ViewerError> {
        self.require_virtual()?;
        let Some(key) = self.parent_key(parent) else {
            return Ok(());
        };
        let parent_element = self.element_of(key);
        let provider = self.lazy_content.clone();
        let (mut reconciler, lazy) = self.engine(session);
        lazy.materialize(
            &mut reconciler,
            key,
            parent_element.as_ref(),
            range,
            provider.as_deref(),
        )
    }
}

fn set_expanded_below<E: Element>(
    reconciler: &mut Reconciler<'_, '_, E>,
    parent: Option<NodeId>,
    wanted: &mut ElementSet<E>,
) -> Result<(), ViewerError> {
    for child in reconciler.nodes().children(parent) {
        let Some(element) = reconciler.nodes().element(child).cloned() else {
            continue;
        };
        let expand = wanted.remove(&element);
        if expand != reconciler.nodes().is_expanded(child) {
            reconciler.set_node_expanded(child, &element, expand)?;
        }
        if reconciler.nodes().child_count(Some(child)) > 0 {
            set_expanded_below(reconciler, Some(child), wanted)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::DefaultEquivalence;
    use crate::fixtures::Rows;
    use crate::providers::Resolution;
    use crate::session::BusyFlag;

    struct Numbers;

    impl LazyContentProvider<&'static str> for Numbers {
        fn child_count(&self, _parent: &&'static str) -> usize {
            2
        }

        fn resolve(&self, _parent: &&'static str, _index: usize) -> Resolution<&'static str> {
            Resolution::Ready("n")
        }
    }

    fn state(options: ViewerOptions) -> ViewerState<&'static str> {
        ViewerState::new(
            Box::new(Rows::default()),
            Rc::new(DefaultEquivalence),
            options,
            Rc::new(RefCell::new(None)),
        )
    }

    #[test]
    fn lazy_content_outside_virtual_mode_is_refused() {
        let flag = BusyFlag::new();
        let mut session = ReconcileSession::begin(&flag, "set_lazy_content_provider").expect("session");
        let mut state = state(ViewerOptions::default());

        let err = state
            .set_lazy_content_provider(&mut session, Rc::new(Numbers))
            .expect_err("not a virtual viewer");

        assert_eq!(err, ViewerError::Invariant(InvariantViolation::VirtualModeRequired));
        assert!(state.lazy_content.is_none());
        assert!(state.content.is_none());
        assert_eq!(state.nodes.child_count(None), 0);
    }

    #[test]
    fn input_without_content_is_reported() {
        let flag = BusyFlag::new();
        let mut session = ReconcileSession::begin(&flag, "set_input").expect("session");
        let mut state = state(ViewerOptions::default());

        let err = state
            .set_input(&mut session, Some("root"))
            .expect_err("nothing provides children");

        assert_eq!(err, ViewerError::Invariant(InvariantViolation::MissingContentProvider));
        assert_eq!(state.nodes.child_count(None), 0);
    }

    #[test]
    fn virtual_mode_installs_lazy_content() {
        let flag = BusyFlag::new();
        let mut session = ReconcileSession::begin(&flag, "set_input").expect("session");
        let mut state = state(ViewerOptions::default().with_virtual_mode(true));
        state
            .set_lazy_content_provider(&mut session, Rc::new(Numbers))
            .expect("virtual viewer");

        state.set_input(&mut session, Some("root")).expect("input");

        assert_eq!(state.item_count(None), 2);
        assert_eq!(state.nodes.child_count(None), 0);
    }
}
