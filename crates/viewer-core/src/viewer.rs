//! The [`Viewer`] facade.
//!
//! A viewer is a cheap `Rc` handle, so providers and listeners can hold a
//! clone of it. Mutating calls open a [`ReconcileSession`]; a call made
//! while another one runs (typically from a provider callback) is rejected
//! and reported through [`ChangeReport::rejected`]. `replace`, `materialize`
//! and `set_selection` are the exceptions: they are queued and run when the
//! current session ends. Listener notifications are delivered after the
//! session, when the viewer is no longer busy.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::hash::Hash;
use std::ops::Range;
use std::rc::Rc;

use crate::element::{DefaultEquivalence, Element, SharedEquivalence};
use crate::node::NodeCollection;
use crate::providers::{
    AssociationListener, Comparator, ContentProvider, Filter, InvalidSelectionHandler,
    LabelProvider, LazyContentProvider, SelectionListener,
};
use crate::registry::RegistryMode;
use crate::session::{BusyFlag, ChangeReport, Notification, ReconcileSession};
use crate::structure::{Selection, SelectionRequest, ViewerState};
use crate::tree_path::TreePath;
use crate::{InvariantViolation, NodeId, ViewerError};

/// Viewer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerOptions {
    pub registry_mode: RegistryMode,
    /// Restore the selection by element after structural changes.
    pub preserve_selection: bool,
    /// Levels expanded when the input is set; see [`crate::ALL_LEVELS`].
    pub auto_expand_level: usize,
    /// Children are declared by count and resolved when they become visible.
    pub virtual_mode: bool,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            registry_mode: RegistryMode::Single,
            preserve_selection: true,
            auto_expand_level: 0,
            virtual_mode: false,
        }
    }
}

impl ViewerOptions {
    pub fn with_registry_mode(mut self, registry_mode: RegistryMode) -> Self {
        self.registry_mode = registry_mode;
        self
    }

    pub fn with_preserve_selection(mut self, preserve_selection: bool) -> Self {
        self.preserve_selection = preserve_selection;
        self
    }

    pub fn with_auto_expand_level(mut self, auto_expand_level: usize) -> Self {
        self.auto_expand_level = auto_expand_level;
        self
    }

    pub fn with_virtual_mode(mut self, virtual_mode: bool) -> Self {
        self.virtual_mode = virtual_mode;
        self
    }
}

enum Deferred<E> {
    Replace {
        parent: Option<E>,
        index: usize,
        element: E,
    },
    Materialize {
        parent: Option<E>,
        range: Range<usize>,
    },
}

struct Listeners<E> {
    selection: Vec<SelectionListener<E>>,
    association: Vec<Box<dyn AssociationListener<E>>>,
    invalid_selection: Option<InvalidSelectionHandler<E>>,
}

impl<E: Element> Listeners<E> {
    fn deliver(&mut self, viewer: &Viewer<E>, notification: Notification<E>) {
        match notification {
            Notification::Associated(element, node) => {
                for listener in &mut self.association {
                    if let Err(err) = listener.associated(&element, node) {
                        log::warn!("association listener failed for {element:?}: {err}");
                    }
                }
            }
            Notification::Disassociated(node) => {
                for listener in &mut self.association {
                    if let Err(err) = listener.disassociated(node) {
                        log::warn!("association listener failed for node {node}: {err}");
                    }
                }
            }
            Notification::FilteredOut(element) => {
                for listener in &mut self.association {
                    if let Err(err) = listener.filtered_out(&element) {
                        log::warn!("association listener failed for {element:?}: {err}");
                    }
                }
            }
            Notification::SelectionChanged(selection) => self.selection_changed(&selection),
            Notification::InvalidSelection { previous, restored } => {
                let fallback = self
                    .invalid_selection
                    .as_mut()
                    .and_then(|handler| handler(previous.as_slice(), restored.as_slice()));
                match fallback {
                    Some(selection) => {
                        viewer.set_selection(&selection, false);
                    }
                    None => self.selection_changed(&restored),
                }
            }
        }
    }

    fn selection_changed(&mut self, selection: &[E]) {
        for listener in &mut self.selection {
            if let Err(err) = listener(selection) {
                log::warn!("selection listener failed: {err}");
            }
        }
    }
}

struct ViewerInner<E: Element> {
    busy: BusyFlag,
    state: RefCell<ViewerState<E>>,
    listeners: RefCell<Listeners<E>>,
    notifications: RefCell<VecDeque<Notification<E>>>,
    deferred: RefCell<VecDeque<Deferred<E>>>,
    selection_request: SelectionRequest<E>,
}

/// Binds a model to a [`NodeCollection`] and keeps the two in step.
pub struct Viewer<E: Element> {
    inner: Rc<ViewerInner<E>>,
}

impl<E: Element> Clone for Viewer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Element + Eq + Hash> Viewer<E> {
    /// Viewer over `nodes` with value equality and default options.
    pub fn new(nodes: impl NodeCollection<E> + 'static) -> Self {
        Self::with_options(nodes, ViewerOptions::default())
    }

    pub fn with_options(nodes: impl NodeCollection<E> + 'static, options: ViewerOptions) -> Self {
        Self::with_strategy(nodes, Rc::new(DefaultEquivalence), options)
    }
}

impl<E: Element> Viewer<E> {
    pub fn with_strategy(
        nodes: impl NodeCollection<E> + 'static,
        strategy: SharedEquivalence<E>,
        options: ViewerOptions,
    ) -> Self {
        let selection_request = Rc::new(RefCell::new(None));
        let state = ViewerState::new(Box::new(nodes), strategy, options, Rc::clone(&selection_request));
        Self {
            inner: Rc::new(ViewerInner {
                busy: BusyFlag::new(),
                state: RefCell::new(state),
                listeners: RefCell::new(Listeners {
                    selection: Vec::new(),
                    association: Vec::new(),
                    invalid_selection: None,
                }),
                notifications: RefCell::new(VecDeque::new()),
                deferred: RefCell::new(VecDeque::new()),
                selection_request,
            }),
        }
    }

    /// Whether a reconciliation is in progress.
    pub fn is_busy(&self) -> bool {
        self.inner.busy.is_busy()
    }

    fn run<T: Default>(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut ViewerState<E>, &mut ReconcileSession<'_, E>) -> Result<T, ViewerError>,
    ) -> (T, ChangeReport) {
        let inner = &*self.inner;
        let mut session = match ReconcileSession::begin(&inner.busy, operation) {
            Ok(session) => session,
            Err(_) => {
                inner.busy.log_rejection(operation);
                return (T::default(), ChangeReport::rejected());
            }
        };
        let outcome = match inner.state.try_borrow_mut() {
            Ok(mut state) => {
                let outcome = body(&mut *state, &mut session).and_then(|value| {
                    state.apply_requested_selection(&mut session)?;
                    Ok(value)
                });
                state.after_session();
                outcome
            }
            Err(_) => Err(InvariantViolation::ReentrantMutation { operation }.into()),
        };
        let value = outcome.unwrap_or_else(|err| {
            log::error!("`{operation}` failed: {err}");
            inner.selection_request.borrow_mut().take();
            T::default()
        });
        let (report, notifications) = session.finish();
        if !report.is_structurally_empty() || !report.reassociated.is_empty() {
            log::debug!(
                "`{operation}`: {} created, {} disposed, {} reassociated, {} skipped",
                report.created.len(),
                report.disposed.len(),
                report.reassociated.len(),
                report.skipped.len()
            );
        }
        self.dispatch(notifications);
        self.drain_deferred();
        (value, report)
    }

    fn mutate(
        &self,
        operation: &'static str,
        body: impl FnOnce(&mut ViewerState<E>, &mut ReconcileSession<'_, E>) -> Result<(), ViewerError>,
    ) -> ChangeReport {
        self.run(operation, body).1
    }

    fn read<T: Default>(&self, body: impl FnOnce(&ViewerState<E>) -> T) -> T {
        match self.inner.state.try_borrow() {
            Ok(state) => body(&state),
            Err(_) => {
                log::trace!("viewer read while busy");
                T::default()
            }
        }
    }

    fn dispatch(&self, notifications: Vec<Notification<E>>) {
        let inner = &*self.inner;
        inner.notifications.borrow_mut().extend(notifications);
        // A listener triggering another operation lands here again; the
        // outer loop delivers what it queued.
        let Ok(mut listeners) = inner.listeners.try_borrow_mut() else {
            return;
        };
        loop {
            let next = inner.notifications.borrow_mut().pop_front();
            let Some(notification) = next else {
                break;
            };
            listeners.deliver(self, notification);
        }
    }

    fn drain_deferred(&self) {
        while !self.is_busy() {
            let next = self.inner.deferred.borrow_mut().pop_front();
            match next {
                Some(Deferred::Replace {
                    parent,
                    index,
                    element,
                }) => {
                    self.replace(parent.as_ref(), index, element);
                }
                Some(Deferred::Materialize { parent, range }) => {
                    self.materialize(parent.as_ref(), range);
                }
                None => break,
            }
        }
    }

    fn with_listeners(&self, register: impl FnOnce(&mut Listeners<E>)) {
        match self.inner.listeners.try_borrow_mut() {
            Ok(mut listeners) => register(&mut listeners),
            Err(_) => log::warn!("listener registration ignored while listeners are notified"),
        }
    }

    // ---- providers and configuration ----

    pub fn set_content_provider(&self, content: Rc<dyn ContentProvider<E>>) -> ChangeReport {
        self.mutate("set_content_provider", |state, session| {
            state.set_content_provider(session, content)
        })
    }

    /// Only valid in virtual mode.
    pub fn set_lazy_content_provider(&self, content: Rc<dyn LazyContentProvider<E>>) -> ChangeReport {
        self.mutate("set_lazy_content_provider", |state, session| {
            state.set_lazy_content_provider(session, content)
        })
    }

    pub fn set_label_provider(&self, labels: Rc<dyn LabelProvider<E>>) -> ChangeReport {
        self.mutate("set_label_provider", |state, session| {
            state.set_label_provider(session, labels)
        })
    }

    /// Swaps the equivalence strategy and rebuilds the registry from the
    /// live nodes.
    pub fn set_equivalence(&self, strategy: SharedEquivalence<E>) -> ChangeReport {
        self.mutate("set_equivalence", |state, _| {
            state.set_equivalence(strategy);
            Ok(())
        })
    }

    pub fn options(&self) -> ViewerOptions {
        self.read(|state| state.options.clone())
    }

    // ---- input and refresh ----

    pub fn set_input(&self, input: Option<E>) -> ChangeReport {
        self.mutate("set_input", |state, session| state.set_input(session, input))
    }

    pub fn input(&self) -> Option<E> {
        self.read(|state| state.input.clone())
    }

    /// Full structural refresh with relabeling.
    pub fn refresh(&self) -> ChangeReport {
        self.refresh_labels(true)
    }

    /// Full structural refresh; without `update_labels` only nodes whose
    /// element changed are relabeled.
    pub fn refresh_labels(&self, update_labels: bool) -> ChangeReport {
        self.mutate("refresh", |state, session| {
            state.refresh(session, None, update_labels)
        })
    }

    /// Structural refresh below every node showing `element`.
    pub fn refresh_element(&self, element: &E, update_labels: bool) -> ChangeReport {
        self.mutate("refresh", |state, session| {
            state.refresh(session, Some(element.clone()), update_labels)
        })
    }

    /// Relabels `element` after its `properties` changed (`None`: any).
    pub fn update(&self, element: &E, properties: Option<&[&str]>) -> ChangeReport {
        self.update_many(std::slice::from_ref(element), properties)
    }

    pub fn update_many(&self, elements: &[E], properties: Option<&[&str]>) -> ChangeReport {
        self.mutate("update", |state, session| {
            state.update(session, elements, properties)
        })
    }

    // ---- incremental changes ----

    /// Adds `elements` below `parent` (`None`: the top level) at their
    /// sorted positions.
    pub fn add(&self, parent: Option<&E>, elements: &[E]) -> ChangeReport {
        self.mutate("add", |state, session| state.add(session, parent, elements))
    }

    pub fn add_at_path(&self, path: &TreePath<E>, elements: &[E]) -> ChangeReport {
        self.mutate("add", |state, session| {
            state.add_at_path(session, path, elements)
        })
    }

    pub fn insert(&self, parent: Option<&E>, element: E, position: usize) -> ChangeReport {
        self.mutate("insert", |state, session| {
            state.insert(session, parent, element, position)
        })
    }

    pub fn remove(&self, elements: &[E]) -> ChangeReport {
        self.mutate("remove", |state, session| state.remove(session, elements))
    }

    pub fn remove_path(&self, path: &TreePath<E>) -> ChangeReport {
        self.mutate("remove", |state, session| state.remove_path(session, path))
    }

    // ---- sorting and filtering ----

    pub fn set_comparator(&self, comparator: Option<Rc<dyn Comparator<E>>>) -> ChangeReport {
        self.mutate("set_comparator", |state, session| {
            state.set_comparator(session, comparator)
        })
    }

    pub fn add_filter(&self, filter: Rc<dyn Filter<E>>) -> ChangeReport {
        self.mutate("add_filter", |state, session| {
            state.change_filters(session, |pipeline| {
                pipeline.add_filter(filter);
                true
            })
        })
    }

    pub fn remove_filter(&self, filter: &Rc<dyn Filter<E>>) -> ChangeReport {
        self.mutate("remove_filter", |state, session| {
            state.change_filters(session, |pipeline| pipeline.remove_filter(filter))
        })
    }

    pub fn set_filters(&self, filters: Vec<Rc<dyn Filter<E>>>) -> ChangeReport {
        self.mutate("set_filters", |state, session| {
            state.change_filters(session, |pipeline| {
                pipeline.set_filters(filters);
                true
            })
        })
    }

    pub fn reset_filters(&self) -> ChangeReport {
        self.mutate("reset_filters", |state, session| {
            state.change_filters(session, |pipeline| {
                let had_filters = pipeline.has_filters();
                pipeline.set_filters(Vec::new());
                had_filters
            })
        })
    }

    // ---- selection ----

    /// Selects the nodes of `elements`; with `reveal`, tree ancestors are
    /// expanded. Called while the viewer is busy, the selection is applied
    /// at the end of the running operation and replaces its selection
    /// restore.
    pub fn set_selection(&self, elements: &[E], reveal: bool) -> ChangeReport {
        if self.is_busy() {
            let requested = Selection::Elements(elements.to_vec());
            *self.inner.selection_request.borrow_mut() = Some(requested);
            return ChangeReport::deferred();
        }
        self.mutate("set_selection", |state, session| {
            state.select_elements(session, elements, reveal)
        })
    }

    /// Selects the nodes at `paths`. Unlike [`Self::set_selection`] this
    /// picks one particular node when equal elements appear under several
    /// parents. Deferred the same way while the viewer is busy.
    pub fn set_selection_paths(&self, paths: &[TreePath<E>], reveal: bool) -> ChangeReport {
        if self.is_busy() {
            let requested = Selection::Paths(paths.to_vec());
            *self.inner.selection_request.borrow_mut() = Some(requested);
            return ChangeReport::deferred();
        }
        self.mutate("set_selection_paths", |state, session| {
            state.select_paths(session, paths, reveal)
        })
    }

    pub fn selection(&self) -> Vec<E> {
        self.read(|state| state.selection())
    }

    pub fn selected_paths(&self) -> Vec<TreePath<E>> {
        self.read(|state| state.selected_paths())
    }

    pub fn add_selection_listener(&self, listener: SelectionListener<E>) {
        self.with_listeners(|listeners| listeners.selection.push(listener));
    }

    pub fn add_association_listener(&self, listener: Box<dyn AssociationListener<E>>) {
        self.with_listeners(|listeners| listeners.association.push(listener));
    }

    pub fn set_invalid_selection_handler(&self, handler: InvalidSelectionHandler<E>) {
        self.with_listeners(|listeners| listeners.invalid_selection = Some(handler));
    }

    // ---- trees ----

    pub fn set_expanded(&self, element: &E, expanded: bool) -> bool {
        self.run("set_expanded", |state, session| {
            state.set_expanded(session, element, expanded)
        })
        .0
    }

    pub fn is_expanded(&self, element: &E) -> bool {
        self.read(|state| state.is_expanded(element))
    }

    pub fn expanded_elements(&self) -> Vec<E> {
        self.read(|state| state.expanded_elements())
    }

    pub fn set_expanded_elements(&self, elements: &[E]) -> ChangeReport {
        self.mutate("set_expanded_elements", |state, session| {
            state.set_expanded_elements(session, elements)
        })
    }

    /// Expands `level` levels from `element` (`None`: the input, whose own
    /// level counts as the first).
    pub fn expand_to_level(&self, element: Option<&E>, level: usize) -> ChangeReport {
        self.mutate("expand_to_level", |state, session| {
            state.expand_to_level(session, element, level)
        })
    }

    pub fn expand_all(&self) -> ChangeReport {
        self.expand_to_level(None, crate::ALL_LEVELS)
    }

    pub fn collapse_all(&self) -> ChangeReport {
        self.mutate("collapse_all", |state, session| state.collapse_all(session))
    }

    /// Creates and expands the ancestors of `element`; `false` if it cannot
    /// be found.
    pub fn reveal(&self, element: &E) -> bool {
        let (found, _) = self.run("reveal", |state, session| state.reveal(session, element));
        found
    }

    pub fn find_node_by_path(&self, path: &TreePath<E>) -> Option<NodeId> {
        self.read(|state| state.find_node_by_path(path))
    }

    pub fn tree_path(&self, node: NodeId) -> Option<TreePath<E>> {
        self.read(|state| state.tree_path(node))
    }

    // ---- check state ----

    pub fn set_checked(&self, element: &E, checked: bool) -> bool {
        self.run("set_checked", |state, session| {
            state.set_checked(session, element, checked)
        })
        .0
    }

    pub fn is_checked(&self, element: &E) -> bool {
        self.read(|state| state.is_checked(element))
    }

    pub fn checked_elements(&self) -> Vec<E> {
        self.read(|state| state.checked_elements())
    }

    pub fn set_checked_elements(&self, elements: &[E]) -> ChangeReport {
        self.mutate("set_checked_elements", |state, session| {
            state.set_marked_elements(session, elements, false)
        })
    }

    pub fn set_grayed(&self, element: &E, grayed: bool) -> bool {
        self.run("set_grayed", |state, session| {
            state.set_grayed(session, element, grayed)
        })
        .0
    }

    pub fn is_grayed(&self, element: &E) -> bool {
        self.read(|state| state.is_grayed(element))
    }

    pub fn grayed_elements(&self) -> Vec<E> {
        self.read(|state| state.grayed_elements())
    }

    pub fn set_grayed_elements(&self, elements: &[E]) -> ChangeReport {
        self.mutate("set_grayed_elements", |state, session| {
            state.set_marked_elements(session, elements, true)
        })
    }

    pub fn set_all_checked(&self, checked: bool) -> ChangeReport {
        self.mutate("set_all_checked", |state, _| state.set_all_checked(checked))
    }

    pub fn set_subtree_checked(&self, element: &E, checked: bool) -> bool {
        self.run("set_subtree_checked", |state, session| {
            state.set_subtree_checked(session, element, checked)
        })
        .0
    }

    // ---- virtual mode ----

    pub fn set_item_count(&self, count: usize) -> ChangeReport {
        self.mutate("set_item_count", |state, session| {
            state.set_count(session, None, count)
        })
    }

    pub fn set_child_count(&self, parent: &E, count: usize) -> ChangeReport {
        self.mutate("set_child_count", |state, session| {
            state.set_count(session, Some(parent), count)
        })
    }

    /// Number of children of `parent` (`None`: the top level); in virtual
    /// mode the declared count.
    pub fn item_count(&self, parent: Option<&E>) -> usize {
        self.read(|state| state.item_count(parent))
    }

    /// Supplies the element at `index` below `parent` and materializes its
    /// node.
    pub fn replace(&self, parent: Option<&E>, index: usize, element: E) -> ChangeReport {
        if self.is_busy() {
            self.inner.deferred.borrow_mut().push_back(Deferred::Replace {
                parent: parent.cloned(),
                index,
                element,
            });
            return ChangeReport::deferred();
        }
        self.mutate("replace", |state, session| {
            state.replace(session, parent, index, &element)
        })
    }

    pub fn clear_index(&self, parent: Option<&E>, index: usize) -> ChangeReport {
        self.mutate("clear_index", |state, session| {
            state.clear_index(session, parent, index)
        })
    }

    /// Resolves the indices in `range` below `parent`, which are about to
    /// become visible.
    pub fn materialize(&self, parent: Option<&E>, range: Range<usize>) -> ChangeReport {
        if self.is_busy() {
            self.inner.deferred.borrow_mut().push_back(Deferred::Materialize {
                parent: parent.cloned(),
                range,
            });
            return ChangeReport::deferred();
        }
        self.mutate("materialize", |state, session| {
            state.materialize(session, parent, range)
        })
    }

    /// Virtual indices whose resolution is still pending.
    pub fn pending_indices(&self) -> Vec<(crate::ParentKey, usize)> {
        self.read(|state| state.lazy.pending().to_vec())
    }

    // ---- lookups ----

    pub fn find_nodes(&self, element: &E) -> Vec<NodeId> {
        self.read(|state| state.nodes_for(element))
    }

    pub fn find_node(&self, element: &E) -> Option<NodeId> {
        self.find_nodes(element).first().copied()
    }

    pub fn node_element(&self, node: NodeId) -> Option<E> {
        self.read(|state| state.nodes.element(node).cloned())
    }

    /// Runs `inspect` against the node collection; `None` while busy.
    pub fn with_nodes<R>(&self, inspect: impl FnOnce(&dyn NodeCollection<E>) -> R) -> Option<R> {
        self.inner
            .state
            .try_borrow()
            .ok()
            .map(|state| inspect(state.nodes.as_ref()))
    }

    /// Every `(element, nodes)` pair of the registry.
    pub fn registry_entries(&self) -> Vec<(E, Vec<NodeId>)> {
        self.read(|state| state.registry.entries())
    }
}
