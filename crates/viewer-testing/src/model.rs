use std::cell::{Cell, RefCell};
use std::hash::Hash;

use viewer_core::collections::map::{HashMap, HashSet};
use viewer_core::{ContentProvider, Element, LazyContentProvider, Resolution};

type Hook<E> = Box<dyn Fn(&E)>;

/// Mutable parent → children model. The viewer input is just another
/// parent; elements with no entry are leaves.
pub struct TreeModel<E> {
    children: RefCell<HashMap<E, Vec<E>>>,
    fetches: Cell<usize>,
    on_fetch: RefCell<Option<Hook<E>>>,
}

impl<E: Element + Eq + Hash> TreeModel<E> {
    pub fn new() -> Self {
        Self {
            children: RefCell::new(HashMap::new()),
            fetches: Cell::new(0),
            on_fetch: RefCell::new(None),
        }
    }

    pub fn set_children(&self, parent: &E, children: Vec<E>) {
        self.children.borrow_mut().insert(parent.clone(), children);
    }

    pub fn children_of(&self, parent: &E) -> Vec<E> {
        self.children
            .borrow()
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Appends `child` below `parent`.
    pub fn push(&self, parent: &E, child: E) {
        self.children
            .borrow_mut()
            .entry(parent.clone())
            .or_default()
            .push(child);
    }

    /// Removes `child` wherever it appears.
    pub fn remove(&self, child: &E) {
        for children in self.children.borrow_mut().values_mut() {
            children.retain(|candidate| candidate != child);
        }
    }

    /// Number of `children` requests served.
    pub fn fetches(&self) -> usize {
        self.fetches.get()
    }

    /// Runs `hook` on every `children` request, after the model answered it.
    /// Used to re-enter a viewer from inside a reconciliation.
    pub fn on_fetch(&self, hook: impl Fn(&E) + 'static) {
        *self.on_fetch.borrow_mut() = Some(Box::new(hook));
    }
}

impl<E: Element + Eq + Hash> Default for TreeModel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element + Eq + Hash> ContentProvider<E> for TreeModel<E> {
    fn children(&self, parent: &E) -> Vec<E> {
        self.fetches.set(self.fetches.get() + 1);
        let children = self.children_of(parent);
        if let Some(hook) = self.on_fetch.borrow().as_ref() {
            hook(parent);
        }
        children
    }

    fn has_children(&self, element: &E) -> bool {
        self.children
            .borrow()
            .get(element)
            .is_some_and(|children| !children.is_empty())
    }

    fn parent(&self, element: &E) -> Option<E> {
        self.children
            .borrow()
            .iter()
            .find(|(_, children)| children.contains(element))
            .map(|(parent, _)| parent.clone())
    }
}

/// Index-addressed model for virtual viewers. Indices marked with
/// [`LazyModel::hold`] answer [`Resolution::Pending`] until released.
pub struct LazyModel<E> {
    children: RefCell<HashMap<E, Vec<E>>>,
    held: RefCell<HashSet<usize>>,
    resolves: Cell<usize>,
}

impl<E: Element + Eq + Hash> LazyModel<E> {
    pub fn new() -> Self {
        Self {
            children: RefCell::new(HashMap::new()),
            held: RefCell::new(HashSet::new()),
            resolves: Cell::new(0),
        }
    }

    pub fn set_children(&self, parent: &E, children: Vec<E>) {
        self.children.borrow_mut().insert(parent.clone(), children);
    }

    pub fn hold(&self, index: usize) {
        self.held.borrow_mut().insert(index);
    }

    pub fn release(&self, index: usize) {
        self.held.borrow_mut().remove(&index);
    }

    pub fn resolves(&self) -> usize {
        self.resolves.get()
    }
}

impl<E: Element + Eq + Hash> Default for LazyModel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element + Eq + Hash> LazyContentProvider<E> for LazyModel<E> {
    fn child_count(&self, parent: &E) -> usize {
        self.children.borrow().get(parent).map_or(0, Vec::len)
    }

    fn resolve(&self, parent: &E, index: usize) -> Resolution<E> {
        self.resolves.set(self.resolves.get() + 1);
        if self.held.borrow().contains(&index) {
            return Resolution::Pending;
        }
        match self.children.borrow().get(parent).and_then(|children| children.get(index)) {
            Some(element) => Resolution::Ready(element.clone()),
            None => Resolution::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Item;

    #[test]
    fn tree_model_answers_parents_and_children() {
        let model = TreeModel::new();
        let root = Item::new("root");
        let child = Item::new("child");
        model.set_children(&root, vec![child.clone()]);

        assert!(model.has_children(&root));
        assert!(!model.has_children(&child));
        assert_eq!(model.parent(&child), Some(root.clone()));
        assert_eq!(model.children(&root), vec![child]);
        assert_eq!(model.fetches(), 1);
    }

    #[test]
    fn held_indices_are_pending() {
        let model = LazyModel::new();
        let root = Item::new("root");
        model.set_children(&root, Item::many(&["a", "b"]));
        model.hold(1);

        assert_eq!(model.resolve(&root, 0), Resolution::Ready(Item::new("a")));
        assert_eq!(model.resolve(&root, 1), Resolution::Pending);
        model.release(1);
        assert_eq!(model.resolve(&root, 1), Resolution::Ready(Item::new("b")));
    }
}
