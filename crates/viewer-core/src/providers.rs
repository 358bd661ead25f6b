//! Collaborator contracts: content, labels, ordering and filtering.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::tree_path::TreePath;

/// Error type of fallible collaborators. Never propagated by the viewer;
/// failures are logged at the call site and the pass continues.
pub type CallbackError = Box<dyn std::error::Error>;

/// Eager content: the full child list of a parent element.
pub trait ContentProvider<E> {
    /// Children of `parent`; for the top level `parent` is the viewer input.
    fn children(&self, parent: &E) -> Vec<E>;

    fn has_children(&self, element: &E) -> bool {
        !self.children(element).is_empty()
    }

    /// Parent of `element` in the model, used to reveal and expand ancestors.
    fn parent(&self, _element: &E) -> Option<E> {
        None
    }
}

/// Result of a lazy resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<E> {
    Ready(E),
    /// The model cannot answer synchronously; the request is retried on the
    /// next visibility pass unless the model calls `replace` first.
    Pending,
}

/// Lazy content for virtual collections: counts up front, elements on demand.
pub trait LazyContentProvider<E> {
    fn child_count(&self, parent: &E) -> usize;

    fn resolve(&self, parent: &E, index: usize) -> Resolution<E>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef(pub Rc<str>);

impl ImageRef {
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }
}

/// Visual state applied to a node. `columns` holds per-column text for
/// tables; lists and trees only read `text`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Label {
    pub text: String,
    pub image: Option<ImageRef>,
    pub columns: Vec<String>,
}

impl Label {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            f.write_str(&self.text)
        } else {
            f.write_str(&self.columns.join(" | "))
        }
    }
}

pub trait LabelProvider<E> {
    fn text(&self, element: &E) -> Result<String, CallbackError>;

    fn image(&self, _element: &E) -> Option<ImageRef> {
        None
    }

    fn column_text(&self, element: &E, column: usize) -> Result<String, CallbackError> {
        if column == 0 {
            self.text(element)
        } else {
            Ok(String::new())
        }
    }

    /// Whether a change to `property` affects the label of `element`.
    fn is_label_property(&self, _element: &E, _property: &str) -> bool {
        true
    }
}

/// Falls back to the element's `Debug` form.
#[derive(Debug, Default, Clone, Copy)]
pub struct DebugLabels;

impl<E: fmt::Debug> LabelProvider<E> for DebugLabels {
    fn text(&self, element: &E) -> Result<String, CallbackError> {
        Ok(format!("{element:?}"))
    }
}

/// Total order over sibling elements. `parent` is the path of the common
/// parent (empty for the top level).
pub trait Comparator<E> {
    fn compare(&self, parent: &TreePath<E>, a: &E, b: &E) -> Ordering;

    /// Whether a change to `property` may change the position of `element`.
    fn is_sorter_property(&self, _element: &E, _property: &str) -> bool {
        false
    }
}

impl<E, F> Comparator<E> for F
where
    F: Fn(&E, &E) -> Ordering,
{
    fn compare(&self, _parent: &TreePath<E>, a: &E, b: &E) -> Ordering {
        self(a, b)
    }
}

pub trait Filter<E> {
    fn select(&self, parent: &TreePath<E>, element: &E) -> Result<bool, CallbackError>;

    /// Whether a change to `property` may change whether `element` is selected.
    fn is_filter_property(&self, _element: &E, _property: &str) -> bool {
        false
    }
}

/// Filter built from a predicate closure.
pub struct FnFilter<F> {
    predicate: F,
    properties: Vec<&'static str>,
}

impl<F> FnFilter<F> {
    pub fn new(predicate: F) -> Self {
        Self {
            predicate,
            properties: Vec::new(),
        }
    }

    /// Declares the properties whose change requires refiltering.
    pub fn with_properties(mut self, properties: &[&'static str]) -> Self {
        self.properties.extend_from_slice(properties);
        self
    }
}

impl<E, F> Filter<E> for FnFilter<F>
where
    F: Fn(&TreePath<E>, &E) -> bool,
{
    fn select(&self, parent: &TreePath<E>, element: &E) -> Result<bool, CallbackError> {
        Ok((self.predicate)(parent, element))
    }

    fn is_filter_property(&self, _element: &E, property: &str) -> bool {
        self.properties.contains(&property)
    }
}

/// Observer of registry bookkeeping.
pub trait AssociationListener<E> {
    fn associated(&mut self, _element: &E, _node: crate::NodeId) -> Result<(), CallbackError> {
        Ok(())
    }

    fn disassociated(&mut self, _node: crate::NodeId) -> Result<(), CallbackError> {
        Ok(())
    }

    /// `element` was dropped by a filter and will never get a node.
    fn filtered_out(&mut self, _element: &E) -> Result<(), CallbackError> {
        Ok(())
    }
}

pub type SelectionListener<E> = Box<dyn FnMut(&[E]) -> Result<(), CallbackError>>;

/// Receives `(previous, restored)` when a preserved selection could not be
/// fully restored. Returning `Some` replaces the restored selection.
pub type InvalidSelectionHandler<E> = Box<dyn FnMut(&[E], &[E]) -> Option<Vec<E>>>;
