#![doc = r"Element/node reconciliation engine behind list, table and tree viewers."]

pub mod collections;
pub mod element;
pub mod lazy;
pub mod node;
pub mod pipeline;
pub mod providers;
pub mod reconcile;
pub mod registry;
pub mod session;
pub mod state;
pub mod tree_path;
pub mod viewer;

mod structure;
mod tree;

#[cfg(test)]
mod fixtures;

pub use element::{
    hash_one, same_elements, DefaultEquivalence, Element, ElementSet, EquivalenceStrategy,
    FnEquivalence, SharedEquivalence,
};
pub use lazy::{LazyController, ParentKey};
pub use node::{CollectionKind, NodeCollection};
pub use pipeline::SortFilterPipeline;
pub use providers::{
    AssociationListener, CallbackError, Comparator, ContentProvider, DebugLabels, Filter,
    FnFilter, ImageRef, InvalidSelectionHandler, Label, LabelProvider, LazyContentProvider,
    Resolution, SelectionListener,
};
pub use reconcile::Reconciler;
pub use registry::{Association, ElementRegistry, RegistryMode};
pub use session::{BusyFlag, ChangeReport, Notification, ReconcileSession};
pub use state::{CheckSnapshot, SelectionSnapshot};
pub use tree::ALL_LEVELS;
pub use tree_path::TreePath;
pub use viewer::{Viewer, ViewerOptions};

use std::fmt;

pub type NodeId = usize;

/// Failures reported by a [`NodeCollection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Missing { id: NodeId },
    IndexOutOfBounds { index: usize, len: usize },
    NotHierarchical,
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Missing { id } => write!(f, "node {id} missing"),
            NodeError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for {len} nodes")
            }
            NodeError::NotHierarchical => write!(f, "collection has no nested nodes"),
        }
    }
}

impl std::error::Error for NodeError {}

/// Caller or bookkeeping bugs. These are never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    DisassociateUnmapped { node: NodeId },
    DuplicateElement { node: NodeId, existing: NodeId },
    ReentrantMutation { operation: &'static str },
    MissingContentProvider,
    VirtualModeRequired,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvariantViolation::DisassociateUnmapped { node } => {
                write!(f, "node {node} has no element to disassociate")
            }
            InvariantViolation::DuplicateElement { node, existing } => write!(
                f,
                "element of node {node} is already shown by node {existing} and the registry is single-valued"
            ),
            InvariantViolation::ReentrantMutation { operation } => {
                write!(f, "`{operation}` called while a reconciliation is in progress")
            }
            InvariantViolation::MissingContentProvider => {
                write!(f, "no content provider set")
            }
            InvariantViolation::VirtualModeRequired => {
                write!(f, "operation requires a viewer in virtual mode")
            }
        }
    }
}

impl std::error::Error for InvariantViolation {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerError {
    Node(NodeError),
    Invariant(InvariantViolation),
}

impl fmt::Display for ViewerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewerError::Node(err) => write!(f, "node error: {err}"),
            ViewerError::Invariant(err) => write!(f, "invariant violation: {err}"),
        }
    }
}

impl std::error::Error for ViewerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ViewerError::Node(err) => Some(err),
            ViewerError::Invariant(err) => Some(err),
        }
    }
}

impl From<NodeError> for ViewerError {
    fn from(err: NodeError) -> Self {
        ViewerError::Node(err)
    }
}

impl From<InvariantViolation> for ViewerError {
    fn from(err: InvariantViolation) -> Self {
        ViewerError::Invariant(err)
    }
}
