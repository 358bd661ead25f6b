//! Bidirectional element/node bookkeeping.
//!
//! The forward direction (node to element) lives on the nodes themselves via
//! [`NodeCollection::element`]; the registry is the non-owning reverse index
//! from element to the node(s) currently showing it. Lookups hash through the
//! viewer's [`EquivalenceStrategy`], so two distinct instances the strategy
//! deems equal share one entry.

use std::fmt;

use smallvec::SmallVec;

use crate::collections::table::HashTable;
use crate::element::{Element, SharedEquivalence};
use crate::node::NodeCollection;
use crate::{InvariantViolation, NodeId, ViewerError};

/// Whether one element may be shown by several nodes at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistryMode {
    /// At most one node per element. Mapping an element that already has a
    /// live node elsewhere is reported as
    /// [`InvariantViolation::DuplicateElement`].
    #[default]
    Single,
    /// Equal elements in different tree branches each keep their node.
    Multi,
}

type NodeList = SmallVec<[NodeId; 1]>;

struct Entry<E> {
    hash: u64,
    element: E,
    nodes: NodeList,
}

/// Outcome of [`ElementRegistry::associate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// The node had no element before.
    Bound,
    /// The node already held this very instance; only the index was refreshed.
    Refreshed,
    /// The node held another element, which was disassociated first.
    Rebound,
}

pub struct ElementRegistry<E> {
    strategy: SharedEquivalence<E>,
    mode: RegistryMode,
    table: HashTable<Entry<E>>,
}

impl<E: Element> fmt::Debug for ElementRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for entry in self.table.iter() {
            map.entry(&entry.element, &entry.nodes.as_slice());
        }
        map.finish()
    }
}

impl<E: Element> ElementRegistry<E> {
    pub fn new(strategy: SharedEquivalence<E>, mode: RegistryMode) -> Self {
        Self {
            strategy,
            mode,
            table: HashTable::new(),
        }
    }

    pub fn mode(&self) -> RegistryMode {
        self.mode
    }

    pub fn strategy(&self) -> &SharedEquivalence<E> {
        &self.strategy
    }

    /// Number of distinct elements with at least one node.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Nodes currently showing `element`, in association order.
    pub fn lookup(&self, element: &E) -> &[NodeId] {
        let hash = self.strategy.hash(element);
        self.table
            .find(hash, |entry| {
                entry.hash == hash && self.strategy.equals(&entry.element, element)
            })
            .map(|entry| entry.nodes.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, element: &E, node: NodeId) -> bool {
        self.lookup(element).contains(&node)
    }

    /// Node other than `node` that would make mapping `element` a duplicate
    /// in single-valued mode.
    pub fn conflict(&self, element: &E, node: NodeId) -> Option<NodeId> {
        if self.mode == RegistryMode::Multi {
            return None;
        }
        self.lookup(element)
            .iter()
            .copied()
            .find(|existing| *existing != node)
    }

    /// Records `element -> node`. The stored key is replaced by `element` so
    /// that later lookups hand out the newest instance.
    pub fn map(&mut self, element: &E, node: NodeId) -> Result<(), InvariantViolation> {
        if let Some(existing) = self.conflict(element, node) {
            return Err(InvariantViolation::DuplicateElement { node, existing });
        }
        let hash = self.strategy.hash(element);
        let strategy = &self.strategy;
        match self.table.find_mut(hash, |entry| {
            entry.hash == hash && strategy.equals(&entry.element, element)
        }) {
            Some(entry) => {
                entry.element = element.clone();
                if !entry.nodes.contains(&node) {
                    entry.nodes.push(node);
                }
            }
            None => {
                let mut nodes = NodeList::new();
                nodes.push(node);
                self.table.insert_unique(
                    hash,
                    Entry {
                        hash,
                        element: element.clone(),
                        nodes,
                    },
                    |entry| entry.hash,
                );
            }
        }
        Ok(())
    }

    /// Removes `element -> node`; returns `false` if that pair was not mapped.
    pub fn unmap(&mut self, element: &E, node: NodeId) -> bool {
        let hash = self.strategy.hash(element);
        let strategy = &self.strategy;
        let Ok(mut occupied) = self.table.find_entry(hash, |entry| {
            entry.hash == hash && strategy.equals(&entry.element, element)
        }) else {
            return false;
        };
        let nodes = &mut occupied.get_mut().nodes;
        let Some(position) = nodes.iter().position(|candidate| *candidate == node) else {
            return false;
        };
        nodes.remove(position);
        if nodes.is_empty() {
            occupied.remove();
        }
        true
    }

    /// Forgets every association. Nodes keep their elements; callers that do
    /// not dispose the nodes afterwards must re-associate them.
    pub fn clear_all(&mut self) {
        self.table.clear();
    }

    /// Binds `node` to `element`, disassociating its previous element first
    /// when it held a different instance.
    pub fn associate(
        &mut self,
        nodes: &mut dyn NodeCollection<E>,
        element: E,
        node: NodeId,
    ) -> Result<Association, ViewerError> {
        let previous = nodes.element(node).cloned();
        if let Some(current) = &previous {
            if current.same_instance(&element) {
                self.map(&element, node)?;
                return Ok(Association::Refreshed);
            }
        }
        if let Some(existing) = self.conflict(&element, node) {
            return Err(InvariantViolation::DuplicateElement { node, existing }.into());
        }
        let outcome = if previous.is_some() {
            self.disassociate(nodes, node)?;
            Association::Rebound
        } else {
            Association::Bound
        };
        nodes.set_element(node, Some(element.clone()))?;
        self.map(&element, node)?;
        Ok(outcome)
    }

    /// Swaps the element of `node` for an equivalent instance without
    /// touching its visual state.
    pub fn reassociate(
        &mut self,
        nodes: &mut dyn NodeCollection<E>,
        element: E,
        node: NodeId,
    ) -> Result<(), ViewerError> {
        if let Some(previous) = nodes.element(node).cloned() {
            self.unmap(&previous, node);
        }
        nodes.set_element(node, Some(element.clone()))?;
        self.map(&element, node)?;
        Ok(())
    }

    /// Clears the element of `node` and removes its reverse entry.
    ///
    /// Disassociating a node without an element means the caller's
    /// bookkeeping is off and is reported, not ignored.
    pub fn disassociate(
        &mut self,
        nodes: &mut dyn NodeCollection<E>,
        node: NodeId,
    ) -> Result<E, ViewerError> {
        let element = nodes
            .element(node)
            .cloned()
            .ok_or(InvariantViolation::DisassociateUnmapped { node })?;
        self.unmap(&element, node);
        nodes.set_element(node, None)?;
        Ok(element)
    }

    /// Rebuilds the index from the live nodes under a new strategy.
    pub fn rebuild(&mut self, strategy: SharedEquivalence<E>, nodes: &dyn NodeCollection<E>) {
        self.strategy = strategy;
        self.table.clear();
        let mut live = Vec::new();
        crate::node::walk_preorder(nodes, None, &mut |node| live.push(node));
        for node in live {
            if let Some(element) = nodes.element(node) {
                if let Err(err) = self.map(element, node) {
                    log::warn!("registry rebuild skipped {element:?}: {err}");
                }
            }
        }
    }

    /// Snapshot of every `(element, nodes)` pair; test and debug aid.
    pub fn entries(&self) -> Vec<(E, Vec<NodeId>)> {
        self.table
            .iter()
            .map(|entry| (entry.element.clone(), entry.nodes.to_vec()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::DefaultEquivalence;
    use crate::fixtures::Rows;
    use std::rc::Rc;

    fn registry(mode: RegistryMode) -> ElementRegistry<&'static str> {
        ElementRegistry::new(Rc::new(DefaultEquivalence), mode)
    }

    #[test]
    fn single_mode_maps_one_node() {
        let mut registry = registry(RegistryMode::Single);
        registry.map(&"a", 1).expect("first mapping");
        assert_eq!(registry.lookup(&"a"), &[1]);
        registry.map(&"a", 1).expect("remapping the same node");
        assert_eq!(registry.lookup(&"a"), &[1]);
    }

    #[test]
    fn single_mode_flags_duplicates() {
        let mut registry = registry(RegistryMode::Single);
        registry.map(&"a", 1).expect("first mapping");
        let err = registry.map(&"a", 2).expect_err("duplicate must be flagged");
        assert_eq!(err, InvariantViolation::DuplicateElement { node: 2, existing: 1 });
        assert_eq!(registry.lookup(&"a"), &[1]);
    }

    #[test]
    fn multi_mode_keeps_association_order() {
        let mut registry = registry(RegistryMode::Multi);
        registry.map(&"a", 3).expect("map");
        registry.map(&"a", 1).expect("map");
        registry.map(&"a", 3).expect("map");
        assert_eq!(registry.lookup(&"a"), &[3, 1]);
        assert!(registry.unmap(&"a", 3));
        assert_eq!(registry.lookup(&"a"), &[1]);
        assert!(registry.unmap(&"a", 1));
        assert!(registry.is_empty());
    }

    #[test]
    fn unmap_of_foreign_node_is_ignored() {
        let mut registry = registry(RegistryMode::Single);
        registry.map(&"a", 1).expect("map");
        assert!(!registry.unmap(&"a", 2));
        assert!(!registry.unmap(&"b", 1));
        assert_eq!(registry.lookup(&"a"), &[1]);
    }

    #[test]
    fn disassociating_an_elementless_node_is_reported() {
        let mut registry = registry(RegistryMode::Single);
        let mut rows = Rows::default();
        let node = rows.create(None, 0).expect("create");

        let err = registry
            .disassociate(&mut rows, node)
            .expect_err("no element to disassociate");

        assert_eq!(
            err,
            ViewerError::Invariant(InvariantViolation::DisassociateUnmapped { node })
        );
        assert!(registry.is_empty());
    }
}
