//! Lazy materialization for virtual collections.
//!
//! A virtual parent only declares how many children it has. Nodes are created
//! and bound when the index becomes visible ([`LazyController::materialize`]),
//! either from a cache filled by an eager refresh or by asking a
//! [`LazyContentProvider`]. Materialized nodes keep the order of their
//! indices, so the node position of index `i` is the number of materialized
//! indices before it.

use std::ops::Range;

use crate::collections::map::HashMap;
use crate::element::{Element, EquivalenceStrategy};
use crate::providers::{LazyContentProvider, Resolution};
use crate::reconcile::Reconciler;
use crate::{NodeError, NodeId, ViewerError};

/// Parent of a virtual child list; `None` is the top level.
pub type ParentKey = Option<NodeId>;

#[derive(Debug)]
struct Slot<E> {
    node: Option<NodeId>,
    cached: Option<E>,
}

impl<E> Slot<E> {
    fn empty() -> Self {
        Self {
            node: None,
            cached: None,
        }
    }
}

#[derive(Debug)]
struct Slots<E> {
    entries: Vec<Slot<E>>,
    /// Filled from the full sorted list of an eager provider. Such a cache is
    /// authoritative and survives index shifts; a lazily resolved one does not.
    eager: bool,
}

impl<E> Default for Slots<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            eager: false,
        }
    }
}

impl<E> Slots<E> {
    fn position_of(&self, index: usize) -> usize {
        self.entries[..index.min(self.entries.len())]
            .iter()
            .filter(|slot| slot.node.is_some())
            .count()
    }
}

pub struct LazyController<E> {
    parents: HashMap<ParentKey, Slots<E>>,
    /// Indices whose resolution came back pending, retried on the next pass.
    pending: Vec<(ParentKey, usize)>,
}

impl<E> Default for LazyController<E> {
    fn default() -> Self {
        Self {
            parents: HashMap::new(),
            pending: Vec::new(),
        }
    }
}

impl<E: Element> LazyController<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, parent: ParentKey) -> usize {
        self.parents
            .get(&parent)
            .map_or(0, |slots| slots.entries.len())
    }

    /// Indices waiting for a retry, in request order.
    pub fn pending(&self) -> &[(ParentKey, usize)] {
        &self.pending
    }

    /// Indices below `parent` that currently have a node.
    pub fn materialized_indices(&self, parent: ParentKey) -> Vec<usize> {
        self.parents.get(&parent).map_or_else(Vec::new, |slots| {
            slots
                .entries
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.node.is_some())
                .map(|(index, _)| index)
                .collect()
        })
    }

    pub fn node_at(&self, parent: ParentKey, index: usize) -> Option<NodeId> {
        self.parents
            .get(&parent)
            .and_then(|slots| slots.entries.get(index))
            .and_then(|slot| slot.node)
    }

    pub fn index_of_node(&self, parent: ParentKey, node: NodeId) -> Option<usize> {
        self.parents
            .get(&parent)?
            .entries
            .iter()
            .position(|slot| slot.node == Some(node))
    }

    /// Cached elements of `parent` with their indices.
    pub fn cached_elements(&self, parent: ParentKey) -> Vec<(usize, E)> {
        self.parents.get(&parent).map_or_else(Vec::new, |slots| {
            slots
                .entries
                .iter()
                .enumerate()
                .filter_map(|(index, slot)| slot.cached.clone().map(|element| (index, element)))
                .collect()
        })
    }

    /// Index of the first cached element equal to `element`.
    pub fn find(
        &self,
        parent: ParentKey,
        element: &E,
        strategy: &dyn EquivalenceStrategy<E>,
    ) -> Option<usize> {
        self.parents.get(&parent)?.entries.iter().position(|slot| {
            slot.cached
                .as_ref()
                .is_some_and(|cached| strategy.equals(cached, element))
        })
    }

    /// Declares `count` children below `parent`. Surplus materialized nodes
    /// are disposed; nothing is resolved.
    pub fn set_count(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        count: usize,
    ) -> Result<(), ViewerError> {
        let slots = self.parents.entry(parent).or_default();
        if count < slots.entries.len() {
            for slot in slots.entries.drain(count..) {
                if let Some(node) = slot.node {
                    reconciler.dispose(node)?;
                }
            }
            self.pending
                .retain(|(key, index)| *key != parent || *index < count);
        } else {
            slots.entries.resize_with(count, Slot::empty);
        }
        Ok(())
    }

    /// Replaces the cache of `parent` with the full sorted child list of an
    /// eager provider and declares its length as the count. Nodes are left
    /// alone; callers invalidate them.
    pub fn cache_elements(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        elements: Vec<E>,
    ) -> Result<(), ViewerError> {
        self.set_count(reconciler, parent, elements.len())?;
        let slots = self.parents.entry(parent).or_default();
        slots.eager = true;
        for (slot, element) in slots.entries.iter_mut().zip(elements) {
            slot.cached = Some(element);
        }
        Ok(())
    }

    /// Drops what is known about indices `from..` of `parent`: their nodes
    /// are emptied (but kept) and lazily resolved cache entries are
    /// forgotten. Used when the whole child list may have changed.
    pub fn invalidate_from(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        from: usize,
    ) -> Result<(), ViewerError> {
        let Some(slots) = self.parents.get_mut(&parent) else {
            return Ok(());
        };
        for slot in slots.entries.iter_mut().skip(from) {
            if let Some(node) = slot.node {
                reconciler.clear_node(node)?;
            }
        }
        self.forget_cached_from(parent, from);
        Ok(())
    }

    /// Forgets lazily resolved cache entries of indices `from..`. Node
    /// bindings stay: slots shift together with the model, so a bound node
    /// still shows the element at its new index.
    fn forget_cached_from(&mut self, parent: ParentKey, from: usize) {
        let Some(slots) = self.parents.get_mut(&parent) else {
            return;
        };
        if slots.eager {
            return;
        }
        for slot in slots.entries.iter_mut().skip(from) {
            slot.cached = None;
        }
    }

    /// Resolves and binds every unresolved index of `range` below `parent`,
    /// retrying pending indices of the same parent first.
    pub fn materialize(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        parent_element: Option<&E>,
        range: Range<usize>,
        provider: Option<&dyn LazyContentProvider<E>>,
    ) -> Result<(), ViewerError> {
        let (retry, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(key, _)| *key == parent);
        self.pending = keep;
        let end = range.end.min(self.count(parent));
        let indices = retry
            .into_iter()
            .map(|(_, index)| index)
            .filter(|index| !range.contains(index))
            .chain(range.start..end);
        for index in indices.collect::<Vec<_>>() {
            self.resolve_index(reconciler, parent, parent_element, index, provider)?;
        }
        Ok(())
    }

    fn resolve_index(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        parent_element: Option<&E>,
        index: usize,
        provider: Option<&dyn LazyContentProvider<E>>,
    ) -> Result<(), ViewerError> {
        let Some(slot) = self
            .parents
            .get(&parent)
            .and_then(|slots| slots.entries.get(index))
        else {
            return Ok(());
        };
        if slot
            .node
            .is_some_and(|node| reconciler.nodes().element(node).is_some())
        {
            return Ok(());
        }
        let resolved = match (&slot.cached, provider, parent_element) {
            (Some(cached), _, _) => Some(cached.clone()),
            (None, Some(provider), Some(parent_element)) => {
                match provider.resolve(parent_element, index) {
                    Resolution::Ready(element) => Some(element),
                    Resolution::Pending => None,
                }
            }
            _ => None,
        };
        match resolved {
            Some(element) => self.bind_index(reconciler, parent, index, &element),
            None => {
                log::trace!("index {index} below {parent:?} pending");
                if !self.pending.contains(&(parent, index)) {
                    self.pending.push((parent, index));
                }
                Ok(())
            }
        }
    }

    fn bind_index(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        index: usize,
        element: &E,
    ) -> Result<(), ViewerError> {
        let slots = self.parents.entry(parent).or_default();
        let len = slots.entries.len();
        if index >= len {
            return Err(NodeError::IndexOutOfBounds { index, len }.into());
        }
        let node = match slots.entries[index].node {
            Some(node) => node,
            None => {
                let node = reconciler.create_empty(parent, slots.position_of(index))?;
                slots.entries[index].node = Some(node);
                node
            }
        };
        if slots.eager {
            slots.entries[index].cached = Some(element.clone());
        }
        self.pending
            .retain(|pending| *pending != (parent, index));
        reconciler.refresh_item(node, element)?;
        Ok(())
    }

    /// The model supplies the element at `index` directly.
    pub fn replace(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        index: usize,
        element: &E,
    ) -> Result<(), ViewerError> {
        self.bind_index(reconciler, parent, index, element)
    }

    /// Empties the node at `index` so it is resolved again when next visible.
    pub fn clear_index(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        index: usize,
    ) -> Result<(), ViewerError> {
        if let Some(node) = self.node_at(parent, index) {
            reconciler.clear_node(node)?;
        }
        Ok(())
    }

    /// Removes `index` below `parent`, disposing its node.
    pub fn remove_index(
        &mut self,
        reconciler: &mut Reconciler<'_, '_, E>,
        parent: ParentKey,
        index: usize,
    ) -> Result<(), ViewerError> {
        let Some(slots) = self.parents.get_mut(&parent) else {
            return Ok(());
        };
        if index >= slots.entries.len() {
            return Ok(());
        }
        let slot = slots.entries.remove(index);
        if let Some(node) = slot.node {
            if reconciler.nodes().contains(node) {
                reconciler.dispose(node)?;
            }
        }
        self.pending.retain(|pending| *pending != (parent, index));
        for pending in self.pending.iter_mut() {
            if pending.0 == parent && pending.1 > index {
                pending.1 -= 1;
            }
        }
        self.forget_cached_from(parent, index);
        Ok(())
    }

    /// Adds an element that is not visible yet at `index`, growing the
    /// count by one.
    pub fn insert_cached(&mut self, parent: ParentKey, index: usize, element: E) {
        let slots = self.parents.entry(parent).or_default();
        let index = index.min(slots.entries.len());
        slots.entries.insert(
            index,
            Slot {
                node: None,
                cached: Some(element),
            },
        );
        for pending in self.pending.iter_mut() {
            if pending.0 == parent && pending.1 >= index {
                pending.1 += 1;
            }
        }
    }

    /// Forgets a materialized node without disposing it; used when the node
    /// went away through another path.
    pub fn forget_node(&mut self, node: NodeId) {
        for slots in self.parents.values_mut() {
            for slot in slots.entries.iter_mut() {
                if slot.node == Some(node) {
                    slot.node = None;
                }
            }
        }
    }

    /// Drops the state of parents whose node no longer exists.
    pub fn retain_parents(&mut self, mut live: impl FnMut(NodeId) -> bool) {
        self.parents
            .retain(|parent, _| parent.map_or(true, &mut live));
        let parents = &self.parents;
        self.pending.retain(|(parent, _)| parents.contains_key(parent));
    }

    pub fn clear(&mut self) {
        self.parents.clear();
        self.pending.clear();
    }
}
