//! Element identity: the [`Element`] trait, pluggable [`EquivalenceStrategy`]
//! and the strategy-aware [`ElementSet`].
//!
//! Two notions of "same" are kept apart on purpose. *Instance identity*
//! ([`Element::same_instance`]) answers whether two handles point at the very
//! same model object. *Equivalence* is decided by the viewer's strategy and may
//! treat distinct instances as one element. Reconciliation uses both: an
//! identical element needs no bookkeeping, an equivalent one is re-associated
//! in place, anything else is rebound.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use crate::collections::table::HashTable;

#[cfg(feature = "std-hash")]
mod default_hasher {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
mod default_hasher {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hash a single value with whichever default hasher is active.
#[inline]
pub fn hash_one<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut h = default_hasher::new();
    v.hash(&mut h);
    h.finish()
}

/// A model value displayed by one or more nodes.
///
/// The viewer never owns the model; it only keeps cheap clones of element
/// handles, so implementors are expected to be handles (`Rc`, `Arc`, ids) or
/// small values.
pub trait Element: Clone + fmt::Debug + 'static {
    /// Returns `true` when `self` and `other` are the very same model instance.
    fn same_instance(&self, other: &Self) -> bool;
}

impl<T: fmt::Debug + ?Sized + 'static> Element for Rc<T> {
    fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(self, other)
    }
}

impl<T: fmt::Debug + ?Sized + 'static> Element for Arc<T> {
    fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

macro_rules! value_elements {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Element for $ty {
                #[inline]
                fn same_instance(&self, other: &Self) -> bool {
                    self == other
                }
            }
        )*
    };
}

value_elements!(
    &'static str,
    String,
    char,
    bool,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize
);

/// Equality and hashing policy used wherever element identity matters:
/// registry lookups, diffing, selection matching, expansion and check state.
///
/// `hash` must be consistent with `equals`.
pub trait EquivalenceStrategy<E> {
    fn equals(&self, a: &E, b: &E) -> bool;
    fn hash(&self, element: &E) -> u64;
}

/// Value equality through the element's own `Eq` and `Hash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEquivalence;

impl<E: Eq + Hash> EquivalenceStrategy<E> for DefaultEquivalence {
    fn equals(&self, a: &E, b: &E) -> bool {
        a == b
    }

    fn hash(&self, element: &E) -> u64 {
        hash_one(element)
    }
}

/// Strategy built from a pair of closures.
pub struct FnEquivalence<E> {
    equals: Box<dyn Fn(&E, &E) -> bool>,
    hash: Box<dyn Fn(&E) -> u64>,
}

impl<E> FnEquivalence<E> {
    pub fn new(
        equals: impl Fn(&E, &E) -> bool + 'static,
        hash: impl Fn(&E) -> u64 + 'static,
    ) -> Self {
        Self {
            equals: Box::new(equals),
            hash: Box::new(hash),
        }
    }
}

impl<E> EquivalenceStrategy<E> for FnEquivalence<E> {
    fn equals(&self, a: &E, b: &E) -> bool {
        (self.equals)(a, b)
    }

    fn hash(&self, element: &E) -> u64 {
        (self.hash)(element)
    }
}

pub type SharedEquivalence<E> = Rc<dyn EquivalenceStrategy<E>>;

/// Set of elements keyed by an [`EquivalenceStrategy`] instead of the
/// elements' own `Hash`/`Eq`.
pub struct ElementSet<E> {
    strategy: SharedEquivalence<E>,
    table: HashTable<(u64, E)>,
}

impl<E: Element> ElementSet<E> {
    pub fn new(strategy: SharedEquivalence<E>) -> Self {
        Self {
            strategy,
            table: HashTable::new(),
        }
    }

    pub fn from_elements<'a>(
        strategy: SharedEquivalence<E>,
        elements: impl IntoIterator<Item = &'a E>,
    ) -> Self {
        let mut set = Self::new(strategy);
        for element in elements {
            set.insert(element.clone());
        }
        set
    }

    /// Inserts `element`; returns `false` if an equivalent element was present.
    pub fn insert(&mut self, element: E) -> bool {
        let hash = self.strategy.hash(&element);
        let strategy = &self.strategy;
        if self
            .table
            .find(hash, |(h, existing)| *h == hash && strategy.equals(existing, &element))
            .is_some()
        {
            return false;
        }
        self.table
            .insert_unique(hash, (hash, element), |(h, _)| *h);
        true
    }

    pub fn contains(&self, element: &E) -> bool {
        let hash = self.strategy.hash(element);
        self.table
            .find(hash, |(h, existing)| {
                *h == hash && self.strategy.equals(existing, element)
            })
            .is_some()
    }

    pub fn remove(&mut self, element: &E) -> bool {
        let hash = self.strategy.hash(element);
        let strategy = &self.strategy;
        match self
            .table
            .find_entry(hash, |(h, existing)| *h == hash && strategy.equals(existing, element))
        {
            Ok(entry) => {
                entry.remove();
                true
            }
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.table.iter().map(|(_, element)| element)
    }
}

impl<E: Element> fmt::Debug for ElementSet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Compares two element sequences position by position under `strategy`.
pub fn same_elements<E>(strategy: &dyn EquivalenceStrategy<E>, a: &[E], b: &[E]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| strategy.equals(x, y))
}
