#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::{HashMap, HashSet};
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::{HashMap, HashSet};
}

/// Raw table used where the key's own `Hash`/`Eq` must be bypassed in favour of
/// an [`EquivalenceStrategy`](crate::EquivalenceStrategy).
pub mod table {
    pub use hashbrown::hash_table::{Entry, HashTable};
}
