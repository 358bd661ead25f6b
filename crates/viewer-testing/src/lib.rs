//! Fixtures for exercising viewers headlessly: an element type whose
//! identity differs from its equality, in-memory models and a recorder for
//! listener traffic.

mod item;
mod labels;
mod model;
mod recorder;

pub use item::Item;
pub use labels::ItemLabels;
pub use model::{LazyModel, TreeModel};
pub use recorder::{Event, EventRecorder};

pub mod prelude {
    pub use crate::{Event, EventRecorder, Item, ItemLabels, LazyModel, TreeModel};
}
