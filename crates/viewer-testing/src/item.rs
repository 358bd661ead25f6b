use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use viewer_core::Element;

struct ItemData {
    name: String,
    caption: RefCell<String>,
}

/// A model object compared by name. Two items created with the same name
/// are equal but are not the same instance, which is what reassociation is
/// about.
#[derive(Clone)]
pub struct Item(Rc<ItemData>);

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self(Rc::new(ItemData {
            caption: RefCell::new(name.clone()),
            name,
        }))
    }

    /// Items for each name, in order.
    pub fn many(names: &[&str]) -> Vec<Item> {
        names.iter().map(|name| Item::new(*name)).collect()
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Displayed text, initially the name.
    pub fn caption(&self) -> String {
        self.0.caption.borrow().clone()
    }

    /// Changes the `caption` property. Equality is unaffected.
    pub fn set_caption(&self, caption: impl Into<String>) {
        *self.0.caption.borrow_mut() = caption.into();
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for Item {}

impl Hash for Item {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl PartialOrd for Item {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Item {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl Element for Item {
    fn same_instance(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_items_are_distinct_instances() {
        let a = Item::new("a");
        let again = Item::new("a");
        assert_eq!(a, again);
        assert!(!a.same_instance(&again));
        assert!(a.same_instance(&a.clone()));
    }

    #[test]
    fn caption_does_not_affect_equality() {
        let a = Item::new("a");
        a.set_caption("Alpha");
        assert_eq!(a.caption(), "Alpha");
        assert_eq!(a, Item::new("a"));
    }
}
