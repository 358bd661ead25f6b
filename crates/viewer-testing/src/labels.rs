use std::cell::{Cell, RefCell};

use viewer_core::{CallbackError, LabelProvider};

use crate::Item;

/// Labels items by caption; column `n` reads `caption/n`. Text requests
/// are counted, and items named in [`ItemLabels::fail_for`] fail.
#[derive(Default)]
pub struct ItemLabels {
    calls: Cell<usize>,
    failing: RefCell<Vec<String>>,
}

impl ItemLabels {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn reset_calls(&self) {
        self.calls.set(0);
    }

    pub fn fail_for(&self, name: &str) {
        self.failing.borrow_mut().push(name.to_string());
    }
}

impl LabelProvider<Item> for ItemLabels {
    fn text(&self, element: &Item) -> Result<String, CallbackError> {
        self.calls.set(self.calls.get() + 1);
        if self.failing.borrow().iter().any(|name| name == element.name()) {
            return Err(format!("no label for {}", element.name()).into());
        }
        Ok(element.caption())
    }

    fn column_text(&self, element: &Item, column: usize) -> Result<String, CallbackError> {
        if column == 0 {
            return self.text(element);
        }
        Ok(format!("{}/{column}", element.caption()))
    }

    fn is_label_property(&self, _element: &Item, property: &str) -> bool {
        property == "caption"
    }
}
