use std::cell::RefCell;
use std::rc::Rc;

use viewer_core::{AssociationListener, CallbackError, NodeId, SelectionListener};

/// Listener traffic, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event<E> {
    Associated(E, NodeId),
    Disassociated(NodeId),
    FilteredOut(E),
    Selection(Vec<E>),
}

/// Records what a viewer tells its listeners. Clones share the log.
pub struct EventRecorder<E> {
    events: Rc<RefCell<Vec<Event<E>>>>,
}

impl<E> Clone for EventRecorder<E> {
    fn clone(&self) -> Self {
        Self {
            events: Rc::clone(&self.events),
        }
    }
}

impl<E: Clone + 'static> EventRecorder<E> {
    pub fn new() -> Self {
        Self {
            events: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn events(&self) -> Vec<Event<E>> {
        self.events.borrow().clone()
    }

    /// Returns the recorded events and starts over.
    pub fn take(&self) -> Vec<Event<E>> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn selections(&self) -> Vec<Vec<E>> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Selection(selection) => Some(selection.clone()),
                _ => None,
            })
            .collect()
    }

    /// A selection listener feeding this recorder.
    pub fn selection_listener(&self) -> SelectionListener<E> {
        let events = Rc::clone(&self.events);
        Box::new(move |selection: &[E]| {
            events.borrow_mut().push(Event::Selection(selection.to_vec()));
            Ok(())
        })
    }

    /// An association listener feeding this recorder.
    pub fn association_listener(&self) -> Box<dyn AssociationListener<E>> {
        Box::new(self.clone())
    }
}

impl<E: Clone + 'static> Default for EventRecorder<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Clone> AssociationListener<E> for EventRecorder<E> {
    fn associated(&mut self, element: &E, node: NodeId) -> Result<(), CallbackError> {
        self.events
            .borrow_mut()
            .push(Event::Associated(element.clone(), node));
        Ok(())
    }

    fn disassociated(&mut self, node: NodeId) -> Result<(), CallbackError> {
        self.events.borrow_mut().push(Event::Disassociated(node));
        Ok(())
    }

    fn filtered_out(&mut self, element: &E) -> Result<(), CallbackError> {
        self.events
            .borrow_mut()
            .push(Event::FilteredOut(element.clone()));
        Ok(())
    }
}
