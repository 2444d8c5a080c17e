//! Typed event channels
//!
//! Each component owns an `EventEmitter` over its own event enum. Listeners
//! are plain closures; `subscribe` hands back a `Subscription` that removes
//! exactly that listener again.
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use synckit_collab::events::EventEmitter;
//!
//! let mut emitter = EventEmitter::<u32>::new();
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let sink = seen.clone();
//! let subscription = emitter.subscribe(move |value| sink.borrow_mut().push(*value));
//!
//! emitter.emit(&1);
//! emitter.unsubscribe(subscription);
//! emitter.emit(&2);
//!
//! assert_eq!(*seen.borrow(), vec![1]);
//! ```

use std::fmt;

type Listener<E> = Box<dyn FnMut(&E)>;

/// Handle returned by [`EventEmitter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the listener impossible to remove"]
pub struct Subscription(u64);

/// Listener registry for one event type
pub struct EventEmitter<E> {
    listeners: Vec<(Subscription, Listener<E>)>,
    next_id: u64,
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener
    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> Subscription {
        self.next_id += 1;
        let subscription = Subscription(self.next_id);
        self.listeners.push((subscription, Box::new(listener)));
        subscription
    }

    /// Remove a listener; returns false if it was already removed
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != subscription);
        self.listeners.len() != before
    }

    /// Deliver an event to every listener, in subscription order
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventEmitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
