//! Named-event emitter with snapshot dispatch.

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Handle returned by every subscription; used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<T> = Rc<dyn Fn(&T)>;

struct Registration<T> {
    id: ListenerId,
    event: String,
    once: bool,
    listener: Listener<T>,
}

/// Notification channel contract implemented by every model type and
/// instance channel.
pub trait NotificationChannel<T> {
    fn subscribe(&self, event: &str, listener: Rc<dyn Fn(&T)>) -> ListenerId;
    fn unsubscribe(&self, id: ListenerId) -> bool;
    /// Returns the number of listeners invoked.
    fn publish(&self, event: &str, payload: &T) -> usize;
}

/// In-process emitter keyed by event name.
///
/// # Invariants
/// - `emit` snapshots matching listeners before invoking them, so listeners
///   may subscribe, unsubscribe or emit again without deadlocking the channel.
/// - `once` listeners are removed before they run.
pub struct Emitter<T> {
    registrations: RefCell<Vec<Registration<T>>>,
    next_id: Cell<u64>,
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            registrations: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for every future `event` emission.
    pub fn on(&self, event: impl Into<String>, listener: impl Fn(&T) + 'static) -> ListenerId {
        self.register(event.into(), false, Rc::new(listener))
    }

    /// Registers `listener` for the next `event` emission only.
    pub fn once(&self, event: impl Into<String>, listener: impl Fn(&T) + 'static) -> ListenerId {
        self.register(event.into(), true, Rc::new(listener))
    }

    /// Removes one listener. Returns `false` when the id is unknown.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != id);
        registrations.len() != before
    }

    /// Removes every listener of `event`, returning how many were removed.
    pub fn off_event(&self, event: &str) -> usize {
        let mut registrations = self.registrations.borrow_mut();
        let before = registrations.len();
        registrations.retain(|registration| registration.event != event);
        before - registrations.len()
    }

    pub fn clear(&self) {
        self.registrations.borrow_mut().clear();
    }

    /// Invokes every listener of `event` with `payload`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, payload: &T) -> usize {
        let fired: Vec<Listener<T>> = {
            let mut registrations = self.registrations.borrow_mut();
            let mut fired = Vec::new();
            registrations.retain(|registration| {
                if registration.event != event {
                    return true;
                }
                fired.push(Rc::clone(&registration.listener));
                !registration.once
            });
            fired
        };

        for listener in &fired {
            listener(payload);
        }
        fired.len()
    }

    pub fn has_listeners(&self, event: &str) -> bool {
        self.listener_count(event) > 0
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|registration| registration.event == event)
            .count()
    }

    fn register(&self, event: String, once: bool, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.registrations.borrow_mut().push(Registration {
            id,
            event,
            once,
            listener,
        });
        id
    }
}

impl<T> NotificationChannel<T> for Emitter<T> {
    fn subscribe(&self, event: &str, listener: Rc<dyn Fn(&T)>) -> ListenerId {
        self.register(event.to_string(), false, listener)
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.off(id)
    }

    fn publish(&self, event: &str, payload: &T) -> usize {
        self.emit(event, payload)
    }
}

impl<T> Debug for Emitter<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let listeners = self
            .registrations
            .try_borrow()
            .map(|registrations| registrations.len())
            .unwrap_or_default();
        f.debug_struct("Emitter")
            .field("listeners", &listeners)
            .finish()
    }
}
