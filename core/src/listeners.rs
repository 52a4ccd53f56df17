//! Subscriber fan-out for bridge events.
//!
//! Listeners run synchronously on the message thread. They may subscribe or
//! unsubscribe while an event is being delivered: such changes are queued and
//! applied once the current pass finishes. A listener removed mid-pass is not
//! called again during that pass.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

/// Identifier of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

type Callback<E> = Box<dyn FnMut(&E)>;

struct Slot<E> {
    id: ListenerId,
    callback: Callback<E>,
}

struct Shared<E> {
    slots: RefCell<Vec<Slot<E>>>,
    pending_add: RefCell<Vec<Slot<E>>>,
    pending_remove: RefCell<Vec<ListenerId>>,
    dispatching: Cell<bool>,
    /// Ids of the slots taken out for the current pass.
    in_flight: RefCell<Vec<ListenerId>>,
    cleared: Cell<bool>,
    next_id: Cell<u64>,
}

impl<E> Shared<E> {
    fn remove(&self, id: ListenerId) {
        if self.dispatching.get() {
            self.pending_remove.borrow_mut().push(id);
            self.pending_add.borrow_mut().retain(|slot| slot.id != id);
        } else {
            self.slots.borrow_mut().retain(|slot| slot.id != id);
        }
    }
}

/// Registry of event callbacks.
pub struct Listeners<E> {
    shared: Rc<Shared<E>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .field("dispatching", &self.shared.dispatching.get())
            .finish()
    }
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                slots: RefCell::new(Vec::new()),
                pending_add: RefCell::new(Vec::new()),
                pending_remove: RefCell::new(Vec::new()),
                dispatching: Cell::new(false),
                in_flight: RefCell::new(Vec::new()),
                cleared: Cell::new(false),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription<E>
    where
        F: FnMut(&E) + 'static,
    {
        let id = ListenerId(self.shared.next_id.get());
        self.shared.next_id.set(id.0 + 1);
        let slot = Slot {
            id,
            callback: Box::new(callback),
        };
        if self.shared.dispatching.get() {
            self.shared.pending_add.borrow_mut().push(slot);
        } else {
            self.shared.slots.borrow_mut().push(slot);
        }
        Subscription {
            id,
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Remove a callback. Safe to call from inside a callback.
    pub fn unsubscribe(&self, id: ListenerId) {
        self.shared.remove(id);
    }

    /// Number of active listeners, including ones queued for addition.
    ///
    /// During a pass this counts what will be registered once it finishes.
    pub fn len(&self) -> usize {
        let pending = self.shared.pending_add.borrow().len();
        if self.shared.cleared.get() {
            return pending;
        }
        let removed = self.shared.pending_remove.borrow();
        let live = |id: &ListenerId| !removed.contains(id);
        let registered = self.shared.slots.borrow().iter().map(|s| s.id).filter(live).count();
        let in_flight = self.shared.in_flight.borrow().iter().filter(|id| live(id)).count();
        registered + in_flight + pending
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every listener.
    ///
    /// If a callback panics the pass is abandoned, but the registry is left
    /// consistent: pending changes are applied and later emits work.
    pub fn emit(&self, event: &E) {
        if self.shared.dispatching.get() {
            tracing::warn!("nested emit ignored while listeners are dispatching");
            return;
        }
        self.shared.dispatching.set(true);
        let mut pass = Pass {
            shared: &self.shared,
            slots: std::mem::take(&mut *self.shared.slots.borrow_mut()),
        };
        *self.shared.in_flight.borrow_mut() = pass.slots.iter().map(|slot| slot.id).collect();

        let shared = pass.shared;
        for slot in pass.slots.iter_mut() {
            if shared.cleared.get() {
                break;
            }
            if shared.pending_remove.borrow().contains(&slot.id) {
                continue;
            }
            (slot.callback)(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        if self.shared.dispatching.get() {
            self.shared.cleared.set(true);
            self.shared.pending_add.borrow_mut().clear();
        } else {
            self.shared.slots.borrow_mut().clear();
        }
    }
}

/// One dispatch pass. Dropping it, normally or while unwinding, puts the
/// slots back and applies the changes queued during the pass.
struct Pass<'a, E> {
    shared: &'a Shared<E>,
    slots: Vec<Slot<E>>,
}

impl<E> Drop for Pass<'_, E> {
    fn drop(&mut self) {
        let shared = self.shared;
        let mut slots = std::mem::take(&mut self.slots);
        let removed = std::mem::take(&mut *shared.pending_remove.borrow_mut());
        if shared.cleared.replace(false) {
            slots.clear();
        }
        slots.retain(|slot| !removed.contains(&slot.id));
        slots.append(&mut shared.pending_add.borrow_mut());
        *shared.slots.borrow_mut() = slots;
        shared.in_flight.borrow_mut().clear();
        shared.dispatching.set(false);
    }
}

/// Handle returned by [`Listeners::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::cancel`].
pub struct Subscription<E> {
    id: ListenerId,
    shared: Weak<Shared<E>>,
}

impl<E> Clone for Subscription<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: self.shared.clone(),
        }
    }
}

impl<E> fmt::Debug for Subscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl<E> Subscription<E> {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unsubscribe. A no-op once the registry is gone.
    pub fn cancel(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.remove(self.id);
        }
    }
}
