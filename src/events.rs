//! Change notifications from the external entity store.
//!
//! The store owns a [`ChangeBus`] and calls [`ChangeBus::notify`] whenever the
//! data behind a subject (a database name, an activity key, ...) changes. Each
//! model-owning component holds a [`Subscription`] for its subject and pulls a
//! fresh snapshot when one is pending. Dropping the subscription removes the
//! observer from the bus.

use std::cell::{Cell, RefCell};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::snapshot::Snapshot;

type ObserverId = u64;

struct Observer<S> {
    subject: S,
    pending: Rc<Cell<bool>>,
}

struct BusInner<S> {
    next_id: ObserverId,
    observers: FxHashMap<ObserverId, Observer<S>>,
}

/// Explicit observer list keyed by subject.
pub struct ChangeBus<S> {
    inner: Rc<RefCell<BusInner<S>>>,
}

impl<S> Default for ChangeBus<S> {
    fn default() -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                next_id: 0,
                observers: FxHashMap::default(),
            })),
        }
    }
}

impl<S: Eq + Hash + Clone> ChangeBus<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers interest in `subject`.
    pub fn subscribe(&self, subject: S) -> Subscription<S> {
        let pending = Rc::new(Cell::new(false));
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.observers.insert(
            id,
            Observer {
                subject: subject.clone(),
                pending: Rc::clone(&pending),
            },
        );
        Subscription {
            id,
            subject,
            pending,
            bus: Rc::downgrade(&self.inner),
        }
    }

    /// Flags every observer of `subject`; returns how many were flagged.
    pub fn notify(&self, subject: &S) -> usize {
        let inner = self.inner.borrow();
        let mut flagged = 0;
        for observer in inner.observers.values() {
            if observer.subject == *subject {
                observer.pending.set(true);
                flagged += 1;
            }
        }
        tracing::debug!(target: "tui_treetable::events", flagged, "change notification");
        flagged
    }

    /// Flags every observer regardless of subject (e.g. after a project switch).
    pub fn notify_all(&self) -> usize {
        let inner = self.inner.borrow();
        for observer in inner.observers.values() {
            observer.pending.set(true);
        }
        inner.observers.len()
    }

    pub fn observer_count(&self) -> usize {
        self.inner.borrow().observers.len()
    }
}

/// Handle returned by [`ChangeBus::subscribe`]; unregisters on drop.
pub struct Subscription<S> {
    id: ObserverId,
    subject: S,
    pending: Rc<Cell<bool>>,
    bus: Weak<RefCell<BusInner<S>>>,
}

impl<S> Subscription<S> {
    pub const fn subject(&self) -> &S {
        &self.subject
    }

    /// Returns and clears the pending-change flag.
    pub fn take_pending(&self) -> bool {
        self.pending.replace(false)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.get()
    }
}

impl<S> Drop for Subscription<S> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.borrow_mut().observers.remove(&self.id);
        }
    }
}

/// External collaborator able to produce a fresh snapshot for a subject.
pub trait SnapshotSource<R, S> {
    fn snapshot(&self, subject: &S) -> Snapshot<R>;
}

impl<R, S, F> SnapshotSource<R, S> for F
where
    F: Fn(&S) -> Snapshot<R>,
{
    fn snapshot(&self, subject: &S) -> Snapshot<R> {
        self(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_flags_matching_subjects_only() {
        let bus = ChangeBus::new();
        let biosphere = bus.subscribe("biosphere3");
        let ecoinvent = bus.subscribe("ecoinvent");

        assert_eq!(bus.notify(&"biosphere3"), 1);
        assert!(biosphere.take_pending());
        assert!(!biosphere.take_pending());
        assert!(!ecoinvent.is_pending());

        assert_eq!(bus.notify_all(), 2);
        assert!(biosphere.is_pending() && ecoinvent.is_pending());
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let bus = ChangeBus::new();
        let sub = bus.subscribe(1u8);
        assert_eq!(bus.observer_count(), 1);
        drop(sub);
        assert_eq!(bus.observer_count(), 0);
        assert_eq!(bus.notify(&1), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = ChangeBus::new();
        let sub = bus.subscribe("db");
        drop(bus);
        assert!(!sub.take_pending());
    }
}
