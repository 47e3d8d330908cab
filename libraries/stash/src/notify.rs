//! Typed in-process notifications.
//!
//! Events are queued while state is being mutated and only delivered when the
//! owner drains them, so listeners that call back into the owner never observe
//! (or re-borrow) half-updated state.

use std::rc::Rc;

use slotmap::{Key as _, KeyData, SlotMap};

slotmap::new_key_type! {
    pub struct ListenerKey;
}

impl ListenerKey {
    pub fn to_ffi(self) -> u64 {
        self.data().as_ffi()
    }

    pub fn from_ffi(value: u64) -> Self {
        KeyData::from_ffi(value).into()
    }
}

type Listener<E> = Rc<dyn Fn(&E)>;

pub struct Listeners<E> {
    listeners: SlotMap<ListenerKey, Listener<E>>,
    pending: Vec<E>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            pending: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("listeners", &self.listeners.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl<E: Clone + 'static> Listeners<E> {
    pub fn register(&mut self, listener: impl Fn(&E) + 'static) -> ListenerKey {
        self.listeners.insert(Rc::new(listener))
    }

    pub fn unregister(&mut self, key: ListenerKey) {
        self.listeners.remove(key);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn queue(&mut self, event: E) {
        self.pending.push(event);
    }

    /// Take every queued event paired with every listener. Call the returned
    /// closures after releasing any borrow of the owner.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let events = std::mem::take(&mut self.pending);
        let mut notifications: Vec<Box<dyn FnOnce()>> = Vec::new();
        for event in events {
            for listener in self.listeners.values() {
                let listener = Rc::clone(listener);
                let event = event.clone();
                notifications.push(Box::new(move || listener(&event)));
            }
        }
        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn queued_events_reach_every_listener_once() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut listeners = Listeners::<u32>::default();
        for name in ["a", "b"] {
            let seen = Rc::clone(&seen);
            listeners.register(move |event| seen.borrow_mut().push(format!("{name}{event}")));
        }
        listeners.queue(1);
        listeners.queue(2);
        assert!(seen.borrow().is_empty());

        for notification in listeners.drain_due_notifications() {
            notification();
        }
        assert_eq!(*seen.borrow(), vec!["a1", "b1", "a2", "b2"]);
        assert!(listeners.drain_due_notifications().is_empty());
    }

    #[test]
    fn unregistered_listener_is_not_called() {
        let seen = Rc::new(RefCell::new(0));
        let mut listeners = Listeners::<()>::default();
        let key = {
            let seen = Rc::clone(&seen);
            listeners.register(move |_| *seen.borrow_mut() += 1)
        };
        listeners.unregister(key);
        listeners.queue(());
        for notification in listeners.drain_due_notifications() {
            notification();
        }
        assert_eq!(*seen.borrow(), 0);
        assert!(listeners.is_empty());
    }

    #[test]
    fn keys_survive_ffi_round_trip() {
        let mut listeners = Listeners::<()>::default();
        let key = listeners.register(|_| {});
        assert_eq!(ListenerKey::from_ffi(key.to_ffi()), key);
    }
}
