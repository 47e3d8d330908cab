use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    rc::Rc,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Storage is not available in this environment")]
    Unavailable,

    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// The narrow interface every persistence consumer goes through.
///
/// Methods take `&self` because the browser's storage is a shared handle; a
/// single `set` either replaces the value for a key or leaves the old one in
/// place, which is what callers rely on for atomic saves.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

impl<T: KeyValueStore + ?Sized> KeyValueStore for Rc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        (**self).keys()
    }
}

/// In-memory store used natively and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<BTreeMap<String, String>>,
    failing_writes: Cell<usize>,
    failing_reads: Cell<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(entries: BTreeMap<String, String>) -> Self {
        Self {
            entries: RefCell::new(entries),
            failing_writes: Cell::new(0),
            failing_reads: Cell::new(0),
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.borrow().clone()
    }

    /// Make the next `count` writes (set or remove) fail without touching the data.
    pub fn fail_writes(&self, count: usize) {
        self.failing_writes.set(count);
    }

    /// Make the next `count` reads fail.
    pub fn fail_reads(&self, count: usize) {
        self.failing_reads.set(count);
    }

    fn take_write_failure(&self, key: &str) -> Result<(), StoreError> {
        let remaining = self.failing_writes.get();
        if remaining > 0 {
            self.failing_writes.set(remaining - 1);
            return Err(StoreError::QuotaExceeded {
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let remaining = self.failing_reads.get();
        if remaining > 0 {
            self.failing_reads.set(remaining - 1);
            return Err(StoreError::Backend(format!("read of {key} failed")));
        }
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.take_write_failure(key)?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.take_write_failure(key)?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.borrow().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn failed_write_keeps_previous_value() {
        let store = MemoryStore::new();
        store.set("a", "old").unwrap();
        store.fail_writes(1);
        assert!(matches!(
            store.set("a", "new"),
            Err(StoreError::QuotaExceeded { .. })
        ));
        assert_eq!(store.get("a").unwrap().as_deref(), Some("old"));
        store.set("a", "new").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn shared_through_rc() {
        let store = Rc::new(MemoryStore::new());
        let other = Rc::clone(&store);
        other.set("k", "v").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["k".to_string()]);
    }
}
