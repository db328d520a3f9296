//! Opaque key/value data bag
//!
//! Hosts use the bag to stash ambient objects (a transport context, request
//! metadata) on a mapping or handling context without the engine depending
//! on their types. Entries are keyed either by their Rust type or by name.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::outcome::Payload;

/// Key of a data bag entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataKey {
    /// Entry keyed by the type of its value
    Type(TypeId),
    /// Entry keyed by a caller-chosen name
    Named(Cow<'static, str>),
}

impl DataKey {
    /// Key for values of type `T`
    pub fn of<T: Any>() -> Self {
        Self::Type(TypeId::of::<T>())
    }

    /// Key for a named entry
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }
}

/// Mapping from opaque keys to opaque shared values
#[derive(Clone, Default)]
pub struct DataBag {
    entries: HashMap<DataKey, Payload>,
}

impl DataBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under its type, returning the previous entry
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) -> Option<Payload> {
        self.entries.insert(DataKey::of::<T>(), Arc::new(value))
    }

    /// Store an already shared value under its type
    pub fn insert_shared<T: Any + Send + Sync>(&mut self, value: Arc<T>) -> Option<Payload> {
        self.entries.insert(DataKey::of::<T>(), value)
    }

    /// Store `value` under `name`
    pub fn insert_named<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        value: T,
    ) -> Option<Payload> {
        self.entries.insert(DataKey::named(name), Arc::new(value))
    }

    /// Borrow the value stored under type `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries
            .get(&DataKey::of::<T>())
            .and_then(|payload| payload.downcast_ref::<T>())
    }

    /// Mutably borrow the value stored under type `T`
    ///
    /// Returns `None` when the value is shared with a cloned bag.
    pub fn get_mut<T: Any + Send + Sync>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&DataKey::of::<T>())
            .and_then(Arc::get_mut)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Clone out the shared value stored under type `T`
    pub fn get_shared<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.entries
            .get(&DataKey::of::<T>())
            .cloned()
            .and_then(|payload| payload.downcast::<T>().ok())
    }

    /// Borrow the value stored under `name`, if it is a `T`
    pub fn get_named<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.entries
            .get(&DataKey::named(name.to_owned()))
            .and_then(|payload| payload.downcast_ref::<T>())
    }

    /// Raw payload stored under `key`
    pub fn get_payload(&self, key: &DataKey) -> Option<&Payload> {
        self.entries.get(key)
    }

    /// Store a raw payload under `key`
    pub fn insert_payload(&mut self, key: DataKey, payload: Payload) -> Option<Payload> {
        self.entries.insert(key, payload)
    }

    /// Remove the entry stored under type `T`
    pub fn remove<T: Any>(&mut self) -> Option<Payload> {
        self.entries.remove(&DataKey::of::<T>())
    }

    /// Remove the entry stored under `key`
    pub fn remove_key(&mut self, key: &DataKey) -> Option<Payload> {
        self.entries.remove(key)
    }

    /// Check if an entry exists under `key`
    pub fn contains_key(&self, key: &DataKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bag is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for DataBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataBag")
            .field("entries", &format!("HashMap with {} entries", self.entries.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Transport {
        id: u32,
    }

    #[test]
    fn test_typed_entries() {
        let mut bag = DataBag::new();
        assert!(bag.is_empty());

        bag.insert(Transport { id: 7 });
        assert_eq!(bag.get::<Transport>(), Some(&Transport { id: 7 }));
        assert!(bag.contains_key(&DataKey::of::<Transport>()));
        assert_eq!(bag.get::<u32>(), None);

        if let Some(transport) = bag.get_mut::<Transport>() {
            transport.id = 8;
        }
        assert_eq!(bag.get::<Transport>().map(|t| t.id), Some(8));

        assert!(bag.remove::<Transport>().is_some());
        assert!(bag.is_empty());
    }

    #[test]
    fn test_named_entries_are_distinct_from_typed() {
        let mut bag = DataBag::new();
        bag.insert(1u32);
        bag.insert_named("retries", 3u32);

        assert_eq!(bag.get::<u32>(), Some(&1));
        assert_eq!(bag.get_named::<u32>("retries"), Some(&3));
        assert_eq!(bag.get_named::<String>("retries"), None);
        assert_eq!(bag.len(), 2);
    }

    #[test]
    fn test_shared_entries_survive_clone() {
        let mut bag = DataBag::new();
        let transport = Arc::new(Transport { id: 1 });
        bag.insert_shared(transport.clone());

        let copy = bag.clone();
        let shared = copy.get_shared::<Transport>();
        assert!(shared.is_some_and(|t| Arc::ptr_eq(&t, &transport)));

        // Shared with the clone, so no unique access
        assert!(bag.get_mut::<Transport>().is_none());
    }
}
