// ── Change-tracking attribute map ──
//
// An ordered key/value store that remembers, per key, whether it was
// written or removed since the last `drain()`. Keys in the pending
// buffers carry the entity prefix (`page_`, `widget_`, `item_`) so
// observers subscribed to several entities can tell them apart.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::model::Value;

/// Pending changes drained from a [`ChangeSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    /// Prefixed key to new value, in write order.
    pub changed: IndexMap<String, Value>,
    /// Prefixed keys removed since the last drain.
    pub deleted: BTreeSet<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}

/// Key/value store that tracks additions, changes and deletions.
///
/// A key is never pending in both buffers at once: writing removes it
/// from `deleted`, deleting removes it from `changed`.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    prefix: &'static str,
    store: IndexMap<String, Value>,
    pending: Diff,
}

impl ChangeSet {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            store: IndexMap::new(),
            pending: Diff::default(),
        }
    }

    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.store.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Iterate the current store (unprefixed keys, insertion order).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.store.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Write `value` under `key`. Returns `false` (and records nothing)
    /// if the key already holds an equal value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> bool {
        let value = value.into();
        if self.store.get(key) == Some(&value) {
            return false;
        }
        self.store.insert(key.to_owned(), value.clone());

        let xkey = self.prefixed(key);
        self.pending.deleted.remove(&xkey);
        self.pending.changed.insert(xkey, value);
        true
    }

    /// Write `Some(value)` or delete the key on `None`.
    pub fn set_opt<V: Into<Value>>(&mut self, key: &str, value: Option<V>) -> bool {
        match value {
            Some(v) => self.set(key, v),
            None => self.delete(key),
        }
    }

    /// Remove `key`. Returns `false` if it was not present.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.store.shift_remove(key).is_none() {
            return false;
        }
        let xkey = self.prefixed(key);
        self.pending.changed.shift_remove(&xkey);
        self.pending.deleted.insert(xkey);
        true
    }

    /// Return and clear the pending diff.
    pub fn drain(&mut self) -> Diff {
        std::mem::take(&mut self.pending)
    }

    /// Whether anything is waiting to be drained.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Full current store with prefixed keys. Leaves pending diffs alone.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.store
            .iter()
            .map(|(k, v)| (self.prefixed(k), v.clone()))
            .collect()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}
