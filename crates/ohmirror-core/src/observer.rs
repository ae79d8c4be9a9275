// ── Observer fan-out ──
//
// Presentation code registers observers on entities. Entities hold
// them weakly: an observer that has been dropped is skipped on the
// next delivery and never kept alive by the entity.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};

use indexmap::IndexMap;

use crate::model::Value;
use crate::store::lock;

/// Receiver of entity change notifications.
///
/// Both the initial snapshot on subscribe and every later diff arrive
/// through `update`; a snapshot is simply a diff with every key
/// changed and nothing deleted.
///
/// Implementations must not mutate the entity they are notified by from
/// inside `update`. Reading it, or any other entity, is fine.
pub trait Observer: Send + Sync {
    fn update(&self, changed: &IndexMap<String, Value>, deleted: &BTreeSet<String>);
}

/// Weakly-held set of observers attached to one entity.
///
/// Dead references are skipped during delivery but not purged; they
/// are only removed by an explicit `remove` of the same observer.
#[derive(Default)]
pub struct ObserverSet {
    entries: Mutex<Vec<Weak<dyn Observer>>>,
}

impl ObserverSet {
    pub fn add<O: Observer + 'static>(&self, observer: &Arc<O>) {
        let weak: Weak<O> = Arc::downgrade(observer);
        self.add_weak(weak);
    }

    /// Register an already type-erased observer.
    pub fn add_weak(&self, observer: Weak<dyn Observer>) {
        lock(&self.entries).push(observer);
    }

    /// Remove every registration of `observer`. Returns how many were
    /// removed.
    pub fn remove<O: Observer + ?Sized + 'static>(&self, observer: &Arc<O>) -> usize {
        let target = Arc::as_ptr(observer);
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|w| !std::ptr::addr_eq(w.as_ptr(), target));
        before - entries.len()
    }

    /// Number of registrations, dead ones included.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registrations whose observer is still alive.
    pub fn live_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|w| w.strong_count() > 0)
            .count()
    }

    /// Strong references to every observer still alive.
    pub fn live(&self) -> Vec<Arc<dyn Observer>> {
        lock(&self.entries)
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    /// Deliver a diff to every live observer.
    ///
    /// Observers are upgraded under the list lock and called after it is
    /// released, so an observer may subscribe itself elsewhere.
    pub fn notify(&self, changed: &IndexMap<String, Value>, deleted: &BTreeSet<String>) {
        for observer in self.live() {
            observer.update(changed, deleted);
        }
    }
}

impl std::fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverSet")
            .field("registered", &self.len())
            .field("live", &self.live_count())
            .finish()
    }
}

/// An observer that records every update it receives. Handy in tests
/// and for front ends that poll instead of reacting.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<(IndexMap<String, Value>, BTreeSet<String>)>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All updates received so far, oldest first.
    pub fn updates(&self) -> Vec<(IndexMap<String, Value>, BTreeSet<String>)> {
        lock(&self.updates).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.updates).len()
    }

    /// Fold every received update into one view of the latest values.
    pub fn merged(&self) -> IndexMap<String, Value> {
        let mut view = IndexMap::new();
        for (changed, deleted) in lock(&self.updates).iter() {
            for (k, v) in changed {
                view.insert(k.clone(), v.clone());
            }
            for k in deleted {
                view.shift_remove(k);
            }
        }
        view
    }
}

impl Observer for RecordingObserver {
    fn update(&self, changed: &IndexMap<String, Value>, deleted: &BTreeSet<String>) {
        lock(&self.updates).push((changed.clone(), deleted.clone()));
    }
}
