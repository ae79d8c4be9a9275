// ── Entity state + observers ──
//
// `Observed<S>` serializes "mutate, drain, notify" per entity. The
// delivery lock is held from the mutation until the last observer has
// seen the diff, so observers see diffs in mutation order and a new
// subscriber's snapshot is never overtaken by an older diff.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};

use crate::observer::{Observer, ObserverSet};
use crate::store::{ChangeSet, lock};

/// Entity state that carries a [`ChangeSet`] of observable attributes.
pub trait Tracked {
    fn attrs(&self) -> &ChangeSet;
    fn attrs_mut(&mut self) -> &mut ChangeSet;
}

#[derive(Debug)]
pub struct Observed<S> {
    state: Mutex<S>,
    observers: ObserverSet,
    delivery: Mutex<()>,
}

impl<S: Tracked> Observed<S> {
    pub fn new(state: S) -> Self {
        Self {
            state: Mutex::new(state),
            observers: ObserverSet::default(),
            delivery: Mutex::new(()),
        }
    }

    /// Run `f` against the state, then drain the change set and push
    /// the diff to live observers. The drain happens whatever `f`
    /// returns, so a failed mutation cannot leave half a diff behind.
    pub fn apply<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let _delivery = lock(&self.delivery);
        let (result, diff) = {
            let mut state = lock(&self.state);
            let result = f(&mut state);
            (result, state.attrs_mut().drain())
        };
        if !diff.is_empty() {
            self.observers.notify(&diff.changed, &diff.deleted);
        }
        result
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&lock(&self.state))
    }

    /// Register `observer` and hand it the full current attribute set.
    pub fn subscribe<O: Observer + 'static>(&self, observer: &Arc<O>) {
        let weak: Weak<O> = Arc::downgrade(observer);
        self.attach(weak, observer.as_ref());
    }

    /// [`subscribe`](Self::subscribe) for an observer that is already
    /// type-erased.
    pub fn subscribe_shared(&self, observer: &Arc<dyn Observer>) {
        self.attach(Arc::downgrade(observer), observer.as_ref());
    }

    fn attach(&self, weak: Weak<dyn Observer>, observer: &dyn Observer) {
        let _delivery = lock(&self.delivery);
        let snapshot = lock(&self.state).attrs().snapshot();
        self.observers.add_weak(weak);
        observer.update(&snapshot, &BTreeSet::new());
    }

    pub fn unsubscribe<O: Observer + ?Sized + 'static>(&self, observer: &Arc<O>) -> bool {
        self.observers.remove(observer) > 0
    }

    pub fn observers(&self) -> &ObserverSet {
        &self.observers
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::Value;
    use crate::observer::RecordingObserver;

    struct Plain(ChangeSet);

    impl Tracked for Plain {
        fn attrs(&self) -> &ChangeSet {
            &self.0
        }
        fn attrs_mut(&mut self) -> &mut ChangeSet {
            &mut self.0
        }
    }

    #[test]
    fn subscribe_delivers_snapshot_before_diffs() {
        let observed = Observed::new(Plain(ChangeSet::new("item_")));
        observed.apply(|s| s.0.set("state", "ON"));

        let rec = RecordingObserver::new();
        observed.subscribe(&rec);
        observed.apply(|s| s.0.set("state", "OFF"));

        let updates = rec.updates();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0.get("item_state"), Some(&Value::from("ON")));
        assert_eq!(updates[1].0.get("item_state"), Some(&Value::from("OFF")));
    }

    #[test]
    fn unchanged_apply_delivers_nothing() {
        let observed = Observed::new(Plain(ChangeSet::new("item_")));
        observed.apply(|s| s.0.set("state", "ON"));
        let rec = RecordingObserver::new();
        observed.subscribe(&rec);

        observed.apply(|s| s.0.set("state", "ON"));
        assert_eq!(rec.count(), 1);
    }

    #[test]
    fn failed_mutation_still_drains() {
        let observed = Observed::new(Plain(ChangeSet::new("page_")));
        let rec = RecordingObserver::new();
        observed.subscribe(&rec);

        let result: Result<(), &str> = observed.apply(|s| {
            s.0.set("title", "Half");
            Err("boom")
        });
        assert!(result.is_err());
        assert_eq!(rec.count(), 2);
        assert!(!observed.read(|s| s.0.has_pending()));
    }
}
