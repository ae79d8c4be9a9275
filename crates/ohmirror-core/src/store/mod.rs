//! Change-tracking storage shared by every mirrored entity.
//!
//! [`ChangeSet`] records what moved since the last drain, and
//! [`Observed`] couples a change set with its observers so that every
//! mutation ends with exactly one diff delivery.

mod change_set;
mod observed;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use change_set::{ChangeSet, Diff};
pub use observed::{Observed, Tracked};

/// Lock a mutex, recovering the guard if a previous holder panicked.
///
/// Entity state stays structurally valid across a panicking observer,
/// so poisoning carries no information worth propagating.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
