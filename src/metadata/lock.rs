//! Per-path exclusive locks.
//!
//! Embedded-metadata edits are read-modify-write on the whole file, so two
//! overlapping edits of the same photo would silently drop one of them.
//! [`PathLocks::with_lock`] serializes callers per path: same-path callers
//! queue and run one at a time, different paths never contend.
//!
//! Entries are created on first use and removed by the last holder, so the
//! registry only contains paths with an operation in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub struct PathLocks {
    slots: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the exclusive lock for `path`.
    ///
    /// The lock is released on every exit path, including panics inside
    /// `f` (a poisoned slot is recovered, not propagated).
    pub fn with_lock<T>(&self, path: &Path, f: impl FnOnce() -> T) -> T {
        let release = SlotRelease {
            locks: self,
            path,
            slot: Some(self.acquire_slot(path)),
        };
        // Declared after `release`, so it unlocks before the entry is released
        let _guard = release
            .slot
            .as_ref()
            .map(|slot| slot.lock().unwrap_or_else(PoisonError::into_inner));
        f()
    }

    /// Number of paths with an operation in flight or queued.
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<Mutex<()>>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn acquire_slot(&self, path: &Path) -> Arc<Mutex<()>> {
        self.slots()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Drops the registry entry when the last interested caller leaves.
///
/// Clones are only taken and dropped under the map lock, so a count of one
/// seen there means nobody else holds or waits on the slot.
struct SlotRelease<'a> {
    locks: &'a PathLocks,
    path: &'a Path,
    slot: Option<Arc<Mutex<()>>>,
}

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        let mut slots = self.locks.slots();
        drop(self.slot.take());
        if slots
            .get(self.path)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(self.path);
        }
    }
}
