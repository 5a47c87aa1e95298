//! Deduplication of crawl targets by canonical key
//!
//! Three mutually exclusive sets (queued, completed, failed) live behind one
//! mutex, so every admission is a single test-and-set: two near-simultaneous
//! discoveries of the same key can never both be admitted.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// Which set a canonical key currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyStatus {
    Queued,
    Completed,
    Failed,
}

/// Result of offering a key to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New key; the caller must schedule it
    Admitted,
    /// Already queued, completed or failed; nothing to do
    AlreadyKnown,
    /// Deeper than the configured maximum
    DepthExceeded,
}

impl Admission {
    /// True unless the depth bound rejected the key
    pub fn is_handled(&self) -> bool {
        !matches!(self, Admission::DepthExceeded)
    }
}

/// Sizes of the three sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerCounts {
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct KeySets {
    queued: HashSet<Url>,
    completed: HashSet<Url>,
    failed: HashSet<Url>,
}

impl KeySets {
    fn status(&self, key: &Url) -> Option<KeyStatus> {
        if self.queued.contains(key) {
            Some(KeyStatus::Queued)
        } else if self.completed.contains(key) {
            Some(KeyStatus::Completed)
        } else if self.failed.contains(key) {
            Some(KeyStatus::Failed)
        } else {
            None
        }
    }
}

/// The queued/completed/failed key sets
#[derive(Debug)]
pub struct DedupTracker {
    max_depth: u32,
    sets: Mutex<KeySets>,
}

impl DedupTracker {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            sets: Mutex::new(KeySets::default()),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    fn lock(&self) -> MutexGuard<'_, KeySets> {
        self.sets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Single admission point: inserts `key` into `queued` if it is unknown
    /// and within the depth bound
    pub fn admit(&self, key: &Url, depth: u32) -> Admission {
        let mut sets = self.lock();
        if sets.status(key).is_some() {
            return Admission::AlreadyKnown;
        }
        if depth > self.max_depth {
            return Admission::DepthExceeded;
        }
        sets.queued.insert(key.clone());
        Admission::Admitted
    }

    /// Claims a redirect target for the resource that was redirected to it
    ///
    /// Returns false if the key is already known, in which case another
    /// resource owns it and the caller must not mark it.
    pub fn register_alias(&self, key: &Url) -> bool {
        let mut sets = self.lock();
        if sets.status(key).is_some() {
            return false;
        }
        sets.queued.insert(key.clone());
        true
    }

    /// Moves every key of a resource from `queued` to `completed` at once
    pub fn complete(&self, keys: &[Url]) {
        let mut sets = self.lock();
        for key in keys {
            sets.queued.remove(key);
            sets.failed.remove(key);
            sets.completed.insert(key.clone());
        }
    }

    /// Moves every key of a resource from `queued` to `failed` at once
    pub fn fail(&self, keys: &[Url]) {
        let mut sets = self.lock();
        for key in keys {
            if sets.completed.contains(key) {
                continue;
            }
            sets.queued.remove(key);
            sets.failed.insert(key.clone());
        }
    }

    pub fn status(&self, key: &Url) -> Option<KeyStatus> {
        self.lock().status(key)
    }

    pub fn counts(&self) -> TrackerCounts {
        let sets = self.lock();
        TrackerCounts {
            queued: sets.queued.len(),
            completed: sets.completed.len(),
            failed: sets.failed.len(),
        }
    }
}
