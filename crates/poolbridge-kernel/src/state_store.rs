//! [`StateStore`] – the versioned snapshot shared by the link supervisor and
//! every HTTP handler.
//!
//! The store holds exactly one current [`Snapshot`] and a version counter.
//! Both live behind a single mutex, so a reader always gets the snapshot
//! together with the version produced by the same write.  The critical
//! section only swaps or clones an [`Arc`]; no I/O ever happens under the
//! lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use poolbridge_types::Snapshot;

struct Current {
    snapshot: Arc<Snapshot>,
    version: u64,
}

/// Latest controller snapshot plus a monotonically increasing version.
///
/// Starts empty at version `0`.  Every [`write`](Self::write) bumps the
/// version by exactly one.
///
/// # Example
///
/// ```
/// use poolbridge_kernel::StateStore;
/// use poolbridge_types::Snapshot;
///
/// let store = StateStore::new();
/// assert_eq!(store.version(), 0);
///
/// let version = store.write(Snapshot { air_temp: Some(70), ..Snapshot::default() });
/// let (snapshot, read_version) = store.read();
/// assert_eq!(version, 1);
/// assert_eq!(read_version, 1);
/// assert_eq!(snapshot.air_temp, Some(70));
/// ```
pub struct StateStore {
    current: Mutex<Current>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self {
            current: Mutex::new(Current {
                snapshot: Arc::new(Snapshot::default()),
                version: 0,
            }),
        }
    }
}

impl StateStore {
    /// Create an empty store (empty snapshot, version `0`).
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot and return the new version.
    pub fn write(&self, snapshot: Snapshot) -> u64 {
        let snapshot = Arc::new(snapshot);
        let (previous, version) = {
            let mut current = self.lock();
            current.version += 1;
            let previous = std::mem::replace(&mut current.snapshot, snapshot);
            (previous, current.version)
        };
        // Freed outside the critical section.
        drop(previous);
        version
    }

    /// Return the current snapshot and the version it was written as.
    pub fn read(&self) -> (Arc<Snapshot>, u64) {
        let current = self.lock();
        (Arc::clone(&current.snapshot), current.version)
    }

    /// Return only the current version.
    pub fn version(&self) -> u64 {
        self.lock().version
    }

    // The guarded pair is replaced in one assignment, so it is valid even if
    // a holder panicked.
    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
