//! In-flight tracking for the single access path.

use std::sync::Arc;

use dashmap::DashMap;

use celldata_core::request::Fingerprint;

/// Tracks which fingerprints currently have a single-path rpc in flight.
///
/// The slot in the shared cache already fans the outcome out to every
/// waiter, so unlike a full singleflight this only needs atomic leader
/// election: the first caller for a fingerprint becomes the leader and
/// issues the rpc, later callers wait on the slot. The batch path keeps its
/// own accounting, which is why a batch-created pending slot does not block
/// a single-path leader.
pub(crate) struct InFlight {
    leaders: DashMap<Fingerprint, ()>,
}

impl InFlight {
    pub fn new() -> Self {
        Self {
            leaders: DashMap::new(),
        }
    }

    /// Atomically try to become the leader for `fingerprint`.
    ///
    /// Returns a guard while this caller should drive the rpc, or `None`
    /// when another single-path caller already is. Uses the map's entry API
    /// for atomic check-and-insert.
    pub fn acquire(self: &Arc<Self>, fingerprint: Fingerprint) -> Option<InFlightGuard> {
        use dashmap::mapref::entry::Entry;

        match self.leaders.entry(fingerprint) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                let fingerprint = entry.key().clone();
                entry.insert(());
                Some(InFlightGuard {
                    owner: Arc::clone(self),
                    fingerprint,
                })
            }
        }
    }
}

/// RAII guard releasing the in-flight entry on drop, so a dropped driver
/// cannot leak its leadership.
pub(crate) struct InFlightGuard {
    owner: Arc<InFlight>,
    fingerprint: Fingerprint,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner.leaders.remove(&self.fingerprint);
    }
}
