//! Fingerprint-addressed slot cache with a one-way state machine.
//!
//! Each requested value lives in a *slot*: created `Pending` when the value
//! is first asked for, transitioned exactly once to `Resolved` or `Rejected`,
//! and immutable afterwards. Rejections are sticky: later reads replay the
//! stored failure instead of re-issuing the call. There is no eviction;
//! entries live for the lifetime of the cache.
//!
//! # Loading episodes
//!
//! The cache tracks how many slots are currently pending. A *loading episode*
//! starts when the count leaves zero and ends when it returns to zero. The
//! `when_data_start_loading` callback fires at most once per episode, then
//! re-arms, so the host can raise a spinner exactly once per burst of
//! activity.
//!
//! # Thread Safety
//!
//! The slot map is a `DashMap` and every slot transition happens under the
//! slot's own lock, so the cache can be shared across async tasks without
//! external synchronization. Waiters are released in FIFO order of
//! attachment, outside the slot lock.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{RpcError, RpcResult};
use crate::request::Fingerprint;

/// Callback invoked when a loading episode starts.
pub type LoadingCallback = Arc<dyn Fn() + Send + Sync>;

/// Current state of a cache slot.
#[derive(Debug, Clone)]
pub enum SlotState {
    /// The value is being fetched.
    Pending,
    /// The call completed; the value is served from the cache from now on.
    Resolved(Value),
    /// The call failed; the failure is replayed on every later access.
    Rejected(RpcError),
}

/// Outcome of subscribing to a slot.
pub enum SlotWait {
    /// The slot already reached a terminal state.
    Ready(RpcResult<Value>),
    /// The slot is pending; the receiver fires on its terminal transition.
    Waiting(oneshot::Receiver<RpcResult<Value>>),
}

struct SlotInner {
    state: SlotState,
    /// Awaiter continuations, released FIFO and emptied on the terminal
    /// transition.
    waiters: Vec<oneshot::Sender<RpcResult<Value>>>,
}

/// Cache entry for one request fingerprint.
struct Slot {
    inner: Mutex<SlotInner>,
}

impl Slot {
    fn pending() -> Self {
        Self {
            inner: Mutex::new(SlotInner {
                state: SlotState::Pending,
                waiters: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Mapping from request fingerprint to slot, plus the loading-episode
/// tracker.
///
/// One instance per server-data façade; both access paths (single and
/// batched) share it, which is what lets them share slots for coinciding
/// fingerprints.
pub struct RequestCache {
    slots: DashMap<Fingerprint, Arc<Slot>>,
    /// Number of slots currently pending; zero means the episode is over.
    pending: AtomicUsize,
    /// Whether `when_data_start_loading` already fired this episode.
    episode_notified: AtomicBool,
    when_data_start_loading: Option<LoadingCallback>,
}

impl std::fmt::Debug for RequestCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCache")
            .field("entry_count", &self.slots.len())
            .field("pending_count", &self.pending.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCache {
    /// Creates an empty cache with no loading callback.
    pub fn new() -> Self {
        Self::with_loading_callback(None)
    }

    /// Creates an empty cache that fires `callback` once per loading episode.
    pub fn with_loading_callback(callback: Option<LoadingCallback>) -> Self {
        Self {
            slots: DashMap::new(),
            pending: AtomicUsize::new(0),
            episode_notified: AtomicBool::new(false),
            when_data_start_loading: callback,
        }
    }

    /// Cloned view of the slot's current state.
    ///
    /// # Metrics
    ///
    /// Records lookups to `celldata_cache_hits_total` /
    /// `celldata_cache_misses_total`.
    pub fn snapshot(&self, fingerprint: &Fingerprint) -> Option<SlotState> {
        let state = self
            .slots
            .get(fingerprint)
            .map(|slot| slot.lock().state.clone());
        if state.is_some() {
            metrics::counter!("celldata_cache_hits_total").increment(1);
        } else {
            metrics::counter!("celldata_cache_misses_total").increment(1);
        }
        state
    }

    /// Inserts a fresh pending slot.
    ///
    /// Atomic check-and-insert: returns `false` without touching the cache
    /// when the fingerprint is already present, so exactly one caller ever
    /// creates a given slot.
    pub fn insert_pending(&self, fingerprint: Fingerprint) -> bool {
        use dashmap::mapref::entry::Entry;

        match self.slots.entry(fingerprint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Slot::pending()));
                self.pending.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }

    /// Attaches a waiter, or returns the terminal outcome immediately.
    ///
    /// Waiters are released in FIFO order of attachment when the slot
    /// settles. Returns `None` when the fingerprint has no slot.
    pub fn subscribe(&self, fingerprint: &Fingerprint) -> Option<SlotWait> {
        let slot = self.slots.get(fingerprint).map(|s| Arc::clone(&s))?;
        let mut inner = slot.lock();
        match &inner.state {
            SlotState::Pending => {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push(tx);
                Some(SlotWait::Waiting(rx))
            }
            SlotState::Resolved(value) => Some(SlotWait::Ready(Ok(value.clone()))),
            SlotState::Rejected(error) => Some(SlotWait::Ready(Err(error.clone()))),
        }
    }

    /// Terminal transition to `Resolved`.
    ///
    /// The first transition wins; calling this on an already-settled slot or
    /// an absent fingerprint is a no-op.
    pub fn resolve(&self, fingerprint: &Fingerprint, value: Value) {
        self.settle(fingerprint, Ok(value));
    }

    /// Terminal transition to `Rejected`. Same idempotency as [`Self::resolve`].
    pub fn reject(&self, fingerprint: &Fingerprint, error: RpcError) {
        self.settle(fingerprint, Err(error));
    }

    fn settle(&self, fingerprint: &Fingerprint, outcome: RpcResult<Value>) {
        let Some(slot) = self.slots.get(fingerprint).map(|s| Arc::clone(&s)) else {
            return;
        };
        let waiters = {
            let mut inner = slot.lock();
            if !matches!(inner.state, SlotState::Pending) {
                // Terminal slots are immutable.
                return;
            }
            inner.state = match &outcome {
                Ok(value) => SlotState::Resolved(value.clone()),
                Err(error) => SlotState::Rejected(error.clone()),
            };
            std::mem::take(&mut inner.waiters)
        };
        for waiter in waiters {
            // A dropped receiver just means the awaiter went away.
            let _ = waiter.send(outcome.clone());
        }
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Episode over: re-arm the notification for the next one.
            self.episode_notified.store(false, Ordering::SeqCst);
        }
    }

    /// Fires `when_data_start_loading` at most once per loading episode.
    ///
    /// Endpoints call this after issuing the rpc for the work that opened the
    /// episode. A call while nothing is pending is ignored: the episode it
    /// belonged to is already over.
    pub fn notify_loading_started(&self) {
        if self.pending.load(Ordering::SeqCst) == 0 {
            return;
        }
        if !self.episode_notified.swap(true, Ordering::SeqCst) {
            if let Some(callback) = &self.when_data_start_loading {
                callback();
            }
        }
    }

    /// Returns the number of slots in the cache.
    pub fn entry_count(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of slots still pending.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Registers request cache metrics descriptions.
///
/// Call once during application startup to register metric descriptions with
/// the metrics recorder. Optional; lookups record to the counters either way.
pub fn register_request_cache_metrics() {
    metrics::describe_counter!(
        "celldata_cache_hits_total",
        "Total number of request cache lookups that found a slot"
    );
    metrics::describe_counter!(
        "celldata_cache_misses_total",
        "Total number of request cache lookups that found nothing"
    );
}
