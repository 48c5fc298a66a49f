//! Per-`(model, method)` batching endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use celldata_core::cache::{RequestCache, SlotState};
use celldata_core::error::{DataError, DataResult, RpcError};
use celldata_core::request::Request;
use celldata_core::rpc::RpcCaller;

use crate::config::BatchHooks;
use crate::scheduler::TickScheduler;

/// Accumulates keys for one `(model, method)` pair and loads them with a
/// single combined rpc per scheduling tick.
///
/// The combined call's only argument is the list of accumulated keys, and
/// its reply must be a list aligned positionally with them. Keys submitted
/// after a flush has started join the next batch.
///
/// When the combined call fails the endpoint retries every key
/// individually - sequentially and in accumulation order - so one poisonous
/// key cannot take down its siblings' results, and the failure lands only on
/// the slot that caused it. Rejected slots are sticky, which keeps a bad key
/// from being retried on every read.
pub struct BatchEndpoint {
    model: String,
    method: String,
    cache: Arc<RequestCache>,
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn TickScheduler>,
    hooks: BatchHooks,
    /// Requests waiting for the next flush, in submission order.
    accumulator: Mutex<Vec<Request>>,
    flush_scheduled: AtomicBool,
}

impl BatchEndpoint {
    /// Creates an endpoint for one `(model, method)` pair.
    pub fn new(
        model: impl Into<String>,
        method: impl Into<String>,
        cache: Arc<RequestCache>,
        rpc: Arc<dyn RpcCaller>,
        scheduler: Arc<dyn TickScheduler>,
        hooks: BatchHooks,
    ) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            cache,
            rpc,
            scheduler,
            hooks,
            accumulator: Mutex::new(Vec::new()),
            flush_scheduled: AtomicBool::new(false),
        }
    }

    /// Builds the request this endpoint issues for `key`.
    ///
    /// The batched key is the sole positional argument, so the fingerprint
    /// coincides with a single-path call of the same shape and the two paths
    /// share a slot.
    fn request_for(&self, key: Value) -> Request {
        Request::new(self.model.clone(), self.method.clone(), vec![key])
    }

    /// Synchronous read for `key`: the cached value, the sticky failure, or
    /// [`DataError::NotReady`] while the key waits for its batch.
    pub fn get(self: &Arc<Self>, key: Value) -> DataResult<Value> {
        let request = self.request_for(key);
        match self.cache.snapshot(&request.fingerprint()) {
            Some(SlotState::Resolved(value)) => Ok(value),
            Some(SlotState::Rejected(error)) => Err(DataError::Rpc(error)),
            Some(SlotState::Pending) => Err(DataError::NotReady),
            None => {
                self.submit(request);
                Err(DataError::NotReady)
            }
        }
    }

    /// Adds `request` to the next flush if its fingerprint is new.
    fn submit(self: &Arc<Self>, request: Request) {
        if !self.cache.insert_pending(request.fingerprint()) {
            // Already pending or settled; whoever created the slot loads it.
            return;
        }
        self.lock_accumulator().push(request);
        if !self.flush_scheduled.swap(true, Ordering::SeqCst) {
            let endpoint = Arc::clone(self);
            self.scheduler.defer(Box::pin(async move {
                endpoint.flush().await;
            }));
        }
    }

    /// Loads every request accumulated since the previous flush.
    async fn flush(&self) {
        let snapshot: Vec<Request> = {
            let mut accumulator = self.lock_accumulator();
            self.flush_scheduled.store(false, Ordering::SeqCst);
            std::mem::take(&mut *accumulator)
        };
        if snapshot.is_empty() {
            return;
        }
        metrics::counter!("celldata_batch_flushes_total").increment(1);
        tracing::debug!(
            model = %self.model,
            method = %self.method,
            size = snapshot.len(),
            "flushing batch"
        );

        self.cache.notify_loading_started();
        let keys: Vec<Value> = snapshot
            .iter()
            .map(|request| request.batched_key())
            .collect();
        let call = self
            .rpc
            .call(&self.model, &self.method, vec![Value::Array(keys)]);
        match call.await {
            Ok(reply) => self.split_reply(&snapshot, reply),
            Err(error) => {
                metrics::counter!("celldata_batch_fallbacks_total").increment(1);
                tracing::warn!(
                    model = %self.model,
                    method = %self.method,
                    size = snapshot.len(),
                    error = %error,
                    "batch rpc failed, retrying keys individually"
                );
                self.retry_individually(&snapshot).await;
            }
        }
    }

    /// Success path: the reply is a list aligned positionally with the keys.
    fn split_reply(&self, snapshot: &[Request], reply: Value) {
        let values = match reply {
            Value::Array(values) if values.len() == snapshot.len() => values,
            _ => {
                // A malformed reply must still settle every slot so waiters
                // are released; reject with a descriptive failure.
                let error = RpcError::new(
                    &self.model,
                    &self.method,
                    format!("batch reply is not a list of {} values", snapshot.len()),
                );
                for request in snapshot {
                    self.cache.reject(&request.fingerprint(), error.clone());
                    self.hooks.failure(request);
                }
                return;
            }
        };
        for (request, value) in snapshot.iter().zip(values) {
            self.cache.resolve(&request.fingerprint(), value);
            self.hooks.success(request);
        }
    }

    /// Fallback path: one rpc per key, sequential, in accumulation order.
    async fn retry_individually(&self, snapshot: &[Request]) {
        for request in snapshot {
            let key = request.batched_key();
            let call = self
                .rpc
                .call(&self.model, &self.method, vec![Value::Array(vec![key])]);
            match call.await {
                Ok(reply) => match Self::single_value(reply) {
                    Some(value) => {
                        self.cache.resolve(&request.fingerprint(), value);
                        self.hooks.success(request);
                    }
                    None => {
                        let error = RpcError::new(
                            &self.model,
                            &self.method,
                            "retry reply is not a single-value list",
                        );
                        self.cache.reject(&request.fingerprint(), error);
                        self.hooks.failure(request);
                    }
                },
                Err(error) => {
                    self.cache.reject(&request.fingerprint(), error);
                    self.hooks.failure(request);
                }
            }
        }
    }

    /// Extracts the single element of a one-key reply.
    fn single_value(reply: Value) -> Option<Value> {
        match reply {
            Value::Array(mut values) if values.len() == 1 => values.pop(),
            _ => None,
        }
    }

    fn lock_accumulator(&self) -> std::sync::MutexGuard<'_, Vec<Request>> {
        self.accumulator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registers batch endpoint metrics descriptions.
///
/// Call once during application startup; optional.
pub fn register_batch_endpoint_metrics() {
    metrics::describe_counter!(
        "celldata_batch_flushes_total",
        "Total number of combined batch rpcs issued"
    );
    metrics::describe_counter!(
        "celldata_batch_fallbacks_total",
        "Total number of batches that fell back to per-key retries"
    );
}
