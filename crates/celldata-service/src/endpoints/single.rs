//! Single-request endpoint.

use std::sync::Arc;

use serde_json::Value;

use celldata_core::cache::{RequestCache, SlotState, SlotWait};
use celldata_core::error::{DataError, DataResult, RpcError, RpcResult};
use celldata_core::request::Request;
use celldata_core::rpc::RpcCaller;

use super::inflight::InFlight;
use crate::scheduler::TickScheduler;

/// Drives individual requests through the rpc transport.
///
/// Concurrent fetches for one fingerprint share a single rpc: the first
/// caller wins the in-flight election and issues it, everyone else waits on
/// the shared slot. A pending slot created by the batch path is the one
/// exception - the single path issues its own rpc alongside the scheduled
/// batch, and whichever completes first settles the slot.
pub struct SingleEndpoint {
    cache: Arc<RequestCache>,
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn TickScheduler>,
    in_flight: Arc<InFlight>,
}

impl SingleEndpoint {
    /// Creates an endpoint over the shared cache and transport.
    pub fn new(
        cache: Arc<RequestCache>,
        rpc: Arc<dyn RpcCaller>,
        scheduler: Arc<dyn TickScheduler>,
    ) -> Self {
        Self {
            cache,
            rpc,
            scheduler,
            in_flight: Arc::new(InFlight::new()),
        }
    }

    /// Fetches the value for `request`, reusing the cached outcome when one
    /// exists.
    ///
    /// A settled slot answers immediately, including sticky rejections. A
    /// pending slot is awaited; the endpoint only issues an rpc of its own
    /// when no single-path call is in flight for the fingerprint.
    pub async fn fetch(&self, request: &Request) -> RpcResult<Value> {
        let fingerprint = request.fingerprint();
        self.cache.insert_pending(fingerprint.clone());

        // Subscribe before driving so the outcome cannot be missed.
        let wait = match self.cache.subscribe(&fingerprint) {
            Some(wait) => wait,
            // Slots are never removed; fail soft rather than panic.
            None => {
                return Err(RpcError::new(
                    &request.model,
                    &request.method,
                    "request slot missing",
                ))
            }
        };

        match wait {
            SlotWait::Ready(outcome) => outcome,
            SlotWait::Waiting(receiver) => {
                if let Some(guard) = self.in_flight.acquire(fingerprint.clone()) {
                    // Leader for the single path. When the pending slot was
                    // created by the batch path this runs next to the
                    // scheduled batch call; the first settle wins and the
                    // loser's is a no-op.
                    tracing::debug!(request = %request, "issuing rpc");
                    let call =
                        self.rpc
                            .call(&request.model, &request.method, request.args.clone());
                    self.cache.notify_loading_started();
                    let _guard = guard;
                    match call.await {
                        Ok(value) => self.cache.resolve(&fingerprint, value),
                        Err(error) => self.cache.reject(&fingerprint, error),
                    }
                }
                match receiver.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(RpcError::new(
                        &request.model,
                        &request.method,
                        "request slot dropped before settling",
                    )),
                }
            }
        }
    }

    /// Synchronous read: the cached value, the sticky failure, or
    /// [`DataError::NotReady`] while the value is loading.
    ///
    /// A miss starts the load before returning: the rpc is issued from the
    /// calling region and its completion is awaited on the next tick, so the
    /// outcome lands in the cache without anyone polling for it.
    pub fn get(&self, request: &Request) -> DataResult<Value> {
        let fingerprint = request.fingerprint();
        match self.cache.snapshot(&fingerprint) {
            Some(SlotState::Resolved(value)) => Ok(value),
            Some(SlotState::Rejected(error)) => Err(DataError::Rpc(error)),
            Some(SlotState::Pending) => Err(DataError::NotReady),
            None => {
                self.start_fetch(request);
                Err(DataError::NotReady)
            }
        }
    }

    /// Starts loading `request` without waiting for the outcome.
    fn start_fetch(&self, request: &Request) {
        let fingerprint = request.fingerprint();
        if !self.cache.insert_pending(fingerprint.clone()) {
            // Someone else created the slot since the snapshot; their driver
            // will settle it.
            return;
        }
        let Some(guard) = self.in_flight.acquire(fingerprint.clone()) else {
            return;
        };
        tracing::debug!(request = %request, "issuing rpc");
        let call = self
            .rpc
            .call(&request.model, &request.method, request.args.clone());
        self.cache.notify_loading_started();

        let cache = Arc::clone(&self.cache);
        self.scheduler.defer(Box::pin(async move {
            let _guard = guard;
            match call.await {
                Ok(value) => cache.resolve(&fingerprint, value),
                Err(error) => cache.reject(&fingerprint, error),
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Mock caller replying with the first argument, counting calls.
    struct EchoRpc {
        calls: AtomicUsize,
    }

    impl EchoRpc {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RpcCaller for EchoRpc {
        fn call(
            &self,
            _model: &str,
            _method: &str,
            args: Vec<Value>,
        ) -> BoxFuture<'static, RpcResult<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = args.first().cloned().unwrap_or(Value::Null);
            Box::pin(async move { Ok(reply) })
        }
    }

    /// Mock caller failing every call.
    struct FailingRpc {
        calls: AtomicUsize,
    }

    impl RpcCaller for FailingRpc {
        fn call(
            &self,
            model: &str,
            method: &str,
            _args: Vec<Value>,
        ) -> BoxFuture<'static, RpcResult<Value>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let error = RpcError::new(model, method, "backend unavailable");
            Box::pin(async move { Err(error) })
        }
    }

    /// Scheduler collecting deferred tasks so tests control the tick.
    #[derive(Default)]
    struct QueueScheduler {
        tasks: Mutex<Vec<BoxFuture<'static, ()>>>,
    }

    impl QueueScheduler {
        async fn run_until_idle(&self) {
            loop {
                let batch: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap());
                if batch.is_empty() {
                    break;
                }
                for task in batch {
                    task.await;
                }
            }
        }
    }

    impl TickScheduler for QueueScheduler {
        fn defer(&self, task: BoxFuture<'static, ()>) {
            self.tasks.lock().unwrap().push(task);
        }
    }

    fn endpoint_with(
        rpc: Arc<dyn RpcCaller>,
    ) -> (SingleEndpoint, Arc<RequestCache>, Arc<QueueScheduler>) {
        let cache = Arc::new(RequestCache::new());
        let scheduler = Arc::new(QueueScheduler::default());
        let endpoint = SingleEndpoint::new(
            Arc::clone(&cache),
            rpc,
            Arc::clone(&scheduler) as Arc<dyn TickScheduler>,
        );
        (endpoint, cache, scheduler)
    }

    fn request(n: i64) -> Request {
        Request::new("res.partner", "read", vec![json!(n)])
    }

    #[tokio::test]
    async fn test_get_reports_not_ready_then_the_value() {
        // Arrange
        let rpc = Arc::new(EchoRpc::new());
        let (endpoint, _cache, scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);

        // Act - first read misses and starts the load
        let first = endpoint.get(&request(5));
        assert!(matches!(first, Err(DataError::NotReady)));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1, "rpc issued from the miss");

        scheduler.run_until_idle().await;

        // Assert - the outcome landed in the cache
        assert_eq!(endpoint.get(&request(5)).expect("loaded"), json!(5));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_replays_the_stored_failure_without_retrying() {
        let rpc = Arc::new(FailingRpc {
            calls: AtomicUsize::new(0),
        });
        let (endpoint, _cache, scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);

        assert!(matches!(endpoint.get(&request(5)), Err(DataError::NotReady)));
        scheduler.run_until_idle().await;

        // Every later read replays the failure; no second rpc
        for _ in 0..3 {
            match endpoint.get(&request(5)) {
                Err(DataError::Rpc(error)) => assert_eq!(error.message, "backend unavailable"),
                other => panic!("expected sticky failure, got {other:?}"),
            }
        }
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_share_one_rpc() {
        let rpc = Arc::new(EchoRpc::new());
        let (endpoint, _cache, _scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);

        let req = request(5);
        let (a, b) = tokio::join!(endpoint.fetch(&req), endpoint.fetch(&req));

        assert_eq!(a.expect("first fetch"), json!(5));
        assert_eq!(b.expect("second fetch"), json!(5));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_answers_from_a_settled_slot() {
        let rpc = Arc::new(EchoRpc::new());
        let (endpoint, _cache, _scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);

        assert_eq!(endpoint.fetch(&request(5)).await.expect("loaded"), json!(5));
        assert_eq!(endpoint.fetch(&request(5)).await.expect("cached"), json!(5));

        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_rejects_with_the_stored_failure() {
        let rpc = Arc::new(FailingRpc {
            calls: AtomicUsize::new(0),
        });
        let (endpoint, _cache, _scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);

        let first = endpoint.fetch(&request(5)).await;
        let second = endpoint.fetch(&request(5)).await;

        assert_eq!(first.expect_err("failed load").message, "backend unavailable");
        assert_eq!(second.expect_err("sticky failure").message, "backend unavailable");
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_joins_a_batch_created_pending_slot_with_its_own_rpc() {
        // Arrange - a pending slot created by the batch path (no single-path
        // call in flight for it)
        let rpc = Arc::new(EchoRpc::new());
        let (endpoint, cache, _scheduler) = endpoint_with(Arc::clone(&rpc) as Arc<dyn RpcCaller>);
        let fingerprint = request(5).fingerprint();
        cache.insert_pending(fingerprint.clone());

        // Act
        let batch_task = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move {
                // Settle the slot as the batch flush would, once the fetch
                // below has had a chance to issue its own rpc.
                tokio::task::yield_now().await;
                cache.resolve(&fingerprint, json!(5));
            }
        });
        let value = endpoint.fetch(&request(5)).await.expect("settled");
        batch_task.await.expect("batch task");

        // Assert - the single path issued its own rpc next to the batch
        assert_eq!(value, json!(5));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }
}
