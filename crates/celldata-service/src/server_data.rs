//! The server-data façade consumed by the formula evaluator.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use celldata_core::cache::RequestCache;
use celldata_core::error::{DataResult, RpcResult};
use celldata_core::request::Request;
use celldata_core::rpc::RpcCaller;

use crate::config::{BatchHooks, ServerDataConfig};
use crate::endpoints::{BatchEndpoint, SingleEndpoint};
use crate::scheduler::{TickScheduler, TokioTickScheduler};

/// Bridges a synchronous evaluation engine with the asynchronous rpc
/// transport.
///
/// The evaluator calls [`ServerData::get`] or [`ServerData::batch_get`]
/// synchronously: either the value is already cached and returned, or the
/// call reports [`celldata_core::DataError::NotReady`] and the façade loads
/// the value in the background. Loads are deduplicated per fingerprint,
/// batched per `(model, method)` within one scheduling tick, and failures
/// stick to the slot that caused them.
///
/// One instance per host session; there is no global state.
pub struct ServerData {
    cache: Arc<RequestCache>,
    rpc: Arc<dyn RpcCaller>,
    scheduler: Arc<dyn TickScheduler>,
    single: Arc<SingleEndpoint>,
    batch_endpoints: DashMap<(String, String), Arc<BatchEndpoint>>,
    batch_hooks: BatchHooks,
}

impl std::fmt::Debug for ServerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerData")
            .field("cache", &self.cache)
            .field("batch_endpoint_count", &self.batch_endpoints.len())
            .finish()
    }
}

impl ServerData {
    /// Creates a façade over `rpc` with the default tokio tick scheduler.
    ///
    /// Must be called from within a tokio runtime; background loads are
    /// spawned onto it.
    pub fn new(rpc: Arc<dyn RpcCaller>, config: ServerDataConfig) -> Self {
        Self::with_scheduler(rpc, Arc::new(TokioTickScheduler), config)
    }

    /// Creates a façade with an explicit tick scheduler.
    pub fn with_scheduler(
        rpc: Arc<dyn RpcCaller>,
        scheduler: Arc<dyn TickScheduler>,
        config: ServerDataConfig,
    ) -> Self {
        let cache = Arc::new(RequestCache::with_loading_callback(
            config.when_data_start_loading,
        ));
        let single = Arc::new(SingleEndpoint::new(
            Arc::clone(&cache),
            Arc::clone(&rpc),
            Arc::clone(&scheduler),
        ));
        Self {
            cache,
            rpc,
            scheduler,
            single,
            batch_endpoints: DashMap::new(),
            batch_hooks: config.batch_hooks,
        }
    }

    /// Synchronous read of `model.method(args)`.
    ///
    /// Returns the cached value, replays the sticky failure, or reports
    /// [`celldata_core::DataError::NotReady`] - starting the load on a miss.
    pub fn get(&self, model: &str, method: &str, args: Vec<Value>) -> DataResult<Value> {
        self.single.get(&Request::new(model, method, args))
    }

    /// Asynchronous read of `model.method(args)`.
    ///
    /// Concurrent identical fetches share one rpc; settled slots answer
    /// immediately.
    pub async fn fetch(&self, model: &str, method: &str, args: Vec<Value>) -> RpcResult<Value> {
        self.single.fetch(&Request::new(model, method, args)).await
    }

    /// Synchronous batched read of `model.method([key])`.
    ///
    /// A miss joins the next tick's combined rpc for `(model, method)`
    /// together with every other key requested during the current region.
    pub fn batch_get(&self, model: &str, method: &str, key: Value) -> DataResult<Value> {
        self.batch_endpoint(model, method).get(key)
    }

    /// Returns true while at least one value is loading.
    pub fn is_loading(&self) -> bool {
        self.cache.pending_count() > 0
    }

    /// The shared request cache, for introspection.
    pub fn cache(&self) -> &RequestCache {
        &self.cache
    }

    fn batch_endpoint(&self, model: &str, method: &str) -> Arc<BatchEndpoint> {
        let key = (model.to_string(), method.to_string());
        let endpoint = self.batch_endpoints.entry(key).or_insert_with(|| {
            Arc::new(BatchEndpoint::new(
                model,
                method,
                Arc::clone(&self.cache),
                Arc::clone(&self.rpc),
                Arc::clone(&self.scheduler),
                self.batch_hooks.clone(),
            ))
        });
        Arc::clone(&endpoint)
    }
}
