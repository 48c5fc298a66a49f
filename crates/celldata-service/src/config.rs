//! Configuration for the server-data façade.
//!
//! Configuration is programmatic: plain structs with defaults and `with_*`
//! builders. The callbacks exist for the host UI - a spinner on loading
//! start, per-request bookkeeping on batch outcomes - and default to doing
//! nothing.

use std::fmt;
use std::sync::Arc;

use celldata_core::cache::LoadingCallback;
use celldata_core::request::Request;

/// Callback invoked per request on the batch observability surface.
pub type RequestCallback = Arc<dyn Fn(&Request) + Send + Sync>;

/// Hooks fired by the batch endpoints as individual requests settle.
///
/// On a successful combined call, `on_success` fires for every request in
/// accumulation order. When the combined call fails and the endpoint retries
/// key by key, each retry fires `on_success` or `on_failure` with its own
/// outcome.
#[derive(Clone, Default)]
pub struct BatchHooks {
    /// Invoked for each request whose value was loaded.
    pub on_success: Option<RequestCallback>,
    /// Invoked for each request whose load failed.
    pub on_failure: Option<RequestCallback>,
}

impl BatchHooks {
    /// Sets the per-request success callback.
    pub fn with_on_success(mut self, callback: RequestCallback) -> Self {
        self.on_success = Some(callback);
        self
    }

    /// Sets the per-request failure callback.
    pub fn with_on_failure(mut self, callback: RequestCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    pub(crate) fn success(&self, request: &Request) {
        if let Some(callback) = &self.on_success {
            callback(request);
        }
    }

    pub(crate) fn failure(&self, request: &Request) {
        if let Some(callback) = &self.on_failure {
            callback(request);
        }
    }
}

impl fmt::Debug for BatchHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchHooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Configuration for [`crate::ServerData`].
#[derive(Clone, Default)]
pub struct ServerDataConfig {
    /// Invoked once per loading episode, when the first value starts
    /// loading while nothing else was.
    pub when_data_start_loading: Option<LoadingCallback>,
    /// Hooks applied to every batch endpoint the façade creates.
    pub batch_hooks: BatchHooks,
}

impl ServerDataConfig {
    /// Sets the loading-episode callback.
    pub fn with_when_data_start_loading(mut self, callback: LoadingCallback) -> Self {
        self.when_data_start_loading = Some(callback);
        self
    }

    /// Sets the batch observability hooks.
    pub fn with_batch_hooks(mut self, hooks: BatchHooks) -> Self {
        self.batch_hooks = hooks;
        self
    }
}

impl fmt::Debug for ServerDataConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerDataConfig")
            .field(
                "when_data_start_loading",
                &self.when_data_start_loading.is_some(),
            )
            .field("batch_hooks", &self.batch_hooks)
            .finish()
    }
}
