//! The remote procedure seam consumed by the cache.

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::RpcResult;

/// Asynchronous transport for `model.method(args)` invocations.
///
/// `call` is a synchronous method returning a boxed future rather than an
/// `async fn`: the synchronous prologue is the instant the request is issued
/// (observable to hosts that trace outgoing traffic), the returned future is
/// its completion. Implementations that record or multiplex outgoing calls
/// must start the call before returning.
///
/// Failures are carried as [`crate::error::RpcError`] and treated opaquely by
/// the cache: stored on the slot and replayed verbatim.
pub trait RpcCaller: Send + Sync {
    /// Begins a remote invocation and returns its completion.
    fn call(&self, model: &str, method: &str, args: Vec<Value>)
        -> BoxFuture<'static, RpcResult<Value>>;
}
