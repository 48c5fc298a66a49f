//! Next-tick scheduling seam for deferred work.

use futures::future::BoxFuture;

/// Defers tasks past the current synchronous region.
///
/// Batch flushes and fire-and-forget fetches are handed to this seam rather
/// than run inline. The contract is the host's "next tick": a deferred task
/// must not run before the current synchronous region drains, which is what
/// lets a batch flush collect every key submitted during the region.
pub trait TickScheduler: Send + Sync {
    /// Runs `task` after the current synchronous region has drained.
    fn defer(&self, task: BoxFuture<'static, ()>);
}

/// Tokio-backed scheduler.
///
/// A task spawned on a current-thread runtime cannot run before the spawning
/// region yields, which is exactly the next-tick boundary. On a
/// multi-threaded runtime deferred tasks may start while the region is still
/// executing; hosts that rely on strict tick semantics should drive the cache
/// from a current-thread runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTickScheduler;

impl TickScheduler for TokioTickScheduler {
    fn defer(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}
