//! Error types for the server-data cache.

use thiserror::Error;

/// Failure captured from the remote procedure layer.
///
/// The cache treats the failure opaquely: it is stored on the slot that was
/// loading and replayed verbatim on every later access. Cloneable so a single
/// failure can fan out to every waiter on the slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rpc {model}/{method} failed: {message}")]
pub struct RpcError {
    /// Model the failing call addressed.
    pub model: String,
    /// Method the failing call addressed.
    pub method: String,
    /// Opaque failure payload.
    pub message: String,
}

impl RpcError {
    /// Creates a failure for a `model.method` invocation.
    pub fn new(
        model: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the synchronous access paths.
#[derive(Debug, Clone, Error)]
pub enum DataError {
    /// The value is still being fetched. The evaluator should render a
    /// loading marker and try again after the current loading episode ends.
    #[error("server value not loaded yet")]
    NotReady,

    /// The remote call failed. The failure is sticky: it is replayed on
    /// every subsequent access without re-issuing the call.
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl DataError {
    /// Returns true for the loading marker signal, false for real failures.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, DataError::NotReady)
    }
}

/// Result type for synchronous cache accesses.
pub type DataResult<T> = Result<T, DataError>;

/// Result type for remote procedure calls.
pub type RpcResult<T> = Result<T, RpcError>;
