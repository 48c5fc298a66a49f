//! Shared test support: a step-recording mock transport.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde_json::Value;

use celldata_core::error::{RpcError, RpcResult};
use celldata_core::rpc::RpcCaller;

/// Records observable steps (outgoing rpcs, loading notifications, batch
/// hooks) in the order they happen.
#[derive(Clone, Default)]
pub struct StepRecorder {
    steps: Arc<Mutex<Vec<String>>>,
}

impl StepRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, step: impl Into<String>) {
        self.steps.lock().unwrap().push(step.into());
    }

    pub fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    /// Number of recorded steps with the given name.
    pub fn count(&self, name: &str) -> usize {
        self.steps
            .lock()
            .unwrap()
            .iter()
            .filter(|step| step.as_str() == name)
            .count()
    }
}

/// How the mock transport answers.
pub enum Behavior {
    /// Reply with the first argument.
    Echo,
    /// Reject every call with the given message.
    FailAll(String),
    /// Reply with the first argument, unless the first argument is a key
    /// list containing the poison key - then reject.
    PoisonKey(Value),
}

/// Mock transport: records a `model/method` step at call time and replies
/// per its [`Behavior`].
pub struct MockRpc {
    steps: StepRecorder,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    behavior: Behavior,
}

impl MockRpc {
    pub fn new(steps: StepRecorder, behavior: Behavior) -> Self {
        Self {
            steps,
            calls: Mutex::new(Vec::new()),
            behavior,
        }
    }

    /// Every recorded call as `(model/method, args)`.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl RpcCaller for MockRpc {
    fn call(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
    ) -> BoxFuture<'static, RpcResult<Value>> {
        let name = format!("{model}/{method}");
        self.steps.push(name.clone());
        self.calls.lock().unwrap().push((name, args.clone()));

        let first = args.first().cloned().unwrap_or(Value::Null);
        let outcome = match &self.behavior {
            Behavior::Echo => Ok(first),
            Behavior::FailAll(message) => Err(RpcError::new(model, method, message.clone())),
            Behavior::PoisonKey(poison) => match &first {
                Value::Array(keys) if keys.contains(poison) => {
                    Err(RpcError::new(model, method, "poisoned batch"))
                }
                _ => Ok(first),
            },
        };
        Box::pin(async move { outcome })
    }
}

/// Lets every deferred task scheduled so far run to completion.
///
/// On the current-thread runtime a handful of yields drains the spawned
/// flushes and fire-and-forget fetches deterministically.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
