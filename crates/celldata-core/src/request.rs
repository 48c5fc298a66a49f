//! Request identity for remote invocations.

use std::fmt;

use serde_json::Value;

/// A single `model.method(args)` invocation.
///
/// Pure value object, immutable after construction. Two requests with
/// JSON-equivalent arguments share a [`Fingerprint`] and therefore a cache
/// slot, regardless of which access path built them.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Target model identifier (e.g. "res.partner").
    pub model: String,
    /// Method invoked on the model.
    pub method: String,
    /// Ordered positional arguments, JSON-serializable.
    pub args: Vec<Value>,
}

impl Request {
    /// Creates a new request.
    pub fn new(model: impl Into<String>, method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            model: model.into(),
            method: method.into(),
            args,
        }
    }

    /// Canonical identity of the `(model, method, args)` triple.
    ///
    /// Arrays serialize positionally and objects key-sorted, so structurally
    /// equal argument lists always produce the same fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        // serde_json object maps are ordered, which makes the serialization
        // canonical without an explicit sort pass.
        let canonical =
            serde_json::to_string(&(&self.model, &self.method, &self.args)).unwrap_or_default();
        Fingerprint(canonical)
    }

    /// The batched key: by convention the first positional argument.
    ///
    /// Requests built by the batch path carry exactly one argument; a request
    /// with no arguments yields `Value::Null`.
    pub fn batched_key(&self) -> Value {
        self.args.first().cloned().unwrap_or(Value::Null)
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.model, self.method)
    }
}

/// Canonical string identity of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The canonical serialization backing this fingerprint.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
