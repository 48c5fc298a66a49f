//! celldata-core: request identity and the slot cache
//!
//! This crate contains the domain layer of the server-data cache:
//! - Request value objects and their canonical fingerprints
//! - The fingerprint-addressed slot cache with its one-way state machine
//! - Loading-episode tracking for the host's spinner callback
//! - The rpc transport seam consumed by the access endpoints
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               celldata-core                  │
//! ├─────────────────────────────────────────────┤
//! │  request.rs  - Request + Fingerprint        │
//! │  cache/      - Slot state machine & cache   │
//! │  rpc.rs      - RpcCaller transport seam     │
//! │  error.rs    - DataError / RpcError         │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod request;
pub mod rpc;

mod request_proptest;

// Re-export commonly used types at the crate root
pub use cache::{LoadingCallback, RequestCache, SlotState, SlotWait};
pub use error::{DataError, DataResult, RpcError, RpcResult};
pub use request::{Fingerprint, Request};
pub use rpc::RpcCaller;
