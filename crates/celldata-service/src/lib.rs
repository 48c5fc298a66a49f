//! celldata-service: access endpoints and the server-data façade
//!
//! This crate contains the service layer of the server-data cache:
//! - The single-request endpoint with in-flight deduplication
//! - The per-`(model, method)` batching endpoint with fallback retries
//! - The next-tick scheduling seam used to defer batch flushes
//! - The `ServerData` façade consumed by the formula evaluator
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              celldata-service                │
//! ├─────────────────────────────────────────────┤
//! │  config.rs      - Façade & hook config      │
//! │  scheduler.rs   - Next-tick trampoline      │
//! │  endpoints/     - Single & batch endpoints  │
//! │  server_data.rs - The evaluator façade      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod endpoints;
pub mod scheduler;
pub mod server_data;

// Re-exports for convenience
pub use config::{BatchHooks, RequestCallback, ServerDataConfig};
pub use endpoints::{BatchEndpoint, SingleEndpoint};
pub use scheduler::{TickScheduler, TokioTickScheduler};
pub use server_data::ServerData;
