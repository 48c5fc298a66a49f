//! Access endpoints driving requests through the rpc transport.
//!
//! Two endpoints share one [`celldata_core::RequestCache`]:
//!
//! - [`SingleEndpoint`] issues one rpc per request and deduplicates
//!   concurrent identical fetches.
//! - [`BatchEndpoint`] accumulates keys for one `(model, method)` pair and
//!   loads a whole tick's worth with a single combined rpc, retrying key by
//!   key when the combined call fails.
//!
//! Both expose the same shape - a submit-style entry point plus a
//! synchronous `get` - so the façade routes either way without a trait
//! object.

mod batch;
mod inflight;
mod single;

pub use batch::{register_batch_endpoint_metrics, BatchEndpoint};
pub use single::SingleEndpoint;
