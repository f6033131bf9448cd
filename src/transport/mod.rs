//! Bundled [`TransportAdapter`](crate::core::TransportAdapter) implementations.

pub mod http;
pub mod memory;

pub use http::HttpTransport;
pub use memory::{MemoryTransport, TransportCall};
