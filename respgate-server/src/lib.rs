//! # RESP Gateway Server
//!
//! Purpose: Connect compiled locations to a live RESP backend over tokio.

pub mod upstream;

pub use upstream::{ExchangeSummary, UpstreamDriver};
