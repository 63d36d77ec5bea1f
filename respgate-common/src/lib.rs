// respgate-common - Shared error model and configuration for the RESP gateway
//
// This crate defines the directive model every location is compiled from

pub mod config;
pub mod error;

// Re-export for convenience
pub use config::*;
pub use error::*;
