//! # Gateway Errors
//!
//! Purpose: One error model shared by configuration loading, request
//! construction, and the upstream driver.
//!
//! ## Design Principles
//! 1. **Request-Scoped**: Every request-time variant fails one request, never the process.
//! 2. **Defects Stand Out**: Encoder invariant violations are separable via `is_internal`.
//! 3. **Config Errors Early**: Conflicts are reported while compiling a location.

use thiserror::Error;

/// Result type used across the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced while configuring locations or serving a request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Two query directives were configured for the same scope.
    #[error("\"{directive}\" conflicts with \"{existing}\"")]
    ConfigConflict {
        directive: &'static str,
        existing: &'static str,
    },

    /// Configuration is invalid for a reason other than a directive conflict.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A directive expression failed to compile.
    #[error("invalid expression {expr:?}: {reason}")]
    InvalidExpression {
        expr: String,
        reason: &'static str,
    },

    /// No query template is configured for the location.
    #[error("no redis query specified or the query is empty")]
    MissingQuery,

    /// The computed raw query resolved to zero bytes.
    #[error("the redis query is empty")]
    EmptyQuery,

    /// The reply-count expression did not resolve to a positive integer.
    #[error("invalid reply count: {0:?}")]
    InvalidReplyCount(String),

    /// A variable referenced by an expression is not set on the request.
    #[error("variable \"{variable}\" is not set for this request")]
    ExpressionResolution { variable: String },

    /// The encoder was handed a command without arguments.
    #[error("command #{index} has no arguments")]
    EmptyCommand { index: usize },

    /// Per-command argument counts do not add up to the arguments supplied.
    #[error("commands declare {declared} arguments but {supplied} were supplied")]
    ArgumentCountMismatch { declared: usize, supplied: usize },

    /// Bytes written by the encoder differ from the computed size.
    #[error("redis query buffer error: written {written} != computed {computed}")]
    EncoderSizeMismatch { computed: usize, written: usize },

    /// The backend reply started with a byte that is not a RESP type tag.
    #[error("redis sent invalid response header 0x{byte:02x}")]
    InvalidResponseHeader { byte: u8 },

    /// The backend closed the connection before sending anything.
    #[error("upstream closed the connection before replying")]
    UpstreamClosed,

    /// An upstream phase (connect, send, read) exceeded its timeout.
    #[error("upstream {0} timed out")]
    Timeout(&'static str),

    /// Network or file IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be decoded.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl GatewayError {
    /// Returns true when the error indicates a bug in the gateway rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            GatewayError::EncoderSizeMismatch { .. }
                | GatewayError::EmptyCommand { .. }
                | GatewayError::ArgumentCountMismatch { .. }
        )
    }

    /// Returns true for errors raised while loading or compiling configuration.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            GatewayError::ConfigConflict { .. }
                | GatewayError::InvalidConfig(_)
                | GatewayError::InvalidExpression { .. }
                | GatewayError::Config(_)
        )
    }
}
