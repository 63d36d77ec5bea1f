//! # Reply Classification
//!
//! Purpose: Decide from the first byte of a backend reply whether it looks like
//! RESP at all. Nothing past the first byte is parsed; the reply body is
//! forwarded untouched by the caller.

use respgate_common::GatewayError;

/// Longest slice of a rejected reply worth logging.
pub const DIAGNOSTIC_WINDOW: usize = 128;

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// First byte is not one of `+ - : $ *`.
    InvalidHeader { byte: u8 },
}

impl From<RejectReason> for GatewayError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::InvalidHeader { byte } => GatewayError::InvalidResponseHeader { byte },
        }
    }
}

/// Outcome of inspecting the bytes received so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    NeedMoreBytes,
    Accepted,
    Rejected(RejectReason),
}

impl Classification {
    /// True once more bytes cannot change the outcome.
    pub fn is_final(&self) -> bool {
        !matches!(self, Classification::NeedMoreBytes)
    }
}

/// Classifies a reply from its received prefix.
///
/// Stateless: the result depends only on `received[0]`, so growing the buffer
/// never changes a final answer.
#[inline]
pub fn classify(received: &[u8]) -> Classification {
    match received.first() {
        None => Classification::NeedMoreBytes,
        Some(b'+' | b'-' | b':' | b'$' | b'*') => Classification::Accepted,
        Some(&byte) => Classification::Rejected(RejectReason::InvalidHeader { byte }),
    }
}

/// Prefix of `received` to include in diagnostics for a rejected reply.
pub fn diagnostic_window(received: &[u8]) -> &[u8] {
    &received[..received.len().min(DIAGNOSTIC_WINDOW)]
}
