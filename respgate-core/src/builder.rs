//! # Request Builder
//!
//! Purpose: Turn a location's query template and one request's variables into
//! the exact bytes sent upstream.
//!
//! ## Policy
//! - `Literal`: the configured bytes, one expected reply.
//! - `SingleComputed`: the resolved text is already RESP and is sent as-is;
//!   the optional count expression sets the expected replies.
//! - `MultiQuery`: every command is array-encoded; one reply per command.
//!
//! `expected_reply_count` is advisory metadata for the upstream driver; the
//! payload is never repeated to match it.

use bytes::Bytes;
use tracing::debug;

use respgate_common::{GatewayError, GatewayResult};

use crate::expr::{Expr, RequestContext};
use crate::resp::encode_query;
use crate::template::QueryTemplate;

/// Outbound payload for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedRequest {
    payload: Bytes,
    expected_reply_count: usize,
}

impl EncodedRequest {
    /// Bytes to write to the backend, exactly sized.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of replies the backend is expected to send.
    pub fn expected_reply_count(&self) -> usize {
        self.expected_reply_count
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Consumes the request, returning the payload buffer.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Builds the outbound request without argument tracing.
pub fn build<C: RequestContext + ?Sized>(
    template: &QueryTemplate,
    ctx: &C,
) -> GatewayResult<EncodedRequest> {
    build_with(template, ctx, false)
}

/// Builds the outbound request; `trace_arguments` enables per-argument trace events.
pub fn build_with<C: RequestContext + ?Sized>(
    template: &QueryTemplate,
    ctx: &C,
    trace_arguments: bool,
) -> GatewayResult<EncodedRequest> {
    let request = match template {
        QueryTemplate::Literal { bytes } => EncodedRequest {
            payload: bytes.clone(),
            expected_reply_count: 1,
        },
        QueryTemplate::SingleComputed { expr, count_expr } => {
            let query = expr.resolve(ctx)?;
            if query.is_empty() {
                return Err(GatewayError::EmptyQuery);
            }
            let expected_reply_count = match count_expr {
                Some(count_expr) => resolve_reply_count(count_expr, ctx)?,
                None => 1,
            };
            EncodedRequest {
                payload: Bytes::from(query),
                expected_reply_count,
            }
        }
        QueryTemplate::MultiQuery { queries } => EncodedRequest {
            payload: encode_query(queries, ctx, trace_arguments)?,
            expected_reply_count: queries.len(),
        },
    };

    debug!(
        kind = template.kind(),
        len = request.len(),
        expected_replies = request.expected_reply_count,
        "built redis request"
    );
    Ok(request)
}

fn resolve_reply_count<C: RequestContext + ?Sized>(
    count_expr: &Expr,
    ctx: &C,
) -> GatewayResult<usize> {
    let raw = count_expr.resolve(ctx)?;
    parse_reply_count(&raw)
        .ok_or_else(|| GatewayError::InvalidReplyCount(String::from_utf8_lossy(&raw).into_owned()))
}

/// Parses a positive decimal count with no sign or whitespace.
pub fn parse_reply_count(raw: &[u8]) -> Option<usize> {
    if raw.is_empty() {
        return None;
    }
    let mut value: usize = 0;
    for &b in raw {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add((b - b'0') as usize)?;
    }
    (value > 0).then_some(value)
}
