//! # Query Templates
//!
//! Purpose: Hold the one query shape a location sends upstream, compiled
//! once from directives and shared read-only by every request.
//!
//! ## Design Principles
//! 1. **Tagged Union**: Exactly one variant per location; request-time code
//!    matches on the variant instead of probing optional fields.
//! 2. **Validate at Load**: Directive conflicts, empty commands and bad
//!    expressions are configuration errors, never request errors.
//! 3. **Shared Literal**: Literal bytes live in `Bytes` so each request clones a
//!    reference, not the payload.

use bytes::Bytes;

use respgate_common::{GatewayError, GatewayResult, LocationConfig};

use crate::expr::Expr;

/// Directive names as they appear in configuration.
pub const LITERAL_RAW_QUERY: &str = "literal_raw_query";
pub const RAW_QUERY: &str = "raw_query";
pub const RAW_QUERY_COUNT: &str = "raw_query_count";
pub const QUERIES: &str = "queries";

/// What a location sends to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTemplate {
    /// Fixed, pre-formed command bytes sent verbatim.
    Literal { bytes: Bytes },
    /// One computed raw query, plus an optional expected-reply count.
    SingleComputed {
        expr: Expr,
        count_expr: Option<Expr>,
    },
    /// Ordered commands of ordered argument expressions.
    MultiQuery { queries: Vec<Vec<Expr>> },
}

impl QueryTemplate {
    /// Builds a literal template.
    ///
    /// The bytes are trusted to be well-formed RESP and never inspected.
    pub fn literal(bytes: impl Into<Bytes>) -> GatewayResult<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(GatewayError::InvalidConfig(format!(
                "\"{}\" must not be empty",
                LITERAL_RAW_QUERY
            )));
        }
        Ok(QueryTemplate::Literal { bytes })
    }

    /// Builds a single computed template from expression sources.
    pub fn single(expr: &str, count_expr: Option<&str>) -> GatewayResult<Self> {
        Ok(QueryTemplate::SingleComputed {
            expr: Expr::compile(expr)?,
            count_expr: count_expr.map(Expr::compile).transpose()?,
        })
    }

    /// Builds a multi-command template from argument sources.
    pub fn multi<Q, A>(queries: &[Q]) -> GatewayResult<Self>
    where
        Q: AsRef<[A]>,
        A: AsRef<str>,
    {
        if queries.is_empty() {
            return Err(GatewayError::InvalidConfig(format!(
                "\"{}\" needs at least one command",
                QUERIES
            )));
        }

        let mut compiled = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let args = query.as_ref();
            if args.is_empty() {
                return Err(GatewayError::InvalidConfig(format!(
                    "\"{}\" command #{} has no arguments",
                    QUERIES, index
                )));
            }
            let exprs = args
                .iter()
                .map(|arg| Expr::compile(arg.as_ref()))
                .collect::<GatewayResult<Vec<_>>>()?;
            compiled.push(exprs);
        }
        Ok(QueryTemplate::MultiQuery { queries: compiled })
    }

    /// Compiles the query directives of one location.
    ///
    /// Returns `Ok(None)` when no query directive is set.
    pub fn from_directives(config: &LocationConfig) -> GatewayResult<Option<Self>> {
        if config.queries.is_some() {
            if config.literal_raw_query.is_some() {
                return Err(conflict(QUERIES, LITERAL_RAW_QUERY));
            }
            if config.raw_query.is_some() {
                return Err(conflict(QUERIES, RAW_QUERY));
            }
        }
        if config.literal_raw_query.is_some() && config.raw_query.is_some() {
            return Err(conflict(RAW_QUERY, LITERAL_RAW_QUERY));
        }
        if config.raw_query_count.is_some() && config.raw_query.is_none() {
            return Err(GatewayError::InvalidConfig(format!(
                "\"{}\" requires \"{}\"",
                RAW_QUERY_COUNT, RAW_QUERY
            )));
        }

        if let Some(queries) = &config.queries {
            return Self::multi(queries).map(Some);
        }
        if let Some(literal) = &config.literal_raw_query {
            return Self::literal(literal.clone().into_bytes()).map(Some);
        }
        if let Some(raw) = &config.raw_query {
            return Self::single(raw, config.raw_query_count.as_deref()).map(Some);
        }
        Ok(None)
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryTemplate::Literal { .. } => "literal",
            QueryTemplate::SingleComputed { .. } => "single",
            QueryTemplate::MultiQuery { .. } => "multi",
        }
    }
}

fn conflict(directive: &'static str, existing: &'static str) -> GatewayError {
    GatewayError::ConfigConflict {
        directive,
        existing,
    }
}
