//! # Gateway Configuration
//!
//! Purpose: Describe per-location query directives and upstream settings in a
//! JSON document, and resolve them into immutable values owned per location.
//!
//! ## Design Principles
//! 1. **Raw vs Resolved**: `*Settings`/`LocationConfig` mirror the file with every
//!    field optional; `UpstreamConfig` is the resolved, fully-defaulted value.
//! 2. **Inheritance**: Locations inherit unset fields from the top-level defaults.
//! 3. **Group Override**: Query directives are inherited all-or-nothing so a child
//!    never merges into a conflicting directive set.
//!
//! ## Example
//!
//! ```json
//! {
//!   "defaults": { "upstream": { "backend": "127.0.0.1:6379" } },
//!   "locations": {
//!     "/get": { "queries": [["get", "$key"]] },
//!     "/ping": { "literal_raw_query": "*1\r\n$4\r\nping\r\n" }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{GatewayError, GatewayResult};

/// Backend used when no location sets one.
pub const DEFAULT_BACKEND: &str = "127.0.0.1:6379";

/// Connect, send, read and relay timeouts default to one minute.
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Receive buffer size for upstream replies.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Settings inherited by every location.
    pub defaults: LocationConfig,
    /// Location name -> directives.
    pub locations: BTreeMap<String, LocationConfig>,
}

impl GatewayConfig {
    /// Parses a configuration document from a JSON string.
    pub fn from_json_str(input: &str) -> GatewayResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    /// Reads and parses a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> GatewayResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Returns the named location with the defaults merged in.
    pub fn location(&self, name: &str) -> Option<LocationConfig> {
        self.locations
            .get(name)
            .map(|location| location.merge(&self.defaults))
    }

    /// Iterates every location with the defaults merged in.
    pub fn merged_locations(&self) -> impl Iterator<Item = (&str, LocationConfig)> + '_ {
        self.locations
            .iter()
            .map(|(name, location)| (name.as_str(), location.merge(&self.defaults)))
    }
}

/// Directives for one location, as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationConfig {
    /// Pre-formed RESP bytes sent verbatim.
    pub literal_raw_query: Option<String>,
    /// Expression producing pre-formed RESP bytes per request.
    pub raw_query: Option<String>,
    /// Expression producing the number of replies `raw_query` yields.
    pub raw_query_count: Option<String>,
    /// Ordered commands, each an ordered list of argument expressions.
    pub queries: Option<Vec<Vec<String>>>,
    /// Upstream connection settings.
    pub upstream: UpstreamSettings,
    /// Emit a trace event for every resolved argument.
    pub trace_arguments: Option<bool>,
}

impl LocationConfig {
    /// Returns true when any query directive is set.
    pub fn has_query_directives(&self) -> bool {
        self.literal_raw_query.is_some()
            || self.raw_query.is_some()
            || self.raw_query_count.is_some()
            || self.queries.is_some()
    }

    /// Fills unset fields from `parent`.
    ///
    /// Query directives move as one group: a location that sets any of them
    /// keeps only its own.
    pub fn merge(&self, parent: &LocationConfig) -> LocationConfig {
        let queries_from = if self.has_query_directives() {
            self
        } else {
            parent
        };

        LocationConfig {
            literal_raw_query: queries_from.literal_raw_query.clone(),
            raw_query: queries_from.raw_query.clone(),
            raw_query_count: queries_from.raw_query_count.clone(),
            queries: queries_from.queries.clone(),
            upstream: self.upstream.merge(&parent.upstream),
            trace_arguments: self.trace_arguments.or(parent.trace_arguments),
        }
    }
}

/// Upstream settings as written in the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamSettings {
    /// Backend socket address, e.g. "127.0.0.1:6379".
    pub backend: Option<String>,
    pub connect_timeout_ms: Option<u64>,
    pub send_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    /// Upper bound on relaying one reply, however steadily bytes arrive.
    pub relay_timeout_ms: Option<u64>,
    /// Receive buffer size in bytes.
    pub buffer_size: Option<usize>,
}

impl UpstreamSettings {
    /// Fills unset fields from `parent`, field by field.
    pub fn merge(&self, parent: &UpstreamSettings) -> UpstreamSettings {
        UpstreamSettings {
            backend: self.backend.clone().or_else(|| parent.backend.clone()),
            connect_timeout_ms: self.connect_timeout_ms.or(parent.connect_timeout_ms),
            send_timeout_ms: self.send_timeout_ms.or(parent.send_timeout_ms),
            read_timeout_ms: self.read_timeout_ms.or(parent.read_timeout_ms),
            relay_timeout_ms: self.relay_timeout_ms.or(parent.relay_timeout_ms),
            buffer_size: self.buffer_size.or(parent.buffer_size),
        }
    }

    /// Applies defaults and validates values.
    ///
    /// The backend must already be a socket address; no name resolution is done.
    pub fn resolve(&self) -> GatewayResult<UpstreamConfig> {
        let backend_raw = self.backend.as_deref().unwrap_or(DEFAULT_BACKEND);
        let backend: SocketAddr = backend_raw.parse().map_err(|_| {
            GatewayError::InvalidConfig(format!("invalid backend address {:?}", backend_raw))
        })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            return Err(GatewayError::InvalidConfig(
                "buffer_size must be positive".to_string(),
            ));
        }

        Ok(UpstreamConfig {
            backend,
            connect_timeout: timeout_ms("connect_timeout_ms", self.connect_timeout_ms)?,
            send_timeout: timeout_ms("send_timeout_ms", self.send_timeout_ms)?,
            read_timeout: timeout_ms("read_timeout_ms", self.read_timeout_ms)?,
            relay_timeout: timeout_ms("relay_timeout_ms", self.relay_timeout_ms)?,
            buffer_size,
        })
    }
}

fn timeout_ms(name: &str, value: Option<u64>) -> GatewayResult<Duration> {
    match value.unwrap_or(DEFAULT_TIMEOUT_MS) {
        0 => Err(GatewayError::InvalidConfig(format!("{} must be positive", name))),
        ms => Ok(Duration::from_millis(ms)),
    }
}

/// Resolved upstream settings for one location.
///
/// Immutable once built; each location owns its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpstreamConfig {
    pub backend: SocketAddr,
    pub connect_timeout: Duration,
    pub send_timeout: Duration,
    pub read_timeout: Duration,
    pub relay_timeout: Duration,
    pub buffer_size: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            backend: SocketAddr::from(([127, 0, 0, 1], 6379)),
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            send_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            read_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            relay_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}
