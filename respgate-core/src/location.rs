//! # Compiled Locations
//!
//! Purpose: Bundle everything a request needs from one configuration scope:
//! the shared query template, the resolved upstream settings and the trace
//! flag.

use std::collections::BTreeMap;
use std::sync::Arc;

use respgate_common::{
    GatewayConfig, GatewayError, GatewayResult, LocationConfig, UpstreamConfig,
};

use crate::builder::{build_with, EncodedRequest};
use crate::expr::RequestContext;
use crate::template::QueryTemplate;

/// Immutable per-location state shared by concurrent requests.
#[derive(Debug, Clone)]
pub struct Location {
    template: Option<Arc<QueryTemplate>>,
    upstream: UpstreamConfig,
    trace_arguments: bool,
}

impl Location {
    /// Compiles one (already merged) location.
    pub fn compile(config: &LocationConfig) -> GatewayResult<Self> {
        Ok(Location {
            template: QueryTemplate::from_directives(config)?.map(Arc::new),
            upstream: config.upstream.resolve()?,
            trace_arguments: config.trace_arguments.unwrap_or(false),
        })
    }

    /// Builds a location directly from a template, with default upstream settings.
    pub fn from_template(template: QueryTemplate) -> Self {
        Location {
            template: Some(Arc::new(template)),
            upstream: UpstreamConfig::default(),
            trace_arguments: false,
        }
    }

    pub fn template(&self) -> Option<&QueryTemplate> {
        self.template.as_deref()
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    pub fn trace_arguments(&self) -> bool {
        self.trace_arguments
    }

    /// Builds the outbound request for one inbound request.
    pub fn build<C: RequestContext + ?Sized>(&self, ctx: &C) -> GatewayResult<EncodedRequest> {
        let template = self.template.as_deref().ok_or(GatewayError::MissingQuery)?;
        build_with(template, ctx, self.trace_arguments)
    }
}

/// Compiles every location of a configuration document.
///
/// Fails on the first invalid location so conflicts surface at load time.
pub fn compile_locations(config: &GatewayConfig) -> GatewayResult<BTreeMap<String, Location>> {
    config
        .merged_locations()
        .map(|(name, merged)| -> GatewayResult<(String, Location)> {
            Ok((name.to_string(), Location::compile(&merged)?))
        })
        .collect()
}
