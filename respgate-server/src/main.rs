//! `respgate <config.json> <location> [name=value ...]`
//!
//! Builds the location's query from the given variables, sends it to the
//! location's backend and writes the raw reply to stdout.

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use respgate_common::{GatewayConfig, GatewayError};
use respgate_core::{compile_locations, Variables};
use respgate_server::UpstreamDriver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (config_path, location_name) = match (args.next(), args.next()) {
        (Some(config), Some(location)) => (config, location),
        _ => bail!("usage: respgate <config.json> <location> [name=value ...]"),
    };
    let vars = parse_vars(args)?;

    let config = GatewayConfig::from_path(&config_path)
        .with_context(|| format!("loading {}", config_path))?;
    let locations = compile_locations(&config).context("compiling locations")?;
    let location = locations
        .get(&location_name)
        .with_context(|| format!("unknown location {:?}", location_name))?;

    let request = location
        .build(&vars)
        .map_err(|err| flag_internal(&location_name, err))
        .with_context(|| format!("building request for {}", location_name))?;
    let driver = UpstreamDriver::for_location(location);

    let mut stdout = tokio::io::stdout();
    let summary = driver
        .exchange(&request, &mut stdout)
        .await
        .map_err(|err| flag_internal(&location_name, err))
        .with_context(|| format!("exchanging with {}", driver.config().backend))?;

    info!(
        location = %location_name,
        forwarded = summary.bytes_forwarded,
        expected_replies = summary.expected_replies,
        "request complete"
    );
    Ok(())
}

/// Logs encoder defects separately from bad input before they propagate.
fn flag_internal(location: &str, err: GatewayError) -> GatewayError {
    if err.is_internal() {
        error!(location, error = %err, "internal gateway error, request not sent");
    }
    err
}

fn parse_vars(args: impl Iterator<Item = String>) -> Result<Variables> {
    let mut vars = Variables::new();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            bail!("expected name=value, got {:?}", arg);
        };
        vars.set(name, value);
    }
    Ok(vars)
}
