use std::net::SocketAddr;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use crate::core::config::Settings;

/// Starts the Prometheus exporter when enabled. The exporter serves scrapes
/// on its own listener so the worker itself stays free of HTTP surface.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }

    let addr: SocketAddr = settings
        .telemetry()
        .prometheus_listen_addr
        .parse()
        .context("Invalid PROMETHEUS_LISTEN_ADDR")?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(listen_addr = %addr, "Prometheus exporter started");
    Ok(())
}
