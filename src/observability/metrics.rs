//! Prometheus metrics.

use crate::config::MetricsSettings;
use crate::storage::IngestSummary;
use crate::{Error, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle, PrometheusRecorder};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Instant;

/// Counter of contract calls by backend, operation and status.
pub const BACKEND_QUERIES_TOTAL: &str = "provgraph_backend_queries_total";
/// Histogram of contract call latency in milliseconds.
pub const BACKEND_QUERY_DURATION_MS: &str = "provgraph_backend_query_duration_ms";
/// Counter of ingested records by backend and node kind.
pub const INGESTED_RECORDS_TOTAL: &str = "provgraph_ingested_records_total";
/// Counter of recovered `SQLite` connection mutex poisonings.
pub const SQLITE_POISON_RECOVERY_TOTAL: &str = "provgraph_sqlite_mutex_poison_recovery_total";

const DEFAULT_METRICS_PORT: u16 = 9090;

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,
    /// Address to bind the metrics exporter.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_METRICS_PORT),
        }
    }
}

impl MetricsConfig {
    /// Builds metrics configuration from config settings with env overrides.
    #[must_use]
    pub fn from_settings(settings: Option<&MetricsSettings>) -> Self {
        let enabled = settings.and_then(|config| config.enabled).unwrap_or(false);
        let port = settings
            .and_then(|config| config.port)
            .unwrap_or(DEFAULT_METRICS_PORT);

        let mut config = Self {
            enabled,
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
        };

        if let Some(enabled) = parse_bool_env("PROVGRAPH_METRICS_ENABLED") {
            config.enabled = enabled;
        }
        if let Some(port) = parse_port_env("PROVGRAPH_METRICS_PORT") {
            config.listen_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        }

        config
    }
}

/// Records one contract call.
pub fn record_query(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        BACKEND_QUERIES_TOTAL,
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        BACKEND_QUERY_DURATION_MS,
        "backend" => backend,
        "operation" => operation
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Records the records merged by one ingest call.
pub fn record_ingest(backend: &'static str, summary: &IngestSummary) {
    for (kind, count) in summary.iter().filter(|(_, count)| *count > 0) {
        metrics::counter!(INGESTED_RECORDS_TOTAL, "backend" => backend, "kind" => kind)
            .increment(u64::try_from(count).unwrap_or(u64::MAX));
    }
}

/// Installs the Prometheus recorder and HTTP listener.
///
/// Returns `None` when metrics are disabled.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the exporter cannot be built or a
/// global recorder is already installed.
pub fn install_prometheus(config: &MetricsConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enabled {
        return Ok(None);
    }

    let builder = PrometheusBuilder::new().with_http_listener(config.listen_addr);
    let handle = install_listener(builder)?;
    tracing::info!(addr = %config.listen_addr, "Prometheus metrics listener started");
    Ok(Some(handle))
}

fn install_listener(builder: PrometheusBuilder) -> Result<PrometheusHandle> {
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        return install_with_runtime(builder, &handle);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_init".to_string(),
            cause: e.to_string(),
        })?;
    let handle = runtime.handle().clone();
    let prometheus = install_with_runtime(builder, &handle)?;
    thread::Builder::new()
        .name("metrics-exporter-prometheus-http".to_string())
        .spawn(move || runtime.block_on(std::future::pending::<()>()))
        .map_err(|e| Error::OperationFailed {
            operation: "metrics_runtime_thread".to_string(),
            cause: e.to_string(),
        })?;
    Ok(prometheus)
}

fn install_with_runtime(
    builder: PrometheusBuilder,
    runtime_handle: &tokio::runtime::Handle,
) -> Result<PrometheusHandle> {
    let (recorder, exporter) = {
        let _guard = runtime_handle.enter();
        builder.build().map_err(|e| Error::OperationFailed {
            operation: "metrics_exporter_build".to_string(),
            cause: e.to_string(),
        })?
    };
    let handle = recorder.handle();
    set_global_recorder(recorder)?;
    runtime_handle.spawn(exporter);
    Ok(handle)
}

fn set_global_recorder(recorder: PrometheusRecorder) -> Result<()> {
    metrics::set_global_recorder(recorder).map_err(|e| Error::OperationFailed {
        operation: "metrics_recorder_install".to_string(),
        cause: e.to_string(),
    })
}

fn parse_bool_env(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|value| {
        let value = value.to_lowercase();
        value == "true" || value == "1" || value == "yes"
    })
}

fn parse_port_env(key: &str) -> Option<u16> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
}
