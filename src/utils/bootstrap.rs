//! Bootstrap utilities for the formbus binary.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the FORMBUS_LOG environment variable.
///
/// Defaults to "info" level if FORMBUS_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Standard OTLP endpoint variable; metrics export is enabled when it is set.
#[cfg(feature = "otel")]
pub const OTLP_ENDPOINT_ENV_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Install a global meter provider exporting over OTLP.
///
/// Returns `None` when no endpoint is configured or the exporter cannot be
/// built; the counters in [`crate::metrics`] are then no-ops. Shut the
/// returned provider down before exit to flush pending measurements.
#[cfg(feature = "otel")]
pub fn init_metrics() -> Option<opentelemetry_sdk::metrics::SdkMeterProvider> {
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

    if std::env::var(OTLP_ENDPOINT_ENV_VAR).is_err() {
        info!("{} not set, metrics export disabled", OTLP_ENDPOINT_ENV_VAR);
        return None;
    }

    let exporter = match opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            warn!(error = %e, "Failed to build OTLP metric exporter, metrics export disabled");
            return None;
        }
    };

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio).build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    opentelemetry::global::set_meter_provider(provider.clone());
    info!("OTLP metrics export enabled");

    Some(provider)
}

/// Config file path from `--config <path>`, `--config=<path>` or `-c <path>`.
pub fn parse_config_path() -> Option<String> {
    config_path_from_args(std::env::args().skip(1))
}

fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

/// Backoff for connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Connect to a service with exponential backoff retry.
///
/// Returns the connected client on success, or the last error once
/// [`connection_backoff`] is exhausted.
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay: Duration| {
            warn!(
                service = service_name,
                address,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Connection failed, retrying"
            );
        })
        .await;

    match &result {
        Ok(_) => info!(service = service_name, address, "Connected"),
        Err(e) => error!(service = service_name, address, error = %e, "Giving up on connection"),
    }

    result
}
