//! formbus: serve one form over the message bus and a read-only HTTP API
//!
//! ## Startup
//! 1. Load configuration (`config.yaml`, `--config`, `FORMBUS_CONFIG`, `FORMBUS__*`)
//! 2. Open the entity store and create its table
//! 3. Connect to the broker (retried with backoff)
//! 4. Declare streams and bind the four request subjects; any failure exits
//! 5. Serve HTTP until Ctrl-C
//!
//! With the `otel` feature, counters are exported over OTLP when
//! `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
//!
//! ## Configuration
//! ```yaml
//! form:
//!   name: prisons
//! server:
//!   port: 8084
//! messaging:
//!   type: nats
//!   nats:
//!     servers: ["nats://localhost:4222"]
//!     max_deliver: 5
//! storage:
//!   type: sqlite
//!   dsn: "sqlite:local_db.sqlite?mode=rwc"
//! ```

use std::sync::Arc;

use tracing::{error, info};

use formbus::bus::init_message_bus;
use formbus::config::Config;
use formbus::dispatch::RedeliveryPolicy;
use formbus::entities::{form_for, Prison};
use formbus::http::{self, AppState};
use formbus::router::MessageRouter;
use formbus::storage::init_storage;
use formbus::utils::bootstrap;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();
    #[cfg(feature = "otel")]
    let meter_provider = bootstrap::init_metrics();

    let config_path = bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    let form = Arc::new(form_for::<Prison>(&config.form));
    info!(form = %form.name, fields = form.fields.len(), "Starting formbus");

    let store = init_storage(&config.storage).await?;
    let bus = init_message_bus(&config.messaging).await?;

    let router = MessageRouter::new(
        Arc::clone(&bus),
        Arc::clone(&form),
        Arc::clone(&store),
        RedeliveryPolicy::new(config.messaging.nats.max_deliver),
    );
    router.setup_routes().await.map_err(|e| {
        error!(error = %e, "Route setup failed");
        e
    })?;

    let server = if config.server.enabled {
        let state = AppState::<Prison> {
            store: Arc::clone(&store),
            form: Arc::clone(&form),
        };
        let host = config.server.host.clone();
        let port = config.server.port;
        Some(tokio::spawn(async move {
            if let Err(e) = http::serve(state, &host, port).await {
                error!(error = %e, "HTTP server failed");
            }
        }))
    } else {
        info!("HTTP server disabled");
        None
    };

    info!("formbus running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(server) = server {
        server.abort();
    }

    #[cfg(feature = "otel")]
    if let Some(provider) = meter_provider {
        if let Err(e) = provider.shutdown() {
            error!(error = %e, "Failed to flush metrics");
        }
    }

    Ok(())
}
