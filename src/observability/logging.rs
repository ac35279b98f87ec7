//! Structured logger initialisation (§4.C item 1), grounded in the teacher's
//! `tracing_subscriber::registry()...init()` setup in `main.rs`. Correlation
//! IDs are injected as a `tracing` field at each call site rather than
//! through a global MDC, matching how the rest of the stack threads the
//! correlation id explicitly through function arguments.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::tracing_exporter;

pub fn init(service_name: &str, log_level: &str, json: bool, tracing_enabled: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter).with(tracing_exporter::layer(tracing_enabled));

    if json {
        let _ = registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init();
    } else {
        let _ = registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init();
    }

    tracing::info!(service = service_name, tracing_enabled, "logger initialised");
}
