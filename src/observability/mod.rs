pub mod logging;
pub mod metrics;
pub mod tracing_exporter;

pub use metrics::ServiceMetrics;
