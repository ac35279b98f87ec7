//! Optional span-event exporter gated by `TRACING_ENABLED`, grounded in
//! `original_source/shared/tracing.py`'s `setup_tracing` (an OpenTelemetry
//! `TracerProvider` with a `ConsoleSpanExporter` that always prints span
//! start/end). Neither OpenTelemetry nor a Jaeger exporter are in this
//! crate's dependency stack, so the behaviour is reproduced with a plain
//! `tracing_subscriber::fmt` layer logging ENTER/CLOSE span events instead —
//! a true no-op when disabled, not a stub.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::Layer;

/// `Some(layer)` when `enabled`, `None` otherwise — composes into a
/// `Registry` via `tracing_subscriber`'s `Option<L>: Layer<S>` impl, so
/// callers don't need to branch the whole subscriber build.
pub fn layer<S>(enabled: bool) -> Option<impl Layer<S>>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    enabled.then(|| {
        tracing_subscriber::fmt::layer()
            .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
            .with_target(false)
    })
}
