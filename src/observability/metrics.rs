//! Metrics collector (§4.C item 2): counters for events published/consumed
//! and errors by kind, counters for external API calls by outcome, and
//! histograms for request/processing duration. Backed by the `metrics` +
//! `metrics-exporter-prometheus` crates, which the teacher declared as
//! dependencies but never wired up — here they do real work.

use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

#[derive(Clone)]
pub struct ServiceMetrics {
    service_name: String,
    handle: PrometheusHandle,
}

impl ServiceMetrics {
    pub fn install(service_name: &str) -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install prometheus recorder");
        Self { service_name: service_name.to_string(), handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub fn event_published(&self, event_name: &str) {
        metrics::counter!("events_published_total", 1, "service" => self.service_name.clone(), "event" => event_name.to_string());
    }

    pub fn event_consumed(&self, event_name: &str) {
        metrics::counter!("events_consumed_total", 1, "service" => self.service_name.clone(), "event" => event_name.to_string());
    }

    pub fn error(&self, kind: &str) {
        metrics::counter!("errors_total", 1, "service" => self.service_name.clone(), "kind" => kind.to_string());
    }

    pub fn external_api_call(&self, api_name: &str, outcome: &str) {
        metrics::counter!("external_api_calls_total", 1, "service" => self.service_name.clone(), "api" => api_name.to_string(), "outcome" => outcome.to_string());
    }

    pub fn request_duration(&self, route: &str, duration: Duration) {
        metrics::histogram!("request_duration_seconds", duration.as_secs_f64(), "service" => self.service_name.clone(), "route" => route.to_string());
    }

    pub fn processing_duration(&self, stage: &str, duration: Duration) {
        metrics::histogram!("processing_duration_seconds", duration.as_secs_f64(), "service" => self.service_name.clone(), "stage" => stage.to_string());
    }
}
