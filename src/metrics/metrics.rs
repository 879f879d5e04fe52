//! Metrics facade for the dubbing service
//!
//! `MetricsExporter` is the pluggable backend; `Metrics` wraps one exporter and
//! offers the domain-level recording methods used by the run manager, the
//! orchestrator and the HTTP handlers. Exporter failures are logged and never
//! propagated to callers.

use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

use crate::metrics::error::MetricsError;

/// Metrics exporter trait for pluggable monitoring systems
#[async_trait]
pub trait MetricsExporter: Send + Sync {
    /// Increment a counter metric
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError>;

    /// Set a gauge metric value
    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Observe a value in a histogram metric
    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError>;

    /// Export metrics in the format expected by the monitoring system
    async fn export(&self) -> Result<Vec<u8>, MetricsError>;
}

/// Metrics facade for the application
#[derive(Clone)]
pub struct Metrics {
    exporter: Arc<dyn MetricsExporter>,
}

impl Metrics {
    pub fn new(exporter: Arc<dyn MetricsExporter>) -> Self {
        Self { exporter }
    }

    /// Facade over the null exporter
    pub fn disabled() -> Self {
        Self::new(Arc::new(crate::metrics::null::NullExporter))
    }

    pub async fn increment(&self, name: &str, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.increment(name, labels).await {
            debug!("Metric {} not recorded: {}", name, e);
        }
    }

    pub async fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.set_gauge(name, value, labels).await {
            debug!("Metric {} not recorded: {}", name, e);
        }
    }

    pub async fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if let Err(e) = self.exporter.observe_histogram(name, value, labels).await {
            debug!("Metric {} not recorded: {}", name, e);
        }
    }

    /// Export metrics in the format expected by the monitoring system
    pub async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        self.exporter.export().await
    }

    // Convenience methods for common metrics

    /// Record HTTP request duration
    pub async fn record_http_request(
        &self,
        method: &str,
        endpoint: &str,
        status: &str,
        duration: f64,
    ) {
        let labels = [("endpoint", endpoint), ("method", method), ("status", status)];
        self.observe_histogram("http_request_duration_seconds", duration, &labels)
            .await;
        self.increment("http_requests_total", &labels).await;
    }

    /// Record a run entering the queue
    pub async fn record_run_submitted(&self, target_language: &str, model: &str) {
        self.increment(
            "dubbing_runs_submitted_total",
            &[("target_language", target_language), ("model", model)],
        )
        .await;
    }

    /// Record a run reaching a terminal state
    pub async fn record_run_finished(&self, outcome: &str, duration: f64) {
        self.increment("dubbing_runs_finished_total", &[("outcome", outcome)])
            .await;
        self.observe_histogram(
            "dubbing_run_duration_seconds",
            duration,
            &[("outcome", outcome)],
        )
        .await;
    }

    /// Record how long one stage took and how it ended
    pub async fn record_stage(&self, stage: &str, status: &str, duration: f64) {
        self.observe_histogram(
            "dubbing_stage_duration_seconds",
            duration,
            &[("stage", stage), ("status", status)],
        )
        .await;
    }

    /// Record artifacts that could not be removed
    pub async fn record_cleanup_failures(&self, count: usize) {
        for _ in 0..count {
            self.increment("dubbing_cleanup_failures_total", &[]).await;
        }
    }

    /// Set current queue size
    pub async fn set_queue_size(&self, size: usize) {
        self.set_gauge("dubbing_queue_size", size as f64, &[]).await;
    }

    /// Set number of runs currently executing
    pub async fn set_runs_processing(&self, count: usize) {
        self.set_gauge("dubbing_runs_processing", count as f64, &[])
            .await;
    }

    /// Record authentication attempt
    pub async fn record_auth_attempt(&self, status: &str) {
        self.increment("auth_attempts_total", &[("status", status)])
            .await;
    }
}
