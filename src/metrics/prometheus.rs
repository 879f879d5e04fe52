/// Prometheus metrics exporter implementation
///
/// Metrics are created lazily on first use and registered in a private
/// registry that `export` renders in the text exposition format.
use crate::metrics::error::{validate_metric_name, MetricsError};
use crate::metrics::metrics::MetricsExporter;
use async_trait::async_trait;
use log::debug;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Prometheus implementation of MetricsExporter
pub struct PrometheusExporter {
    registry: Registry,
    counters: Mutex<HashMap<String, CounterVec>>,
    gauges: Mutex<HashMap<String, GaugeVec>>,
    histograms: Mutex<HashMap<String, HistogramVec>>,
}

impl Default for PrometheusExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusExporter {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
        }
    }

    /// Buckets chosen from the metric name
    fn histogram_buckets(name: &str) -> Vec<f64> {
        if name.starts_with("dubbing_") && name.ends_with("_seconds") {
            // Pipeline work: seconds to an hour
            vec![
                1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 1800.0, 3600.0,
            ]
        } else {
            // Request latencies
            vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ]
        }
    }

    fn split_labels<'a>(labels: &'a [(&'a str, &'a str)]) -> (Vec<&'a str>, Vec<&'a str>) {
        let label_names: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
        let label_values: Vec<&str> = labels.iter().map(|(_, v)| *v).collect();
        (label_names, label_values)
    }

    async fn get_or_create_counter(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<CounterVec, MetricsError> {
        let mut counters = self.counters.lock().await;
        if let Some(counter) = counters.get(name) {
            return Ok(counter.clone());
        }

        validate_metric_name(name)?;
        let counter = CounterVec::new(Opts::new(name, "Counter metric"), label_names)
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;
        self.registry
            .register(Box::new(counter.clone()))
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;

        counters.insert(name.to_string(), counter.clone());
        Ok(counter)
    }

    async fn get_or_create_gauge(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<GaugeVec, MetricsError> {
        let mut gauges = self.gauges.lock().await;
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }

        validate_metric_name(name)?;
        let gauge = GaugeVec::new(Opts::new(name, "Gauge metric"), label_names)
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;

        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    async fn get_or_create_histogram(
        &self,
        name: &str,
        label_names: &[&str],
    ) -> Result<HistogramVec, MetricsError> {
        let mut histograms = self.histograms.lock().await;
        if let Some(histogram) = histograms.get(name) {
            return Ok(histogram.clone());
        }

        validate_metric_name(name)?;
        let opts = HistogramOpts::new(name, "Histogram metric")
            .buckets(Self::histogram_buckets(name));
        let histogram = HistogramVec::new(opts, label_names)
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;
        self.registry
            .register(Box::new(histogram.clone()))
            .map_err(|e| MetricsError::registration_failed(name, e.to_string()))?;

        histograms.insert(name.to_string(), histogram.clone());
        Ok(histogram)
    }
}

#[async_trait]
impl MetricsExporter for PrometheusExporter {
    async fn increment(&self, name: &str, labels: &[(&str, &str)]) -> Result<(), MetricsError> {
        let (label_names, label_values) = Self::split_labels(labels);
        let counter = self.get_or_create_counter(name, &label_names).await?;
        counter
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_labels(name, e.to_string()))?
            .inc();

        debug!("Incremented counter {} with labels {:?}", name, labels);
        Ok(())
    }

    async fn set_gauge(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        let (label_names, label_values) = Self::split_labels(labels);
        let gauge = self.get_or_create_gauge(name, &label_names).await?;
        gauge
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_labels(name, e.to_string()))?
            .set(value);

        debug!("Set gauge {} to {} with labels {:?}", name, value, labels);
        Ok(())
    }

    async fn observe_histogram(
        &self,
        name: &str,
        value: f64,
        labels: &[(&str, &str)],
    ) -> Result<(), MetricsError> {
        let (label_names, label_values) = Self::split_labels(labels);
        let histogram = self.get_or_create_histogram(name, &label_names).await?;
        histogram
            .get_metric_with_label_values(&label_values)
            .map_err(|e| MetricsError::invalid_labels(name, e.to_string()))?
            .observe(value);

        debug!(
            "Observed histogram {} with value {} and labels {:?}",
            name, value, labels
        );
        Ok(())
    }

    async fn export(&self) -> Result<Vec<u8>, MetricsError> {
        let mut buffer = vec![];
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::export_failed(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exported_text_contains_recorded_metrics() {
        let exporter = PrometheusExporter::new();
        exporter
            .increment("dubbing_runs_finished_total", &[("outcome", "succeeded")])
            .await
            .unwrap();
        exporter.set_gauge("dubbing_queue_size", 2.0, &[]).await.unwrap();
        exporter
            .observe_histogram("dubbing_run_duration_seconds", 42.0, &[("outcome", "succeeded")])
            .await
            .unwrap();

        let text = String::from_utf8(exporter.export().await.unwrap()).unwrap();
        assert!(text.contains("dubbing_runs_finished_total{outcome=\"succeeded\"} 1"));
        assert!(text.contains("dubbing_queue_size 2"));
        assert!(text.contains("dubbing_run_duration_seconds_count{outcome=\"succeeded\"} 1"));
    }

    #[tokio::test]
    async fn mismatched_labels_are_an_error_not_a_panic() {
        let exporter = PrometheusExporter::new();
        exporter
            .increment("dubbing_runs_submitted_total", &[("target_language", "ar")])
            .await
            .unwrap();
        let err = exporter
            .increment("dubbing_runs_submitted_total", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MetricsError::InvalidLabels { .. }));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let exporter = PrometheusExporter::new();
        let err = exporter.increment("bad-name", &[]).await.unwrap_err();
        assert!(matches!(err, MetricsError::InvalidName { .. }));
    }
}
