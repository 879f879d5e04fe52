// Dubbing API metrics for monitoring and observability
//
// This module contains the metrics for the dubbing service.
// It provides a pluggable exporter and the facade used across the crate.

pub mod error;
pub mod metrics;
pub mod null;
pub mod prometheus;

use log::{debug, warn};
use std::sync::Arc;

pub use self::error::MetricsError;
pub use self::metrics::{Metrics, MetricsExporter};
pub use self::null::NullExporter;
pub use self::prometheus::PrometheusExporter;

/// Factory function to create metrics exporter based on configuration
pub fn create_metrics_exporter(exporter_type: &str) -> Arc<dyn MetricsExporter> {
    match exporter_type.to_lowercase().as_str() {
        "prometheus" => {
            debug!("Initializing Prometheus metrics exporter");
            Arc::new(PrometheusExporter::new())
        }
        "none" | "disabled" => {
            debug!("Metrics disabled, using null exporter");
            Arc::new(NullExporter)
        }
        _ => {
            warn!(
                "Unknown metrics exporter type '{}', using null exporter",
                exporter_type
            );
            Arc::new(NullExporter)
        }
    }
}
