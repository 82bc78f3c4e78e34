//! Prometheus metrics for the ingestion pipeline.
//!
//! All metrics follow the naming convention: `stream_<metric>_<unit>`.
//! Every metric is labelled with the stream `kind` (balance, event, record)
//! unless noted otherwise.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Files accepted into the chain
    pub static ref FILES_ACCEPTED: CounterVec = CounterVec::new(
        Opts::new("stream_files_accepted_total", "Stream files accepted after quorum and chain validation"),
        &["kind"]
    ).expect("metric creation failed");

    /// Files deferred to a later pass
    pub static ref FILES_SKIPPED: CounterVec = CounterVec::new(
        Opts::new("stream_files_skipped_total", "Stream files deferred to a later pass"),
        &["kind", "reason"]
    ).expect("metric creation failed");

    /// Faults observed, by fault type
    pub static ref FAULTS: CounterVec = CounterVec::new(
        Opts::new("stream_faults_total", "Faults observed while verifying stream files"),
        &["kind", "fault"]
    ).expect("metric creation failed");

    /// Pass duration
    pub static ref PASS_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "stream_pass_duration_seconds",
            "Wall time of one pipeline pass"
        ).buckets(exponential_buckets(0.01, 2.0, 14).expect("valid buckets")),
        &["kind"]
    ).expect("metric creation failed");

    /// Node signature checks (labels: algorithm, result)
    pub static ref SIGNATURE_VERIFICATIONS: CounterVec = CounterVec::new(
        Opts::new("stream_signature_verifications_total", "Node signature verifications"),
        &["algorithm", "result"]
    ).expect("metric creation failed");

    /// Consensus timestamp (seconds) of the last accepted file
    pub static ref LAST_ACCEPTED_TIMESTAMP: GaugeVec = GaugeVec::new(
        Opts::new("stream_last_accepted_timestamp_seconds", "Consensus end time of the last accepted file"),
        &["kind"]
    ).expect("metric creation failed");
}

/// Handle to the registry the pipeline metrics live in.
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Encode all metrics as Prometheus text format.
    pub fn encode(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register all metrics with the global registry.
///
/// Registering twice fails with `MetricsInit`.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(FILES_ACCEPTED.clone()),
        Box::new(FILES_SKIPPED.clone()),
        Box::new(FAULTS.clone()),
        Box::new(PASS_DURATION.clone()),
        Box::new(SIGNATURE_VERIFICATIONS.clone()),
        Box::new(LAST_ACCEPTED_TIMESTAMP.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}
