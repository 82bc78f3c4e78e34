//! # Ingest Service
//!
//! Owns one [`PipelineRunner`] per enabled stream kind and drives passes,
//! either once or on a fixed interval until shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use super::report::PassReport;
use super::runner::PipelineRunner;
use crate::config::PipelineConfig;
use crate::domain::{IngestError, IngestResult, StreamKind};
use crate::ports::outbound::{NodeRegistry, ObjectStore, StateStore, StreamFileSink};

/// Runners for every enabled stream kind.
pub struct IngestService {
    runners: Vec<PipelineRunner>,
}

impl IngestService {
    /// Build a runner for each kind enabled in `config`.
    pub async fn new(
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn NodeRegistry>,
        state_store: Arc<dyn StateStore>,
        sink: Arc<dyn StreamFileSink>,
    ) -> IngestResult<Self> {
        let mut runners = Vec::new();
        for kind in StreamKind::ALL {
            if !config.stream(kind).enabled {
                continue;
            }
            runners.push(
                PipelineRunner::new(
                    kind,
                    config.clone(),
                    Arc::clone(&store),
                    Arc::clone(&registry),
                    Arc::clone(&state_store),
                    Arc::clone(&sink),
                )
                .await?,
            );
        }
        if runners.is_empty() {
            return Err(IngestError::InvalidConfig(
                "no stream kind enabled".to_string(),
            ));
        }
        Ok(Self { runners })
    }

    /// Enabled kinds, in ingestion order.
    pub fn kinds(&self) -> Vec<StreamKind> {
        self.runners.iter().map(PipelineRunner::kind).collect()
    }

    /// Runner for `kind`, if enabled.
    pub fn runner(&self, kind: StreamKind) -> Option<&PipelineRunner> {
        self.runners.iter().find(|r| r.kind() == kind)
    }

    /// Mutable runner for `kind`, e.g. to clear a halt.
    pub fn runner_mut(&mut self, kind: StreamKind) -> Option<&mut PipelineRunner> {
        self.runners.iter_mut().find(|r| r.kind() == kind)
    }

    /// One pass for every kind that is not halted. One kind failing does
    /// not stop the others.
    pub async fn run_once(&mut self) -> Vec<(StreamKind, IngestResult<PassReport>)> {
        let mut results = Vec::with_capacity(self.runners.len());
        for runner in &mut self.runners {
            if runner.is_halted() {
                continue;
            }
            let result = runner.run_pass().await;
            if let Err(e) = &result {
                error!(kind = %runner.kind(), error = %e, "Pass failed");
            }
            results.push((runner.kind(), result));
        }
        results
    }

    /// Run passes every `period` until `shutdown` flips to true.
    pub async fn run_periodic(&mut self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            period_ms = period.as_millis() as u64,
            kinds = ?self.kinds(),
            "Ingest service started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for (kind, result) in self.run_once().await {
                        if let Ok(report) = result {
                            if report.halted {
                                warn!(kind = %kind, "Stream halted, waiting for operator");
                            }
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Ingest service stopped");
    }
}
