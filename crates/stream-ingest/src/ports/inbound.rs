//! # Inbound Ports
//!
//! API the pipeline exposes to its scheduler.

use async_trait::async_trait;

use crate::application::PassReport;
use crate::domain::{IngestResult, PipelineState, StreamKind};

/// Pipeline API - inbound port.
#[async_trait]
pub trait StreamIngestApi: Send {
    /// Stream kind this pipeline ingests.
    fn kind(&self) -> StreamKind;

    /// Run one pass. Passes never overlap for one pipeline.
    async fn run_pass(&mut self) -> IngestResult<PassReport>;

    /// Current resume state.
    fn state(&self) -> &PipelineState;

    /// True after a chain discontinuity until an operator clears it.
    fn is_halted(&self) -> bool;

    /// Clear a halt after the break has been resolved.
    fn clear_halt(&mut self);
}
