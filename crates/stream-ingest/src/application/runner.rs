//! # Pipeline Runner
//!
//! One pass per call:
//!
//! ```text
//! Selecting -> Listing/Downloading (one task per node)
//!           -> Quorum (per timestamp, in order)
//!           -> Verifying (per timestamp, concurrently)
//!           -> Advancing (in order, stops at the first unresolved file)
//! ```
//!
//! Node tasks run in a `JoinSet` behind a semaphore. Only the claim set is
//! shared between them; pipeline state is touched only while advancing.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use stream_telemetry::{
    metric_inc, FAULTS, FILES_ACCEPTED, FILES_SKIPPED, LAST_ACCEPTED_TIMESTAMP, PASS_DURATION,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::claims::ClaimSet;
use super::downloader::PendingDownloadTracker;
use super::node_task::{harvest_node, DataCopy, NodeHarvest, NodeTaskSettings};
use super::report::{FileOutcome, PassReport, Resolution, SkipReason};
use crate::algorithms::{select_nodes, HashChainValidator, SignatureQuorumVerifier};
use crate::config::PipelineConfig;
use crate::domain::{
    ConsensusNode, FileHash, IngestError, IngestResult, NodeId, PipelineState, QuorumResult,
    SignatureFile, StreamFault, StreamFile, StreamFilename, StreamKind,
};
use crate::ports::inbound::StreamIngestApi;
use crate::ports::outbound::{NodeRegistry, ObjectStore, StateStore, StreamFileSink};

/// Result of verifying one timestamp's data.
#[derive(Debug)]
enum Verification {
    Verified(Box<StreamFile>),
    Unavailable(SkipReason),
}

/// Drives passes for one stream kind.
pub struct PipelineRunner {
    kind: StreamKind,
    config: PipelineConfig,
    store: Arc<dyn ObjectStore>,
    registry: Arc<dyn NodeRegistry>,
    state_store: Arc<dyn StateStore>,
    sink: Arc<dyn StreamFileSink>,
    verifier: SignatureQuorumVerifier,
    validator: HashChainValidator,
    state: PipelineState,
    halted_at: Option<String>,
}

impl PipelineRunner {
    /// Validate `config` and load the last saved state for `kind`.
    pub async fn new(
        kind: StreamKind,
        config: PipelineConfig,
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn NodeRegistry>,
        state_store: Arc<dyn StateStore>,
        sink: Arc<dyn StreamFileSink>,
    ) -> IngestResult<Self> {
        config.validate()?;
        let state = state_store
            .load_last(kind)
            .await?
            .unwrap_or_else(|| PipelineState::initial(kind));
        let stream = config.stream(kind);
        let validator = HashChainValidator::new(kind, stream.digest)
            .with_bypass(stream.chain_bypass)
            .with_size_limit(config.max_decompressed_len);

        info!(
            kind = %kind,
            marker = ?state.resume_marker.as_ref().map(StreamFilename::name),
            "Pipeline runner ready"
        );

        Ok(Self {
            kind,
            verifier: SignatureQuorumVerifier::new(config.consensus_ratio),
            validator,
            config,
            store,
            registry,
            state_store,
            sink,
            state,
            halted_at: None,
        })
    }

    /// Stream kind.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Current resume state.
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// True after a chain discontinuity.
    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Resume after an operator resolved the discontinuity.
    pub fn clear_halt(&mut self) {
        if let Some(filename) = self.halted_at.take() {
            warn!(kind = %self.kind, file = %filename, "Halt cleared");
        }
    }

    /// Run one pass.
    ///
    /// Per-file faults are reported, never returned. Errors are reserved for
    /// a halted stream, an unavailable registry, and sink or state-store
    /// failures; state is left unchanged for the file being advanced.
    pub async fn run_pass(&mut self) -> IngestResult<PassReport> {
        if let Some(filename) = &self.halted_at {
            return Err(IngestError::Halted {
                kind: self.kind,
                filename: filename.clone(),
            });
        }
        let started = Instant::now();
        let mut report = PassReport::new(self.kind);

        // Selecting
        let nodes = self.registry.current_nodes().await?;
        let selected = select_nodes(&nodes, self.config.download_ratio);
        report.nodes_total = nodes.len();
        report.nodes_selected = selected.len();
        debug!(
            pass_id = %report.pass_id,
            kind = %self.kind,
            nodes = nodes.len(),
            selected = selected.len(),
            "Pass started"
        );

        // Listing and downloading
        let tracker =
            PendingDownloadTracker::new(Arc::clone(&self.store), self.kind, ClaimSet::new());
        let selected_ids: Vec<NodeId> = selected.iter().map(|n| n.id.clone()).collect();
        let harvests = self
            .run_node_tasks(&selected_ids, &tracker, &mut report.faults)
            .await;

        let mut signatures: BTreeMap<i64, BTreeMap<NodeId, SignatureFile>> = BTreeMap::new();
        let mut copies: BTreeMap<i64, Vec<DataCopy>> = BTreeMap::new();
        for harvest in harvests {
            report.faults.extend(harvest.faults);
            for (timestamp, signature) in harvest.signatures {
                signatures
                    .entry(timestamp)
                    .or_default()
                    .insert(harvest.node.clone(), signature);
            }
            for copy in harvest.data {
                copies.entry(copy.filename.timestamp()).or_default().push(copy);
            }
        }

        // Quorum, in order; nothing after the first shortfall can advance
        let timestamps: Vec<i64> = signatures.keys().copied().collect();
        let mut quorums = self
            .evaluate_quorums(signatures, nodes, &mut report.faults)
            .await
            .into_iter();
        let mut agreed = Vec::new();
        let mut deferred = Vec::new();
        for timestamp in timestamps {
            let filename = StreamFilename::signature(self.kind, timestamp);
            let quorum = match quorums.next() {
                Some(quorum) if deferred.is_empty() => quorum,
                _ => {
                    deferred.push((filename, SkipReason::AwaitingPredecessor));
                    continue;
                }
            };
            if quorum.is_reached() {
                agreed.push(quorum);
            } else {
                let fault = StreamFault::QuorumNotReached {
                    filename: filename.to_string(),
                    best_stake: quorum.stake,
                    required_stake: quorum.required_stake,
                };
                info!(pass_id = %report.pass_id, %fault, "Deferring file");
                report.faults.push(fault);
                deferred.push((filename, SkipReason::QuorumNotReached));
            }
        }

        // Verifying
        let mut verified = self
            .verify_all(&agreed, &mut copies, &tracker, &mut report.faults)
            .await;

        // Advancing
        let mut blocked = false;
        for (index, quorum) in agreed.iter().enumerate() {
            let filename = quorum.filename.clone();
            if blocked {
                report.outcomes.push(skip(filename, SkipReason::AwaitingPredecessor));
                continue;
            }
            let file = match verified.remove(&index) {
                Some(Verification::Verified(file)) => *file,
                Some(Verification::Unavailable(reason)) => {
                    blocked = true;
                    report.outcomes.push(skip(filename, reason));
                    continue;
                }
                None => {
                    blocked = true;
                    report.outcomes.push(skip(filename, SkipReason::NoValidCopy));
                    continue;
                }
            };

            match self.validator.accept(&file, quorum, self.state.last_hash.as_ref()) {
                Ok(how) => {
                    let hash = self.advance(file).await?;
                    debug!(pass_id = %report.pass_id, file = %filename, ?how, "Accepted");
                    report.outcomes.push(FileOutcome {
                        filename,
                        resolution: Resolution::Accepted { hash },
                    });
                }
                Err(fault) if fault.is_fatal() => {
                    error!(
                        pass_id = %report.pass_id,
                        kind = %self.kind,
                        %fault,
                        "Chain discontinuity, halting stream"
                    );
                    self.halted_at = Some(file.filename.to_string());
                    report.halted = true;
                    report.faults.push(fault.clone());
                    report.outcomes.push(FileOutcome {
                        filename,
                        resolution: Resolution::Faulted(fault),
                    });
                    blocked = true;
                }
                Err(fault) => {
                    warn!(pass_id = %report.pass_id, %fault, "Rejected verified copy");
                    report.faults.push(fault);
                    report.outcomes.push(skip(filename, SkipReason::NoValidCopy));
                    blocked = true;
                }
            }
        }
        for (filename, reason) in deferred {
            let reason = if blocked && reason == SkipReason::QuorumNotReached {
                SkipReason::AwaitingPredecessor
            } else {
                reason
            };
            report.outcomes.push(skip(filename, reason));
        }

        report.resume_marker = self.state.resume_marker.clone();
        self.record_metrics(&report, started);
        info!(
            pass_id = %report.pass_id,
            kind = %self.kind,
            accepted = report.accepted(),
            skipped = report.skipped(),
            faulted = report.faulted(),
            faults = report.faults.len(),
            halted = report.halted,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pass finished"
        );
        Ok(report)
    }

    /// Quorum per timestamp in order, up to and including the first
    /// shortfall. Signature checks are CPU-bound and run on the blocking pool.
    async fn evaluate_quorums(
        &self,
        signatures: BTreeMap<i64, BTreeMap<NodeId, SignatureFile>>,
        nodes: Vec<ConsensusNode>,
        faults: &mut Vec<StreamFault>,
    ) -> Vec<QuorumResult> {
        let verifier = self.verifier;
        let kind = self.kind;
        let evaluated = tokio::task::spawn_blocking(move || {
            let mut quorums = Vec::with_capacity(signatures.len());
            for (timestamp, by_node) in &signatures {
                let filename = StreamFilename::signature(kind, *timestamp);
                let quorum = verifier.verify(&filename, by_node, &nodes);
                let reached = quorum.is_reached();
                quorums.push(quorum);
                if !reached {
                    break;
                }
            }
            quorums
        })
        .await;

        match evaluated {
            Ok(quorums) => quorums,
            Err(e) => {
                error!(kind = %self.kind, error = %e, "Quorum evaluation aborted");
                faults.push(StreamFault::NodeTaskFailed {
                    node: None,
                    reason: e.to_string(),
                });
                Vec::new()
            }
        }
    }

    async fn run_node_tasks(
        &self,
        nodes: &[NodeId],
        tracker: &PendingDownloadTracker,
        faults: &mut Vec<StreamFault>,
    ) -> Vec<NodeHarvest> {
        let settings = Arc::new(NodeTaskSettings {
            kind: self.kind,
            digest: self.validator.digest(),
            resume_marker: self.state.resume_marker.clone(),
            page_size: self.config.list_page_size,
            fetch_concurrency: self.config.per_node_fetch_concurrency,
            max_files: self.config.max_files_per_pass,
        });
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_nodes));
        let mut tasks = JoinSet::new();

        for node in nodes {
            let permits = Arc::clone(&permits);
            let store = Arc::clone(&self.store);
            let tracker = tracker.clone();
            let settings = Arc::clone(&settings);
            let node = node.clone();
            tasks.spawn(async move {
                let _permit =
                    permits
                        .acquire_owned()
                        .await
                        .map_err(|e| StreamFault::NodeTaskFailed {
                            node: Some(node.clone()),
                            reason: e.to_string(),
                        })?;
                Ok::<_, StreamFault>(harvest_node(store, tracker, node, settings).await)
            });
        }

        let mut harvests = Vec::with_capacity(nodes.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(harvest)) => harvests.push(harvest),
                Ok(Err(fault)) => faults.push(fault),
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "Node task aborted");
                    faults.push(StreamFault::NodeTaskFailed {
                        node: None,
                        reason: e.to_string(),
                    });
                }
            }
        }
        harvests
    }

    async fn verify_all(
        &self,
        agreed: &[QuorumResult],
        copies: &mut BTreeMap<i64, Vec<DataCopy>>,
        tracker: &PendingDownloadTracker,
        faults: &mut Vec<StreamFault>,
    ) -> BTreeMap<usize, Verification> {
        let mut tasks = JoinSet::new();
        for (index, quorum) in agreed.iter().enumerate() {
            let job = VerifyJob {
                quorum: quorum.clone(),
                copies: copies.remove(&quorum.filename.timestamp()).unwrap_or_default(),
                tracker: tracker.clone(),
                validator: self.validator.clone(),
                sidecars_enabled: self.config.sidecars_enabled,
            };
            tasks.spawn(async move {
                let (verification, faults) = job.run().await;
                (index, verification, faults)
            });
        }

        let mut results = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, verification, task_faults)) => {
                    faults.extend(task_faults);
                    results.insert(index, verification);
                }
                Err(e) => faults.push(StreamFault::NodeTaskFailed {
                    node: None,
                    reason: e.to_string(),
                }),
            }
        }
        results
    }

    /// Sink the file, then save state; the in-memory state moves only after
    /// both succeed.
    async fn advance(&mut self, file: StreamFile) -> IngestResult<FileHash> {
        let next = self.state.advanced(&file);
        let hash = file.hash.clone();
        let consensus_end = file.consensus_end;
        let filename = file.filename.to_string();

        self.sink.accept(file).await.map_err(|e| {
            error!(kind = %self.kind, file = %filename, error = %e, "Sink refused file");
            e
        })?;
        self.state_store.save(&next).await.map_err(|e| {
            error!(kind = %self.kind, file = %filename, error = %e, "Saving state failed");
            e
        })?;
        self.state = next;

        metric_inc!(FILES_ACCEPTED, &[self.kind.name()]);
        LAST_ACCEPTED_TIMESTAMP
            .with_label_values(&[self.kind.name()])
            .set(consensus_end as f64 / 1e9);
        Ok(hash)
    }

    fn record_metrics(&self, report: &PassReport, started: Instant) {
        let kind = self.kind.name();
        for outcome in &report.outcomes {
            if let Resolution::Skipped(reason) = &outcome.resolution {
                metric_inc!(FILES_SKIPPED, &[kind, reason.label()]);
            }
        }
        for fault in &report.faults {
            metric_inc!(FAULTS, &[kind, fault.label()]);
        }
        PASS_DURATION
            .with_label_values(&[kind])
            .observe(started.elapsed().as_secs_f64());
    }
}

fn skip(filename: StreamFilename, reason: SkipReason) -> FileOutcome {
    FileOutcome {
        filename,
        resolution: Resolution::Skipped(reason),
    }
}

/// Verification of one timestamp, run on its own task.
struct VerifyJob {
    quorum: QuorumResult,
    copies: Vec<DataCopy>,
    tracker: PendingDownloadTracker,
    validator: HashChainValidator,
    sidecars_enabled: bool,
}

impl VerifyJob {
    /// Try every downloaded copy, then fetch from the rest of the winning
    /// group. The first copy matching the agreed hash wins.
    async fn run(mut self) -> (Verification, Vec<StreamFault>) {
        let mut faults = Vec::new();
        let quorum = &self.quorum;

        // Attesting nodes first, then preferred encodings
        self.copies.sort_by(|a, b| {
            quorum
                .attested_by(&b.node)
                .cmp(&quorum.attested_by(&a.node))
                .then_with(|| b.filename.priority().cmp(&a.filename.priority()))
                .then_with(|| a.node.cmp(&b.node))
        });
        // Compressed first
        let timestamp = quorum.filename.timestamp();
        let names = [true, false]
            .map(|compressed| StreamFilename::data(self.validator.kind(), timestamp, compressed));

        let mut tried: HashSet<NodeId> = HashSet::new();
        let copies = std::mem::take(&mut self.copies);
        for copy in copies {
            tried.insert(copy.node.clone());
            if let Some(file) = self.check(&copy.node, &copy.filename, copy.bytes, &mut faults) {
                return (self.with_sidecars(file, &mut faults).await, faults);
            }
        }

        for node in &quorum.nodes {
            if !tried.insert(node.clone()) {
                continue;
            }
            let mut last_failure = None;
            for name in &names {
                let mut download = self.tracker.fetch_unclaimed(node, name);
                if !download.wait_for_completion().await {
                    last_failure = download.fault();
                    continue;
                }
                last_failure = None;
                let Some(bytes) = download.into_bytes() else {
                    continue;
                };
                if let Some(file) = self.check(node, name, bytes, &mut faults) {
                    return (self.with_sidecars(file, &mut faults).await, faults);
                }
                break;
            }
            faults.extend(last_failure);
        }

        warn!(file = %quorum.filename, "No valid copy from any node");
        (Verification::Unavailable(SkipReason::NoValidCopy), faults)
    }

    fn check(
        &self,
        node: &NodeId,
        name: &StreamFilename,
        bytes: Bytes,
        faults: &mut Vec<StreamFault>,
    ) -> Option<StreamFile> {
        match self.validator.verify_content(node, name, bytes, &self.quorum) {
            Ok(file) => Some(file),
            Err(fault) => {
                warn!(%fault, "Discarding copy");
                faults.push(fault);
                None
            }
        }
    }

    async fn with_sidecars(
        &self,
        mut file: StreamFile,
        faults: &mut Vec<StreamFault>,
    ) -> Verification {
        if !self.sidecars_enabled || file.sidecars.is_empty() {
            return Verification::Verified(Box::new(file));
        }

        let mut candidates = vec![file.source_node.clone()];
        candidates.extend(
            self.quorum
                .nodes
                .iter()
                .filter(|n| **n != file.source_node)
                .cloned(),
        );
        let digest = self.validator.digest();
        let timestamp = file.filename.timestamp();

        for sidecar in &mut file.sidecars {
            let name = StreamFilename::sidecar(file.kind, timestamp, sidecar.id);
            for node in &candidates {
                let mut download = self.tracker.fetch_unclaimed(node, &name);
                if !download.wait_for_completion().await {
                    faults.extend(download.fault());
                    continue;
                }
                let Some(bytes) = download.into_bytes() else {
                    continue;
                };
                if digest.digest(&bytes) == sidecar.hash.as_bytes() {
                    sidecar.bytes = Some(bytes);
                    break;
                }
                faults.push(StreamFault::SidecarMismatch {
                    node: node.clone(),
                    filename: file.filename.to_string(),
                    sidecar_id: sidecar.id,
                    reason: "hash mismatch".to_string(),
                });
            }
            if sidecar.bytes.is_none() {
                warn!(file = %file.filename, sidecar = sidecar.id, "Sidecar unavailable");
                return Verification::Unavailable(SkipReason::SidecarUnavailable);
            }
        }
        Verification::Verified(Box::new(file))
    }
}

#[async_trait]
impl StreamIngestApi for PipelineRunner {
    fn kind(&self) -> StreamKind {
        self.kind
    }

    async fn run_pass(&mut self) -> IngestResult<PassReport> {
        PipelineRunner::run_pass(self).await
    }

    fn state(&self) -> &PipelineState {
        &self.state
    }

    fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    fn clear_halt(&mut self) {
        PipelineRunner::clear_halt(self)
    }
}
