//! # Test Fixtures
//!
//! A simulated network: signing nodes publishing into one in-memory bucket,
//! a static registry, and in-memory state and sink.

use std::sync::{Arc, Once};

use stream_ingest::{
    CollectingSink, MemoryObjectStore, MemoryStateStore, PipelineConfig, PipelineRunner,
    PublishedFile, SimulatedNode, StaticNodeRegistry, StreamKind, StreamPublisher,
};
use stream_telemetry::{init_logging, TelemetryConfig};

static LOGGING: Once = Once::new();

/// Install a debug subscriber once per test binary. Output shows with
/// `--nocapture`.
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let config = TelemetryConfig {
            log_level: "stream_ingest=debug".to_string(),
            ..TelemetryConfig::default()
        };
        // Another harness may own the global subscriber
        let _ = init_logging(&config);
    });
}

/// 2023-11-14T22:13:20Z
pub const T0: i64 = 1_700_000_000_000_000_000;

/// One second in nanoseconds.
pub const SECOND: i64 = 1_000_000_000;

/// Nodes, bucket and pipeline ports for one test.
pub struct Network {
    pub store: Arc<MemoryObjectStore>,
    pub nodes: Vec<SimulatedNode>,
    pub registry: Arc<StaticNodeRegistry>,
    pub states: Arc<MemoryStateStore>,
    pub sink: Arc<CollectingSink>,
}

impl Network {
    /// `count` Ed25519 nodes with equal stake, ids `0.0.3` upwards.
    pub fn ed25519(count: u8, stake: u64) -> Self {
        Self::with_nodes(
            (0..count)
                .map(|i| SimulatedNode::ed25519(format!("0.0.{}", i + 3), stake, i + 1))
                .collect(),
        )
    }

    /// Network with the given nodes.
    pub fn with_nodes(nodes: Vec<SimulatedNode>) -> Self {
        init_test_logging();
        let registry = StaticNodeRegistry::new(nodes.iter().map(|n| n.consensus_node()).collect());
        Self {
            store: Arc::new(MemoryObjectStore::new()),
            nodes,
            registry: Arc::new(registry),
            states: Arc::new(MemoryStateStore::new()),
            sink: Arc::new(CollectingSink::new()),
        }
    }

    /// All nodes.
    pub fn everyone(&self) -> Vec<&SimulatedNode> {
        self.nodes.iter().collect()
    }

    /// Publisher writing into this network's bucket.
    pub fn publisher(&self, kind: StreamKind) -> StreamPublisher {
        StreamPublisher::new(self.store.clone(), kind)
    }

    /// Build and publish `count` files one second apart from every node.
    pub fn publish_run(
        &self,
        publisher: &mut StreamPublisher,
        start: i64,
        count: i64,
    ) -> Vec<PublishedFile> {
        (0..count)
            .map(|i| {
                let payload = format!("item-{i}");
                let file = publisher
                    .build(start + i * SECOND, &[payload.as_bytes()])
                    .unwrap();
                publisher.publish(&file, &self.everyone()).unwrap();
                file
            })
            .collect()
    }

    /// Runner wired to this network.
    pub async fn runner(&self, kind: StreamKind, config: PipelineConfig) -> PipelineRunner {
        PipelineRunner::new(
            kind,
            config,
            self.store.clone(),
            self.registry.clone(),
            self.states.clone(),
            self.sink.clone(),
        )
        .await
        .unwrap()
    }
}
