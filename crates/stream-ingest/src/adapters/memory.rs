//! In-memory adapters for every outbound port.
//!
//! Used by tests and local simulation. The object store supports fault
//! injection per key and counts fetches so tests can assert how often an
//! object was transferred.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::{
    ConsensusNode, IngestError, IngestResult, PipelineState, StreamFile, StreamKind,
};
use crate::ports::outbound::{NodeRegistry, ObjectStore, StateStore, StreamFileSink};

/// Object store backed by a sorted map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
    failing: RwLock<HashSet<String>>,
    fetches: RwLock<HashMap<String, usize>>,
}

impl MemoryObjectStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object, replacing any existing one.
    pub fn put(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.write().insert(key.into(), bytes.into());
    }

    /// Remove an object.
    pub fn remove(&self, key: &str) -> Option<Bytes> {
        self.objects.write().remove(key)
    }

    /// Make every fetch of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.failing.write().insert(key.into());
    }

    /// Undo [`fail_key`](Self::fail_key).
    pub fn heal_key(&self, key: &str) {
        self.failing.write().remove(key);
    }

    /// Number of successful fetches of `key`.
    pub fn get_count(&self, key: &str) -> usize {
        self.fetches.read().get(key).copied().unwrap_or(0)
    }

    /// Successful fetches of any key ending with `suffix`.
    pub fn get_count_matching(&self, suffix: &str) -> usize {
        self.fetches
            .read()
            .iter()
            .filter(|(key, _)| key.ends_with(suffix))
            .map(|(_, count)| count)
            .sum()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(
        &self,
        prefix: &str,
        after: Option<&str>,
        limit: usize,
    ) -> IngestResult<Vec<String>> {
        let objects = self.objects.read();
        let keys = objects
            .range::<str, _>((
                after.map_or(std::ops::Bound::Included(prefix), std::ops::Bound::Excluded),
                std::ops::Bound::Unbounded,
            ))
            .map(|(key, _)| key)
            .skip_while(|key| key.as_str() < prefix)
            .take_while(|key| key.starts_with(prefix))
            .filter(|key| !key[prefix.len()..].contains('/'))
            .take(limit)
            .cloned()
            .collect();
        Ok(keys)
    }

    async fn get_bytes(&self, key: &str) -> IngestResult<Bytes> {
        if self.failing.read().contains(key) {
            return Err(IngestError::Storage {
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let bytes = self
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| IngestError::NotFound(key.to_string()))?;
        *self.fetches.write().entry(key.to_string()).or_default() += 1;
        debug!(key, len = bytes.len(), "Served object");
        Ok(bytes)
    }
}

/// Registry returning a fixed node set.
pub struct StaticNodeRegistry {
    nodes: RwLock<Vec<ConsensusNode>>,
}

impl StaticNodeRegistry {
    /// Registry with the given nodes.
    pub fn new(nodes: Vec<ConsensusNode>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Replace the node set (membership change).
    pub fn replace(&self, nodes: Vec<ConsensusNode>) {
        *self.nodes.write() = nodes;
    }
}

#[async_trait]
impl NodeRegistry for StaticNodeRegistry {
    async fn current_nodes(&self) -> IngestResult<Vec<ConsensusNode>> {
        Ok(self.nodes.read().clone())
    }
}

/// State store kept in memory.
#[derive(Default)]
pub struct MemoryStateStore {
    states: RwLock<HashMap<StreamKind, PipelineState>>,
    fail_saves: AtomicBool,
}

impl MemoryStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent saves fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Saved state for `kind`.
    pub fn get(&self, kind: StreamKind) -> Option<PipelineState> {
        self.states.read().get(&kind).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load_last(&self, kind: StreamKind) -> IngestResult<Option<PipelineState>> {
        Ok(self.get(kind))
    }

    async fn save(&self, state: &PipelineState) -> IngestResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(IngestError::StateStore("injected save failure".to_string()));
        }
        self.states.write().insert(state.kind, state.clone());
        Ok(())
    }
}

/// Sink that keeps every accepted file, in arrival order.
#[derive(Default)]
pub struct CollectingSink {
    files: RwLock<Vec<StreamFile>>,
}

impl CollectingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepted files so far.
    pub fn files(&self) -> Vec<StreamFile> {
        self.files.read().clone()
    }

    /// Number of accepted files.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// True if nothing was accepted.
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }
}

#[async_trait]
impl StreamFileSink for CollectingSink {
    async fn accept(&self, file: StreamFile) -> IngestResult<()> {
        self.files.write().push(file);
        Ok(())
    }
}
