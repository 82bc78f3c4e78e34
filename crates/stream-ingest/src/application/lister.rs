//! Candidate lister: lazily pages through one node's folder.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use super::claims::ClaimSet;
use crate::domain::{FileKind, IngestResult, NodeId, StreamFilename, StreamKind};
use crate::ports::outbound::ObjectStore;

/// Ascending stream of filenames a node published after the resume marker.
///
/// Yields data and signature filenames; skips keys that do not parse, files
/// of another kind, and data files already claimed by another node task.
/// One lister per node per pass; it is not restartable.
pub struct CandidateLister {
    store: Arc<dyn ObjectStore>,
    kind: StreamKind,
    node: NodeId,
    prefix: String,
    marker: Option<i64>,
    claims: ClaimSet,
    page_size: usize,
    buffer: VecDeque<String>,
    last_key: Option<String>,
    exhausted: bool,
}

impl CandidateLister {
    /// Lister for `node`'s folder, starting strictly after `resume_marker`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        kind: StreamKind,
        node: NodeId,
        resume_marker: Option<&StreamFilename>,
        claims: ClaimSet,
        page_size: usize,
    ) -> Self {
        let prefix = kind.node_directory(&node);
        let last_key = resume_marker.map(|m| format!("{}{}", prefix, m.timestamp_prefix()));
        Self {
            store,
            kind,
            node,
            prefix,
            marker: resume_marker.map(StreamFilename::timestamp),
            claims,
            page_size: page_size.max(1),
            buffer: VecDeque::new(),
            last_key,
            exhausted: false,
        }
    }

    /// Node this lister walks.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Next candidate, or `None` when the folder is exhausted.
    pub async fn next(&mut self) -> IngestResult<Option<StreamFilename>> {
        loop {
            let Some(key) = self.pop_key().await? else {
                return Ok(None);
            };
            let Some(name) = key.strip_prefix(&self.prefix) else {
                debug!(node = %self.node, key = %key, "Skipping key outside node folder");
                continue;
            };
            let filename = match StreamFilename::parse(name) {
                Ok(filename) => filename,
                Err(e) => {
                    debug!(node = %self.node, key = %key, error = %e, "Skipping unparsable key");
                    continue;
                }
            };
            if filename.kind() != self.kind {
                continue;
            }
            if self.marker.is_some_and(|marker| filename.timestamp() <= marker) {
                continue;
            }
            match filename.file_kind() {
                FileKind::Sidecar(_) => continue,
                FileKind::Data if self.claims.is_claimed(&filename) => {
                    debug!(node = %self.node, file = %filename, "Already claimed");
                    continue;
                }
                FileKind::Data | FileKind::Signature => return Ok(Some(filename)),
            }
        }
    }

    async fn pop_key(&mut self) -> IngestResult<Option<String>> {
        while self.buffer.is_empty() && !self.exhausted {
            let page = self
                .store
                .list(&self.prefix, self.last_key.as_deref(), self.page_size)
                .await?;
            if page.len() < self.page_size {
                self.exhausted = true;
            }
            if let Some(last) = page.last() {
                self.last_key = Some(last.clone());
            }
            self.buffer.extend(page);
        }
        Ok(self.buffer.pop_front())
    }
}
