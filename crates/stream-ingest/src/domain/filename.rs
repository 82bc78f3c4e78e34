//! # Stream Filenames
//!
//! Every stream file is named after the consensus timestamp of its first
//! event, `YYYY-MM-DDTHH_MM_SS.nnnnnnnnnZ`, followed by a kind-specific
//! suffix:
//!
//! | Kind | Data | Signature | Sidecar |
//! |------|------|-----------|---------|
//! | Record | `T.rcd`, `T.rcd.zst` | `T.rcd_sig` | `T_01.rcd` |
//! | Event | `T.evts`, `T.evts.zst` | `T.evts_sig` | - |
//! | Balance | `T_Balances.bal`, `T_Balances.bal.zst` | `T_Balances.bal_sig` | - |
//!
//! The timestamp encoding is fixed-width, so lexicographic order of names
//! equals chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use super::value_objects::NodeId;

const TIMESTAMP_LEN: usize = 30;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H_%M_%S%.9fZ";
const BALANCE_SUFFIX: &str = "_Balances";
const COMPRESSED_SUFFIX: &str = ".zst";
const SIGNATURE_SUFFIX: &str = "_sig";

/// Filename parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid stream filename {name:?}: {reason}")]
pub struct FilenameError {
    /// Offending name
    pub name: String,
    /// What was wrong
    pub reason: &'static str,
}

impl FilenameError {
    fn new(name: &str, reason: &'static str) -> Self {
        Self {
            name: name.to_string(),
            reason,
        }
    }
}

/// Stream kinds published by consensus nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Periodic account balance snapshots (not hash-chained)
    Balance,
    /// Consensus event streams
    Event,
    /// Transaction record streams
    Record,
}

impl StreamKind {
    /// All kinds, in a fixed order.
    pub const ALL: [StreamKind; 3] = [StreamKind::Balance, StreamKind::Event, StreamKind::Record];

    /// Short name for logs and metric labels.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Event => "event",
            Self::Record => "record",
        }
    }

    /// Whether each file embeds the hash of its predecessor.
    pub const fn is_chained(self) -> bool {
        match self {
            Self::Balance => false,
            Self::Event | Self::Record => true,
        }
    }

    /// Whether files may reference sidecar files.
    pub const fn has_sidecars(self) -> bool {
        matches!(self, Self::Record)
    }

    /// Base data extension.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Balance => "bal",
            Self::Event => "evts",
            Self::Record => "rcd",
        }
    }

    /// Bucket directory holding every node's folder.
    pub const fn bucket_directory(self) -> &'static str {
        match self {
            Self::Balance => "accountBalances",
            Self::Event => "eventsStreams",
            Self::Record => "recordstreams",
        }
    }

    /// Per-node folder prefix.
    pub const fn node_folder_prefix(self) -> &'static str {
        match self {
            Self::Balance => "balance",
            Self::Event => "events_",
            Self::Record => "record",
        }
    }

    /// Folder a node publishes into, with trailing slash.
    pub fn node_directory(self, node: &NodeId) -> String {
        format!(
            "{}/{}{}/",
            self.bucket_directory(),
            self.node_folder_prefix(),
            node
        )
    }

    /// Full object key for `filename` as published by `node`.
    pub fn object_key(self, node: &NodeId, filename: &StreamFilename) -> String {
        match filename.file_kind() {
            FileKind::Sidecar(_) => {
                format!("{}sidecar/{}", self.node_directory(node), filename.name())
            }
            FileKind::Data | FileKind::Signature => {
                format!("{}{}", self.node_directory(node), filename.name())
            }
        }
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "bal" => Some(Self::Balance),
            "evts" => Some(Self::Event),
            "rcd" => Some(Self::Record),
            _ => None,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a filename refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Stream file content
    Data,
    /// A node's signature over the data file hash
    Signature,
    /// Auxiliary file referenced by a record file, with its index
    Sidecar(u8),
}

/// Parsed stream filename.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StreamFilename {
    name: String,
    kind: StreamKind,
    file_kind: FileKind,
    timestamp: i64,
    compressed: bool,
}

impl StreamFilename {
    /// Parse a bare filename (no directory).
    pub fn parse(name: &str) -> Result<Self, FilenameError> {
        if name.len() <= TIMESTAMP_LEN || !name.is_char_boundary(TIMESTAMP_LEN) {
            return Err(FilenameError::new(name, "too short"));
        }
        let (ts, rest) = name.split_at(TIMESTAMP_LEN);
        let timestamp =
            parse_timestamp(ts).ok_or_else(|| FilenameError::new(name, "bad timestamp"))?;

        let (balance, sidecar, ext) = if let Some(ext) = rest
            .strip_prefix(BALANCE_SUFFIX)
            .and_then(|r| r.strip_prefix('.'))
        {
            (true, None, ext)
        } else if let Some(ext) = rest.strip_prefix('.') {
            (false, None, ext)
        } else {
            let id = rest
                .strip_prefix('_')
                .filter(|r| {
                    r.len() > 3
                        && r.as_bytes()[2] == b'.'
                        && r.as_bytes()[..2].iter().all(u8::is_ascii_digit)
                })
                .and_then(|r| r[..2].parse::<u8>().ok().map(|id| (id, &r[3..])))
                .ok_or_else(|| FilenameError::new(name, "unrecognized suffix"))?;
            (false, Some(id.0), id.1)
        };

        let (ext, signature) = match ext.strip_suffix(SIGNATURE_SUFFIX) {
            Some(base) => (base, true),
            None => (ext, false),
        };
        let (ext, compressed) = match ext.strip_suffix(COMPRESSED_SUFFIX) {
            Some(base) => (base, true),
            None => (ext, false),
        };
        if signature && compressed {
            return Err(FilenameError::new(name, "signature files are never compressed"));
        }

        let kind = StreamKind::from_extension(ext)
            .ok_or_else(|| FilenameError::new(name, "unknown extension"))?;
        if balance != (kind == StreamKind::Balance) {
            return Err(FilenameError::new(name, "balance suffix mismatch"));
        }

        let file_kind = match (signature, sidecar) {
            (false, None) => FileKind::Data,
            (true, None) => FileKind::Signature,
            (false, Some(id)) if kind.has_sidecars() => FileKind::Sidecar(id),
            _ => return Err(FilenameError::new(name, "invalid sidecar name")),
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            file_kind,
            timestamp,
            compressed,
        })
    }

    /// Build a data filename.
    pub fn data(kind: StreamKind, timestamp: i64, compressed: bool) -> Self {
        let mut name = base_name(kind, timestamp);
        if compressed {
            name.push_str(COMPRESSED_SUFFIX);
        }
        Self {
            name,
            kind,
            file_kind: FileKind::Data,
            timestamp,
            compressed,
        }
    }

    /// Build a signature filename.
    pub fn signature(kind: StreamKind, timestamp: i64) -> Self {
        let mut name = base_name(kind, timestamp);
        name.push_str(SIGNATURE_SUFFIX);
        Self {
            name,
            kind,
            file_kind: FileKind::Signature,
            timestamp,
            compressed: false,
        }
    }

    /// Build a sidecar filename (`T_01.rcd`).
    pub fn sidecar(kind: StreamKind, timestamp: i64, id: u8) -> Self {
        let name = format!(
            "{}_{:02}.{}",
            format_timestamp(timestamp),
            id,
            kind.extension()
        );
        Self {
            name,
            kind,
            file_kind: FileKind::Sidecar(id),
            timestamp,
            compressed: false,
        }
    }

    /// Raw filename.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stream kind.
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Data, signature or sidecar.
    pub fn file_kind(&self) -> FileKind {
        self.file_kind
    }

    /// Consensus timestamp, nanoseconds since the Unix epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// True for `.zst` data files.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// True for data files.
    pub fn is_data(&self) -> bool {
        self.file_kind == FileKind::Data
    }

    /// Tie-break priority among data files sharing a timestamp: the
    /// compressed encoding is the newer one and wins.
    pub fn priority(&self) -> u8 {
        match (self.file_kind, self.compressed) {
            (FileKind::Data, true) => 2,
            (FileKind::Data, false) => 1,
            _ => 0,
        }
    }

    /// The 30-character timestamp prefix of the name.
    pub fn timestamp_prefix(&self) -> &str {
        &self.name[..TIMESTAMP_LEN]
    }

    /// Signature filename covering this file's timestamp.
    pub fn to_signature(&self) -> Self {
        Self::signature(self.kind, self.timestamp)
    }
}

impl PartialOrd for StreamFilename {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Timestamp, then kind, then higher priority first, then raw name.
impl Ord for StreamFilename {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| other.priority().cmp(&self.priority()))
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for StreamFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Serialize for StreamFilename {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name)
    }
}

impl<'de> Deserialize<'de> for StreamFilename {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name).map_err(serde::de::Error::custom)
    }
}

fn base_name(kind: StreamKind, timestamp: i64) -> String {
    let ts = format_timestamp(timestamp);
    match kind {
        StreamKind::Balance => format!("{}{}.{}", ts, BALANCE_SUFFIX, kind.extension()),
        StreamKind::Event | StreamKind::Record => format!("{}.{}", ts, kind.extension()),
    }
}

/// Format nanoseconds since the epoch in filename form.
pub fn format_timestamp(nanos: i64) -> String {
    DateTime::<Utc>::from_timestamp(nanos.div_euclid(1_000_000_000), nanos.rem_euclid(1_000_000_000) as u32)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_else(|| "1970-01-01T00_00_00.000000000Z".to_string())
}

/// Parse the filename timestamp form into nanoseconds since the epoch.
pub fn parse_timestamp(ts: &str) -> Option<i64> {
    // Exactly nine fractional digits keep names fixed-width
    let bytes = ts.as_bytes();
    if bytes.len() != TIMESTAMP_LEN || bytes[19] != b'.' || bytes[29] != b'Z' {
        return None;
    }
    if !bytes[20..29].iter().all(u8::is_ascii_digit) {
        return None;
    }
    NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .ok()
        .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
}
