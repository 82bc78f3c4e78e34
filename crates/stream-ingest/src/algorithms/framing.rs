//! # Stream File Framing
//!
//! Byte layouts of data and signature files, and the version-dependent
//! self-hash. All integers are big-endian; `N` is the digest width of the
//! stream kind's configured algorithm.
//!
//! ## Data files (record, event)
//!
//! ```text
//! header   v1/v2: i32 version, i32 protocol
//!          v5/v6: i32 version, i32 major, i32 minor, i32 patch
//! prev     0x01, [N] previous file hash
//! body     0x02, i64 consensus_ns, u32 len, [len] payload    (repeated)
//!          0x07, u32 sidecar id, [N] sidecar hash              (v6 records)
//! ```
//!
//! The self-hash of v1 files is `D(all bytes)`. Later versions digest the
//! body separately and fold it in: `D(header || prev || D(body))`. Files
//! from v5 on also carry a metadata hash `D(header || prev)` which nodes
//! sign alongside the file hash.
//!
//! ## Balance files
//!
//! `i32 version (1), i64 consensus_ns`, then items. Self-hash is
//! `D(all bytes)`; there is no previous hash.
//!
//! ## Signature files
//!
//! ```text
//! legacy: 0x04 [N] hash, 0x03 u8 alg u32 len [len] sig
//! v5:     0x05, hash, sig, metadata hash, metadata sig   (same objects)
//! ```

use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use shared_crypto::{DigestAlgorithm, SignatureAlgorithm};
use thiserror::Error;

use crate::domain::{
    invariant_monotonic_times, AttestedHash, FileHash, NodeId, Sidecar, SignatureBlob,
    SignatureFile, StreamFilename, StreamItem, StreamKind, MAX_SIGNATURE_LEN,
};

const MARKER_PREVIOUS_HASH: u8 = 0x01;
const MARKER_ITEM: u8 = 0x02;
const MARKER_SIGNATURE: u8 = 0x03;
const MARKER_HASH: u8 = 0x04;
const MARKER_SIGNATURE_V5: u8 = 0x05;
const MARKER_SIDECAR: u8 = 0x07;

/// Signature file version written with a leading hash object.
pub const SIGNATURE_VERSION_LEGACY: u8 = 4;
/// Signature file version carrying a metadata hash.
pub const SIGNATURE_VERSION_V5: u8 = 5;

/// Protocol version written into v1/v2 headers.
pub const LEGACY_PROTOCOL_VERSION: i32 = 27;
/// Semantic protocol version written into v5/v6 headers.
pub const PROTOCOL_VERSION: (i32, i32, i32) = (0, 47, 0);

/// Decoding failures. Any of these makes one node's copy unusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FramingError {
    /// File has no bytes.
    #[error("empty file")]
    Empty,

    /// Fewer bytes than the layout needs.
    #[error("truncated at offset {offset}: need {needed} more bytes")]
    Truncated {
        /// Read position
        offset: usize,
        /// Bytes the field needs
        needed: usize,
    },

    /// Version not supported for the kind.
    #[error("unsupported {kind} format version {version}")]
    UnknownVersion {
        /// Stream kind
        kind: StreamKind,
        /// Version read
        version: i32,
    },

    /// A marker byte other than the expected one.
    #[error("unexpected marker 0x{found:02x} at offset {offset}")]
    UnexpectedMarker {
        /// Read position
        offset: usize,
        /// Byte found
        found: u8,
    },

    /// Bytes left over after the last object.
    #[error("{0} trailing bytes")]
    TrailingBytes(usize),

    /// Chained data file without any item.
    #[error("file has no items")]
    NoItems,

    /// Item consensus times go backwards.
    #[error("consensus times are not monotonic")]
    NonMonotonic,

    /// Signature longer than allowed.
    #[error("signature length {0} exceeds limit")]
    SignatureTooLong(usize),

    /// Signature algorithm tag not recognised.
    #[error("unknown signature algorithm {0}")]
    UnknownAlgorithm(u8),

    /// Sidecar reference outside the two-digit range.
    #[error("sidecar id {0} out of range")]
    SidecarId(u32),

    /// Compressed payload could not be inflated.
    #[error("decompression failed: {0}")]
    Decompress(String),
}

/// Contents of a decoded data file plus its digests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataFileContents {
    /// Format version
    pub version: u32,
    /// Self-hash
    pub hash: FileHash,
    /// Metadata hash (v5 and newer)
    pub metadata_hash: Option<FileHash>,
    /// Previous file hash (chained kinds)
    pub previous_hash: Option<FileHash>,
    /// Items in order
    pub items: Vec<StreamItem>,
    /// Sidecar references (bytes not yet fetched)
    pub sidecars: Vec<Sidecar>,
    /// Header timestamp (balance files)
    pub header_timestamp: Option<i64>,
}

impl DataFileContents {
    /// First consensus timestamp.
    pub fn consensus_start(&self) -> i64 {
        self.header_timestamp
            .or_else(|| self.items.first().map(|i| i.consensus_ns))
            .unwrap_or_default()
    }

    /// Last consensus timestamp.
    pub fn consensus_end(&self) -> i64 {
        let last = self.items.last().map(|i| i.consensus_ns);
        match (last, self.header_timestamp) {
            (Some(last), Some(header)) => last.max(header),
            (last, header) => last.or(header).unwrap_or_default(),
        }
    }
}

/// Versions accepted for each kind.
pub fn supported_versions(kind: StreamKind) -> &'static [u32] {
    match kind {
        StreamKind::Balance => &[1],
        StreamKind::Event => &[2, 5],
        StreamKind::Record => &[1, 2, 5, 6],
    }
}

/// Inflate `.zst` files to at most `limit` bytes; other files are returned
/// as-is.
pub fn decompress(
    filename: &StreamFilename,
    raw: Bytes,
    limit: u64,
) -> Result<Bytes, FramingError> {
    if !filename.is_compressed() {
        return Ok(raw);
    }
    let decoder = zstd::stream::Decoder::new(raw.as_ref())
        .map_err(|e| FramingError::Decompress(e.to_string()))?;
    let mut output = Vec::new();
    decoder
        .take(limit.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| FramingError::Decompress(e.to_string()))?;
    if output.len() as u64 > limit {
        return Err(FramingError::Decompress(format!(
            "inflated size exceeds {limit} bytes"
        )));
    }
    Ok(Bytes::from(output))
}

/// Self-hash of a decompressed data file.
pub fn compute_self_hash(
    kind: StreamKind,
    digest: DigestAlgorithm,
    bytes: &[u8],
) -> Result<FileHash, FramingError> {
    decode_data_file(kind, digest, bytes).map(|contents| contents.hash)
}

/// Decode a decompressed data file and compute its digests.
pub fn decode_data_file(
    kind: StreamKind,
    digest: DigestAlgorithm,
    bytes: &[u8],
) -> Result<DataFileContents, FramingError> {
    if bytes.is_empty() {
        return Err(FramingError::Empty);
    }
    match kind {
        StreamKind::Balance => decode_balance(digest, bytes),
        StreamKind::Event | StreamKind::Record => decode_chained(kind, digest, bytes),
    }
}

fn decode_balance(digest: DigestAlgorithm, bytes: &[u8]) -> Result<DataFileContents, FramingError> {
    let mut reader = Reader::new(bytes);
    let version = reader.i32()?;
    check_version(StreamKind::Balance, version)?;
    let header_timestamp = reader.i64()?;
    let (items, sidecars) = read_body(&mut reader, digest, false)?;

    Ok(DataFileContents {
        version: version as u32,
        hash: FileHash::new(digest.digest(bytes)),
        metadata_hash: None,
        previous_hash: None,
        items,
        sidecars,
        header_timestamp: Some(header_timestamp),
    })
}

fn decode_chained(
    kind: StreamKind,
    digest: DigestAlgorithm,
    bytes: &[u8],
) -> Result<DataFileContents, FramingError> {
    let mut reader = Reader::new(bytes);
    let version = reader.i32()?;
    check_version(kind, version)?;
    let header_fields = if version >= 5 { 3 } else { 1 };
    for _ in 0..header_fields {
        reader.i32()?;
    }
    reader.expect_marker(MARKER_PREVIOUS_HASH)?;
    let previous_hash = FileHash::from_slice(reader.take(digest.output_len())?);
    let prefix_len = reader.offset();

    let allow_sidecars = kind.has_sidecars() && version >= 6;
    let (items, sidecars) = read_body(&mut reader, digest, allow_sidecars)?;
    if items.is_empty() {
        return Err(FramingError::NoItems);
    }

    let (prefix, body) = bytes.split_at(prefix_len);
    let hash = if version == 1 {
        digest.digest(bytes)
    } else {
        let body_hash = digest.digest(body);
        let mut hasher = digest.hasher();
        hasher.update(prefix).update(&body_hash);
        hasher.finalize()
    };
    let metadata_hash = (version >= 5).then(|| FileHash::new(digest.digest(prefix)));

    Ok(DataFileContents {
        version: version as u32,
        hash: FileHash::new(hash),
        metadata_hash,
        previous_hash: Some(previous_hash),
        items,
        sidecars,
        header_timestamp: None,
    })
}

fn check_version(kind: StreamKind, version: i32) -> Result<(), FramingError> {
    let known = u32::try_from(version)
        .map(|v| supported_versions(kind).contains(&v))
        .unwrap_or(false);
    if known {
        Ok(())
    } else {
        Err(FramingError::UnknownVersion { kind, version })
    }
}

fn read_body(
    reader: &mut Reader<'_>,
    digest: DigestAlgorithm,
    allow_sidecars: bool,
) -> Result<(Vec<StreamItem>, Vec<Sidecar>), FramingError> {
    let mut items = Vec::new();
    let mut sidecars = Vec::new();
    while reader.has_remaining() {
        let offset = reader.offset();
        match reader.u8()? {
            MARKER_ITEM => {
                let consensus_ns = reader.i64()?;
                let len = reader.u32()? as usize;
                let payload = Bytes::copy_from_slice(reader.take(len)?);
                items.push(StreamItem {
                    consensus_ns,
                    payload,
                });
            }
            MARKER_SIDECAR if allow_sidecars => {
                let id = reader.u32()?;
                let id = u8::try_from(id)
                    .ok()
                    .filter(|id| *id < 100)
                    .ok_or(FramingError::SidecarId(id))?;
                let hash = FileHash::from_slice(reader.take(digest.output_len())?);
                sidecars.push(Sidecar {
                    id,
                    hash,
                    bytes: None,
                });
            }
            found => return Err(FramingError::UnexpectedMarker { offset, found }),
        }
    }

    let times: Vec<i64> = items.iter().map(|i| i.consensus_ns).collect();
    if !invariant_monotonic_times(&times) {
        return Err(FramingError::NonMonotonic);
    }
    Ok((items, sidecars))
}

/// Decode a signature file published by `node`.
pub fn decode_signature_file(
    node: &NodeId,
    filename: &StreamFilename,
    digest: DigestAlgorithm,
    bytes: &[u8],
) -> Result<SignatureFile, FramingError> {
    let mut reader = Reader::new(bytes);
    let first = reader.peek().ok_or(FramingError::Empty)?;

    let (version, file, metadata) = match first {
        MARKER_HASH => (SIGNATURE_VERSION_LEGACY, read_attested(&mut reader, digest)?, None),
        MARKER_SIGNATURE_V5 => {
            reader.u8()?;
            let file = read_attested(&mut reader, digest)?;
            let metadata = read_attested(&mut reader, digest)?;
            (SIGNATURE_VERSION_V5, file, Some(metadata))
        }
        found => return Err(FramingError::UnexpectedMarker { offset: 0, found }),
    };
    if reader.has_remaining() {
        return Err(FramingError::TrailingBytes(reader.remaining()));
    }

    Ok(SignatureFile {
        node: node.clone(),
        filename: filename.clone(),
        version,
        file,
        metadata,
    })
}

fn read_attested(
    reader: &mut Reader<'_>,
    digest: DigestAlgorithm,
) -> Result<AttestedHash, FramingError> {
    reader.expect_marker(MARKER_HASH)?;
    let hash = FileHash::from_slice(reader.take(digest.output_len())?);
    reader.expect_marker(MARKER_SIGNATURE)?;
    let tag = reader.u8()?;
    let algorithm =
        SignatureAlgorithm::from_tag(tag).map_err(|_| FramingError::UnknownAlgorithm(tag))?;
    let len = reader.u32()? as usize;
    if len > MAX_SIGNATURE_LEN {
        return Err(FramingError::SignatureTooLong(len));
    }
    let bytes = reader.take(len)?.to_vec();
    Ok(AttestedHash {
        hash,
        signature: SignatureBlob { algorithm, bytes },
    })
}

/// Everything needed to write a data file.
#[derive(Clone, Debug)]
pub struct DataFileParts<'a> {
    /// Stream kind
    pub kind: StreamKind,
    /// Format version
    pub version: u32,
    /// Digest algorithm (sets the previous-hash width)
    pub digest: DigestAlgorithm,
    /// Header timestamp (balance files)
    pub timestamp: i64,
    /// Previous file hash, zero-filled when absent
    pub previous_hash: Option<&'a FileHash>,
    /// Items
    pub items: &'a [StreamItem],
    /// Sidecar references (v6 records)
    pub sidecars: &'a [Sidecar],
}

/// Encode a data file. The inverse of [`decode_data_file`].
pub fn encode_data_file(parts: &DataFileParts<'_>) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_i32(parts.version as i32);

    if parts.kind == StreamKind::Balance {
        buf.put_i64(parts.timestamp);
    } else {
        if parts.version >= 5 {
            let (major, minor, patch) = PROTOCOL_VERSION;
            buf.put_i32(major);
            buf.put_i32(minor);
            buf.put_i32(patch);
        } else {
            buf.put_i32(LEGACY_PROTOCOL_VERSION);
        }
        buf.put_u8(MARKER_PREVIOUS_HASH);
        match parts.previous_hash {
            Some(prev) => buf.put_slice(prev.as_bytes()),
            None => buf.put_bytes(0, parts.digest.output_len()),
        }
    }

    for item in parts.items {
        buf.put_u8(MARKER_ITEM);
        buf.put_i64(item.consensus_ns);
        buf.put_u32(item.payload.len() as u32);
        buf.put_slice(&item.payload);
    }
    for sidecar in parts.sidecars {
        buf.put_u8(MARKER_SIDECAR);
        buf.put_u32(u32::from(sidecar.id));
        buf.put_slice(sidecar.hash.as_bytes());
    }
    buf.freeze()
}

/// Encode a signature file; v5 when a metadata attestation is given.
pub fn encode_signature_file(file: &AttestedHash, metadata: Option<&AttestedHash>) -> Bytes {
    let mut buf = BytesMut::new();
    if let Some(metadata) = metadata {
        buf.put_u8(MARKER_SIGNATURE_V5);
        put_attested(&mut buf, file);
        put_attested(&mut buf, metadata);
    } else {
        put_attested(&mut buf, file);
    }
    buf.freeze()
}

fn put_attested(buf: &mut BytesMut, attested: &AttestedHash) {
    buf.put_u8(MARKER_HASH);
    buf.put_slice(attested.hash.as_bytes());
    buf.put_u8(MARKER_SIGNATURE);
    buf.put_u8(attested.signature.algorithm.tag());
    buf.put_u32(attested.signature.bytes.len() as u32);
    buf.put_slice(&attested.signature.bytes);
}

/// Bounds-checked big-endian reader over a byte slice.
struct Reader<'a> {
    buf: &'a [u8],
    len: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            len: buf.len(),
        }
    }

    fn offset(&self) -> usize {
        self.len - self.buf.remaining()
    }

    fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn has_remaining(&self) -> bool {
        self.buf.has_remaining()
    }

    fn peek(&self) -> Option<u8> {
        self.buf.first().copied()
    }

    fn ensure(&self, needed: usize) -> Result<(), FramingError> {
        if self.buf.remaining() < needed {
            Err(FramingError::Truncated {
                offset: self.offset(),
                needed,
            })
        } else {
            Ok(())
        }
    }

    fn u8(&mut self) -> Result<u8, FramingError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32, FramingError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    fn i32(&mut self) -> Result<i32, FramingError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    fn i64(&mut self) -> Result<i64, FramingError> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], FramingError> {
        self.ensure(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn expect_marker(&mut self, marker: u8) -> Result<(), FramingError> {
        let offset = self.offset();
        match self.u8()? {
            found if found == marker => Ok(()),
            found => Err(FramingError::UnexpectedMarker { offset, found }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_MAX_DECOMPRESSED_LEN;
    use shared_crypto::NodeKeyPair;

    const T0: i64 = 1_700_000_000_000_000_000;

    // Digests below were computed independently from the documented
    // layouts (SHA-384, previous hash = 48 x 0xaa).
    const RECORD_V1_HASH: &str =
        "0dd76c597695ef91b20614351e572d0ad6a5ede2e6d3db357b9aa1722df05b058f992eb5a8aba4457c9e806cd4f6a378";
    const RECORD_V2_HASH: &str =
        "d8f29759b34c3f4ab3538ba65cd5b3664040f3f6639605d7a34e2d41cfb7256493731f24892852e9791f640d0aa0ed19";
    const RECORD_V5_HASH: &str =
        "dd784f511d86b21b632ac5440aae3900d79ce025c071b8f69a9e38282a63d3c7cfb2247ed4fbd6806b4ea26bdcde3579";
    const RECORD_V5_METADATA: &str =
        "80268124779dbac511b6101592335bd8267fa02da1a4c5ebfaf490f2008902859b2cbca311ac775cfe2e5660a7fb3424";
    const RECORD_V6_HASH: &str =
        "618bcff4538060aeb5dc28ade7da6dcdc95a07176636a792858e17167cefad8f5360f19196d849c77eaa1ed90328c9c2";
    const BALANCE_V1_HASH: &str =
        "195452e663139d9c068301bebc45fe95b1a1f95ef9b3c59118146cd25576174d9d0db98891e6a4f0c8b00381c17d4e25";

    fn items() -> Vec<StreamItem> {
        vec![
            StreamItem {
                consensus_ns: T0,
                payload: Bytes::from_static(b"alpha"),
            },
            StreamItem {
                consensus_ns: T0 + 500,
                payload: Bytes::from_static(b"beta"),
            },
        ]
    }

    fn previous() -> FileHash {
        FileHash::from_slice(&[0xaa; 48])
    }

    fn record(version: u32, sidecars: &[Sidecar]) -> Bytes {
        let items = items();
        let prev = previous();
        encode_data_file(&DataFileParts {
            kind: StreamKind::Record,
            version,
            digest: DigestAlgorithm::Sha384,
            timestamp: T0,
            previous_hash: Some(&prev),
            items: &items,
            sidecars,
        })
    }

    fn hash_hex(kind: StreamKind, bytes: &[u8]) -> String {
        compute_self_hash(kind, DigestAlgorithm::Sha384, bytes)
            .unwrap()
            .to_hex()
    }

    #[test]
    fn test_record_v1_digests_whole_file() {
        let bytes = record(1, &[]);
        assert_eq!(hash_hex(StreamKind::Record, &bytes), RECORD_V1_HASH);
        assert_eq!(
            hex::encode(DigestAlgorithm::Sha384.digest(&bytes)),
            RECORD_V1_HASH
        );
    }

    #[test]
    fn test_record_v2_nests_body_digest() {
        let bytes = record(2, &[]);
        assert_eq!(hash_hex(StreamKind::Record, &bytes), RECORD_V2_HASH);
        assert_ne!(
            hex::encode(DigestAlgorithm::Sha384.digest(&bytes)),
            RECORD_V2_HASH
        );
    }

    #[test]
    fn test_record_v5_metadata_hash() {
        let bytes = record(5, &[]);
        let contents =
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &bytes).unwrap();
        assert_eq!(contents.hash.to_hex(), RECORD_V5_HASH);
        assert_eq!(
            contents.metadata_hash.as_ref().map(|h| h.to_hex()).as_deref(),
            Some(RECORD_V5_METADATA)
        );
        assert_eq!(contents.previous_hash, Some(previous()));
        assert_eq!(contents.consensus_start(), T0);
        assert_eq!(contents.consensus_end(), T0 + 500);
    }

    #[test]
    fn test_record_v6_sidecar_refs() {
        let sidecar = Sidecar {
            id: 1,
            hash: FileHash::from_slice(&[0xbb; 48]),
            bytes: None,
        };
        let bytes = record(6, std::slice::from_ref(&sidecar));
        let contents =
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &bytes).unwrap();
        assert_eq!(contents.hash.to_hex(), RECORD_V6_HASH);
        assert_eq!(contents.sidecars, vec![sidecar]);
        assert_eq!(contents.items.len(), 2);
    }

    #[test]
    fn test_balance_v1() {
        let items = vec![StreamItem {
            consensus_ns: T0,
            payload: Bytes::from_static(b"balances"),
        }];
        let bytes = encode_data_file(&DataFileParts {
            kind: StreamKind::Balance,
            version: 1,
            digest: DigestAlgorithm::Sha384,
            timestamp: T0,
            previous_hash: None,
            items: &items,
            sidecars: &[],
        });
        let contents =
            decode_data_file(StreamKind::Balance, DigestAlgorithm::Sha384, &bytes).unwrap();
        assert_eq!(contents.hash.to_hex(), BALANCE_V1_HASH);
        assert!(contents.previous_hash.is_none());
        assert_eq!(contents.header_timestamp, Some(T0));
    }

    #[test]
    fn test_sha256_width() {
        let items = items();
        let bytes = encode_data_file(&DataFileParts {
            kind: StreamKind::Event,
            version: 5,
            digest: DigestAlgorithm::Sha256,
            timestamp: T0,
            previous_hash: None,
            items: &items,
            sidecars: &[],
        });
        let contents =
            decode_data_file(StreamKind::Event, DigestAlgorithm::Sha256, &bytes).unwrap();
        assert_eq!(contents.hash.len(), 32);
        assert!(contents.previous_hash.map_or(false, |h| h.is_zero()));
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = record(5, &[]).to_vec();
        bytes[3] = 9;
        assert_eq!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &bytes),
            Err(FramingError::UnknownVersion {
                kind: StreamKind::Record,
                version: 9
            })
        );
        // v6 exists for records only
        let bytes = record(6, &[]);
        assert!(decode_data_file(StreamKind::Event, DigestAlgorithm::Sha384, &bytes).is_err());
    }

    #[test]
    fn test_rejects_truncation_and_garbage() {
        let bytes = record(2, &[]);
        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, truncated),
            Err(FramingError::Truncated { .. })
        ));

        let mut garbage = bytes.to_vec();
        garbage.push(0xff);
        assert!(matches!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &garbage),
            Err(FramingError::UnexpectedMarker { found: 0xff, .. })
        ));

        assert_eq!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &[]),
            Err(FramingError::Empty)
        );
    }

    #[test]
    fn test_rejects_sidecar_refs_before_v6() {
        let sidecar = Sidecar {
            id: 1,
            hash: FileHash::from_slice(&[0xbb; 48]),
            bytes: None,
        };
        let bytes = record(5, &[sidecar]);
        assert!(matches!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &bytes),
            Err(FramingError::UnexpectedMarker { found: 0x07, .. })
        ));
    }

    #[test]
    fn test_rejects_items_out_of_order() {
        let mut items = items();
        items.reverse();
        let bytes = encode_data_file(&DataFileParts {
            kind: StreamKind::Record,
            version: 2,
            digest: DigestAlgorithm::Sha384,
            timestamp: T0,
            previous_hash: None,
            items: &items,
            sidecars: &[],
        });
        assert_eq!(
            decode_data_file(StreamKind::Record, DigestAlgorithm::Sha384, &bytes),
            Err(FramingError::NonMonotonic)
        );
    }

    #[test]
    fn test_compressed_files_hash_decompressed_bytes() {
        let plain = record(2, &[]);
        let packed = Bytes::from(zstd::encode_all(plain.as_ref(), 3).unwrap());
        let name = StreamFilename::data(StreamKind::Record, T0, true);

        let inflated = decompress(&name, packed, DEFAULT_MAX_DECOMPRESSED_LEN).unwrap();
        assert_eq!(inflated, plain);
        assert_eq!(hash_hex(StreamKind::Record, &inflated), RECORD_V2_HASH);

        let bogus = decompress(
            &name,
            Bytes::from_static(b"not zstd"),
            DEFAULT_MAX_DECOMPRESSED_LEN,
        );
        assert!(matches!(bogus, Err(FramingError::Decompress(_))));
    }

    #[test]
    fn test_decompress_stops_at_limit() {
        let name = StreamFilename::data(StreamKind::Record, T0, true);
        let bomb = Bytes::from(zstd::encode_all(vec![0u8; 4 << 20].as_slice(), 19).unwrap());
        assert!(bomb.len() < 4096);

        let result = decompress(&name, bomb.clone(), 1 << 20);
        assert!(matches!(result, Err(FramingError::Decompress(_))));
        assert_eq!(decompress(&name, bomb, 4 << 20).unwrap().len(), 4 << 20);

        // Plain files are not size-checked here
        let plain = StreamFilename::data(StreamKind::Record, T0, false);
        assert!(decompress(&plain, Bytes::from(vec![1u8; 16]), 8).is_ok());
    }

    #[test]
    fn test_signature_file_roundtrip() {
        let key = NodeKeyPair::ed25519_from_seed([3; 32]);
        let attest = |hash: FileHash| AttestedHash {
            signature: SignatureBlob {
                algorithm: key.algorithm(),
                bytes: key.sign(hash.as_bytes()),
            },
            hash,
        };
        let file = attest(FileHash::from_slice(&[1; 48]));
        let meta = attest(FileHash::from_slice(&[2; 48]));
        let node = NodeId::from("0.0.3");
        let name = StreamFilename::signature(StreamKind::Record, T0);

        let legacy = encode_signature_file(&file, None);
        let decoded =
            decode_signature_file(&node, &name, DigestAlgorithm::Sha384, &legacy).unwrap();
        assert_eq!(decoded.version, SIGNATURE_VERSION_LEGACY);
        assert_eq!(decoded.file, file);
        assert!(decoded.metadata.is_none());

        let v5 = encode_signature_file(&file, Some(&meta));
        let decoded = decode_signature_file(&node, &name, DigestAlgorithm::Sha384, &v5).unwrap();
        assert_eq!(decoded.version, SIGNATURE_VERSION_V5);
        assert_eq!(decoded.metadata, Some(meta));
    }

    #[test]
    fn test_signature_file_rejects_bad_layouts() {
        let node = NodeId::from("0.0.3");
        let name = StreamFilename::signature(StreamKind::Record, T0);
        let decode = |bytes: &[u8]| decode_signature_file(&node, &name, DigestAlgorithm::Sha384, bytes);

        assert_eq!(decode(&[]), Err(FramingError::Empty));
        assert!(matches!(
            decode(&[0x09]),
            Err(FramingError::UnexpectedMarker { offset: 0, found: 0x09 })
        ));

        let mut bytes = vec![MARKER_HASH];
        bytes.extend_from_slice(&[1; 48]);
        bytes.extend_from_slice(&[MARKER_SIGNATURE, 7, 0, 0, 0, 0]);
        assert_eq!(decode(&bytes), Err(FramingError::UnknownAlgorithm(7)));

        let mut bytes = vec![MARKER_HASH];
        bytes.extend_from_slice(&[1; 48]);
        bytes.extend_from_slice(&[MARKER_SIGNATURE, 1, 0, 0, 0x10, 0]);
        assert_eq!(decode(&bytes), Err(FramingError::SignatureTooLong(4096)));
    }
}
