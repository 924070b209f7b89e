//! Exhaustive L2 similarity index with single-file persistence.
//!
//! [`SimilarityIndex`] stores one index generation: a row-major block of
//! vectors, the chunks they were computed from (same order), and a digest
//! of the document set the generation was built from. Search compares the
//! query with every stored vector.
//!
//! # File format
//!
//! Version 1, all integers and floats little-endian:
//!
//! ```text
//! magic "KBQI" u32 | version u16 | dimension u32 | count u32 | digest [u8; 32]
//! count * dimension f32
//! count chunk records: text | pair count u32 | (key, value)*
//! ```
//!
//! Strings are a `u32` byte length followed by UTF-8. Metadata pairs are
//! written in key order.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::document::DocumentChunk;
use crate::error::{RagError, Result};

const MAGIC: u32 = u32::from_le_bytes(*b"KBQI");
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4 + 32;

/// BLAKE3 digest of an embedder identity and an ordered chunk set.
pub type SourceDigest = [u8; 32];

/// Hash what an index generation is built from: the identity of the
/// embedder that produced its vectors and the ordered chunk set.
///
/// Any change to the embedder identity, chunk order, text or metadata
/// changes the digest.
pub fn source_digest(embedder: &str, chunks: &[DocumentChunk]) -> SourceDigest {
    let mut hasher = blake3::Hasher::new();
    hash_str(&mut hasher, embedder);
    hasher.update(&(chunks.len() as u64).to_le_bytes());
    for chunk in chunks {
        hash_str(&mut hasher, &chunk.text);
        hasher.update(&(chunk.metadata.len() as u64).to_le_bytes());
        for (key, value) in &chunk.metadata {
            hash_str(&mut hasher, key);
            hash_str(&mut hasher, value);
        }
    }
    *hasher.finalize().as_bytes()
}

fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

/// A configured width that was overridden by the width of real vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionCorrection {
    /// Width declared by configuration.
    pub configured: usize,
    /// Width of the vectors the index was built from.
    pub actual: usize,
}

/// One search hit: a stored position and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Index of the matched vector and chunk.
    pub position: usize,
    /// Squared Euclidean distance to the query.
    pub distance: f32,
}

/// An in-memory index generation.
#[derive(Debug, Clone)]
pub struct SimilarityIndex {
    dimension: usize,
    vectors: Vec<f32>,
    chunks: Vec<DocumentChunk>,
    digest: SourceDigest,
    correction: Option<DimensionCorrection>,
}

impl SimilarityIndex {
    /// Build an index over `vectors`, where vector `i` belongs to chunk `i`.
    ///
    /// The index width is the width of the supplied vectors. When that
    /// differs from `configured_dimension` the real width is used and the
    /// correction is logged and kept in [`correction`](Self::correction).
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if there are no vectors, if the
    /// vector and chunk counts differ, or if vectors have differing or zero
    /// width.
    pub fn build(
        vectors: Vec<Vec<f32>>,
        chunks: Vec<DocumentChunk>,
        configured_dimension: usize,
    ) -> Result<Self> {
        if vectors.is_empty() {
            return Err(RagError::IndexError("cannot build an index from zero vectors".into()));
        }
        if vectors.len() != chunks.len() {
            return Err(RagError::IndexError(format!(
                "{} vectors but {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(RagError::IndexError("vectors have zero width".into()));
        }
        if let Some((position, v)) = vectors.iter().enumerate().find(|(_, v)| v.len() != dimension)
        {
            return Err(RagError::IndexError(format!(
                "vector {position} has width {} but the index width is {dimension}",
                v.len()
            )));
        }

        info!(configured_dimension, actual_dimension = dimension, "building similarity index");
        let correction = (dimension != configured_dimension).then(|| {
            warn!(
                configured = configured_dimension,
                actual = dimension,
                "configured embedding dimension does not match vectors, using actual width"
            );
            DimensionCorrection { configured: configured_dimension, actual: dimension }
        });

        Ok(Self {
            dimension,
            vectors: vectors.into_iter().flatten().collect(),
            chunks,
            digest: [0; 32],
            correction,
        })
    }

    /// Record the digest of the document set this generation came from.
    pub fn with_source_digest(mut self, digest: SourceDigest) -> Self {
        self.digest = digest;
        self
    }

    /// The digest recorded with [`with_source_digest`](Self::with_source_digest).
    pub fn source_digest(&self) -> &SourceDigest {
        &self.digest
    }

    /// Vector width.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The dimension correction applied at build time, if any.
    ///
    /// Always `None` for an index read with [`load`](Self::load).
    pub fn correction(&self) -> Option<DimensionCorrection> {
        self.correction
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stored chunks, parallel to the vectors.
    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    /// The chunk at `position`.
    pub fn chunk(&self, position: usize) -> Option<&DocumentChunk> {
        self.chunks.get(position)
    }

    /// Find the `k` stored vectors closest to `query`.
    ///
    /// Results are ordered by ascending squared L2 distance; equal
    /// distances keep insertion order. Fewer than `k` results are returned
    /// when fewer vectors are stored. Non-finite distances are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::IndexError`] if the query width differs from the
    /// index width.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(RagError::IndexError(format!(
                "query has width {} but the index width is {}",
                query.len(),
                self.dimension
            )));
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(position, stored)| Neighbor { position, distance: squared_l2(stored, query) })
            .filter(|n| n.distance.is_finite())
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance.total_cmp(&b.distance).then_with(|| a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// Write the index to `path`, replacing any existing file atomically.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] on any I/O failure.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)
            .map_err(|e| RagError::persistence(path, format!("create directory: {e}")))?;

        let bytes = self.encode();
        let mut file = NamedTempFile::new_in(dir)
            .map_err(|e| RagError::persistence(path, format!("create temp file: {e}")))?;
        file.write_all(&bytes)
            .and_then(|()| file.as_file().sync_all())
            .map_err(|e| RagError::persistence(path, format!("write: {e}")))?;
        file.persist(path).map_err(|e| RagError::persistence(path, format!("replace: {e}")))?;

        info!(path = %path.display(), vectors = self.len(), bytes = bytes.len(), "index saved");
        Ok(())
    }

    /// Read an index previously written by [`persist`](Self::persist).
    ///
    /// The stored width is trusted as-is; it is not compared with any
    /// configured dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PersistenceError`] if the file cannot be read or
    /// is not a valid version 1 index.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| RagError::persistence(path, format!("read: {e}")))?;
        let index = Self::decode(&bytes).map_err(|message| RagError::persistence(path, message))?;
        debug!(
            path = %path.display(),
            vectors = index.len(),
            dimension = index.dimension,
            "index loaded"
        );
        Ok(index)
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        buf.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.digest);

        for value in &self.vectors {
            buf.extend_from_slice(&value.to_le_bytes());
        }
        for chunk in &self.chunks {
            put_str(&mut buf, &chunk.text);
            buf.extend_from_slice(&(chunk.metadata.len() as u32).to_le_bytes());
            for (key, value) in &chunk.metadata {
                put_str(&mut buf, key);
                put_str(&mut buf, value);
            }
        }
        buf
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = Reader { bytes, pos: 0 };

        if reader.u32()? != MAGIC {
            return Err("not an index file (bad magic)".into());
        }
        let version = reader.u16()?;
        if version != FORMAT_VERSION {
            return Err(format!("unsupported format version {version}"));
        }
        let dimension = reader.u32()? as usize;
        let count = reader.u32()? as usize;
        if dimension == 0 || count == 0 {
            return Err(format!("empty index (dimension {dimension}, count {count})"));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(reader.take(32)?);

        let floats = dimension
            .checked_mul(count)
            .filter(|n| n.checked_mul(4).is_some_and(|b| b <= reader.remaining()))
            .ok_or("vector block larger than file")?;
        let mut vectors = Vec::with_capacity(floats);
        for _ in 0..floats {
            vectors.push(reader.f32()?);
        }

        let mut chunks = Vec::with_capacity(count);
        for _ in 0..count {
            let mut chunk = DocumentChunk::new(reader.string()?);
            let pairs = reader.u32()?;
            for _ in 0..pairs {
                let key = reader.string()?;
                let value = reader.string()?;
                chunk.metadata.insert(key, value);
            }
            chunks.push(chunk);
        }

        if reader.remaining() != 0 {
            return Err(format!("{} trailing bytes", reader.remaining()));
        }

        Ok(Self { dimension, vectors, chunks, digest, correction: None })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> std::result::Result<&'a [u8], String> {
        if n > self.remaining() {
            return Err(format!("unexpected end of file at byte {}", self.pos));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> std::result::Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> std::result::Result<u16, String> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> std::result::Result<u32, String> {
        self.array().map(u32::from_le_bytes)
    }

    fn f32(&mut self) -> std::result::Result<f32, String> {
        self.array().map(f32::from_le_bytes)
    }

    fn string(&mut self) -> std::result::Result<String, String> {
        let len = self.u32()? as usize;
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|e| format!("invalid UTF-8: {e}"))
    }
}
