//! Chunking engine: content hashing, fixed-size splitting and deterministic
//! replica placement.
//!
//! A file is read in fixed windows (1 MiB by default); each window becomes a
//! chunk with a 1-based sequence number and its own SHA-256 digest, while a
//! running digest over the whole byte stream is accumulated in parallel.
//! Chunk objects are named `<base>_chunk<seq><ext>` and assigned a replica
//! location by `(seq - 1) mod N`.

pub mod store;

use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Content hash (256-bit SHA-256)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Self::from_digest(hasher)
    }

    fn from_digest(hasher: Sha256) -> Self {
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Self(hash)
    }

    pub fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 {
            return None;
        }
        let mut hash = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let s = std::str::from_utf8(chunk).ok()?;
            hash[i] = u8::from_str_radix(s, 16).ok()?;
        }
        Some(Self(hash))
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl std::fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// One chunk produced by the splitter.
#[derive(Clone, Debug)]
pub struct ChunkDescriptor {
    /// 1-based, contiguous within a file.
    pub seq: u32,
    pub data: Bytes,
    pub hash: ContentHash,
}

/// Reads a byte stream forward-only in fixed windows, yielding one
/// [`ChunkDescriptor`] per window. The final chunk may be shorter than the
/// window. Accumulates the whole-file digest across all chunks in stream
/// order; [`ChunkSplitter::finish`] returns it once the stream is exhausted.
///
/// Empty input yields zero chunks and the digest of the empty byte sequence.
pub struct ChunkSplitter<R> {
    reader: R,
    chunk_size: usize,
    next_seq: u32,
    full_hasher: Sha256,
    done: bool,
}

impl<R: AsyncRead + Unpin> ChunkSplitter<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Self {
            reader,
            chunk_size,
            next_seq: 1,
            full_hasher: Sha256::new(),
            done: false,
        }
    }

    /// Next chunk in sequence order, or `None` at end of stream.
    pub async fn next_chunk(&mut self) -> std::io::Result<Option<ChunkDescriptor>> {
        if self.done {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self.reader.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < self.chunk_size {
            self.done = true;
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);

        self.full_hasher.update(&buf);
        let hash = ContentHash::from_data(&buf);
        let seq = self.next_seq;
        self.next_seq += 1;

        Ok(Some(ChunkDescriptor {
            seq,
            data: Bytes::from(buf),
            hash,
        }))
    }

    /// Whole-file digest over everything read so far. Equals hashing the
    /// original byte sequence directly once the stream is exhausted.
    pub fn finish(self) -> ContentHash {
        ContentHash::from_digest(self.full_hasher)
    }
}

/// Replica location for a chunk: round-robin over the N locations.
/// Deterministic and stateless; cycles with period N.
pub fn replica_index(seq: u32, replica_count: usize) -> usize {
    ((seq - 1) as usize) % replica_count
}

/// Splits a filename at its last dot into (base, extension-with-dot).
/// No dot, or a leading dot only, means no extension.
pub fn split_filename(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(i) if i > 0 => filename.split_at(i),
        _ => (filename, ""),
    }
}

/// On-disk name for a chunk object: `<base>_chunk<seq><ext>`.
///
/// Filename-derived, not content-addressed: two files sharing a base name
/// and extension collide in the chunk namespace.
pub fn chunk_object_name(filename: &str, seq: u32) -> String {
    let (base, ext) = split_filename(filename);
    format!("{}_chunk{}{}", base, seq, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_content_hash() {
        let data = b"hello world";
        let hash = ContentHash::from_data(data);
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 64);

        let parsed = ContentHash::from_hex(&hex).unwrap();
        assert_eq!(hash, parsed);
    }

    #[test]
    fn test_empty_hash_is_well_known() {
        assert_eq!(ContentHash::from_data(b"").to_hex(), EMPTY_SHA256);
    }

    #[tokio::test]
    async fn test_split_counts_and_sizes() {
        // 2.5 MiB with a 1 MiB window: 1 MiB, 1 MiB, 0.5 MiB
        let mib = 1024 * 1024;
        let data = vec![7u8; 2 * mib + mib / 2];
        let mut splitter = ChunkSplitter::new(std::io::Cursor::new(data), mib);

        let mut chunks = Vec::new();
        while let Some(chunk) = splitter.next_chunk().await.unwrap() {
            chunks.push(chunk);
        }

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data.len(), mib);
        assert_eq!(chunks[1].data.len(), mib);
        assert_eq!(chunks[2].data.len(), mib / 2);
        assert_eq!(
            chunks.iter().map(|c| c.seq).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_split_round_trip() {
        let data: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let mut splitter = ChunkSplitter::new(std::io::Cursor::new(data.clone()), 64 * 1024);

        let mut rebuilt = Vec::new();
        while let Some(chunk) = splitter.next_chunk().await.unwrap() {
            // Each chunk digest covers exactly that chunk's bytes
            assert_eq!(chunk.hash, ContentHash::from_data(&chunk.data));
            rebuilt.extend_from_slice(&chunk.data);
        }

        assert_eq!(rebuilt, data);
        assert_eq!(splitter.finish(), ContentHash::from_data(&data));
    }

    #[tokio::test]
    async fn test_split_exact_multiple() {
        let data = vec![0u8; 4096];
        let mut splitter = ChunkSplitter::new(std::io::Cursor::new(data), 1024);
        let mut count = 0;
        while splitter.next_chunk().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_split_empty_input() {
        let mut splitter = ChunkSplitter::new(std::io::Cursor::new(Vec::new()), 1024);
        assert!(splitter.next_chunk().await.unwrap().is_none());
        assert_eq!(splitter.finish().to_hex(), EMPTY_SHA256);
    }

    #[test]
    fn test_replica_index_cycles() {
        for seq in 1..=12u32 {
            assert_eq!(replica_index(seq, 3), ((seq - 1) % 3) as usize);
            // Deterministic across calls
            assert_eq!(replica_index(seq, 3), replica_index(seq, 3));
        }
        assert_eq!(replica_index(1, 3), 0);
        assert_eq!(replica_index(2, 3), 1);
        assert_eq!(replica_index(4, 3), 0);
        assert_eq!(replica_index(5, 1), 0);
    }

    #[test]
    fn test_chunk_object_name() {
        assert_eq!(chunk_object_name("report.pdf", 1), "report_chunk1.pdf");
        assert_eq!(chunk_object_name("report.pdf", 12), "report_chunk12.pdf");
        assert_eq!(chunk_object_name("archive.tar.gz", 2), "archive.tar_chunk2.gz");
        assert_eq!(chunk_object_name("README", 3), "README_chunk3");
        assert_eq!(chunk_object_name(".bashrc", 1), ".bashrc_chunk1");
    }
}
