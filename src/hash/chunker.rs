// Content-defined chunker.
//
// `Chunker` is an `io::Write` sink, so it can sit next to any other
// single-pass consumer (a whole-file hasher, a copy sink) and see the same
// bytes in the same read. Boundaries come from `Rollsum::on_split()` or the
// `MAX_CHUNK_SIZE` cap; the rollsum restarts after every cut.

use std::io::{self, Write};

use sha2::{Digest as _, Sha256};

use super::config::{HEADER_LEN, MAX_CHUNK_SIZE};
use super::rolling::Rollsum;

/// SHA-256 content digest.
pub type Digest = [u8; 32];

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One content-defined byte range of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chunk {
    /// Offset of the first byte within the file.
    pub offset: u64,
    /// Length in bytes, `1..=MAX_CHUNK_SIZE`.
    pub size: u64,
    /// SHA-256 of the chunk bytes.
    pub digest: Digest,
}

impl Chunk {
    /// Offset one past the last byte.
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

// ---------------------------------------------------------------------------
// Chunker
// ---------------------------------------------------------------------------

/// Streaming content-defined chunker.
pub struct Chunker {
    rollsum: Rollsum,
    hasher: Sha256,
    chunks: Vec<Chunk>,
    chunk_start: u64,
    chunk_len: u64,
    header: Vec<u8>,
}

impl Chunker {
    pub fn new() -> Self {
        Self {
            rollsum: Rollsum::new(),
            hasher: Sha256::new(),
            chunks: Vec::new(),
            chunk_start: 0,
            chunk_len: 0,
            header: Vec::with_capacity(HEADER_LEN),
        }
    }

    /// First `HEADER_LEN` bytes of the stream (fewer for short streams).
    pub fn header(&self) -> &[u8] {
        &self.header
    }

    /// Total bytes consumed so far.
    pub fn bytes_consumed(&self) -> u64 {
        self.chunk_start + self.chunk_len
    }

    /// Feed more stream bytes.
    pub fn update(&mut self, data: &[u8]) {
        if self.header.len() < HEADER_LEN {
            let take = (HEADER_LEN - self.header.len()).min(data.len());
            self.header.extend_from_slice(&data[..take]);
        }

        let mut start = 0usize;
        for (i, &b) in data.iter().enumerate() {
            self.rollsum.roll(b);
            self.chunk_len += 1;
            if self.rollsum.on_split() || self.chunk_len == MAX_CHUNK_SIZE {
                self.hasher.update(&data[start..=i]);
                self.cut();
                start = i + 1;
            }
        }
        self.hasher.update(&data[start..]);
    }

    /// Close the trailing partial chunk and return the chunk list.
    ///
    /// An empty stream yields no chunks.
    pub fn finish(mut self) -> Vec<Chunk> {
        if self.chunk_len > 0 {
            self.cut();
        }
        self.chunks
    }

    fn cut(&mut self) {
        let digest: Digest = self.hasher.finalize_reset().into();
        self.chunks.push(Chunk {
            offset: self.chunk_start,
            size: self.chunk_len,
            digest,
        });
        self.chunk_start += self.chunk_len;
        self.chunk_len = 0;
        self.rollsum.reset();
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for Chunker {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Chunk an in-memory buffer.
pub fn chunk_bytes(data: &[u8]) -> Vec<Chunk> {
    let mut chunker = Chunker::new();
    chunker.update(data);
    chunker.finish()
}

// ---------------------------------------------------------------------------
// Coverage check
// ---------------------------------------------------------------------------

/// A chunk list that does not tile `[0, size)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoverageViolation {
    #[error("chunk {index} starts at {offset}, expected {expected}")]
    WrongStart {
        index: usize,
        offset: u64,
        expected: u64,
    },
    #[error("chunk {index} has size {size}, allowed 1..={}", MAX_CHUNK_SIZE)]
    WrongSize { index: usize, size: u64 },
    #[error("chunks end at {end}, expected {size}")]
    WrongEnd { end: u64, size: u64 },
}

/// Check that `chunks` are contiguous from 0, each within the size cap, and
/// end exactly at `size`.
pub fn verify_coverage(chunks: &[Chunk], size: u64) -> Result<(), CoverageViolation> {
    let mut last = 0u64;
    for (index, chunk) in chunks.iter().enumerate() {
        if chunk.offset != last {
            return Err(CoverageViolation::WrongStart {
                index,
                offset: chunk.offset,
                expected: last,
            });
        }
        if chunk.size == 0 || chunk.size > MAX_CHUNK_SIZE {
            return Err(CoverageViolation::WrongSize {
                index,
                size: chunk.size,
            });
        }
        last = chunk.end();
    }
    if last != size {
        return Err(CoverageViolation::WrongEnd { end: last, size });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use sha2::Digest as _;

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut data = vec![0u8; len];
        StdRng::seed_from_u64(seed).fill(&mut data[..]);
        data
    }

    #[test]
    fn empty_stream_has_no_chunks() {
        assert!(chunk_bytes(b"").is_empty());
        assert!(Chunker::new().finish().is_empty());
    }

    #[test]
    fn small_stream_is_one_chunk() {
        let chunks = chunk_bytes(b"hello");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].size, 5);
        let expected: Digest = Sha256::digest(b"hello").into();
        assert_eq!(chunks[0].digest, expected);
    }

    #[test]
    fn random_data_is_fully_covered() {
        let data = random_bytes(300_000, 1);
        let chunks = chunk_bytes(&data);
        assert!(chunks.len() > 1);
        verify_coverage(&chunks, data.len() as u64).unwrap();
        for c in &chunks {
            let bytes = &data[c.offset as usize..c.end() as usize];
            let expected: Digest = Sha256::digest(bytes).into();
            assert_eq!(c.digest, expected);
        }
    }

    #[test]
    fn constant_data_hits_size_cap() {
        let data = vec![0u8; (MAX_CHUNK_SIZE * 3 + 10) as usize];
        let chunks = chunk_bytes(&data);
        verify_coverage(&chunks, data.len() as u64).unwrap();
        assert_eq!(chunks.len(), 4);
        assert!(chunks[..3].iter().all(|c| c.size == MAX_CHUNK_SIZE));
        assert_eq!(chunks[3].size, 10);
        // Identical content, identical digests.
        assert_eq!(chunks[0].digest, chunks[1].digest);
    }

    #[test]
    fn write_granularity_does_not_matter() {
        let data = random_bytes(100_000, 2);
        let whole = chunk_bytes(&data);

        let mut chunker = Chunker::new();
        for piece in data.chunks(777) {
            chunker.write_all(piece).unwrap();
        }
        assert_eq!(chunker.bytes_consumed(), data.len() as u64);
        assert_eq!(chunker.finish(), whole);
    }

    #[test]
    fn header_captures_leading_bytes() {
        let mut chunker = Chunker::new();
        chunker.update(b"\x7fEL");
        chunker.update(b"F and then a lot more bytes");
        assert_eq!(chunker.header().len(), HEADER_LEN);
        assert!(chunker.header().starts_with(b"\x7fELF"));

        let mut short = Chunker::new();
        short.update(b"ab");
        assert_eq!(short.header(), b"ab");
    }

    #[test]
    fn insertion_only_disturbs_nearby_chunks() {
        let original = random_bytes(512 * 1024, 3);
        let edit_at = 64 * 1024;
        let mut edited = original[..edit_at].to_vec();
        edited.extend_from_slice(b"0123456789");
        edited.extend_from_slice(&original[edit_at..]);

        let before = chunk_bytes(&original);
        let after = chunk_bytes(&edited);

        // Chunks wholly before the edit are untouched.
        for c in before.iter().filter(|c| c.end() < edit_at as u64) {
            assert!(after.contains(c), "chunk at {} lost", c.offset);
        }

        // Chunks well past the edit reappear, shifted by the insertion.
        let resync = edit_at as u64 + 3 * MAX_CHUNK_SIZE;
        let far: Vec<_> = before.iter().filter(|c| c.offset >= resync).collect();
        assert!(!far.is_empty());
        for c in far {
            let shifted = Chunk {
                offset: c.offset + 10,
                ..*c
            };
            assert!(after.contains(&shifted), "chunk at {} not resynced", c.offset);
        }
    }

    #[test]
    fn deletion_only_disturbs_nearby_chunks() {
        let original = random_bytes(512 * 1024, 4);
        let cut = 200 * 1024..200 * 1024 + 500;
        let mut edited = original[..cut.start].to_vec();
        edited.extend_from_slice(&original[cut.end..]);

        let before = chunk_bytes(&original);
        let after = chunk_bytes(&edited);

        for c in before.iter().filter(|c| c.end() < cut.start as u64) {
            assert!(after.contains(c));
        }
        let resync = cut.end as u64 + 3 * MAX_CHUNK_SIZE;
        for c in before.iter().filter(|c| c.offset >= resync) {
            let shifted = Chunk {
                offset: c.offset - 500,
                ..*c
            };
            assert!(after.contains(&shifted));
        }
    }

    #[test]
    fn coverage_violations_are_reported() {
        let d = [0u8; 32];
        let ok = [
            Chunk { offset: 0, size: 10, digest: d },
            Chunk { offset: 10, size: 5, digest: d },
        ];
        assert_eq!(verify_coverage(&ok, 15), Ok(()));
        assert_eq!(
            verify_coverage(&ok, 16),
            Err(CoverageViolation::WrongEnd { end: 15, size: 16 })
        );

        let gap = [
            Chunk { offset: 0, size: 10, digest: d },
            Chunk { offset: 11, size: 5, digest: d },
        ];
        assert!(matches!(
            verify_coverage(&gap, 16),
            Err(CoverageViolation::WrongStart { index: 1, .. })
        ));

        let big = [Chunk {
            offset: 0,
            size: MAX_CHUNK_SIZE + 1,
            digest: d,
        }];
        assert!(matches!(
            verify_coverage(&big, MAX_CHUNK_SIZE + 1),
            Err(CoverageViolation::WrongSize { index: 0, .. })
        ));

        assert_eq!(verify_coverage(&[], 0), Ok(()));
    }
}
