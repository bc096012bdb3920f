// Block matching between two independently chunked files.
//
// Both chunk lists come from the same content-defined chunker, so equal
// digests mean equal bytes; no byte-level alignment search is needed:
//   1. Index source chunks by digest
//   2. Walk target chunks in order, looking each one up
//   3. Emit COPY for hits and LITERAL for misses, coalescing adjacent runs
//
// A hit may land anywhere in the source (moved or reordered content). When a
// digest occurs more than once, the source chunk right after the previous hit
// is preferred so consecutive copies merge.

use std::collections::HashMap;

use super::chunker::{Chunk, Digest};

// ---------------------------------------------------------------------------
// Block operations
// ---------------------------------------------------------------------------

/// One contiguous run of target bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOp {
    /// Target bytes `[target_offset, target_offset + len)` equal source bytes
    /// `[source_offset, source_offset + len)`.
    Copy {
        source_offset: u64,
        target_offset: u64,
        len: u64,
    },
    /// Target bytes `[target_offset, target_offset + len)` must be stored.
    Literal { target_offset: u64, len: u64 },
}

impl BlockOp {
    #[inline]
    pub fn len(&self) -> u64 {
        match *self {
            Self::Copy { len, .. } | Self::Literal { len, .. } => len,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn target_offset(&self) -> u64 {
        match *self {
            Self::Copy { target_offset, .. } | Self::Literal { target_offset, .. } => {
                target_offset
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Correspondence
// ---------------------------------------------------------------------------

/// Ordered copy/literal plan covering a whole target file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockCorrespondence {
    ops: Vec<BlockOp>,
    matched_bytes: u64,
    literal_bytes: u64,
}

impl BlockCorrespondence {
    /// Operations in target order; their lengths sum to the target size.
    pub fn ops(&self) -> &[BlockOp] {
        &self.ops
    }

    /// Target bytes satisfied from the source.
    pub fn matched_bytes(&self) -> u64 {
        self.matched_bytes
    }

    /// Target bytes that must be stored.
    pub fn literal_bytes(&self) -> u64 {
        self.literal_bytes
    }

    pub fn target_size(&self) -> u64 {
        self.matched_bytes + self.literal_bytes
    }

    /// Fraction of the target reconstructed from the source, in `[0, 1]`.
    pub fn match_ratio(&self) -> f64 {
        match self.target_size() {
            0 => 0.0,
            total => self.matched_bytes as f64 / total as f64,
        }
    }

    /// Source ranges referenced by COPY operations, as `(offset, len)`.
    pub fn copies(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ops.iter().filter_map(|op| match *op {
            BlockOp::Copy {
                source_offset, len, ..
            } => Some((source_offset, len)),
            BlockOp::Literal { .. } => None,
        })
    }

    /// Rebuild the target from `source` plus the target's own literal bytes.
    ///
    /// `literals` must be the full target; only LITERAL ranges are read from it.
    pub fn reconstruct(&self, source: &[u8], literals: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.target_size() as usize);
        for op in &self.ops {
            match *op {
                BlockOp::Copy {
                    source_offset, len, ..
                } => {
                    let start = source_offset as usize;
                    out.extend_from_slice(&source[start..start + len as usize]);
                }
                BlockOp::Literal { target_offset, len } => {
                    let start = target_offset as usize;
                    out.extend_from_slice(&literals[start..start + len as usize]);
                }
            }
        }
        out
    }

    fn push_copy(&mut self, source_offset: u64, target_offset: u64, len: u64) {
        self.matched_bytes += len;
        if let Some(BlockOp::Copy {
            source_offset: prev_src,
            len: prev_len,
            ..
        }) = self.ops.last_mut()
            && *prev_src + *prev_len == source_offset
        {
            *prev_len += len;
            return;
        }
        self.ops.push(BlockOp::Copy {
            source_offset,
            target_offset,
            len,
        });
    }

    fn push_literal(&mut self, target_offset: u64, len: u64) {
        self.literal_bytes += len;
        if let Some(BlockOp::Literal { len: prev_len, .. }) = self.ops.last_mut() {
            *prev_len += len;
            return;
        }
        self.ops.push(BlockOp::Literal { target_offset, len });
    }
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

/// Compute which target chunks can be copied from the source.
pub fn compute_block_matches(source: &[Chunk], target: &[Chunk]) -> BlockCorrespondence {
    let mut by_digest: HashMap<&Digest, usize> = HashMap::with_capacity(source.len());
    for (i, chunk) in source.iter().enumerate() {
        by_digest.entry(&chunk.digest).or_insert(i);
    }

    let same = |i: usize, t: &Chunk| source[i].digest == t.digest && source[i].size == t.size;

    let mut result = BlockCorrespondence::default();
    let mut prev: Option<usize> = None;

    for t in target {
        let hit = prev
            .map(|p| p + 1)
            .filter(|&next| next < source.len() && same(next, t))
            .or_else(|| by_digest.get(&t.digest).copied().filter(|&i| same(i, t)));

        match hit {
            Some(i) => result.push_copy(source[i].offset, t.offset, t.size),
            None => result.push_literal(t.offset, t.size),
        }
        prev = hit;
    }

    debug_assert_eq!(
        result.ops.iter().map(BlockOp::len).sum::<u64>(),
        target.iter().map(|c| c.size).sum::<u64>(),
        "block matching broke the coverage invariant"
    );

    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
