// Source selection: pick at most one old file to rebuild each new file from.
//
// Per target, in order:
//   1. Identity: an old file with the same digest and size that is
//      world-readable (reused whole, never spooled)
//   2. Targets that are not delta candidates get no source
//   3. Same path, delta candidate, size inside the similarity window
//   4. Size-sorted scan of the window: identical basename first, then
//      identical basename stem (text before the first '.')
//
// Ties inside a pass go to the smallest qualifying size; there is no scoring.

use std::collections::HashMap;

use log::debug;

use super::{SourceId, SourceRecord};
use crate::archive::FileRecord;
use crate::hash::chunker::Digest;
use crate::hash::config::{NON_DELTA_MARKERS, size_window};

// ---------------------------------------------------------------------------
// Eligibility and name similarity
// ---------------------------------------------------------------------------

/// Whether a file may take part in block-level reuse at all.
///
/// Files that are not world-readable (think `/etc/shadow`) are never
/// reproduced from another file, and neither are already-compressed formats.
pub fn is_delta_candidate(file: &FileRecord) -> bool {
    file.world_readable && !has_non_delta_marker(&file.basename)
}

/// Basename starts or ends with a reserved compressed-format marker.
pub fn has_non_delta_marker(basename: &str) -> bool {
    NON_DELTA_MARKERS
        .iter()
        .any(|m| basename.starts_with(m) || basename.ends_with(m))
}

/// How loosely basenames are compared during the fuzzy scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuzziness {
    /// Identical basenames (moved files).
    Exact,
    /// Identical text before the first '.' (renamed or re-versioned files).
    Stem,
}

impl Fuzziness {
    pub const PASSES: [Fuzziness; 2] = [Fuzziness::Exact, Fuzziness::Stem];
}

pub fn name_is_similar(a: &str, b: &str, fuzziness: Fuzziness) -> bool {
    match fuzziness {
        Fuzziness::Exact => a == b,
        Fuzziness::Stem => stem(a) == stem(b),
    }
}

fn stem(basename: &str) -> &str {
    basename.split('.').next().unwrap_or(basename)
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Outcome of source selection for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Stored verbatim.
    None,
    /// Byte-identical to the source.
    Identical(SourceId),
    /// Rebuilt partly from the source's chunks.
    Partial(SourceId),
}

impl Selection {
    pub fn source(&self) -> Option<SourceId> {
        match *self {
            Self::None => None,
            Self::Identical(id) | Self::Partial(id) => Some(id),
        }
    }
}

/// Lookup structures over the size-sorted source arena.
pub struct Selector<'a> {
    sources: &'a [SourceRecord],
    by_digest: HashMap<&'a Digest, SourceId>,
    by_path: HashMap<&'a str, SourceId>,
    similarity_percent: u64,
}

impl<'a> Selector<'a> {
    /// Index `sources`, which must be sorted by ascending size.
    pub fn new(sources: &'a [SourceRecord], similarity_percent: u64) -> Self {
        debug_assert!(sources.is_sorted_by_key(|s| s.file.size));

        let mut by_digest: HashMap<&Digest, SourceId> = HashMap::with_capacity(sources.len());
        let mut by_path: HashMap<&str, SourceId> = HashMap::with_capacity(sources.len());

        for (i, s) in sources.iter().enumerate() {
            let id = SourceId(i);

            // Prefer a world-readable file among identical copies.
            by_digest
                .entry(&s.file.digest)
                .and_modify(|cur| {
                    if !sources[cur.0].file.world_readable && s.file.world_readable {
                        *cur = id;
                    }
                })
                .or_insert(id);

            // Duplicate paths: the later archive entry wins, as on extraction.
            by_path
                .entry(s.file.path.as_str())
                .and_modify(|cur| {
                    if sources[cur.0].file.index < s.file.index {
                        *cur = id;
                    }
                })
                .or_insert(id);
        }

        Self {
            sources,
            by_digest,
            by_path,
            similarity_percent,
        }
    }

    /// Choose the source for one target file.
    pub fn select(&self, target: &FileRecord) -> Selection {
        if let Some(id) = self.identical(target) {
            debug!("{}: identical to {}", target.path, self.path(id));
            return Selection::Identical(id);
        }

        if !is_delta_candidate(target) {
            debug!("{}: not a delta candidate", target.path);
            return Selection::None;
        }

        let (min, max) = size_window(target.size, self.similarity_percent);
        let in_window = |s: &SourceRecord| (min..=max).contains(&s.file.size);

        if let Some(&id) = self.by_path.get(target.path.as_str()) {
            let s = &self.sources[id.0];
            if is_delta_candidate(&s.file) && in_window(s) {
                debug!("{}: same path in old archive", target.path);
                return Selection::Partial(id);
            }
        }

        match self.similar(target, min, max) {
            Some(id) => {
                debug!("{}: similar to {}", target.path, self.path(id));
                Selection::Partial(id)
            }
            None => {
                debug!("{}: no source", target.path);
                Selection::None
            }
        }
    }

    fn identical(&self, target: &FileRecord) -> Option<SourceId> {
        let &id = self.by_digest.get(&target.digest)?;
        let s = &self.sources[id.0].file;
        (s.size == target.size && s.world_readable).then_some(id)
    }

    /// Two-pass scan over the sources whose size lies in `[min, max]`.
    ///
    /// The lower bound is found once and shared by both passes; each pass
    /// stops at the first source above `max`.
    fn similar(&self, target: &FileRecord, min: u64, max: u64) -> Option<SourceId> {
        let lower = self.sources.partition_point(|s| s.file.size < min);

        Fuzziness::PASSES.into_iter().find_map(|fuzziness| {
            self.sources[lower..]
                .iter()
                .take_while(|s| s.file.size <= max)
                .position(|s| {
                    is_delta_candidate(&s.file)
                        && name_is_similar(&target.basename, &s.file.basename, fuzziness)
                })
                .map(|offset| SourceId(lower + offset))
        })
    }

    fn path(&self, id: SourceId) -> &str {
        &self.sources[id.0].file.path
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
