// Delta analysis: the aggregate result handed to a patch serializer.
//
// Phases, strictly in order:
//   1. Source selection over the two in-memory inventories
//   2. Block matching for every partial-reuse pair
//   3. A second pass over the old archive spooling consumed sources into a
//      scratch file owned by the result
//
// Sources live in an arena (`Vec<SourceRecord>`, size-sorted like the old
// inventory); targets refer to them by `SourceId`. The scratch file is a
// `NamedTempFile`, so it is deleted when the analysis is dropped or closed,
// and also when any phase fails before the analysis exists.

pub mod select;
pub mod spool;

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::info;
use tempfile::NamedTempFile;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::archive::{ArchiveInventory, FileRecord};
use crate::error::{AnalysisError, Result};
use crate::hash::config::SIMILARITY_PERCENT;
use crate::hash::matching::{BlockCorrespondence, compute_block_matches};
use select::{Selection, Selector};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

const SCRATCH_PREFIX: &str = "tardelta-";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for `analyze()`.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Directory for the scratch file. `None` uses the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// Size tolerance for fuzzy source candidates, in percent.
    pub similarity_percent: u64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            scratch_dir: None,
            similarity_percent: SIMILARITY_PERCENT,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Index of a `SourceRecord` in the analysis arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub usize);

/// An old-archive file plus its spooling state.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub file: FileRecord,
    consumed: bool,
    scratch_offset: Option<u64>,
}

impl SourceRecord {
    pub fn new(file: FileRecord) -> Self {
        Self {
            file,
            consumed: false,
            scratch_offset: None,
        }
    }

    /// Selected for partial reuse by at least one target; its bytes are in
    /// the scratch store.
    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Offset of the file's bytes in the scratch store.
    pub fn scratch_offset(&self) -> Option<u64> {
        self.scratch_offset
    }
}

/// How a target file will be reproduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Stored verbatim.
    Literal,
    /// Whole-file reuse of a byte-identical source.
    Identical,
    /// Block-level reuse of a similar source.
    Partial,
}

/// A new-archive file and its chosen reconstruction.
#[derive(Debug, Clone)]
pub struct TargetMatch {
    pub file: FileRecord,
    pub source: Option<SourceId>,
    pub blocks: Option<BlockCorrespondence>,
}

impl TargetMatch {
    pub fn kind(&self) -> MatchKind {
        match (&self.source, &self.blocks) {
            (None, _) => MatchKind::Literal,
            (Some(_), None) => MatchKind::Identical,
            (Some(_), Some(_)) => MatchKind::Partial,
        }
    }
}

// ---------------------------------------------------------------------------
// DeltaAnalysis
// ---------------------------------------------------------------------------

/// Result of analysing an old/new archive pair.
///
/// Owns the scratch file; dropping or closing the analysis deletes it.
pub struct DeltaAnalysis {
    targets: Vec<TargetMatch>,
    sources: Vec<SourceRecord>,
    scratch: NamedTempFile,
    target_by_index: HashMap<usize, usize>,
    spooled_bytes: u64,
}

impl DeltaAnalysis {
    /// Target matches, in new-inventory (size) order.
    pub fn targets(&self) -> &[TargetMatch] {
        &self.targets
    }

    /// Source arena, in old-inventory (size) order.
    pub fn sources(&self) -> &[SourceRecord] {
        &self.sources
    }

    pub fn source(&self, id: SourceId) -> &SourceRecord {
        &self.sources[id.0]
    }

    /// Look up a target by its ordinal position in the new archive.
    pub fn target_by_index(&self, index: usize) -> Option<&TargetMatch> {
        self.target_by_index.get(&index).map(|&i| &self.targets[i])
    }

    /// Total bytes in the scratch store.
    pub fn spooled_bytes(&self) -> u64 {
        self.spooled_bytes
    }

    pub fn scratch_path(&self) -> &Path {
        self.scratch.path()
    }

    /// Reader over a spooled source's bytes, or `None` if it was not spooled.
    pub fn source_reader(&mut self, id: SourceId) -> io::Result<Option<io::Take<&mut File>>> {
        let source = &self.sources[id.0];
        let Some(offset) = source.scratch_offset else {
            return Ok(None);
        };
        let size = source.file.size;
        let file = self.scratch.as_file_mut();
        file.seek(SeekFrom::Start(offset))?;
        Ok(Some(file.take(size)))
    }

    /// Delete the scratch file, reporting failures that drop would swallow.
    pub fn close(self) -> io::Result<()> {
        self.scratch.close()
    }
}

impl std::fmt::Debug for DeltaAnalysis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeltaAnalysis")
            .field("targets", &self.targets.len())
            .field("sources", &self.sources.len())
            .field("scratch", &self.scratch.path())
            .field("spooled_bytes", &self.spooled_bytes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Pair every file of `new` with a reuse plan against `old`.
///
/// `old_archive` must yield the same bytes that produced `old`; it is read
/// once more to spool the sources selected for partial reuse.
pub fn analyze<R: Read>(
    old: ArchiveInventory,
    new: ArchiveInventory,
    old_archive: R,
    opts: &AnalysisOptions,
) -> Result<DeltaAnalysis> {
    let mut sources: Vec<SourceRecord> =
        old.into_files().into_iter().map(SourceRecord::new).collect();
    let targets = new.into_files();

    let selections: Vec<Selection> = {
        let selector = Selector::new(&sources, opts.similarity_percent);
        targets.iter().map(|t| selector.select(t)).collect()
    };
    for sel in &selections {
        if let Selection::Partial(id) = *sel {
            sources[id.0].consumed = true;
        }
    }

    let blocks = block_matches(&sources, &targets, &selections);
    let targets: Vec<TargetMatch> = targets
        .into_iter()
        .zip(selections)
        .zip(blocks)
        .map(|((file, sel), blocks)| TargetMatch {
            file,
            source: sel.source(),
            blocks,
        })
        .collect();

    let target_by_index = targets
        .iter()
        .enumerate()
        .map(|(i, t)| (t.file.index, i))
        .collect();

    let mut scratch = create_scratch(opts.scratch_dir.as_deref())?;
    let spooled_bytes = {
        let mut writer = BufWriter::with_capacity(BUF_SIZE, scratch.as_file_mut());
        let n = spool::spool_sources(old_archive, &mut sources, &mut writer)?;
        writer.flush().map_err(AnalysisError::Scratch)?;
        n
    };

    let analysis = DeltaAnalysis {
        targets,
        sources,
        scratch,
        target_by_index,
        spooled_bytes,
    };
    info!(
        "analysis: {} targets, {} sources, {} spooled bytes",
        analysis.targets.len(),
        analysis.sources.len(),
        analysis.spooled_bytes
    );
    Ok(analysis)
}

fn create_scratch(dir: Option<&Path>) -> Result<NamedTempFile> {
    let dir = dir.map_or_else(std::env::temp_dir, Path::to_path_buf);
    tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(dir)
        .map_err(AnalysisError::Scratch)
}

fn block_matches(
    sources: &[SourceRecord],
    targets: &[FileRecord],
    selections: &[Selection],
) -> Vec<Option<BlockCorrespondence>> {
    let compute = |(target, sel): (&FileRecord, &Selection)| match *sel {
        Selection::Partial(id) => Some(compute_block_matches(
            &sources[id.0].file.chunks,
            &target.chunks,
        )),
        Selection::None | Selection::Identical(_) => None,
    };

    #[cfg(feature = "parallel")]
    {
        targets.par_iter().zip(selections.par_iter()).map(compute).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        targets.iter().zip(selections).map(compute).collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
