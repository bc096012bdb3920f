// File-level helpers for delta analysis.
//
// `scan_file()` and `analyze_files()` wrap the streaming pipeline with
// buffered file I/O. The old archive is opened twice: once for the scan and
// once more for spooling.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::analysis::{AnalysisOptions, DeltaAnalysis, MatchKind, analyze};
use crate::archive::ArchiveInventory;
use crate::archive::scan::scan_archive;
use crate::error::Result;

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Summary of a `DeltaAnalysis`, as returned by `analyze_files()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    /// Old archive size on disk, in bytes.
    pub old_archive_size: u64,
    /// New archive size on disk, in bytes.
    pub new_archive_size: u64,
    /// Files in the old inventory.
    pub old_files: usize,
    /// Files in the new inventory.
    pub new_files: usize,
    /// Targets reused whole from an identical source.
    pub identical: usize,
    /// Targets rebuilt partly from a similar source.
    pub partial: usize,
    /// Targets stored verbatim.
    pub literal: usize,
    /// Target bytes covered by identical sources or matched chunks.
    pub reused_bytes: u64,
    /// Target bytes that must be stored verbatim.
    pub literal_bytes: u64,
    /// Bytes copied into the scratch store.
    pub spooled_bytes: u64,
}

impl AnalysisStats {
    /// Tally the match outcomes of an analysis.
    pub fn from_analysis(analysis: &DeltaAnalysis) -> Self {
        let mut stats = Self {
            old_files: analysis.sources().len(),
            new_files: analysis.targets().len(),
            spooled_bytes: analysis.spooled_bytes(),
            ..Self::default()
        };
        for t in analysis.targets() {
            match (t.kind(), &t.blocks) {
                (MatchKind::Identical, _) => {
                    stats.identical += 1;
                    stats.reused_bytes += t.file.size;
                }
                (MatchKind::Partial, Some(blocks)) => {
                    stats.partial += 1;
                    stats.reused_bytes += blocks.matched_bytes();
                    stats.literal_bytes += blocks.literal_bytes();
                }
                _ => {
                    stats.literal += 1;
                    stats.literal_bytes += t.file.size;
                }
            }
        }
        stats
    }
}

// ---------------------------------------------------------------------------
// scan_file / analyze_files
// ---------------------------------------------------------------------------

/// Scan an archive file into an inventory.
pub fn scan_file(path: &Path) -> Result<ArchiveInventory> {
    let file = File::open(path)?;
    scan_archive(BufReader::with_capacity(BUF_SIZE, file))
}

/// Analyse the delta between two archive files.
pub fn analyze_files(
    old_path: &Path,
    new_path: &Path,
    opts: &AnalysisOptions,
) -> Result<(DeltaAnalysis, AnalysisStats)> {
    let old_archive_size = std::fs::metadata(old_path)?.len();
    let new_archive_size = std::fs::metadata(new_path)?.len();

    let old = scan_file(old_path)?;
    let new = scan_file(new_path)?;

    let reopened = BufReader::with_capacity(BUF_SIZE, File::open(old_path)?);
    let analysis = analyze(old, new, reopened, opts)?;

    let stats = AnalysisStats {
        old_archive_size,
        new_archive_size,
        ..AnalysisStats::from_analysis(&analysis)
    };
    Ok((analysis, stats))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tar::{Builder, EntryType, Header};

    fn write_archive(path: &Path, files: &[(&str, &[u8])]) {
        let gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
        let mut b = Builder::new(gz);
        for (name, data) in files {
            let mut h = Header::new_gnu();
            h.set_size(data.len() as u64);
            h.set_mode(0o644);
            h.set_entry_type(EntryType::Regular);
            b.append_data(&mut h, name, *data).unwrap();
        }
        b.into_inner().unwrap().finish().unwrap().flush().unwrap();
    }

    #[test]
    fn stats_add_up() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("old.tar.gz");
        let new_path = dir.path().join("new.tar.gz");

        let body: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let mut edited = body.clone();
        edited.extend_from_slice(b"tail");

        write_archive(&old_path, &[("lib/a.so", &body[..]), ("doc/x", &b"same"[..])]);
        write_archive(
            &new_path,
            &[
                ("lib/a.so", &edited[..]),
                ("doc/y", &b"same"[..]),
                ("new", &b"fresh"[..]),
            ],
        );

        let opts = AnalysisOptions {
            scratch_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        let (analysis, stats) = analyze_files(&old_path, &new_path, &opts).unwrap();

        assert_eq!(stats.old_files, 2);
        assert_eq!(stats.new_files, 3);
        assert_eq!((stats.identical, stats.partial, stats.literal), (1, 1, 1));
        assert_eq!(stats.reused_bytes + stats.literal_bytes, 4004 + 4 + 5);
        assert_eq!(stats.spooled_bytes, 4000);
        assert_eq!(stats.old_archive_size, std::fs::metadata(&old_path).unwrap().len());
        analysis.close().unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.tar.gz");
        let err = analyze_files(&missing, &missing, &AnalysisOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::Io(_)));
    }
}
