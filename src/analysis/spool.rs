// Delta spooler: second pass over the old archive.
//
// Copies the bytes of every source consumed for partial reuse into the
// scratch store, in archive order, recording each one's scratch offset
// before its bytes are written. Everything else is skipped unread. The pass
// stops as soon as the last consumed source has been copied.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use log::{debug, info};

use super::{SourceId, SourceRecord};
use crate::archive::open_archive;
use crate::error::{AnalysisError, Result};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

/// Spool consumed sources from `old_archive` into `dest`.
///
/// Returns the number of bytes written.
pub fn spool_sources<R: Read, W: Write>(
    old_archive: R,
    sources: &mut [SourceRecord],
    dest: &mut W,
) -> Result<u64> {
    let mut pending: HashMap<usize, SourceId> = sources
        .iter()
        .enumerate()
        .filter(|(_, s)| s.consumed)
        .map(|(i, s)| (s.file.index, SourceId(i)))
        .collect();

    let mut offset = 0u64;
    if pending.is_empty() {
        return Ok(offset);
    }

    let mut archive = open_archive(old_archive)?;
    let mut buf = vec![0u8; BUF_SIZE];

    for (index, entry) in archive.entries()?.enumerate() {
        let mut entry = entry?;
        let Some(id) = pending.remove(&index) else {
            continue;
        };
        let source = &mut sources[id.0];

        let path = entry.path()?.to_string_lossy().into_owned();
        if path != source.file.path || entry.size() != source.file.size {
            return Err(AnalysisError::ArchiveChanged(format!(
                "entry #{index} is {path} ({} bytes), scanned as {} ({} bytes)",
                entry.size(),
                source.file.path,
                source.file.size
            )));
        }

        source.scratch_offset = Some(offset);
        let copied = copy_entry(&mut entry, dest, &mut buf)?;
        if copied != source.file.size {
            return Err(AnalysisError::TruncatedEntry {
                path,
                expected: source.file.size,
                actual: copied,
            });
        }
        debug!("spooled {} at scratch offset {offset}", source.file.path);
        offset += copied;

        if pending.is_empty() {
            break;
        }
    }

    if let Some(id) = pending.values().next() {
        let missing = &sources[id.0].file;
        return Err(AnalysisError::ArchiveChanged(format!(
            "entry #{} ({}) not found",
            missing.index, missing.path
        )));
    }

    info!("spooled {offset} bytes of source data");
    Ok(offset)
}

/// Copy `src` to `dest`, keeping read failures (`Io`) apart from scratch
/// write failures (`Scratch`).
fn copy_entry<R: Read, W: Write>(src: &mut R, dest: &mut W, buf: &mut [u8]) -> Result<u64> {
    let mut total = 0u64;
    loop {
        let n = match src.read(buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        dest.write_all(&buf[..n]).map_err(AnalysisError::Scratch)?;
        total += n as u64;
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::scan::scan_archive;
    use tar::{Builder, EntryType, Header};

    fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut b = Builder::new(Vec::new());
        for (path, data) in files {
            let mut h = Header::new_gnu();
            h.set_size(data.len() as u64);
            h.set_mode(0o644);
            h.set_entry_type(EntryType::Regular);
            b.append_data(&mut h, path, *data).unwrap();
        }
        b.into_inner().unwrap()
    }

    fn arena(tar: &[u8]) -> Vec<SourceRecord> {
        scan_archive(tar)
            .unwrap()
            .into_files()
            .into_iter()
            .map(SourceRecord::new)
            .collect()
    }

    fn consume(sources: &mut [SourceRecord], path: &str) {
        let s = sources.iter_mut().find(|s| s.file.path == path).unwrap();
        s.consumed = true;
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn copies_only_consumed_sources_in_archive_order() {
        let tar = tarball(&[
            ("a", &b"aaaa"[..]),
            ("b", &b"bb"[..]),
            ("c", &b"cccccc"[..]),
        ]);
        let mut sources = arena(&tar);
        consume(&mut sources, "c");
        consume(&mut sources, "a");

        let mut scratch = Vec::new();
        let written = spool_sources(&tar[..], &mut sources, &mut scratch).unwrap();
        assert_eq!(written, 10);
        assert_eq!(scratch, b"aaaacccccc");

        let offset = |p: &str| {
            sources
                .iter()
                .find(|s| s.file.path == p)
                .unwrap()
                .scratch_offset()
        };
        assert_eq!(offset("a"), Some(0));
        assert_eq!(offset("b"), None);
        assert_eq!(offset("c"), Some(4));
    }

    #[test]
    fn skipped_sparse_entry_does_not_shift_sources() {
        let mut b = Builder::new(Vec::new());
        crate::archive::entry::tests::append_gnu_sparse(&mut b, "disk.img", b"zz", 8192);
        let mut h = Header::new_gnu();
        h.set_size(5);
        h.set_mode(0o644);
        h.set_entry_type(EntryType::Regular);
        b.append_data(&mut h, "lib/a.so", &b"aaaaa"[..]).unwrap();
        let tar = b.into_inner().unwrap();

        let mut sources = arena(&tar);
        assert_eq!(sources.len(), 1);
        consume(&mut sources, "lib/a.so");

        let mut scratch = Vec::new();
        assert_eq!(spool_sources(&tar[..], &mut sources, &mut scratch).unwrap(), 5);
        assert_eq!(scratch, b"aaaaa");
        assert_eq!(sources[0].scratch_offset(), Some(0));
    }

    #[test]
    fn nothing_consumed_reads_nothing() {
        let tar = tarball(&[("a", &b"aaaa"[..])]);
        let mut sources = arena(&tar);
        let mut scratch = Vec::new();
        // An unreadable stream proves the archive is never opened.
        let written = spool_sources(&b"\x1f\x8bgarbage"[..], &mut sources, &mut scratch).unwrap();
        assert_eq!(written, 0);
        assert!(scratch.is_empty());
    }

    #[test]
    fn write_failure_is_a_scratch_error() {
        let tar = tarball(&[("a", &b"aaaa"[..])]);
        let mut sources = arena(&tar);
        consume(&mut sources, "a");
        let err = spool_sources(&tar[..], &mut sources, &mut FailingWriter).unwrap_err();
        assert!(matches!(err, AnalysisError::Scratch(_)));
    }

    #[test]
    fn different_archive_is_detected() {
        let tar = tarball(&[("a", &b"aaaa"[..])]);
        let mut sources = arena(&tar);
        consume(&mut sources, "a");

        let other = tarball(&[("z", &b"aaaa"[..])]);
        let err = spool_sources(&other[..], &mut sources, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::ArchiveChanged(_)));

        let empty = tarball(&[]);
        let err = spool_sources(&empty[..], &mut sources, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, AnalysisError::ArchiveChanged(_)));
    }
}
