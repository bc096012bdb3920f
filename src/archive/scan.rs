// Single-pass archive scanner.
//
// Every eligible entry is read once; the bytes flow through a `ScanSink`
// that feeds the whole-file SHA-256 and the chunker side by side.

use std::io::{self, Read, Write};
use std::path::Path;

use log::{debug, info};
use sha2::{Digest as _, Sha256};
use tar::Entry;

use super::entry;
use super::{ArchiveInventory, FileRecord, open_archive};
use crate::error::{AnalysisError, Result};
use crate::hash::chunker::{Chunker, Digest, verify_coverage};

// ---------------------------------------------------------------------------
// Scan sink
// ---------------------------------------------------------------------------

/// Write sink hashing and chunking the same bytes.
struct ScanSink {
    hasher: Sha256,
    chunker: Chunker,
}

impl Write for ScanSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.chunker.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// Scan a (possibly gzip-compressed) tar stream into an inventory.
///
/// Any read or framing error aborts the scan; no partial inventory is
/// returned.
pub fn scan_archive<R: Read>(reader: R) -> Result<ArchiveInventory> {
    let mut archive = open_archive(reader)?;
    let mut files = Vec::new();

    for (index, entry) in archive.entries()?.enumerate() {
        let mut entry = entry?;
        if !entry::use_entry(&mut entry)? {
            continue;
        }
        let record = scan_entry(index, &mut entry)?;
        debug!(
            "scanned #{} {} ({} bytes, {} chunks)",
            record.index,
            record.path,
            record.size,
            record.chunks.len()
        );
        files.push(record);
    }

    let inventory = ArchiveInventory::new(files);
    info!(
        "inventory: {} files, {} bytes",
        inventory.len(),
        inventory.total_size()
    );
    Ok(inventory)
}

fn scan_entry<R: Read>(index: usize, entry: &mut Entry<'_, R>) -> Result<FileRecord> {
    let path = entry.path()?.to_string_lossy().into_owned();
    let size = entry.size();
    let mode = entry.header().mode()?;

    let mut sink = ScanSink {
        hasher: Sha256::new(),
        chunker: Chunker::new(),
    };
    let copied = io::copy(entry, &mut sink)?;
    if copied != size {
        return Err(AnalysisError::TruncatedEntry {
            path,
            expected: size,
            actual: copied,
        });
    }

    let is_executable = entry::is_executable(sink.chunker.header());
    let digest: Digest = sink.hasher.finalize().into();
    let chunks = sink.chunker.finish();

    if let Err(violation) = verify_coverage(&chunks, size) {
        // The chunker and the entry disagree about the stream length; any
        // delta built on top would be corrupt.
        panic!("internal error: {path}: {violation}");
    }

    Ok(FileRecord {
        index,
        basename: basename(&path),
        path,
        size,
        digest,
        is_executable,
        world_readable: entry::is_world_readable(mode),
        chunks,
    })
}

fn basename(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::config::MAX_CHUNK_SIZE;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use sha2::Digest as _;
    use tar::{Builder, EntryType, Header};

    fn tarball(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let mut b = Builder::new(Vec::new());
        for (path, mode, data) in files {
            let mut h = Header::new_gnu();
            h.set_size(data.len() as u64);
            h.set_mode(*mode);
            h.set_entry_type(EntryType::Regular);
            b.append_data(&mut h, path, *data).unwrap();
        }
        b.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn scans_gzip_archive_sorted_by_size() {
        let big = vec![7u8; (MAX_CHUNK_SIZE * 2 + 1) as usize];
        let tar = tarball(&[
            ("usr/bin/tool", 0o755, &b"\x7fELF\x02\x01\x01\x00payload"[..]),
            ("etc/shadow", 0o600, &b"root:x"[..]),
            ("empty", 0o644, &b""[..]),
            ("share/big.dat", 0o644, &big[..]),
        ]);
        let inv = scan_archive(&gzip(&tar)[..]).unwrap();

        let paths: Vec<_> = inv.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["etc/shadow", "usr/bin/tool", "share/big.dat"]);

        let shadow = &inv.files()[0];
        assert_eq!(shadow.index, 1);
        assert_eq!(shadow.basename, "shadow");
        assert!(!shadow.world_readable);
        assert!(!shadow.is_executable);
        let expected: [u8; 32] = Sha256::digest(b"root:x").into();
        assert_eq!(shadow.digest, expected);

        let tool = &inv.files()[1];
        assert_eq!(tool.index, 0);
        assert!(tool.is_executable);
        assert!(tool.world_readable);

        let dat = &inv.files()[2];
        assert_eq!(dat.index, 3);
        assert_eq!(dat.chunks.len(), 3);
        verify_coverage(&dat.chunks, dat.size).unwrap();
    }

    #[test]
    fn plain_tar_is_accepted() {
        let tar = tarball(&[("a", 0o644, &b"hello"[..])]);
        let inv = scan_archive(&tar[..]).unwrap();
        assert_eq!(inv.len(), 1);
        assert_eq!(inv.files()[0].size, 5);
    }

    #[test]
    fn sparse_entry_keeps_later_indices_aligned() {
        let mut b = Builder::new(Vec::new());
        entry::tests::append_gnu_sparse(&mut b, "var/disk.img", b"data", 4096);
        let mut h = Header::new_gnu();
        h.set_size(6);
        h.set_mode(0o644);
        h.set_entry_type(EntryType::Regular);
        b.append_data(&mut h, "lib/a.so", &b"abcdef"[..]).unwrap();
        let tar = b.into_inner().unwrap();

        let inv = scan_archive(&gzip(&tar)[..]).unwrap();
        let found: Vec<_> = inv.files().iter().map(|f| (f.index, f.path.as_str())).collect();
        assert_eq!(found, [(1, "lib/a.so")]);
    }

    #[test]
    fn truncated_archive_is_an_error() {
        let data = vec![1u8; 4096];
        let tar = tarball(&[("a", 0o644, &data[..])]);
        let cut = gzip(&tar[..512 + 1000]);
        assert!(scan_archive(&cut[..]).is_err());
    }

    #[test]
    fn basename_of_paths() {
        assert_eq!(basename("usr/lib/libfoo.so.1"), "libfoo.so.1");
        assert_eq!(basename("top"), "top");
        assert_eq!(basename("./a/b"), "b");
    }
}
