// Archive inventory: what one tarball version contains.
//
// Archives arrive gzip-compressed (single or multi-member) or as plain tar;
// `open_archive()` sniffs the first bytes and stacks the right decoder under
// the tar reader. Both the scan pass and the spool pass go through it.

pub mod entry;
pub mod scan;

use std::io::{self, BufRead, BufReader, Read};

use flate2::bufread::MultiGzDecoder;

use crate::hash::chunker::{Chunk, Digest};

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// ---------------------------------------------------------------------------
// File records
// ---------------------------------------------------------------------------

/// One regular, non-empty, non-sparse file of an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Position of the entry in the archive stream (counts every entry).
    pub index: usize,
    /// Last path component.
    pub basename: String,
    /// Full path as stored in the archive.
    pub path: String,
    /// Content length in bytes, always > 0.
    pub size: u64,
    /// SHA-256 of the whole content.
    pub digest: Digest,
    /// Content starts with a native executable header.
    pub is_executable: bool,
    /// The "other" read permission bit is set.
    pub world_readable: bool,
    /// Content-defined chunks tiling `[0, size)`.
    pub chunks: Vec<Chunk>,
}

impl FileRecord {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// All usable files of one archive, smallest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveInventory {
    files: Vec<FileRecord>,
}

impl ArchiveInventory {
    /// Build an inventory; records are stably sorted by size.
    pub fn new(mut files: Vec<FileRecord>) -> Self {
        files.sort_by_key(|f| f.size);
        Self { files }
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn into_files(self) -> Vec<FileRecord> {
        self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decoded tar byte stream.
pub enum Decoded<R: Read> {
    Gzip(MultiGzDecoder<BufReader<R>>),
    Plain(BufReader<R>),
}

impl<R: Read> Read for Decoded<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Gzip(r) => r.read(buf),
            Self::Plain(r) => r.read(buf),
        }
    }
}

#[inline]
pub fn is_gzip_magic(header: &[u8]) -> bool {
    header.len() >= 2 && header[..2] == GZIP_MAGIC
}

/// Wrap `reader` in a gzip decoder when it starts with the gzip magic.
pub fn decode<R: Read>(reader: R) -> io::Result<Decoded<R>> {
    let mut buffered = BufReader::with_capacity(BUF_SIZE, reader);
    let gzip = is_gzip_magic(buffered.fill_buf()?);
    Ok(if gzip {
        Decoded::Gzip(MultiGzDecoder::new(buffered))
    } else {
        Decoded::Plain(buffered)
    })
}

/// Open a (possibly gzip-compressed) tar stream.
pub fn open_archive<R: Read>(reader: R) -> io::Result<tar::Archive<Decoded<R>>> {
    Ok(tar::Archive::new(decode(reader)?))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn record(path: &str, size: u64) -> FileRecord {
        FileRecord {
            index: 0,
            basename: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            size,
            digest: [0; 32],
            is_executable: false,
            world_readable: true,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn inventory_sorts_by_size_stably() {
        let inv = ArchiveInventory::new(vec![
            record("c", 30),
            record("a", 10),
            record("b", 30),
            record("d", 20),
        ]);
        let order: Vec<_> = inv.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(order, ["a", "d", "c", "b"]);
        assert_eq!(inv.total_size(), 90);
        assert_eq!(inv.len(), 4);
    }

    #[test]
    fn gzip_magic() {
        assert!(is_gzip_magic(&[0x1f, 0x8b, 0x08]));
        assert!(!is_gzip_magic(&[0x1f]));
        assert!(!is_gzip_magic(b"ustar"));
    }

    #[test]
    fn decode_passes_plain_bytes_through() {
        let mut out = Vec::new();
        decode(&b"plain tar bytes"[..])
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"plain tar bytes");
    }

    #[test]
    fn decode_inflates_multi_member_gzip() {
        let mut data = Vec::new();
        for part in [&b"first "[..], b"second"] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(part).unwrap();
            data.extend(enc.finish().unwrap());
        }
        let mut out = Vec::new();
        decode(&data[..]).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first second");
    }

    #[test]
    fn decode_reports_corrupt_gzip() {
        let data = [0x1f, 0x8b, 0xff, 0xff, 0xff];
        let mut out = Vec::new();
        assert!(decode(&data[..]).unwrap().read_to_end(&mut out).is_err());
    }
}
