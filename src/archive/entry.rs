// Per-entry eligibility and content sniffing.

use std::io::{self, Read};

use log::warn;
use tar::{Entry, EntryType};

/// ELF object header magic.
pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];

/// "Other" read permission bit.
const MODE_WORLD_READ: u32 = 0o004;

/// PAX records marking a sparse file (GNU sparse formats 0.1 and 1.0).
const SPARSE_PAX_KEYS: &[&str] = &["GNU.sparse.major", "GNU.sparse.minor", "GNU.sparse.map"];

/// True for sparse entries, whose logical content differs from the bytes
/// stored in the archive stream.
pub fn is_sparse<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<bool> {
    let kind = entry.header().entry_type();
    if kind == EntryType::GNUSparse {
        return Ok(true);
    }
    if !kind.is_file() {
        return Ok(false);
    }
    let Some(extensions) = entry.pax_extensions()? else {
        return Ok(false);
    };
    for ext in extensions {
        let ext = ext?;
        let sparse_key = ext.key().is_ok_and(|k| SPARSE_PAX_KEYS.contains(&k));
        if sparse_key && !ext.value_bytes().is_empty() {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Whether an entry goes into the inventory: regular, non-empty, not sparse.
pub fn use_entry<R: Read>(entry: &mut Entry<'_, R>) -> io::Result<bool> {
    if is_sparse(entry)? {
        warn!(
            "skipping sparse entry {}",
            String::from_utf8_lossy(&entry.path_bytes())
        );
        return Ok(false);
    }
    Ok(entry.header().entry_type().is_file() && entry.size() > 0)
}

/// Content starts with a native executable header.
///
/// A file holding nothing but the magic is not an executable.
#[inline]
pub fn is_executable(header: &[u8]) -> bool {
    header.len() > ELF_MAGIC.len() && header.starts_with(&ELF_MAGIC)
}

#[inline]
pub fn is_world_readable(mode: u32) -> bool {
    mode & MODE_WORLD_READ != 0
}
