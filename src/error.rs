// Error type for archive scanning and delta analysis.
//
// Chunk coverage failures are deliberately absent: they are internal
// invariant violations (see `hash::chunker::CoverageViolation`) and abort
// instead of being returned.

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Read failure or malformed gzip/tar framing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The scratch store could not be created or written.
    #[error("scratch store: {0}")]
    Scratch(#[source] io::Error),

    /// An archive entry ended before its declared size.
    #[error("truncated entry {path}: expected {expected} bytes, got {actual}")]
    TruncatedEntry {
        path: String,
        expected: u64,
        actual: u64,
    },

    /// The old archive read during spooling differs from the scanned one.
    #[error("archive changed between passes: {0}")]
    ArchiveChanged(String),
}

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, AnalysisError>;
