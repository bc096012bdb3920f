// Chunking and chunk-level matching.
//
// This module provides:
// - The bup-style rolling checksum that places chunk boundaries
// - A streaming content-defined chunker (an `io::Write` sink)
// - Digest-keyed block matching between two chunk lists
// - The fixed constants both sides of a delta must agree on

pub mod chunker;
pub mod config;
pub mod matching;
pub mod rolling;
