// Fixed parameters of the chunker and the source-selection heuristics.
//
// Changing any chunking constant changes every cut point, so old and new
// inventories must always be produced with the same values.

/// Width of the rolling-hash window in bytes.
pub const WINDOW_SIZE: usize = 64;

/// Bias added to each byte before it enters the rollsum.
pub const CHAR_OFFSET: u32 = 31;

/// Number of low `s2` bits that must all be set to declare a boundary.
pub const CHUNK_BITS: u32 = 13;

/// Expected chunk size for random input (8 KiB).
pub const CHUNK_SIZE: u64 = 1 << CHUNK_BITS;

/// Hard cap on chunk length; reaching it always cuts (32 KiB).
pub const MAX_CHUNK_SIZE: u64 = CHUNK_SIZE * 4;

/// Number of leading stream bytes kept for format sniffing.
pub const HEADER_LEN: usize = 16;

/// Size tolerance, in percent of the target size, for fuzzy source candidates.
pub const SIMILARITY_PERCENT: u64 = 30;

/// Basename markers of already-compressed formats that never take part in
/// block-level reuse.
///
/// `.gz` is not listed: `--rsyncable` gzip output chunks well.
pub const NON_DELTA_MARKERS: &[&str] = &[".xz", ".bz2"];

/// Inclusive `[min, max]` size window around `size`, truncating integer math.
#[inline]
pub fn size_window(size: u64, percent: u64) -> (u64, u64) {
    let slack = size.saturating_mul(percent) / 100;
    (size - slack.min(size), size.saturating_add(slack))
}
