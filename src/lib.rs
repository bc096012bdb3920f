//! Tardelta: delta analysis between two versions of a tar archive.
//!
//! Given an old and a new (optionally gzip-compressed) tarball, the crate
//! decides for every file of the new archive whether it can be reused whole
//! from an identical old file, rebuilt partly from a similar old file, or
//! must be stored verbatim. The result is the input of a patch serializer.
//!
//! The crate provides:
//! - Content-defined chunking and block matching (`hash`)
//! - The single-pass archive scanner (`archive`)
//! - Source selection, spooling and the `DeltaAnalysis` aggregate (`analysis`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use tardelta::analysis::{AnalysisOptions, MatchKind};
//! use tardelta::io::analyze_files;
//!
//! let (analysis, stats) = analyze_files(
//!     Path::new("app-1.0.tar.gz"),
//!     Path::new("app-1.1.tar.gz"),
//!     &AnalysisOptions::default(),
//! )
//! .unwrap();
//!
//! for target in analysis.targets() {
//!     if target.kind() == MatchKind::Partial {
//!         let source = analysis.source(target.source.unwrap());
//!         println!("{} <- {}", target.file.path, source.file.path);
//!     }
//! }
//! println!("{} bytes reused", stats.reused_bytes);
//! analysis.close().unwrap();
//! ```

pub mod analysis;
pub mod archive;
pub mod error;
pub mod hash;
pub mod io;

#[cfg(feature = "cli")]
pub mod cli;

pub use analysis::{AnalysisOptions, DeltaAnalysis, MatchKind, SourceId, TargetMatch, analyze};
pub use archive::{ArchiveInventory, FileRecord};
pub use error::{AnalysisError, Result};
