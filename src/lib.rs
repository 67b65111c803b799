//! # class-version-patcher
//!
//! Rewrites the version stamped into Java class files, either loose `.class`
//! files, everything below a directory, or the entries of jar/zip archives.
//!
//! ## Architecture
//!
//! - **tokenize**: Splitting of the quoted/escaped path list
//! - **version**: Version pairs and remap rules
//! - **header**: Streaming rewrite of the 8-byte class-file prologue
//! - **archive**: Entry-by-entry archive copy with recomputed checksums
//! - **scratch**: Batch-scoped scratch file/buffer and atomic replacement
//! - **dispatch**: Path classification and the batch driver
//! - **cli** / **config**: Command line surface and its resolution

pub mod archive;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod header;
pub mod scratch;
pub mod tokenize;
pub mod version;
