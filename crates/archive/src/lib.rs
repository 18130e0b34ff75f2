#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! ZIP archive codec for plugget
//!
//! Streaming reader and writer for the standard ZIP container format
//! (trailing central directory, per-entry store/deflate streams). The
//! reader enumerates entries from the central directory without scanning
//! the whole stream, decompresses entries independently, and verifies
//! the stored CRC32 of every entry.
//!
//! Every offset, size, and path read out of an archive is untrusted
//! input: all of them are bounds-checked before any read or write, and
//! entry paths containing parent-directory traversal segments are
//! rejected outright.
//!
//! This crate does pure data transformation; it owns no I/O policy.
//! Callers decide where archives come from and where entries go.

mod entry;
mod reader;
mod writer;

pub use entry::{sanitize_entry_path, ArchiveEntry, CompressionMethod};
pub use reader::ZipArchive;
pub use writer::ZipWriter;
