//! Archive codec error types
//!
//! Everything read out of an archive (offsets, sizes, paths, methods) is
//! untrusted input; these errors distinguish structural damage from
//! integrity failures and from entries that are merely unsafe to place
//! on the filesystem.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ArchiveError {
    #[error("corrupt archive: {message}")]
    CorruptArchive { message: String },

    #[error("entry {entry}: checksum mismatch, expected {expected:08x}, got {actual:08x}")]
    EntryChecksumMismatch {
        entry: String,
        expected: u32,
        actual: u32,
    },

    #[error("entry {entry}: unsupported compression method {method}")]
    UnsupportedCompressionMethod { entry: String, method: u16 },

    #[error("entry {entry}: unsafe path rejected")]
    UnsafePath { entry: String },

    #[error("entry {entry}: declared size {declared} but decompressed {actual}")]
    SizeMismatch {
        entry: String,
        declared: u64,
        actual: u64,
    },

    #[error("archive contains no entries")]
    Empty,
}
