//! Archive entry metadata and path sanitization

use plugget_errors::{ArchiveError, Error};
use std::path::PathBuf;

/// Compression method declared for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    /// No compression
    Store,
    /// Raw deflate stream
    Deflate,
    /// Anything else; listed but not extractable
    Other(u16),
}

impl CompressionMethod {
    #[must_use]
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => Self::Store,
            8 => Self::Deflate,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub fn raw(self) -> u16 {
        match self {
            Self::Store => 0,
            Self::Deflate => 8,
            Self::Other(raw) => raw,
        }
    }
}

/// One entry parsed from the central directory
///
/// Transient metadata: valid only against the archive stream it was
/// read from.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Path within the archive, exactly as stored
    pub name: String,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Offset of the entry's local header in the stream
    pub(crate) header_offset: u64,
    /// Unix permission bits, when the archive records them
    pub unix_mode: Option<u32>,
}

impl ArchiveEntry {
    /// Directory entries carry no data
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Whether the recorded unix mode marks the entry executable
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.unix_mode.is_some_and(|mode| mode & 0o111 != 0)
    }
}

/// Turn a stored entry name into a safe relative path.
///
/// Rejects absolute paths, drive prefixes, NUL bytes, backslash
/// separators, and any `..` segment, regardless of where it appears.
/// `.` segments are dropped. An entry that sanitizes to nothing (e.g.
/// `"./"`) is rejected too.
///
/// # Errors
///
/// Returns `ArchiveError::UnsafePath` naming the offending entry.
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf, Error> {
    let unsafe_path = || -> Error {
        ArchiveError::UnsafePath {
            entry: name.to_string(),
        }
        .into()
    };

    if name.is_empty()
        || name.contains('\0')
        || name.contains('\\')
        || name.starts_with('/')
        || name.contains(':')
    {
        return Err(unsafe_path());
    }

    let mut path = PathBuf::new();
    for component in name.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            normal => path.push(normal),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(unsafe_path());
    }

    Ok(path)
}
