//! ZIP reader: central directory parsing and verified extraction

use crate::entry::{sanitize_entry_path, ArchiveEntry, CompressionMethod};
use flate2::read::DeflateDecoder;
use flate2::Crc;
use plugget_errors::{ArchiveError, Error};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

const EOCD_SIG: u32 = 0x0605_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const LOCAL_SIG: u32 = 0x0403_4b50;

const EOCD_LEN: u64 = 22;
const MAX_COMMENT_LEN: u64 = 65_535;
const CENTRAL_HEADER_LEN: usize = 46;
const LOCAL_HEADER_LEN: usize = 30;

/// Flag bit 0: the entry is encrypted
const FLAG_ENCRYPTED: u16 = 1;

const COPY_BUF_SIZE: usize = 64 * 1024;

fn corrupt(message: impl Into<String>) -> Error {
    ArchiveError::CorruptArchive {
        message: message.into(),
    }
    .into()
}

/// Little-endian field reads out of an in-memory header slice. Callers
/// must have bounds-checked the slice already.
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// A ZIP archive opened for reading
///
/// The central directory is parsed eagerly on open; entry data is read
/// lazily and verified against its stored CRC32 on extraction.
pub struct ZipArchive<R> {
    reader: R,
    stream_len: u64,
    entries: Vec<ArchiveEntry>,
}

impl ZipArchive<File> {
    /// Open an archive file from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or is not a valid
    /// archive.
    pub fn open_file(path: &Path) -> Result<Self, Error> {
        let file = File::open(path).map_err(|e| Error::io_with_path(&e, path))?;
        Self::open(file)
    }
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Open an archive from any seekable byte stream
    ///
    /// Locates the end-of-central-directory record at the tail of the
    /// stream, then parses the central directory to enumerate entries.
    ///
    /// # Errors
    ///
    /// Fails with `CorruptArchive` on any structural inconsistency:
    /// missing or damaged records, offsets pointing outside the stream,
    /// or zip64 markers (not supported).
    pub fn open(mut reader: R) -> Result<Self, Error> {
        let stream_len = reader.seek(SeekFrom::End(0))?;
        let (cd_offset, cd_size, entry_count) = find_end_of_central_directory(&mut reader, stream_len)?;

        reader.seek(SeekFrom::Start(cd_offset))?;
        let mut directory = vec![0u8; usize::try_from(cd_size).map_err(|_| corrupt("central directory too large"))?];
        reader.read_exact(&mut directory).map_err(|_| corrupt("central directory truncated"))?;

        let entries = parse_central_directory(&directory, entry_count, stream_len)?;

        Ok(Self {
            reader,
            stream_len,
            entries,
        })
    }

    /// The entries listed in the central directory, in directory order
    #[must_use]
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Detect a single top-level directory shared by every entry.
    ///
    /// Archives produced by forges usually wrap the plugin in one root
    /// folder; the installer flattens it. Returns the shared first path
    /// component, or `None` if any entry lives at the top level or the
    /// archive mixes roots.
    #[must_use]
    pub fn shared_root_prefix(&self) -> Option<String> {
        let mut root: Option<&str> = None;
        for entry in &self.entries {
            let first = match entry.name.split_once('/') {
                Some((first, _)) => first,
                // A top-level file defeats the shared root
                None if !entry.is_dir() => return None,
                None => entry.name.trim_end_matches('/'),
            };
            if first.is_empty() {
                return None;
            }
            match root {
                None => root = Some(first),
                Some(existing) if existing == first => {}
                Some(_) => return None,
            }
        }
        root.map(str::to_string)
    }

    /// Decompress one entry into `sink`, verifying its CRC32.
    ///
    /// # Errors
    ///
    /// Fails with `CorruptArchive` if the local header disagrees with
    /// the central directory or data runs outside the stream,
    /// `UnsupportedCompressionMethod` for methods other than store and
    /// deflate, `SizeMismatch` if the decompressed byte count differs
    /// from the declared size, and `EntryChecksumMismatch` if the
    /// recomputed CRC32 does not equal the stored one.
    pub fn read_entry(&mut self, entry: &ArchiveEntry, sink: &mut impl Write) -> Result<(), Error> {
        if entry.is_dir() {
            return Ok(());
        }

        let data_start = self.locate_entry_data(entry)?;

        self.reader.seek(SeekFrom::Start(data_start))?;
        let compressed = (&mut self.reader).take(entry.compressed_size);

        match entry.method {
            CompressionMethod::Store => {
                if entry.compressed_size != entry.uncompressed_size {
                    return Err(corrupt(format!(
                        "stored entry {} has differing sizes",
                        entry.name
                    )));
                }
                copy_verified(compressed, sink, entry)
            }
            CompressionMethod::Deflate => copy_verified(DeflateDecoder::new(compressed), sink, entry),
            CompressionMethod::Other(method) => Err(ArchiveError::UnsupportedCompressionMethod {
                entry: entry.name.clone(),
                method,
            }
            .into()),
        }
    }

    /// Extract every entry into `dest`, or fail as a whole.
    ///
    /// Entry paths are sanitized before any write; unix permission bits
    /// recorded in the archive are restored on unix. With
    /// `strip_shared_root`, a single shared top-level directory is
    /// flattened away.
    ///
    /// A single bad entry fails the extraction. `dest` is left as-is on
    /// failure; the caller owns staging-directory cleanup.
    ///
    /// # Errors
    ///
    /// Any entry-level error from [`Self::read_entry`], an unsafe entry
    /// path, or a filesystem error.
    pub fn extract_to(&mut self, dest: &Path, strip_shared_root: bool) -> Result<(), Error> {
        if self.entries.is_empty() {
            return Err(ArchiveError::Empty.into());
        }

        let prefix = if strip_shared_root {
            self.shared_root_prefix()
        } else {
            None
        };

        let entries = self.entries.clone();
        for entry in &entries {
            let name = match &prefix {
                Some(root) => {
                    let stripped = entry
                        .name
                        .strip_prefix(root.as_str())
                        .and_then(|rest| rest.strip_prefix('/'))
                        .unwrap_or("");
                    if stripped.is_empty() {
                        // The root directory entry itself
                        continue;
                    }
                    stripped
                }
                None => entry.name.as_str(),
            };

            let rel = sanitize_entry_path(name)?;
            let target = dest.join(rel);

            if entry.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| Error::io_with_path(&e, target))?;
                continue;
            }

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(&e, parent))?;
            }

            let file = File::create(&target).map_err(|e| Error::io_with_path(&e, &target))?;
            let mut sink = BufWriter::new(file);
            self.read_entry(entry, &mut sink)?;
            sink.flush().map_err(|e| Error::io_with_path(&e, &target))?;

            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&target, std::fs::Permissions::from_mode(mode & 0o7777))
                    .map_err(|e| Error::io_with_path(&e, &target))?;
            }
        }

        Ok(())
    }

    /// Find the start of an entry's data, re-validating the local
    /// header against the central directory record.
    fn locate_entry_data(&mut self, entry: &ArchiveEntry) -> Result<u64, Error> {
        if entry.header_offset + LOCAL_HEADER_LEN as u64 > self.stream_len {
            return Err(corrupt(format!(
                "local header of {} outside stream",
                entry.name
            )));
        }

        self.reader.seek(SeekFrom::Start(entry.header_offset))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        self.reader
            .read_exact(&mut header)
            .map_err(|_| corrupt(format!("local header of {} truncated", entry.name)))?;

        if read_u32(&header, 0) != LOCAL_SIG {
            return Err(corrupt(format!("bad local header signature for {}", entry.name)));
        }
        if CompressionMethod::from_raw(read_u16(&header, 8)) != entry.method {
            return Err(corrupt(format!(
                "local header of {} disagrees with central directory",
                entry.name
            )));
        }

        let name_len = u64::from(read_u16(&header, 26));
        let extra_len = u64::from(read_u16(&header, 28));
        let data_start = entry.header_offset + LOCAL_HEADER_LEN as u64 + name_len + extra_len;

        if data_start + entry.compressed_size > self.stream_len {
            return Err(corrupt(format!("data of {} outside stream", entry.name)));
        }

        Ok(data_start)
    }
}

/// Stream `source` into `sink` while counting bytes and computing the
/// CRC32, then check both against the entry's declared values.
fn copy_verified(
    mut source: impl Read,
    sink: &mut impl Write,
    entry: &ArchiveEntry,
) -> Result<(), Error> {
    let mut crc = Crc::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = source
            .read(&mut buf)
            .map_err(|e| corrupt(format!("failed to decompress {}: {e}", entry.name)))?;
        if n == 0 {
            break;
        }

        written += n as u64;
        if written > entry.uncompressed_size {
            // Decompression bomb guard: never write more than declared
            return Err(ArchiveError::SizeMismatch {
                entry: entry.name.clone(),
                declared: entry.uncompressed_size,
                actual: written,
            }
            .into());
        }

        crc.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
    }

    if written != entry.uncompressed_size {
        return Err(ArchiveError::SizeMismatch {
            entry: entry.name.clone(),
            declared: entry.uncompressed_size,
            actual: written,
        }
        .into());
    }

    let actual = crc.sum();
    if actual != entry.crc32 {
        return Err(ArchiveError::EntryChecksumMismatch {
            entry: entry.name.clone(),
            expected: entry.crc32,
            actual,
        }
        .into());
    }

    Ok(())
}

/// Locate and parse the end-of-central-directory record.
///
/// The record sits at the very end of the stream, possibly followed by
/// an archive comment of up to 64KiB, so the tail is scanned backwards
/// for the signature whose comment length lines up with the stream end.
fn find_end_of_central_directory<R: Read + Seek>(
    reader: &mut R,
    stream_len: u64,
) -> Result<(u64, u64, u16), Error> {
    if stream_len < EOCD_LEN {
        return Err(corrupt("stream too small for an archive"));
    }

    let tail_len = stream_len.min(EOCD_LEN + MAX_COMMENT_LEN);
    let tail_start = stream_len - tail_len;
    reader.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; usize::try_from(tail_len).map_err(|_| corrupt("stream too large"))?];
    reader.read_exact(&mut tail)?;

    let mut pos = tail.len() - 22;
    loop {
        if read_u32(&tail, pos) == EOCD_SIG {
            let comment_len = usize::from(read_u16(&tail, pos + 20));
            if pos + 22 + comment_len == tail.len() {
                return parse_end_of_central_directory(&tail[pos..pos + 22], tail_start + pos as u64);
            }
        }
        if pos == 0 {
            return Err(corrupt("end of central directory record not found"));
        }
        pos -= 1;
    }
}

fn parse_end_of_central_directory(record: &[u8], record_pos: u64) -> Result<(u64, u64, u16), Error> {
    let disk_number = read_u16(record, 4);
    let cd_disk = read_u16(record, 6);
    let entries_this_disk = read_u16(record, 8);
    let entry_count = read_u16(record, 10);
    let cd_size = read_u32(record, 12);
    let cd_offset = read_u32(record, 16);

    if disk_number != 0 || cd_disk != 0 || entries_this_disk != entry_count {
        return Err(corrupt("multi-disk archives are not supported"));
    }
    if entry_count == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
        return Err(corrupt("zip64 archives are not supported"));
    }

    let cd_offset = u64::from(cd_offset);
    let cd_size = u64::from(cd_size);
    if cd_offset + cd_size > record_pos {
        return Err(corrupt("central directory overlaps end record"));
    }

    Ok((cd_offset, cd_size, entry_count))
}

/// Parse `entry_count` central directory file headers out of the
/// directory buffer, validating every length against the buffer and
/// every data offset against the stream.
fn parse_central_directory(
    directory: &[u8],
    entry_count: u16,
    stream_len: u64,
) -> Result<Vec<ArchiveEntry>, Error> {
    let mut entries = Vec::with_capacity(usize::from(entry_count));
    let mut pos = 0usize;

    for _ in 0..entry_count {
        if directory.len() - pos < CENTRAL_HEADER_LEN {
            return Err(corrupt("central directory truncated"));
        }
        let header = &directory[pos..pos + CENTRAL_HEADER_LEN];

        if read_u32(header, 0) != CENTRAL_SIG {
            return Err(corrupt("bad central directory signature"));
        }

        let version_made_by = read_u16(header, 4);
        let flags = read_u16(header, 8);
        let method = read_u16(header, 10);
        let crc32 = read_u32(header, 16);
        let compressed_size = u64::from(read_u32(header, 20));
        let uncompressed_size = u64::from(read_u32(header, 24));
        let name_len = usize::from(read_u16(header, 28));
        let extra_len = usize::from(read_u16(header, 30));
        let comment_len = usize::from(read_u16(header, 32));
        let external_attrs = read_u32(header, 38);
        let header_offset = u64::from(read_u32(header, 42));

        let record_len = CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
        if directory.len() - pos < record_len {
            return Err(corrupt("central directory record runs past buffer"));
        }

        let name_bytes = &directory[pos + CENTRAL_HEADER_LEN..pos + CENTRAL_HEADER_LEN + name_len];
        let name = std::str::from_utf8(name_bytes)
            .map_err(|_| corrupt("entry name is not valid UTF-8"))?
            .to_string();

        if flags & FLAG_ENCRYPTED != 0 {
            return Err(corrupt(format!("encrypted entry: {name}")));
        }
        if compressed_size == u64::from(u32::MAX) || uncompressed_size == u64::from(u32::MAX) {
            return Err(corrupt("zip64 archives are not supported"));
        }
        if header_offset + compressed_size > stream_len {
            return Err(corrupt(format!("entry {name} points outside the stream")));
        }

        // Unix hosts record permission bits in the upper half of the
        // external attributes; other hosts leave nothing usable.
        let unix_mode = if version_made_by >> 8 == 3 {
            Some(external_attrs >> 16)
        } else {
            None
        };

        entries.push(ArchiveEntry {
            name,
            method: CompressionMethod::from_raw(method),
            crc32,
            compressed_size,
            uncompressed_size,
            header_offset,
            unix_mode,
        });

        pos += record_len;
    }

    if pos != directory.len() {
        return Err(corrupt("trailing bytes after central directory"));
    }

    Ok(entries)
}
