//! Minimal ZIP writer
//!
//! Writes store or deflate entries with a trailing central directory.
//! Used for packaging plugins and for round-trip tests; it does not
//! support streaming entry bodies, data descriptors, or zip64.

use crate::entry::CompressionMethod;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use plugget_errors::{ArchiveError, Error};
use std::io::{Seek, Write};

const LOCAL_SIG: u32 = 0x0403_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;

/// Version 2.0: deflate support
const VERSION_NEEDED: u16 = 20;
/// Host 3 = unix, used when an entry carries permission bits
const HOST_UNIX: u16 = 3 << 8;

struct PendingEntry {
    name: String,
    method: CompressionMethod,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    header_offset: u32,
    unix_mode: Option<u32>,
}

/// Writer producing a ZIP stream entry by entry
pub struct ZipWriter<W: Write + Seek> {
    writer: W,
    entries: Vec<PendingEntry>,
}

impl<W: Write + Seek> ZipWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            entries: Vec::new(),
        }
    }

    /// Append a file entry with the given contents
    ///
    /// # Errors
    ///
    /// Returns an error if the entry does not fit the (non-zip64)
    /// format limits or on write failure.
    pub fn add_file(
        &mut self,
        name: &str,
        data: &[u8],
        method: CompressionMethod,
        unix_mode: Option<u32>,
    ) -> Result<(), Error> {
        let uncompressed_size = size_field(data.len(), name)?;

        let mut crc = Crc::new();
        crc.update(data);

        let compressed: Vec<u8> = match method {
            CompressionMethod::Store => data.to_vec(),
            CompressionMethod::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                encoder.finish()?
            }
            CompressionMethod::Other(method) => {
                return Err(ArchiveError::UnsupportedCompressionMethod {
                    entry: name.to_string(),
                    method,
                }
                .into());
            }
        };
        let compressed_size = size_field(compressed.len(), name)?;

        let header_offset = self.position()?;
        let entry = PendingEntry {
            name: name.to_string(),
            method,
            crc32: crc.sum(),
            compressed_size,
            uncompressed_size,
            header_offset,
            unix_mode,
        };

        self.write_local_header(&entry)?;
        self.writer.write_all(&compressed)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Append a directory entry (name is given a trailing slash if
    /// missing)
    ///
    /// # Errors
    ///
    /// Returns an error on write failure.
    pub fn add_directory(&mut self, name: &str, unix_mode: Option<u32>) -> Result<(), Error> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };

        let header_offset = self.position()?;
        let entry = PendingEntry {
            name,
            method: CompressionMethod::Store,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            header_offset,
            unix_mode,
        };

        self.write_local_header(&entry)?;
        self.entries.push(entry);
        Ok(())
    }

    /// Write the central directory and end record, returning the inner
    /// writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive exceeds format limits or on
    /// write failure.
    pub fn finish(mut self) -> Result<W, Error> {
        let cd_start = self.position()?;

        for entry in &self.entries {
            let version_made_by = if entry.unix_mode.is_some() {
                HOST_UNIX | VERSION_NEEDED
            } else {
                VERSION_NEEDED
            };
            let external_attrs = entry.unix_mode.map_or(0, |mode| mode << 16);

            write_u32(&mut self.writer, CENTRAL_SIG)?;
            write_u16(&mut self.writer, version_made_by)?;
            write_u16(&mut self.writer, VERSION_NEEDED)?;
            write_u16(&mut self.writer, 0)?; // flags
            write_u16(&mut self.writer, entry.method.raw())?;
            write_u16(&mut self.writer, 0)?; // mod time
            write_u16(&mut self.writer, 0)?; // mod date
            write_u32(&mut self.writer, entry.crc32)?;
            write_u32(&mut self.writer, entry.compressed_size)?;
            write_u32(&mut self.writer, entry.uncompressed_size)?;
            write_u16(&mut self.writer, name_field(&entry.name)?)?;
            write_u16(&mut self.writer, 0)?; // extra len
            write_u16(&mut self.writer, 0)?; // comment len
            write_u16(&mut self.writer, 0)?; // disk start
            write_u16(&mut self.writer, 0)?; // internal attrs
            write_u32(&mut self.writer, external_attrs)?;
            write_u32(&mut self.writer, entry.header_offset)?;
            self.writer.write_all(entry.name.as_bytes())?;
        }

        let cd_end = self.position()?;
        let entry_count = u16::try_from(self.entries.len()).map_err(|_| {
            ArchiveError::CorruptArchive {
                message: "too many entries for a plain archive".to_string(),
            }
        })?;

        write_u32(&mut self.writer, EOCD_SIG)?;
        write_u16(&mut self.writer, 0)?; // disk number
        write_u16(&mut self.writer, 0)?; // central directory disk
        write_u16(&mut self.writer, entry_count)?;
        write_u16(&mut self.writer, entry_count)?;
        write_u32(&mut self.writer, cd_end - cd_start)?;
        write_u32(&mut self.writer, cd_start)?;
        write_u16(&mut self.writer, 0)?; // comment len
        self.writer.flush()?;

        Ok(self.writer)
    }

    fn write_local_header(&mut self, entry: &PendingEntry) -> Result<(), Error> {
        write_u32(&mut self.writer, LOCAL_SIG)?;
        write_u16(&mut self.writer, VERSION_NEEDED)?;
        write_u16(&mut self.writer, 0)?; // flags
        write_u16(&mut self.writer, entry.method.raw())?;
        write_u16(&mut self.writer, 0)?; // mod time
        write_u16(&mut self.writer, 0)?; // mod date
        write_u32(&mut self.writer, entry.crc32)?;
        write_u32(&mut self.writer, entry.compressed_size)?;
        write_u32(&mut self.writer, entry.uncompressed_size)?;
        write_u16(&mut self.writer, name_field(&entry.name)?)?;
        write_u16(&mut self.writer, 0)?; // extra len
        self.writer.write_all(entry.name.as_bytes())?;
        Ok(())
    }

    fn position(&mut self) -> Result<u32, Error> {
        let pos = self.writer.stream_position()?;
        u32::try_from(pos).map_err(|_| {
            ArchiveError::CorruptArchive {
                message: "archive exceeds 4GiB format limit".to_string(),
            }
            .into()
        })
    }
}

fn size_field(len: usize, name: &str) -> Result<u32, Error> {
    u32::try_from(len).map_err(|_| {
        ArchiveError::CorruptArchive {
            message: format!("entry {name} exceeds 4GiB format limit"),
        }
        .into()
    })
}

fn name_field(name: &str) -> Result<u16, Error> {
    u16::try_from(name.len()).map_err(|_| {
        ArchiveError::CorruptArchive {
            message: format!("entry name too long: {name:?}"),
        }
        .into()
    })
}

fn write_u16(writer: &mut impl Write, value: u16) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_u32(writer: &mut impl Write, value: u32) -> Result<(), Error> {
    writer.write_all(&value.to_le_bytes())?;
    Ok(())
}
