//! Tools for writing a ZIP archive.
//!
//! A [`ZipWriter`] hands out one [`MemberWriter`] at a time. The member
//! writer mutably borrows the archive, so the next member can't be started
//! until the current one is finished (or dropped, which discards it).
//! Members are compressed in memory and land in the sink on
//! [`MemberWriter::finish()`], so the local header always carries the real
//! sizes and CRC and the sink doesn't need to be seekable.
//!
//! ```
//! # use dzip::read::CompressionMethod;
//! # use dzip::write::ZipWriter;
//! # use std::io::Write;
//! let mut zip = ZipWriter::new(Vec::new());
//! let mut member = zip.start_member("hello.txt", CompressionMethod::Deflate)?;
//! member.write_all(b"Hello, ZIP!")?;
//! member.finish()?;
//! let bytes = zip.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! [`ZipWriter`]: struct.ZipWriter.html
//! [`MemberWriter`]: struct.MemberWriter.html
//! [`MemberWriter::finish()`]: struct.MemberWriter.html#method.finish

use std::io::{self, Write};

use chrono::NaiveDateTime;
use crc32fast::Hasher;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::read::CompressionMethod;
use crate::result::*;
use crate::spec;

/// Unix regular file, rw-r--r--
const UNIX_FILE_ATTRIBUTES: u32 = 0o100644 << 16;

/// A member that has been written, waiting for its central directory entry.
#[derive(Debug)]
struct WrittenMember {
    name: String,
    method: CompressionMethod,
    crc32: u32,
    compressed_size: u32,
    size: u32,
    header_offset: u32,
}

/// Writes a ZIP archive to any sink.
pub struct ZipWriter<W: Write> {
    inner: W,
    offset: u64,
    members: Vec<WrittenMember>,
    last_modified: (u16, u16),
}

impl<W: Write> ZipWriter<W> {
    /// Starts a new archive. Members are stamped with the current local time.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            members: Vec::new(),
            last_modified: spec::to_msdos(chrono::Local::now().naive_local()),
        }
    }

    /// Stamps members with the given time instead of the current one.
    pub fn with_timestamp(mut self, when: NaiveDateTime) -> Self {
        self.last_modified = spec::to_msdos(when);
        self
    }

    /// Starts writing a member named `name`.
    pub fn start_member(
        &mut self,
        name: &str,
        method: CompressionMethod,
    ) -> DzipResult<MemberWriter<'_, W>> {
        if self.members.iter().any(|m| m.name == name) {
            return Err(DzipError::UnsupportedArchive(format!(
                "Duplicate member {name}"
            )));
        }
        let sink = match method {
            CompressionMethod::None => Sink::Stored(Vec::new()),
            CompressionMethod::Deflate => {
                Sink::Deflate(DeflateEncoder::new(Vec::new(), Compression::default()))
            }
            CompressionMethod::Unsupported(code) => {
                return Err(DzipError::UnsupportedArchive(format!(
                    "Compression method {code} not supported"
                )))
            }
        };
        debug!("Starting member {} ({:?})", name, method);
        Ok(MemberWriter {
            archive: self,
            name: name.to_owned(),
            method,
            sink,
            finished: false,
            hasher: Hasher::new(),
            size: 0,
        })
    }

    /// Writes the central directory and returns the sink.
    pub fn finish(mut self) -> DzipResult<W> {
        let central_directory_offset = checked_u32(self.offset, "Archive")?;
        let mut central_directory_size = 0usize;
        let (time, date) = self.last_modified;

        for member in &self.members {
            let entry = spec::CentralDirectoryEntry {
                source_version: spec::VERSION_MADE_BY_UNIX,
                minimum_extract_version: extract_version(member.method),
                flags: spec::FLAG_UTF8,
                compression_method: member.method.to_u16(),
                last_modified_time: time,
                last_modified_date: date,
                crc32: member.crc32,
                compressed_size: member.compressed_size,
                uncompressed_size: member.size,
                disk_number: 0,
                internal_file_attributes: 0,
                external_file_attributes: UNIX_FILE_ATTRIBUTES,
                header_offset: member.header_offset,
                path: member.name.as_bytes(),
                extra_field: &[],
                file_comment: &[],
            };
            trace!("{:?}", entry);
            entry.write_to(&mut self.inner)?;
            central_directory_size += entry.size_in_file();
        }

        let entries = u16::try_from(self.members.len()).map_err(|_| {
            DzipError::UnsupportedArchive(String::from("Too many members for a non-Zip64 archive"))
        })?;
        let eocdr = spec::EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size: checked_u32(central_directory_size as u64, "Central directory")?,
            central_directory_offset,
            file_comment: &[],
        };
        trace!("{:?}", eocdr);
        eocdr.write_to(&mut self.inner)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

fn extract_version(method: CompressionMethod) -> u16 {
    match method {
        CompressionMethod::Deflate => spec::VERSION_DEFLATE,
        _ => 10,
    }
}

fn checked_u32(value: u64, what: &str) -> DzipResult<u32> {
    u32::try_from(value).map_err(|_| {
        DzipError::UnsupportedArchive(format!("{what} too large without Zip64"))
    })
}

enum Sink {
    Stored(Vec<u8>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

/// Writes the contents of one member. Call [`finish()`](#method.finish)
/// to add it to the archive.
pub struct MemberWriter<'z, W: Write> {
    archive: &'z mut ZipWriter<W>,
    name: String,
    method: CompressionMethod,
    sink: Sink,
    /// Set by `finish()`, so dropping an unfinished member can be flagged
    finished: bool,
    hasher: Hasher,
    size: u64,
}

impl<W: Write> MemberWriter<'_, W> {
    /// Writes the member's local header and compressed contents to the archive.
    pub fn finish(mut self) -> DzipResult<()> {
        self.finished = true;
        let payload = match std::mem::replace(&mut self.sink, Sink::Stored(Vec::new())) {
            Sink::Stored(bytes) => bytes,
            Sink::Deflate(encoder) => encoder.finish()?,
        };
        let name = std::mem::take(&mut self.name);
        let crc32 = self.hasher.clone().finalize();
        let size = checked_u32(self.size, &name)?;
        let compressed_size = checked_u32(payload.len() as u64, &name)?;
        let header_offset = checked_u32(self.archive.offset, "Archive")?;
        let (time, date) = self.archive.last_modified;

        let header = spec::LocalFileHeader {
            minimum_extract_version: extract_version(self.method),
            flags: spec::FLAG_UTF8,
            compression_method: self.method.to_u16(),
            last_modified_time: time,
            last_modified_date: date,
            crc32,
            compressed_size,
            uncompressed_size: size,
            path: name.as_bytes(),
            extra_field: &[],
        };
        trace!("{:?}", header);
        header.write_to(&mut self.archive.inner)?;
        self.archive.inner.write_all(&payload)?;
        self.archive.offset += (header.size_in_file() + payload.len()) as u64;

        debug!(
            "Wrote member {} ({} bytes, {} compressed)",
            name, size, compressed_size
        );
        self.archive.members.push(WrittenMember {
            name,
            method: self.method,
            crc32,
            compressed_size,
            size,
            header_offset,
        });
        Ok(())
    }
}

impl<W: Write> Write for MemberWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match &mut self.sink {
            Sink::Stored(bytes) => bytes.write(buf)?,
            Sink::Deflate(encoder) => encoder.write(buf)?,
        };
        self.hasher.update(&buf[..written]);
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Deflate(encoder) => encoder.flush(),
            Sink::Stored(_) => Ok(()),
        }
    }
}

impl<W: Write> Drop for MemberWriter<'_, W> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Member {} dropped before finish(); it won't be written", self.name);
        }
    }
}
