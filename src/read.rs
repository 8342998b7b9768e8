//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, create a [`ZipArchive`] from its bytes.
//!
//! The archive and every stream read from it hold a reference-counted
//! handle to the same buffer, so a member stream can't outlive its bytes
//! and dropping the last handle frees them.
//!
//! [`ZipArchive`]: struct.ZipArchive.html

use std::fmt;
use std::io;
use std::ops::Range;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use flate2::read::DeflateDecoder;
use log::*;

use crate::crc_reader::Crc32Reader;
use crate::result::*;
use crate::spec;

/// The compression method used to store a member
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The member is uncompressed
    None,
    /// The member is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    Deflate,
    /// The member is compressed with an unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

/// Metadata for a member of the archive,
/// retrieved from its central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// Uncompressed size of the member in bytes
    pub size: usize,

    /// Compressed size of the member in bytes
    pub compressed_size: usize,

    /// Compression algorithm used to store the member
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed member
    pub crc32: u32,

    /// True if the member is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// True if the local header defers sizes and CRC to a data descriptor
    pub has_data_descriptor: bool,

    /// The member's path inside the archive.
    pub path: Utf8PathBuf,

    /// When the member was last modified
    pub last_modified: NaiveDateTime,

    /// The offset to the local file header in the archive
    pub(crate) header_offset: usize,
}

impl FileMetadata {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.size == 0 && self.path.as_str().ends_with('/')
    }

    /// Does this (central directory) metadata agree with the local file header's?
    ///
    /// Writers that stream members leave the local sizes and CRC zeroed
    /// and put the real values in a data descriptor, so those aren't compared.
    fn agrees_with(&self, local: &FileMetadata) -> bool {
        let same_basics = self.path == local.path
            && self.compression_method == local.compression_method
            && self.encrypted == local.encrypted;
        if local.has_data_descriptor {
            same_basics
        } else {
            same_basics
                && self.crc32 == local.crc32
                && self.size == local.size
                && self.compressed_size == local.compressed_size
        }
    }
}

/// A range of a shared buffer, usable as `Cursor<ByteRange>`.
#[derive(Debug, Clone)]
struct ByteRange {
    bytes: Arc<[u8]>,
    range: Range<usize>,
}

impl AsRef<[u8]> for ByteRange {
    fn as_ref(&self) -> &[u8] {
        &self.bytes[self.range.clone()]
    }
}

/// A stream reading one decompressed member.
pub type MemberStream = Box<dyn io::Read + Send + 'static>;

/// A ZIP archive to be read
#[derive(Clone)]
pub struct ZipArchive {
    /// The contents of the ZIP archive.
    bytes: Arc<[u8]>,
    /// A list of entries from the ZIP's central directory
    entries: Vec<FileMetadata>,
}

impl fmt::Debug for ZipArchive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipArchive")
            .field("len", &self.bytes.len())
            .field("entries", &self.entries)
            .finish()
    }
}

impl ZipArchive {
    /// Parses the central directory of a ZIP archive held in memory.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use dzip::read::ZipArchive;
    /// let bytes = fs::read("survey.dzip")?;
    /// let archive = ZipArchive::new(bytes.into())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(bytes: Arc<[u8]>) -> DzipResult<Self> {
        let mapping: &[u8] = &bytes;
        let eocdr_posit = spec::find_eocdr(mapping)?;
        let eocdr = spec::EndOfCentralDirectory::parse(&mapping[eocdr_posit..])?;
        trace!("{:?}", eocdr);

        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(DzipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(DzipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        // Any junk in front of the archive shifts every stored offset.
        // Work out how much there is, and refuse it.
        let archive_offset;
        let central_directory_offset: usize;
        let entry_count: u64;

        let locator = eocdr_posit
            .checked_sub(spec::Zip64EndOfCentralDirectoryLocator::SIZE)
            .map(|posit| spec::Zip64EndOfCentralDirectoryLocator::parse(&mapping[posit..]))
            .transpose()?
            .flatten();

        if let Some(locator) = locator {
            trace!("{:?}", locator);

            if eocdr.disk_number as u32 != locator.disk_with_central_directory || locator.disks != 1
            {
                return Err(DzipError::UnsupportedArchive(format!(
                    "No support for multi-disk archives: Zip64 locator reports {} disks",
                    locator.disks
                )));
            }

            // Search for the zip64 EOCDR, from its nominal starting position
            // to the locator.
            let search_start = spec::to_usize(locator.zip64_eocdr_offset)?;
            let search_end = eocdr_posit - spec::Zip64EndOfCentralDirectoryLocator::SIZE;
            let search_space = mapping
                .get(search_start..search_end)
                .ok_or(DzipError::InvalidArchive("Invalid Zip64 locator offset"))?;

            let zip64_posit = spec::find_zip64_eocdr(search_space)?;
            // Since we're searching starting at the nominal offset,
            // the position we found is the archive offset.
            archive_offset = zip64_posit;
            let zip64_eocdr = spec::Zip64EndOfCentralDirectory::parse(&search_space[zip64_posit..])?;
            trace!("{:?}", zip64_eocdr);

            central_directory_offset = spec::to_usize(zip64_eocdr.central_directory_offset)?;
            entry_count = zip64_eocdr.entries;
        } else {
            // The offset is the actual position versus the stored one.
            let actual_cdr_posit =
                eocdr_posit.checked_sub(spec::to_usize(eocdr.central_directory_size)?);
            let nominal_offset = spec::to_usize(eocdr.central_directory_offset)?;
            archive_offset = actual_cdr_posit
                .and_then(|off| off.checked_sub(nominal_offset))
                .ok_or(DzipError::InvalidArchive(
                    "Invalid central directory size or offset",
                ))?;
            central_directory_offset = nominal_offset;
            entry_count = eocdr.entries as u64;
        }

        if archive_offset != 0 {
            return Err(DzipError::PrependedWithUnknownBytes(archive_offset));
        }

        trace!(
            "{} entries at offset {}",
            entry_count,
            central_directory_offset
        );

        let mut central_directory = mapping
            .get(central_directory_offset..)
            .ok_or(DzipError::InvalidArchive("Invalid central directory offset"))?;

        // Every entry is at least FIXED_SIZE bytes;
        // don't let a bogus count drive a huge allocation.
        let max_entries = central_directory.len() / spec::CentralDirectoryEntry::FIXED_SIZE;
        let mut entries = Vec::with_capacity(spec::to_usize(entry_count)?.min(max_entries));

        for _ in 0..entry_count {
            let dir_entry = spec::CentralDirectoryEntry::parse_and_consume(&mut central_directory)?;
            trace!("{:?}", dir_entry);

            let file_metadata = FileMetadata::from_cde(&dir_entry)?;
            debug!("{:?}", file_metadata);
            entries.push(file_metadata);
        }

        Ok(ZipArchive { bytes, entries })
    }

    /// Returns the entries found in the ZIP archive's central directory.
    pub fn entries(&self) -> &[FileMetadata] {
        &self.entries
    }

    /// Looks up a member by its exact path.
    pub fn by_name<P: AsRef<Utf8Path>>(&self, path: P) -> DzipResult<&FileMetadata> {
        let path = path.as_ref();
        self.entries
            .iter()
            .find(|entry| entry.path == path)
            .ok_or_else(|| DzipError::NoSuchMember(path.to_owned()))
    }

    /// The sum of every member's compressed size.
    pub fn compressed_size(&self) -> u64 {
        self.entries.iter().map(|e| e.compressed_size as u64).sum()
    }

    /// Opens the given member for reading.
    ///
    /// The stream checks the member's CRC-32 once it reaches the end.
    pub fn read(&self, metadata: &FileMetadata) -> DzipResult<MemberStream> {
        let mut file_slice = self
            .bytes
            .get(metadata.header_offset..)
            .ok_or(DzipError::InvalidArchive("Local file header out of bounds"))?;
        let before = file_slice.len();
        let local_header = spec::LocalFileHeader::parse_and_consume(&mut file_slice)?;
        trace!("{:?}", local_header);
        let local_metadata = FileMetadata::from_local_header(&local_header, metadata.header_offset)?;
        debug!("Reading {:?}", local_metadata);
        if cfg!(feature = "check-local-metadata") && !metadata.agrees_with(&local_metadata) {
            return Err(DzipError::InvalidArchive(
                "Central directory entry doesn't match local file header",
            ));
        }

        if metadata.encrypted {
            return Err(DzipError::UnsupportedArchive(format!(
                "Can't read encrypted member {}",
                metadata.path
            )));
        }

        let start = metadata.header_offset + (before - file_slice.len());
        let end = start
            .checked_add(metadata.compressed_size)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DzipError::InvalidArchive("Member data out of bounds"))?;

        make_reader(
            metadata.compression_method,
            metadata.crc32,
            io::Cursor::new(ByteRange {
                bytes: self.bytes.clone(),
                range: start..end,
            }),
        )
    }
}

/// Returns a boxed read trait for a compressed member,
/// given its compression method and expected CRC.
fn make_reader<R: io::Read + Send + 'static>(
    compression_method: CompressionMethod,
    crc32: u32,
    reader: R,
) -> DzipResult<MemberStream> {
    match compression_method {
        CompressionMethod::None => Ok(Box::new(Crc32Reader::new(reader, crc32))),
        CompressionMethod::Deflate => {
            let deflate_reader = DeflateDecoder::new(reader);
            Ok(Box::new(Crc32Reader::new(deflate_reader, crc32)))
        }
        CompressionMethod::Unsupported(code) => Err(DzipError::UnsupportedArchive(format!(
            "Compression method {} not supported",
            code
        ))),
    }
}
