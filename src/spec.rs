//! Code specific to the ZIP file format specification.
//!
//! The nitty gritty of record layouts lives here,
//! and higher-level stuff in the [`read`] and [`write`] modules.
//! Comments quote the ZIP spec, [`APPNOTE.TXT`].
//!
//! Every parser checks the record's length before touching it,
//! so a truncated or garbage archive is an error instead of a panic.
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::io::{self, Write};

use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use camino::Utf8PathBuf;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use codepage_437::*;
use memchr::memmem;

use crate::read::{CompressionMethod, FileMetadata};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Bit 3: sizes and CRC live in a data descriptor after the payload.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;
/// Bit 11: names are UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// "Version needed to extract" for DEFLATE: 2.0
pub const VERSION_DEFLATE: u16 = 20;
/// "Version made by": UNIX, spec version 3.0
pub const VERSION_MADE_BY_UNIX: u16 = (3 << 8) | 30;

/// A checked cast from u64 to usize
pub fn to_usize<I: Into<u64>>(i: I) -> DzipResult<usize> {
    usize::try_from(i.into()).map_err(|_| DzipError::InsufficientAddressSpace)
}

impl CompressionMethod {
    fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub(crate) fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// Splits `len` bytes off the front of `input`,
/// or fails with `what` if there aren't that many.
fn take<'a>(input: &mut &'a [u8], len: usize, what: &'static str) -> DzipResult<&'a [u8]> {
    if input.len() < len {
        return Err(DzipError::InvalidArchive(what));
    }
    let (taken, rest) = input.split_at(len);
    *input = rest;
    Ok(taken)
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub const FIXED_SIZE: usize = 22;

    pub fn parse(mut eocdr: &'a [u8]) -> DzipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        let mut fixed = take(
            &mut eocdr,
            Self::FIXED_SIZE,
            "Truncated End Of Central Directory Record",
        )?;
        if fixed[..4] != EOCDR_MAGIC {
            return Err(DzipError::InvalidArchive(
                "Couldn't find End Of Central Directory Record",
            ));
        }
        fixed = &fixed[4..];
        let disk_number = fixed.read_u16::<LE>()?;
        let disk_with_central_directory = fixed.read_u16::<LE>()?;
        let entries_on_this_disk = fixed.read_u16::<LE>()?;
        let entries = fixed.read_u16::<LE>()?;
        let central_directory_size = fixed.read_u32::<LE>()?;
        let central_directory_offset = fixed.read_u32::<LE>()?;
        let comment_length = fixed.read_u16::<LE>()?;
        let file_comment = take(
            &mut eocdr,
            comment_length as usize,
            "Truncated archive comment",
        )?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&EOCDR_MAGIC)?;
        w.write_u16::<LE>(self.disk_number)?;
        w.write_u16::<LE>(self.disk_with_central_directory)?;
        w.write_u16::<LE>(self.entries_on_this_disk)?;
        w.write_u16::<LE>(self.entries)?;
        w.write_u32::<LE>(self.central_directory_size)?;
        w.write_u32::<LE>(self.central_directory_offset)?;
        w.write_u16::<LE>(self.file_comment.len() as u16)?;
        w.write_all(self.file_comment)
    }
}

/// Searches backward through `mapping` to find the
/// End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable size means we can't jump to a known offset.
pub fn find_eocdr(mapping: &[u8]) -> DzipResult<usize> {
    memmem::rfind(mapping, &EOCDR_MAGIC).ok_or(DzipError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Data from the Zip64 end of central directory locator
///
/// This immediately precedes the End of central directory record
/// on Zip64 files and tells us where to find the Zip64 end of central directory record.
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub const SIZE: usize = 20;

    /// Returns `None` if `mapping` doesn't start with a locator.
    pub fn parse(mut mapping: &[u8]) -> DzipResult<Option<Self>> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        if mapping.len() < Self::SIZE || mapping[..4] != ZIP64_EOCDR_LOCATOR_MAGIC {
            return Ok(None);
        }
        mapping = &mapping[4..];
        Ok(Some(Self {
            disk_with_central_directory: mapping.read_u32::<LE>()?,
            zip64_eocdr_offset: mapping.read_u64::<LE>()?,
            disks: mapping.read_u32::<LE>()?,
        }))
    }
}

/// Data from the Zip64 end of central directory record
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
    pub extensible_data: &'a [u8],
}

impl<'a> Zip64EndOfCentralDirectory<'a> {
    const FIXED_SIZE: usize = 56;

    pub fn parse(mut eocdr: &'a [u8]) -> DzipResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)
        let mut fixed = take(
            &mut eocdr,
            Self::FIXED_SIZE,
            "Truncated Zip64 End Of Central Directory Record",
        )?;
        if fixed[..4] != ZIP64_EOCDR_MAGIC {
            return Err(DzipError::InvalidArchive(
                "Couldn't find zip64 End Of Central Directory Record",
            ));
        }
        fixed = &fixed[4..];
        let record_size = to_usize(fixed.read_u64::<LE>()?)?;
        let source_version = fixed.read_u16::<LE>()?;
        let minimum_extract_version = fixed.read_u16::<LE>()?;
        let disk_number = fixed.read_u32::<LE>()?;
        let disk_with_central_directory = fixed.read_u32::<LE>()?;
        let entries_on_this_disk = fixed.read_u64::<LE>()?;
        let entries = fixed.read_u64::<LE>()?;
        let central_directory_size = fixed.read_u64::<LE>()?;
        let central_directory_offset = fixed.read_u64::<LE>()?;

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD be the size of the remaining
        // record and SHOULD NOT include the leading 12 bytes.
        let extensible_len = (record_size + 12)
            .checked_sub(Self::FIXED_SIZE)
            .ok_or(DzipError::InvalidArchive(
                "Invalid extensible data length in Zip64 End Of Central Directory Record",
            ))?;
        let extensible_data = take(
            &mut eocdr,
            extensible_len,
            "Invalid extensible data length in Zip64 End Of Central Directory Record",
        )?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            extensible_data,
        })
    }
}

/// Finds the Zip64 end of central directory record in the given slice.
pub fn find_zip64_eocdr(mapping: &[u8]) -> DzipResult<usize> {
    memmem::find(mapping, &ZIP64_EOCDR_MAGIC).ok_or(DzipError::InvalidArchive(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Data from a central directory entry
///
/// Each of these records contains information about a member
/// stored in the ZIP archive.
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub const FIXED_SIZE: usize = 46;

    pub fn parse_and_consume(entry: &mut &'a [u8]) -> DzipResult<Self> {
        // 4.3.12  Central directory structure, file header:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        let mut fixed = take(entry, Self::FIXED_SIZE, "Truncated central directory entry")?;
        if fixed[..4] != CENTRAL_DIRECTORY_MAGIC {
            return Err(DzipError::InvalidArchive("Invalid central directory entry"));
        }
        fixed = &fixed[4..];
        let source_version = fixed.read_u16::<LE>()?;
        let minimum_extract_version = fixed.read_u16::<LE>()?;
        let flags = fixed.read_u16::<LE>()?;
        let compression_method = fixed.read_u16::<LE>()?;
        let last_modified_time = fixed.read_u16::<LE>()?;
        let last_modified_date = fixed.read_u16::<LE>()?;
        let crc32 = fixed.read_u32::<LE>()?;
        let compressed_size = fixed.read_u32::<LE>()?;
        let uncompressed_size = fixed.read_u32::<LE>()?;
        let path_length = fixed.read_u16::<LE>()? as usize;
        let extra_field_length = fixed.read_u16::<LE>()? as usize;
        let file_comment_length = fixed.read_u16::<LE>()? as usize;
        let disk_number = fixed.read_u16::<LE>()?;
        let internal_file_attributes = fixed.read_u16::<LE>()?;
        let external_file_attributes = fixed.read_u32::<LE>()?;
        let header_offset = fixed.read_u32::<LE>()?;
        let path = take(entry, path_length, "Truncated central directory entry")?;
        let extra_field = take(entry, extra_field_length, "Truncated central directory entry")?;
        let file_comment = take(entry, file_comment_length, "Truncated central directory entry")?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&CENTRAL_DIRECTORY_MAGIC)?;
        w.write_u16::<LE>(self.source_version)?;
        w.write_u16::<LE>(self.minimum_extract_version)?;
        w.write_u16::<LE>(self.flags)?;
        w.write_u16::<LE>(self.compression_method)?;
        w.write_u16::<LE>(self.last_modified_time)?;
        w.write_u16::<LE>(self.last_modified_date)?;
        w.write_u32::<LE>(self.crc32)?;
        w.write_u32::<LE>(self.compressed_size)?;
        w.write_u32::<LE>(self.uncompressed_size)?;
        w.write_u16::<LE>(self.path.len() as u16)?;
        w.write_u16::<LE>(self.extra_field.len() as u16)?;
        w.write_u16::<LE>(self.file_comment.len() as u16)?;
        w.write_u16::<LE>(self.disk_number)?;
        w.write_u16::<LE>(self.internal_file_attributes)?;
        w.write_u32::<LE>(self.external_file_attributes)?;
        w.write_u32::<LE>(self.header_offset)?;
        w.write_all(self.path)?;
        w.write_all(self.extra_field)?;
        w.write_all(self.file_comment)
    }

    pub fn size_in_file(&self) -> usize {
        Self::FIXED_SIZE + self.path.len() + self.extra_field.len() + self.file_comment.len()
    }
}

/// Data from a local file header
///
/// Each member's actual contents is preceded by this header.
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub const FIXED_SIZE: usize = 30;

    pub fn parse_and_consume(header: &mut &'a [u8]) -> DzipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let mut fixed = take(header, Self::FIXED_SIZE, "Truncated local file header")?;
        if fixed[..4] != LOCAL_FILE_HEADER_MAGIC {
            return Err(DzipError::InvalidArchive("Invalid local file header"));
        }
        fixed = &fixed[4..];
        let minimum_extract_version = fixed.read_u16::<LE>()?;
        let flags = fixed.read_u16::<LE>()?;
        let compression_method = fixed.read_u16::<LE>()?;
        let last_modified_time = fixed.read_u16::<LE>()?;
        let last_modified_date = fixed.read_u16::<LE>()?;
        let crc32 = fixed.read_u32::<LE>()?;
        let compressed_size = fixed.read_u32::<LE>()?;
        let uncompressed_size = fixed.read_u32::<LE>()?;
        let path_length = fixed.read_u16::<LE>()? as usize;
        let extra_field_length = fixed.read_u16::<LE>()? as usize;
        let path = take(header, path_length, "Truncated local file header")?;
        let extra_field = take(header, extra_field_length, "Truncated local file header")?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&LOCAL_FILE_HEADER_MAGIC)?;
        w.write_u16::<LE>(self.minimum_extract_version)?;
        w.write_u16::<LE>(self.flags)?;
        w.write_u16::<LE>(self.compression_method)?;
        w.write_u16::<LE>(self.last_modified_time)?;
        w.write_u16::<LE>(self.last_modified_date)?;
        w.write_u32::<LE>(self.crc32)?;
        w.write_u32::<LE>(self.compressed_size)?;
        w.write_u32::<LE>(self.uncompressed_size)?;
        w.write_u16::<LE>(self.path.len() as u16)?;
        w.write_u16::<LE>(self.extra_field.len() as u16)?;
        w.write_all(self.path)?;
        w.write_all(self.extra_field)
    }

    pub fn size_in_file(&self) -> usize {
        Self::FIXED_SIZE + self.path.len() + self.extra_field.len()
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
fn is_utf8(flags: u16) -> bool {
    flags & FLAG_UTF8 != 0
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
fn is_encrypted(flags: u16) -> bool {
    flags & 1 != 0
}

fn decode_path(raw: &[u8], flags: u16) -> DzipResult<Utf8PathBuf> {
    if is_utf8(flags) {
        Ok(Utf8PathBuf::from(std::str::from_utf8(raw)?))
    } else {
        let decoded: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        Ok(Utf8PathBuf::from(decoded.into_owned()))
    }
}

impl FileMetadata {
    /// Extracts `FileMetadata` from a central directory entry
    pub(crate) fn from_cde(cde: &CentralDirectoryEntry) -> DzipResult<Self> {
        let path = decode_path(cde.path, cde.flags)?;

        if cde.disk_number != 0 {
            return Err(DzipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: member {} claims to be on disk {}",
                path, cde.disk_number,
            )));
        }

        let mut metadata = Self {
            size: to_usize(cde.uncompressed_size)?,
            compressed_size: to_usize(cde.compressed_size)?,
            compression_method: CompressionMethod::from_u16(cde.compression_method),
            crc32: cde.crc32,
            encrypted: is_encrypted(cde.flags),
            has_data_descriptor: cde.flags & FLAG_DATA_DESCRIPTOR != 0,
            path,
            last_modified: parse_msdos(cde.last_modified_time, cde.last_modified_date),
            header_offset: to_usize(cde.header_offset)?,
        };

        parse_extra_field(&mut metadata, cde.extra_field)?;

        Ok(metadata)
    }

    /// Extracts metadata from a local file header.
    ///
    /// The local header doesn't contain its own offset,
    /// so that one is taken from the central directory.
    pub(crate) fn from_local_header(local: &LocalFileHeader, header_offset: usize) -> DzipResult<Self> {
        let mut metadata = Self {
            size: to_usize(local.uncompressed_size)?,
            compressed_size: to_usize(local.compressed_size)?,
            compression_method: CompressionMethod::from_u16(local.compression_method),
            crc32: local.crc32,
            encrypted: is_encrypted(local.flags),
            has_data_descriptor: local.flags & FLAG_DATA_DESCRIPTOR != 0,
            path: decode_path(local.path, local.flags)?,
            last_modified: parse_msdos(local.last_modified_time, local.last_modified_date),
            header_offset,
        };

        parse_extra_field(&mut metadata, local.extra_field)?;

        Ok(metadata)
    }
}

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// Decodes an MS-DOS time and date pair.
///
/// Out-of-range fields (some writers leave them zeroed) map to 1980-01-01.
pub fn parse_msdos(time: u16, date: u16) -> NaiveDateTime {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)
        .and_then(|d| d.and_hms_opt(hours, minutes, seconds))
        .unwrap_or_else(epoch)
}

/// Encodes a timestamp as an MS-DOS `(time, date)` pair,
/// clamping to the 1980..=2107 range the format can hold.
pub fn to_msdos(when: NaiveDateTime) -> (u16, u16) {
    if when.year() < 1980 {
        return to_msdos(epoch());
    }
    let year = (when.year().min(2107) - 1980) as u16;
    let date = (year << 9) | ((when.month() as u16) << 5) | when.day() as u16;
    let time =
        ((when.hour() as u16) << 11) | ((when.minute() as u16) << 5) | (when.second() as u16 / 2);
    (time, date)
}

/// Parses the "extra fields" found in central directory entries
/// and local file headers.
///
/// We only look for Zip64 info (64-bit values for members > 2^32 in size).
fn parse_extra_field(metadata: &mut FileMetadata, mut extra_field: &[u8]) -> DzipResult<()> {
    // 4.5.1 Each header MUST consist of:
    //
    //     Header ID - 2 bytes
    //     Data Size - 2 bytes
    while !extra_field.is_empty() {
        let mut header = take(&mut extra_field, 4, "Truncated extra field")?;
        let kind = header.read_u16::<LE>()?;
        let field_len = header.read_u16::<LE>()? as usize;
        let mut field = take(&mut extra_field, field_len, "Truncated extra field")?;

        // Zip64 extended information extra field
        if kind == 0x0001 {
            if metadata.size == u32::MAX as usize {
                metadata.size = to_usize(read_zip64_value(&mut field)?)?;
            }
            if metadata.compressed_size == u32::MAX as usize {
                metadata.compressed_size = to_usize(read_zip64_value(&mut field)?)?;
            }
            if metadata.header_offset == u32::MAX as usize {
                metadata.header_offset = to_usize(read_zip64_value(&mut field)?)?;
            }
            // We already checked that this isn't a multi-disk archive.
            if !field.is_empty() {
                return Err(DzipError::InvalidArchive(
                    "Extra data field contains disk number",
                ));
            }
        }
    }
    Ok(())
}

fn read_zip64_value(field: &mut &[u8]) -> DzipResult<u64> {
    let mut bytes = take(field, 8, "Truncated Zip64 extra field")?;
    Ok(bytes.read_u64::<LE>()?)
}
