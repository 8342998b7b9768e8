//! Reading dzip archives
//!
//! A [`DzipFile`] wraps the bytes of an archive. Every accessor parses a
//! fresh [`ZipArchive`] view over them; members come back as [`Member`]
//! guards that release the archive when dropped, whether the caller
//! finished normally, bailed out with `?`, or panicked.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::*;

use crate::frame::{Chunks, CsvOptions, Frame};
use crate::metadata::Metadata;
use crate::read::{MemberStream, ZipArchive};
use crate::result::*;
use crate::size::sizeof_fmt;

/// Name of the CSV payload member
pub const DATA_MEMBER: &str = "data.csv";
/// Name of the JSON metadata member
pub const META_MEMBER: &str = "meta.json";

/// Where the bytes of an archive come from
#[derive(Debug, Clone)]
pub enum Source {
    /// A file, read into memory up front
    Path(PathBuf),
    /// A buffer shared with the caller
    Buffer(Arc<[u8]>),
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(path.into())
    }
}

impl From<String> for Source {
    fn from(path: String) -> Self {
        Source::Path(path.into())
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_owned())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<Arc<[u8]>> for Source {
    fn from(bytes: Arc<[u8]>) -> Self {
        Source::Buffer(bytes)
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Buffer(bytes.into())
    }
}

impl From<&[u8]> for Source {
    fn from(bytes: &[u8]) -> Self {
        Source::Buffer(bytes.into())
    }
}

/// An open member of the archive.
///
/// The guard owns its stream (and through it the bytes);
/// dropping it closes the member.
pub struct Member {
    name: &'static str,
    stream: MemberStream,
}

impl Member {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Read for Member {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member").field("name", &self.name).finish()
    }
}

impl Drop for Member {
    fn drop(&mut self) {
        trace!("Closing {}", self.name);
    }
}

/// Decoded `data.csv`: all at once, or chunk by chunk
pub enum Table {
    Frame(Frame),
    Chunks(Chunks),
}

impl Table {
    /// Collects the table into one frame, draining chunks if need be.
    ///
    /// A chunked read of an empty payload has no chunks to take the columns
    /// from, so it collects to a frame with the columns the decoder saw.
    pub fn into_frame(self) -> DzipResult<Frame> {
        match self {
            Table::Frame(frame) => Ok(frame),
            Table::Chunks(chunks) => {
                let columns = chunks.columns().map(<[String]>::to_vec).unwrap_or_default();
                let chunks = chunks.collect::<DzipResult<Vec<_>>>()?;
                Ok(Frame::concat(chunks)?.unwrap_or_else(|| Frame::empty(columns)))
            }
        }
    }
}

/// A dzip archive held in memory.
pub struct DzipFile {
    bytes: Arc<[u8]>,
    compressed_size: u64,
}

impl DzipFile {
    /// Opens an archive from a path or a buffer.
    ///
    /// Paths are read into memory right away.
    /// Fails if the bytes aren't a ZIP archive.
    pub fn new<S: Into<Source>>(source: S) -> DzipResult<Self> {
        let bytes = match source.into() {
            Source::Path(path) => Self::load_bytes(&path)?,
            Source::Buffer(bytes) => bytes,
        };
        // Parse once up front so garbage fails here instead of on first use.
        let compressed_size = ZipArchive::new(bytes.clone())?.compressed_size();
        Ok(Self {
            bytes,
            compressed_size,
        })
    }

    /// Reads the archive at `path` into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> DzipResult<Self> {
        Self::new(path.as_ref())
    }

    /// Wraps a buffer, sharing it with the caller.
    pub fn from_bytes<B: Into<Arc<[u8]>>>(bytes: B) -> DzipResult<Self> {
        Self::new(Source::Buffer(bytes.into()))
    }

    fn load_bytes(path: &Path) -> DzipResult<Arc<[u8]>> {
        debug!("Reading {}", path.display());
        Ok(fs::read(path)?.into())
    }

    /// The archive's bytes
    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    /// A fresh view of the archive. Nothing is cached between calls.
    pub fn zip(&self) -> DzipResult<ZipArchive> {
        ZipArchive::new(self.bytes.clone())
    }

    fn open_member(archive: &ZipArchive, name: &'static str) -> DzipResult<Member> {
        let entry = archive.by_name(name)?;
        trace!("Opening {}", name);
        Ok(Member {
            name,
            stream: archive.read(entry)?,
        })
    }

    /// Opens `data.csv`, undecoded.
    pub fn open_data(&self) -> DzipResult<Member> {
        Self::open_member(&self.zip()?, DATA_MEMBER)
    }

    /// Opens `meta.json`, undecoded.
    pub fn open_meta(&self) -> DzipResult<Member> {
        Self::open_member(&self.zip()?, META_MEMBER)
    }

    /// Reads and decodes `meta.json`.
    pub fn meta(&self) -> DzipResult<Metadata> {
        decode_meta(self.open_meta()?)
    }

    /// Decodes all of `data.csv` into one frame.
    pub fn to_frame(&self, options: &CsvOptions) -> DzipResult<Frame> {
        Frame::read_csv(self.open_data()?, options)
    }

    /// Decodes `data.csv` lazily, at most `chunk_size` rows at a time.
    pub fn to_chunks(&self, chunk_size: NonZeroUsize, options: &CsvOptions) -> DzipResult<Chunks> {
        let member = self.open_data()?;
        Chunks::new(Box::new(member), chunk_size, options)
    }

    /// Decodes `data.csv`, chunked if `chunk_size` is given.
    pub fn to_table(
        &self,
        chunk_size: Option<NonZeroUsize>,
        options: &CsvOptions,
    ) -> DzipResult<Table> {
        match chunk_size {
            None => self.to_frame(options).map(Table::Frame),
            Some(size) => self.to_chunks(size, options).map(Table::Chunks),
        }
    }

    /// Decodes both members: the whole payload and its metadata.
    pub fn extract(&self) -> DzipResult<(Frame, Metadata)> {
        Ok((self.to_frame(&CsvOptions::default())?, self.meta()?))
    }

    /// Opens `data.csv` undecoded alongside the decoded metadata,
    /// both from the same view of the archive.
    pub fn load(&self) -> DzipResult<(Member, Metadata)> {
        let archive = self.zip()?;
        let data = Self::open_member(&archive, DATA_MEMBER)?;
        let meta = decode_meta(Self::open_member(&archive, META_MEMBER)?)?;
        Ok((data, meta))
    }

    /// The total compressed size of every member
    pub fn compressed_size(&self) -> u64 {
        self.compressed_size
    }
}

fn decode_meta(mut member: Member) -> DzipResult<Metadata> {
    let mut json = Vec::new();
    member.read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

impl fmt::Display for DzipFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DzipFile object of size={}",
            sizeof_fmt(self.compressed_size as f64)
        )
    }
}

impl fmt::Debug for DzipFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DzipFile")
            .field("len", &self.bytes.len())
            .field("compressed_size", &self.compressed_size)
            .finish()
    }
}

/// How [`read_dzip()`] should decode the payload
#[derive(Debug, Clone, Default)]
pub struct DzipReadOptions {
    /// Skip `data.csv`; return empty frame with the metadata's columns
    pub metadata_only: bool,
    /// Decode in chunks of this many rows
    pub chunk_size: Option<NonZeroUsize>,
    /// Passed to the CSV decoder
    pub csv: CsvOptions,
}

/// Reads a dzip archive: the metadata, and the payload as asked.
///
/// ```no_run
/// # use dzip::{read_dzip, DzipReadOptions};
/// let (table, meta) = read_dzip("survey.dzip", &DzipReadOptions::default())?;
/// let frame = table.into_frame()?;
/// assert_eq!(frame.width() as u64, meta.number_columns);
/// # Ok::<(), dzip::result::DzipError>(())
/// ```
pub fn read_dzip<S: Into<Source>>(
    source: S,
    options: &DzipReadOptions,
) -> DzipResult<(Table, Metadata)> {
    let file = DzipFile::new(source)?;
    let meta = file.meta()?;

    if options.metadata_only {
        let frame = Frame::empty(meta.column_names());
        return Ok((Table::Frame(frame), meta));
    }

    Ok((file.to_table(options.chunk_size, &options.csv)?, meta))
}
