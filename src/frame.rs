//! Tabular payloads: a text table and its CSV encoding
//!
//! A [`Frame`] is what `data.csv` decodes to: named columns and rows of
//! text cells, where an empty cell is a missing value. [`Chunks`] decodes
//! the same payload lazily, a bounded number of rows at a time.

use std::io::{Read, Write};
use std::num::NonZeroUsize;

use log::*;

use crate::result::*;

/// A table of text cells. Every row has one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Frame {
    /// Builds a frame, checking that every row is as wide as the header.
    ///
    /// A frame without columns can't have rows: there'd be no header line,
    /// and its empty records wouldn't read back.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> DzipResult<Self> {
        if columns.is_empty() && !rows.is_empty() {
            return Err(DzipError::RowsWithoutColumns(rows.len()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(DzipError::RaggedRow {
                    line: i as u64 + 2,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// A frame with the given columns and no rows.
    pub fn empty<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height(), self.width())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The cells of the named column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &str> + '_> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(move |row| row[index].as_str()))
    }

    /// Appends `other`'s rows. Both frames must have the same columns.
    pub fn extend(&mut self, other: Frame) -> DzipResult<()> {
        if self.columns != other.columns {
            return Err(DzipError::ColumnMismatch {
                expected: self.columns.clone(),
                found: other.columns,
            });
        }
        self.rows.extend(other.rows);
        Ok(())
    }

    /// Concatenates frames top to bottom, e.g. the chunks of a chunked read.
    ///
    /// Returns `None` given no frames.
    pub fn concat<I: IntoIterator<Item = Frame>>(frames: I) -> DzipResult<Option<Frame>> {
        let mut frames = frames.into_iter();
        let Some(mut first) = frames.next() else {
            return Ok(None);
        };
        for frame in frames {
            first.extend(frame)?;
        }
        Ok(Some(first))
    }

    /// Writes the frame as comma-delimited text: a header row, then one line
    /// per row, no index column, `\n` terminators.
    pub fn write_csv<W: Write>(&self, sink: W) -> DzipResult<()> {
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(sink);
        if !self.columns.is_empty() {
            writer.write_record(&self.columns)?;
        }
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Reads a whole CSV payload.
    pub fn read_csv<R: Read>(source: R, options: &CsvOptions) -> DzipResult<Frame> {
        let mut decoder = CsvDecoder::new(source, options)?;
        let mut rows = Vec::new();
        while let Some(row) = decoder.next_row()? {
            rows.push(row);
        }
        Ok(Frame {
            columns: decoder.columns,
            rows,
        })
    }
}

/// Options handed to the CSV decoder as-is.
///
/// Nothing here is validated or interpreted by dzip;
/// they configure [`csv::ReaderBuilder`] directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub quote: u8,
    pub escape: Option<u8>,
    pub double_quote: bool,
    pub comment: Option<u8>,
    /// Trim whitespace around fields and headers
    pub trim: bool,
    /// Accept records shorter than the header (missing cells are empty)
    pub flexible: bool,
    /// If false, the first line is data and columns are named `0`, `1`, ...
    pub has_headers: bool,
    /// Stop after this many rows
    pub nrows: Option<usize>,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            escape: None,
            double_quote: true,
            comment: None,
            trim: false,
            flexible: false,
            has_headers: true,
            nrows: None,
        }
    }
}

impl CsvOptions {
    fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .delimiter(self.delimiter)
            .quote(self.quote)
            .escape(self.escape)
            .double_quote(self.double_quote)
            .comment(self.comment)
            .flexible(self.flexible)
            .has_headers(self.has_headers)
            .trim(if self.trim {
                csv::Trim::All
            } else {
                csv::Trim::None
            });
        builder
    }
}

/// The shared decoding loop of [`Frame::read_csv()`] and [`Chunks`].
struct CsvDecoder<R> {
    reader: csv::Reader<R>,
    columns: Vec<String>,
    record: csv::StringRecord,
    remaining: Option<usize>,
}

impl<R: Read> CsvDecoder<R> {
    fn new(source: R, options: &CsvOptions) -> DzipResult<Self> {
        let mut reader = options.reader_builder().from_reader(source);
        let header = reader.headers()?;
        let columns = if options.has_headers {
            header.iter().map(str::to_owned).collect()
        } else {
            (0..header.len()).map(|i| i.to_string()).collect()
        };
        trace!("CSV columns: {:?}", columns);
        Ok(Self {
            reader,
            columns,
            record: csv::StringRecord::new(),
            remaining: options.nrows,
        })
    }

    fn next_row(&mut self) -> DzipResult<Option<Vec<String>>> {
        if self.remaining == Some(0) || !self.reader.read_record(&mut self.record)? {
            return Ok(None);
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        let width = self.columns.len();
        if self.record.len() > width {
            return Err(DzipError::RaggedRow {
                line: self.record.position().map_or(0, |p| p.line()),
                expected: width,
                found: self.record.len(),
            });
        }
        let mut row: Vec<String> = self.record.iter().map(str::to_owned).collect();
        row.resize(width, String::new());
        Ok(Some(row))
    }
}

/// A lazy, forward-only sequence of frames of at most `chunk_size` rows.
///
/// The iterator owns the member stream it decodes, and through it a handle
/// on the archive's bytes. It's fused: after the last chunk, or after the
/// first error, it only returns `None`.
pub struct Chunks {
    /// `None` once exhausted
    decoder: Option<CsvDecoder<Box<dyn Read + Send>>>,
    chunk_size: NonZeroUsize,
}

impl Chunks {
    pub(crate) fn new(
        source: Box<dyn Read + Send>,
        chunk_size: NonZeroUsize,
        options: &CsvOptions,
    ) -> DzipResult<Self> {
        Ok(Self {
            decoder: Some(CsvDecoder::new(source, options)?),
            chunk_size,
        })
    }

    /// The header of the payload, known before the first chunk is read.
    pub fn columns(&self) -> Option<&[String]> {
        self.decoder.as_ref().map(|d| d.columns.as_slice())
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    /// True once every chunk has been returned (or decoding failed).
    pub fn is_exhausted(&self) -> bool {
        self.decoder.is_none()
    }

    fn next_chunk(decoder: &mut CsvDecoder<Box<dyn Read + Send>>, size: usize) -> DzipResult<Frame> {
        let mut rows = Vec::with_capacity(size);
        while rows.len() < size {
            match decoder.next_row()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(Frame {
            columns: decoder.columns.clone(),
            rows,
        })
    }
}

impl Iterator for Chunks {
    type Item = DzipResult<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        let decoder = self.decoder.as_mut()?;
        match Self::next_chunk(decoder, self.chunk_size.get()) {
            Ok(chunk) if chunk.is_empty() => {
                self.decoder = None;
                None
            }
            Ok(chunk) => {
                trace!("Decoded a chunk of {} rows", chunk.height());
                Some(Ok(chunk))
            }
            Err(e) => {
                self.decoder = None;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for Chunks {}
