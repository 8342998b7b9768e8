//! Reading the case data that follows the dictionary.
//!
//! Every reader yields one case at a time as its raw 8-byte segments,
//! in the file's byte order, so bytecode-compressed and uncompressed files
//! decode the same way downstream.

use std::borrow::Cow;
use std::io::Read;

use flate2::read::ZlibDecoder;
use log::*;

use super::dictionary::{Compression, Dictionary, Endian, Input};
use crate::result::*;

/// Bytecodes of the simple compression scheme
const PADDING: u8 = 0;
const END_OF_FILE: u8 = 252;
const RAW: u8 = 253;
const SPACES: u8 = 254;
const SYSMIS: u8 = 255;

pub struct CaseReader<'a> {
    source: Source<'a>,
    case_size: usize,
    /// Cases left according to the header, if it knows
    remaining: Option<usize>,
    /// Set once the data ran out or failed to decode
    done: bool,
}

enum Source<'a> {
    Raw { data: &'a [u8], offset: usize },
    Bytecode(Bytecode<'a>),
}

impl<'a> CaseReader<'a> {
    pub fn new(bytes: &'a [u8], dictionary: &Dictionary<'a>) -> DzipResult<Self> {
        let header = &dictionary.header;
        let data = &bytes[dictionary.data_offset..];
        let source = match header.compression {
            Compression::None => Source::Raw { data, offset: 0 },
            Compression::Bytecode => Source::Bytecode(Bytecode::new(
                Cow::Borrowed(data),
                header.bias,
                dictionary.sysmis,
                header.endian,
            )),
            Compression::Zlib => Source::Bytecode(Bytecode::new(
                Cow::Owned(inflate_blocks(bytes, dictionary.data_offset, header.endian)?),
                header.bias,
                dictionary.sysmis,
                header.endian,
            )),
        };
        Ok(Self {
            source,
            case_size: dictionary.segments * 8,
            remaining: usize::try_from(header.ncases).ok(),
            done: false,
        })
    }

    fn read_case(&mut self) -> DzipResult<Option<Vec<u8>>> {
        match &mut self.source {
            Source::Raw { data, offset } => {
                let rest = &data[*offset..];
                if rest.len() < self.case_size || self.case_size == 0 {
                    if !rest.is_empty() && self.case_size > 0 {
                        warn!("Ignoring {} trailing bytes after the last case", rest.len());
                    }
                    return Ok(None);
                }
                *offset += self.case_size;
                Ok(Some(rest[..self.case_size].to_vec()))
            }
            Source::Bytecode(bytecode) => bytecode.read_case(self.case_size),
        }
    }
}

impl Iterator for CaseReader<'_> {
    type Item = DzipResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        match self.read_case() {
            Ok(Some(case)) => {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                }
                Some(Ok(case))
            }
            Ok(None) => {
                self.done = true;
                if let Some(remaining) = self.remaining.filter(|r| *r > 0) {
                    warn!("Data ended {} cases short of the header's count", remaining);
                }
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Decompresses the bytecode stream of a `.zsav` from its zlib blocks.
fn inflate_blocks(bytes: &[u8], offset: usize, endian: Endian) -> DzipResult<Vec<u8>> {
    const WHAT: &str = "zlib header";
    let mut header = Input::new(bytes, offset, endian);
    let _zheader_offset = header.i64(WHAT)?;
    let ztrailer_offset = header.i64(WHAT)?;
    let _ztrailer_len = header.i64(WHAT)?;

    const TRAILER: &str = "zlib trailer";
    let ztrailer_offset = usize::try_from(ztrailer_offset)
        .map_err(|_| DzipError::InvalidSav(String::from("Bad zlib trailer offset")))?;
    let mut trailer = Input::new(bytes, ztrailer_offset, endian);
    let _bias = trailer.i64(TRAILER)?;
    let _zero = trailer.i64(TRAILER)?;
    let _block_size = trailer.i32(TRAILER)?;
    let blocks = trailer.count(TRAILER)?;

    let mut inflated = Vec::new();
    for _ in 0..blocks {
        let _uncompressed_offset = trailer.i64(TRAILER)?;
        let compressed_offset = trailer.i64(TRAILER)?;
        let uncompressed_size = trailer.count(TRAILER)?;
        let compressed_size = trailer.count(TRAILER)?;

        let compressed_offset = usize::try_from(compressed_offset)
            .map_err(|_| DzipError::InvalidSav(String::from("Bad zlib block offset")))?;
        let block = Input::new(bytes, compressed_offset, endian).take(compressed_size, "zlib block")?;
        let before = inflated.len();
        ZlibDecoder::new(block).read_to_end(&mut inflated)?;
        if inflated.len() - before != uncompressed_size {
            return Err(DzipError::InvalidSav(format!(
                "zlib block inflated to {} bytes, expected {}",
                inflated.len() - before,
                uncompressed_size
            )));
        }
        trace!("Inflated a {} byte zlib block", compressed_size);
    }
    Ok(inflated)
}

/// The bytecode compression scheme: groups of eight one-byte commands,
/// each followed by the raw segments its commands call for.
struct Bytecode<'a> {
    data: Cow<'a, [u8]>,
    offset: usize,
    commands: [u8; 8],
    /// Index of the next command in `commands`; 8 means fetch more
    next_command: usize,
    bias: f64,
    sysmis: f64,
    endian: Endian,
    finished: bool,
}

impl<'a> Bytecode<'a> {
    fn new(data: Cow<'a, [u8]>, bias: f64, sysmis: f64, endian: Endian) -> Self {
        Self {
            data,
            offset: 0,
            commands: [0; 8],
            next_command: 8,
            bias,
            sysmis,
            endian,
            finished: false,
        }
    }

    fn take_segment(&mut self) -> Option<[u8; 8]> {
        let segment = self.data.get(self.offset..self.offset + 8)?;
        self.offset += 8;
        let mut out = [0; 8];
        out.copy_from_slice(segment);
        Some(out)
    }

    fn next_command(&mut self) -> Option<u8> {
        if self.finished {
            return None;
        }
        if self.next_command == 8 {
            self.commands = self.take_segment()?;
            self.next_command = 0;
        }
        let command = self.commands[self.next_command];
        self.next_command += 1;
        Some(command)
    }

    fn read_case(&mut self, case_size: usize) -> DzipResult<Option<Vec<u8>>> {
        // No variables means no cases, whatever the commands say.
        if case_size == 0 {
            return Ok(None);
        }
        let truncated = || DzipError::InvalidSav(String::from("Compressed data ends inside a case"));
        let mut case = Vec::with_capacity(case_size);
        while case.len() < case_size {
            let command = match self.next_command() {
                Some(END_OF_FILE) => {
                    self.finished = true;
                    None
                }
                other => other,
            };
            match command {
                None if case.is_empty() => return Ok(None),
                None => return Err(truncated()),
                Some(PADDING) => {}
                Some(RAW) => case.extend_from_slice(&self.take_segment().ok_or_else(truncated)?),
                Some(SPACES) => case.extend_from_slice(b"        "),
                Some(SYSMIS) => case.extend_from_slice(&self.endian.f64_bytes(self.sysmis)),
                Some(code) => {
                    let value = code as f64 - self.bias;
                    case.extend_from_slice(&self.endian.f64_bytes(value));
                }
            }
        }
        Ok(Some(case))
    }
}
