//! Parsing the dictionary of a system file: the header and every record
//! up to the 999 terminator that precedes the case data.
//!
//! Text stays undecoded here. The encoding is only known once the whole
//! dictionary has been read (subtype 20 comes after the variables).

use byteorder::{BigEndian as BE, ByteOrder, LittleEndian as LE};
use log::*;

use super::cell::Format;
use crate::result::*;

pub const HEADER_SIZE: usize = 176;

/// Byte order of the file, detected from the header's layout code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn i32(self, bytes: &[u8]) -> i32 {
        match self {
            Endian::Little => LE::read_i32(bytes),
            Endian::Big => BE::read_i32(bytes),
        }
    }

    pub fn i64(self, bytes: &[u8]) -> i64 {
        match self {
            Endian::Little => LE::read_i64(bytes),
            Endian::Big => BE::read_i64(bytes),
        }
    }

    pub fn f64(self, bytes: &[u8]) -> f64 {
        match self {
            Endian::Little => LE::read_f64(bytes),
            Endian::Big => BE::read_f64(bytes),
        }
    }

    pub fn f64_bytes(self, value: f64) -> [u8; 8] {
        let mut out = [0; 8];
        match self {
            Endian::Little => LE::write_f64(&mut out, value),
            Endian::Big => BE::write_f64(&mut out, value),
        }
        out
    }
}

/// A bounds-checked cursor over the file
pub struct Input<'a> {
    bytes: &'a [u8],
    offset: usize,
    endian: Endian,
}

impl<'a> Input<'a> {
    pub fn new(bytes: &'a [u8], offset: usize, endian: Endian) -> Self {
        Self {
            bytes,
            offset,
            endian,
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    pub fn take(&mut self, len: usize, what: &str) -> DzipResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| DzipError::InvalidSav(format!("File ends inside {what}")))?;
        let taken = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(taken)
    }

    pub fn i32(&mut self, what: &str) -> DzipResult<i32> {
        Ok(self.endian.i32(self.take(4, what)?))
    }

    pub fn i64(&mut self, what: &str) -> DzipResult<i64> {
        Ok(self.endian.i64(self.take(8, what)?))
    }

    pub fn f64(&mut self, what: &str) -> DzipResult<f64> {
        Ok(self.endian.f64(self.take(8, what)?))
    }

    pub fn u8(&mut self, what: &str) -> DzipResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    /// A non-negative 32-bit count
    pub fn count(&mut self, what: &str) -> DzipResult<usize> {
        let count = self.i32(what)?;
        usize::try_from(count)
            .map_err(|_| DzipError::InvalidSav(format!("Negative count {count} in {what}")))
    }

    pub fn value(&mut self, what: &str) -> DzipResult<[u8; 8]> {
        let mut value = [0; 8];
        value.copy_from_slice(self.take(8, what)?);
        Ok(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Bytecode,
    Zlib,
}

#[derive(Debug)]
pub struct Header<'a> {
    pub endian: Endian,
    pub nominal_case_size: i32,
    pub compression: Compression,
    /// -1 if unknown
    pub ncases: i32,
    pub bias: f64,
    pub creation_date: &'a [u8],
    pub creation_time: &'a [u8],
    pub file_label: &'a [u8],
}

impl<'a> Header<'a> {
    pub fn parse(bytes: &'a [u8]) -> DzipResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(DzipError::InvalidSav(String::from(
                "Too short to be an SPSS system file",
            )));
        }
        match &bytes[0..4] {
            b"$FL2" | b"$FL3" => {}
            // "$FL2" in EBCDIC
            [0x5b, 0xc6, 0xd3, 0xf2] => {
                return Err(DzipError::UnsupportedSav(String::from(
                    "EBCDIC system files",
                )))
            }
            _ => {
                return Err(DzipError::InvalidSav(String::from(
                    "Not an SPSS system file",
                )))
            }
        }

        let endian = [Endian::Little, Endian::Big]
            .into_iter()
            .find(|e| matches!(e.i32(&bytes[64..68]), 2 | 3))
            .ok_or_else(|| DzipError::InvalidSav(String::from("Unknown layout code")))?;

        let compression = match endian.i32(&bytes[72..76]) {
            0 => Compression::None,
            1 => Compression::Bytecode,
            2 => Compression::Zlib,
            other => {
                return Err(DzipError::UnsupportedSav(format!(
                    "Compression type {other}"
                )))
            }
        };

        let header = Self {
            endian,
            nominal_case_size: endian.i32(&bytes[68..72]),
            compression,
            ncases: endian.i32(&bytes[80..84]),
            bias: endian.f64(&bytes[84..92]),
            creation_date: &bytes[92..101],
            creation_time: &bytes[101..109],
            file_label: &bytes[109..173],
        };
        trace!("{:?}", header);
        Ok(header)
    }
}

/// Missing values declared on a variable, undecoded
#[derive(Debug, Clone, PartialEq)]
pub enum MissingValues {
    None,
    Discrete(Vec<[u8; 8]>),
    Range {
        lo: [u8; 8],
        hi: [u8; 8],
        discrete: Option<[u8; 8]>,
    },
}

/// A variable record (type 2), not counting its continuation records
#[derive(Debug)]
pub struct RawVariable<'a> {
    /// Short name, space-padded
    pub name: &'a [u8],
    /// 0 for numeric variables
    pub width: usize,
    pub label: Option<&'a [u8]>,
    pub print: Format,
    pub missing: MissingValues,
    /// Index of the variable's first 8-byte segment in a case
    pub segment: usize,
    /// How many segments the variable spans
    pub segments: usize,
}

/// A value label record (type 3) and the variables it applies to (type 4)
#[derive(Debug)]
pub struct ValueLabelSet<'a> {
    pub labels: Vec<([u8; 8], &'a [u8])>,
    /// 1-based segment indices, as stored
    pub variables: Vec<usize>,
}

/// Value labels of a long string variable (subtype 21)
#[derive(Debug)]
pub struct LongStringLabels<'a> {
    pub variable: &'a [u8],
    pub labels: Vec<(&'a [u8], &'a [u8])>,
}

/// Measure and display width (subtype 11) of one variable record
#[derive(Debug, Clone, Copy)]
pub struct DisplayParameters {
    pub measure: i32,
    pub width: Option<i32>,
}

#[derive(Debug)]
pub struct Dictionary<'a> {
    pub header: Header<'a>,
    pub variables: Vec<RawVariable<'a>>,
    /// Total 8-byte segments per case
    pub segments: usize,
    pub value_labels: Vec<ValueLabelSet<'a>>,
    pub long_string_labels: Vec<LongStringLabels<'a>>,
    /// 80-byte document lines
    pub documents: Vec<&'a [u8]>,
    pub character_code: Option<i32>,
    pub sysmis: f64,
    /// One entry per variable record, when the file has them
    pub display: Vec<DisplayParameters>,
    pub long_names: Option<&'a [u8]>,
    pub very_long_strings: Option<&'a [u8]>,
    pub encoding: Option<&'a [u8]>,
    /// Offset of the case data, just past the 999 record
    pub data_offset: usize,
}

/// Segments of a string of the given width
fn segments_for(width: usize) -> usize {
    width.div_ceil(8).max(1)
}

impl<'a> Dictionary<'a> {
    pub fn parse(bytes: &'a [u8]) -> DzipResult<Self> {
        let header = Header::parse(bytes)?;
        let mut input = Input::new(bytes, HEADER_SIZE, header.endian);

        let mut dictionary = Dictionary {
            header,
            variables: Vec::new(),
            segments: 0,
            value_labels: Vec::new(),
            long_string_labels: Vec::new(),
            documents: Vec::new(),
            character_code: None,
            sysmis: -f64::MAX,
            display: Vec::new(),
            long_names: None,
            very_long_strings: None,
            encoding: None,
            data_offset: 0,
        };
        // Continuation records still owed by the last string variable
        let mut continuations = 0;
        let mut display_items = Vec::new();

        loop {
            let record_type = input.i32("record type")?;
            match record_type {
                2 => {
                    let record = parse_variable(&mut input, dictionary.segments)?;
                    dictionary.segments += 1;
                    match record {
                        None if continuations > 0 => continuations -= 1,
                        None => {
                            return Err(DzipError::InvalidSav(String::from(
                                "Continuation record without a string variable",
                            )))
                        }
                        Some(_) if continuations > 0 => {
                            return Err(DzipError::InvalidSav(String::from(
                                "String variable is missing continuation records",
                            )))
                        }
                        Some(variable) => {
                            debug!(
                                "Variable {} (width {})",
                                String::from_utf8_lossy(variable.name).trim_end(),
                                variable.width
                            );
                            continuations = variable.segments - 1;
                            dictionary.variables.push(variable);
                        }
                    }
                }
                3 => {
                    let set = parse_value_labels(&mut input)?;
                    trace!("{} value labels for {:?}", set.labels.len(), set.variables);
                    dictionary.value_labels.push(set);
                }
                4 => {
                    return Err(DzipError::InvalidSav(String::from(
                        "Value label variables without value labels",
                    )))
                }
                6 => {
                    let lines = input.count("document record")?;
                    for _ in 0..lines {
                        dictionary.documents.push(input.take(80, "document record")?);
                    }
                }
                7 => parse_extension(&mut input, &mut dictionary, &mut display_items)?,
                999 => {
                    input.i32("dictionary terminator")?;
                    break;
                }
                other => {
                    return Err(DzipError::InvalidSav(format!(
                        "Unknown record type {other} at offset {}",
                        input.offset() - 4
                    )))
                }
            }
        }
        if continuations > 0 {
            return Err(DzipError::InvalidSav(String::from(
                "String variable is missing continuation records",
            )));
        }
        dictionary.data_offset = input.offset();
        dictionary.display = split_display_items(&display_items, dictionary.variables.len());

        let nominal = dictionary.header.nominal_case_size;
        if nominal >= 0 && nominal as usize != dictionary.segments {
            warn!(
                "Header claims {} segments per case, dictionary has {}",
                nominal, dictionary.segments
            );
        }
        Ok(dictionary)
    }
}

/// Parses a variable record, returning `None` for a continuation record.
fn parse_variable<'a>(input: &mut Input<'a>, segment: usize) -> DzipResult<Option<RawVariable<'a>>> {
    const WHAT: &str = "variable record";
    let kind = input.i32(WHAT)?;
    let has_label = input.i32(WHAT)?;
    let missing_count = input.i32(WHAT)?;
    let print = Format::unpack(input.i32(WHAT)?);
    let _write = input.i32(WHAT)?;
    let name = input.take(8, WHAT)?;

    let label = if has_label == 1 {
        let len = input.count(WHAT)?;
        let label = input.take(len, WHAT)?;
        input.take(len.next_multiple_of(4) - len, WHAT)?;
        Some(label)
    } else {
        None
    };

    let missing = match missing_count {
        0 => MissingValues::None,
        1..=3 => MissingValues::Discrete(
            (0..missing_count)
                .map(|_| input.value(WHAT))
                .collect::<DzipResult<_>>()?,
        ),
        -2 | -3 => MissingValues::Range {
            lo: input.value(WHAT)?,
            hi: input.value(WHAT)?,
            discrete: if missing_count == -3 {
                Some(input.value(WHAT)?)
            } else {
                None
            },
        },
        other => {
            return Err(DzipError::InvalidSav(format!(
                "Bad missing value count {other}"
            )))
        }
    };

    let width = match kind {
        -1 => return Ok(None),
        0 => 0,
        1..=255 => kind as usize,
        other => return Err(DzipError::InvalidSav(format!("Bad variable type {other}"))),
    };
    Ok(Some(RawVariable {
        name,
        width,
        label,
        print,
        missing,
        segment,
        segments: segments_for(width),
    }))
}

fn parse_value_labels<'a>(input: &mut Input<'a>) -> DzipResult<ValueLabelSet<'a>> {
    const WHAT: &str = "value label record";
    let count = input.count(WHAT)?;
    let mut labels = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let value = input.value(WHAT)?;
        let len = input.u8(WHAT)? as usize;
        let label = input.take(len, WHAT)?;
        // The length byte and label are padded to a multiple of 8.
        input.take((len + 1).next_multiple_of(8) - len - 1, WHAT)?;
        labels.push((value, label));
    }

    if input.i32(WHAT)? != 4 {
        return Err(DzipError::InvalidSav(String::from(
            "Value labels not followed by their variables",
        )));
    }
    let count = input.count(WHAT)?;
    let variables = (0..count)
        .map(|_| input.count(WHAT))
        .collect::<DzipResult<_>>()?;
    Ok(ValueLabelSet { labels, variables })
}

fn parse_extension<'a>(
    input: &mut Input<'a>,
    dictionary: &mut Dictionary<'a>,
    display_items: &mut Vec<i32>,
) -> DzipResult<()> {
    const WHAT: &str = "extension record";
    let subtype = input.i32(WHAT)?;
    let size = input.count(WHAT)?;
    let count = input.count(WHAT)?;
    let len = size
        .checked_mul(count)
        .ok_or_else(|| DzipError::InvalidSav(String::from("Extension record too large")))?;
    let payload = input.take(len, WHAT)?;
    trace!("Extension subtype {} ({} x {} bytes)", subtype, count, size);

    let endian = dictionary.header.endian;
    match subtype {
        3 if size == 4 && count == 8 => {
            dictionary.character_code = Some(endian.i32(&payload[28..32]));
        }
        4 if size == 8 && count == 3 => {
            dictionary.sysmis = endian.f64(&payload[0..8]);
        }
        11 if size == 4 => {
            display_items.extend(payload.chunks_exact(4).map(|item| endian.i32(item)));
        }
        13 => dictionary.long_names = Some(payload),
        14 => dictionary.very_long_strings = Some(payload),
        20 => dictionary.encoding = Some(payload),
        21 => {
            let mut labels = Input::new(payload, 0, endian);
            while !labels.is_empty() {
                dictionary
                    .long_string_labels
                    .push(parse_long_string_labels(&mut labels)?);
            }
        }
        // Sets, multiple response, product info, attributes, 64-bit case
        // counts, long string missing values and the like aren't needed.
        5 | 6 | 7 | 10 | 12 | 16 | 17 | 18 | 19 | 22 | 24 => {
            debug!("Skipping extension subtype {}", subtype);
        }
        _ => warn!("Skipping unknown extension subtype {}", subtype),
    }
    Ok(())
}

fn parse_long_string_labels<'a>(input: &mut Input<'a>) -> DzipResult<LongStringLabels<'a>> {
    const WHAT: &str = "long string value labels";
    let len = input.count(WHAT)?;
    let variable = input.take(len, WHAT)?;
    let _width = input.count(WHAT)?;
    let count = input.count(WHAT)?;
    let mut labels = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let len = input.count(WHAT)?;
        let value = input.take(len, WHAT)?;
        let len = input.count(WHAT)?;
        let label = input.take(len, WHAT)?;
        labels.push((value, label));
    }
    Ok(LongStringLabels { variable, labels })
}

/// Subtype 11 has two or three items per variable record,
/// depending on whether it carries display widths.
fn split_display_items(items: &[i32], variables: usize) -> Vec<DisplayParameters> {
    if items.is_empty() || variables == 0 {
        return Vec::new();
    }
    let stride = match items.len() / variables {
        3 if items.len() % variables == 0 => 3,
        2 if items.len() % variables == 0 => 2,
        _ => {
            warn!(
                "{} display items don't fit {} variables; ignoring them",
                items.len(),
                variables
            );
            return Vec::new();
        }
    };
    items
        .chunks_exact(stride)
        .map(|item| DisplayParameters {
            measure: item[0],
            width: (stride == 3).then_some(item[1]),
        })
        .collect()
}
