//! A reader for SPSS system files (`.sav` and `.zsav`)
//!
//! [`read_sav()`] decodes a system file into a [`Frame`] of text cells and a
//! [`SavMetadata`] describing its variables. Cells follow what pandas would
//! write for the same data: numbers as Python floats (`1.0`), missing
//! values as empty cells, dates as ISO 8601 text.
//!
//! ```no_run
//! # use dzip::sav::{read_sav, SavOptions};
//! # use dzip::Metadata;
//! let (frame, sav_meta) = read_sav("survey.sav", &SavOptions::default())?;
//! let meta = Metadata::from_config(&sav_meta)?;
//! assert_eq!(frame.width() as u64, meta.number_columns);
//! # Ok::<(), dzip::result::DzipError>(())
//! ```

mod cases;
mod cell;
mod dictionary;

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use encoding_rs::Encoding;
use indexmap::IndexMap;
use log::*;

use crate::frame::Frame;
use crate::metadata::{MetadataContainer, ValueLabels};
use crate::result::*;
use cases::CaseReader;
use cell::{render_number, repr_f64, Format};
use dictionary::{Dictionary, Endian, MissingValues, RawVariable};

/// Width of each piece of a very long string, but the last
const VERY_LONG_STRING_SEGMENT: usize = 252;

/// How to decode a system file
#[derive(Debug, Clone, Default)]
pub struct SavOptions {
    /// Read the dictionary only; the frame has no rows
    pub metadata_only: bool,
    /// Skip this many cases
    pub row_offset: usize,
    /// Decode at most this many cases
    pub row_limit: Option<usize>,
    /// Keep user-missing values instead of blanking them
    pub user_missing: bool,
    /// Show date, datetime and time values as plain numbers
    pub disable_datetime_conversion: bool,
    /// Overrides the file's own character encoding
    pub encoding: Option<&'static Encoding>,
}

/// Measurement level of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    Unknown,
    Nominal,
    Ordinal,
    Scale,
}

impl Measure {
    fn from_code(code: i32) -> Self {
        match code {
            1 => Measure::Nominal,
            2 => Measure::Ordinal,
            3 => Measure::Scale,
            _ => Measure::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Measure::Unknown => "unknown",
            Measure::Nominal => "nominal",
            Measure::Ordinal => "ordinal",
            Measure::Scale => "scale",
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-missing value or range of values.
///
/// A discrete numeric value is a range with `lo == hi`.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingRange {
    Numeric { lo: f64, hi: f64 },
    Text(String),
}

impl MissingRange {
    fn contains(&self, value: f64) -> bool {
        match self {
            MissingRange::Numeric { lo, hi } => *lo <= value && value <= *hi,
            MissingRange::Text(_) => false,
        }
    }
}

/// Everything the dictionary of a system file says about its data
#[derive(Debug, Clone, PartialEq)]
pub struct SavMetadata {
    pub column_names: Vec<String>,
    /// Empty for unlabelled columns
    pub column_names_to_labels: IndexMap<String, String>,
    pub variable_value_labels: IndexMap<String, ValueLabels>,
    /// Cases decoded, or with `metadata_only`, cases the file holds
    pub number_rows: u64,
    pub number_columns: u64,
    pub file_label: String,
    pub file_encoding: String,
    pub creation_time: Option<NaiveDateTime>,
    /// Document lines
    pub notes: Vec<String>,
    /// Print formats, e.g. `F8.2` or `A20`
    pub original_variable_types: IndexMap<String, String>,
    pub variable_measure: IndexMap<String, Measure>,
    pub variable_display_width: IndexMap<String, u32>,
    /// Only columns with user-missing values have an entry.
    pub missing_ranges: IndexMap<String, Vec<MissingRange>>,
}

impl MetadataContainer for SavMetadata {
    fn variable_value_labels(&self) -> &IndexMap<String, ValueLabels> {
        &self.variable_value_labels
    }

    fn column_names_to_labels(&self) -> &IndexMap<String, String> {
        &self.column_names_to_labels
    }

    fn number_rows(&self) -> u64 {
        self.number_rows
    }

    fn number_columns(&self) -> u64 {
        self.number_columns
    }
}

/// Reads and decodes the system file at `path`.
pub fn read_sav<P: AsRef<Path>>(path: P, options: &SavOptions) -> DzipResult<(Frame, SavMetadata)> {
    let path = path.as_ref();
    debug!("Reading {}", path.display());
    let bytes = fs::read(path)?;
    read_sav_bytes(&bytes, options)
}

/// Decodes a system file held in memory.
pub fn read_sav_bytes(bytes: &[u8], options: &SavOptions) -> DzipResult<(Frame, SavMetadata)> {
    let dictionary = Dictionary::parse(bytes)?;
    let encoding = pick_encoding(&dictionary, options);
    let text = |bytes: &[u8]| decode(encoding, bytes);
    let variables = merge_variables(&dictionary, &text)?;
    let endian = dictionary.header.endian;

    let mut meta = SavMetadata {
        column_names: variables.iter().map(|v| v.name.clone()).collect(),
        column_names_to_labels: variables
            .iter()
            .map(|v| (v.name.clone(), v.label.clone()))
            .collect(),
        variable_value_labels: IndexMap::new(),
        number_rows: 0,
        number_columns: variables.len() as u64,
        file_label: text(dictionary.header.file_label),
        file_encoding: encoding.name().to_owned(),
        creation_time: creation_time(&dictionary),
        notes: dictionary.documents.iter().map(|line| text(*line)).collect(),
        original_variable_types: variables
            .iter()
            .map(|v| (v.name.clone(), v.describe_format()))
            .collect(),
        variable_measure: IndexMap::new(),
        variable_display_width: IndexMap::new(),
        missing_ranges: variables
            .iter()
            .filter(|v| !v.missing.is_empty())
            .map(|v| (v.name.clone(), v.missing.clone()))
            .collect(),
    };

    for variable in &variables {
        if let Some(display) = dictionary.display.get(variable.raw_index) {
            meta.variable_measure
                .insert(variable.name.clone(), Measure::from_code(display.measure));
            if let Some(width) = display.width.and_then(|w| u32::try_from(w).ok()) {
                meta.variable_display_width
                    .insert(variable.name.clone(), width);
            }
        }
    }
    meta.variable_value_labels = value_labels(&dictionary, &variables, &text, endian);

    let limit = options.row_limit.unwrap_or(usize::MAX);
    let columns = meta.column_names.clone();
    let declared = usize::try_from(dictionary.header.ncases).ok();

    if options.metadata_only {
        let rows = match declared {
            Some(count) => count.saturating_sub(options.row_offset).min(limit),
            // The header doesn't know, so count them.
            None => {
                let mut count = 0;
                for case in skip_cases(CaseReader::new(bytes, &dictionary)?, options.row_offset)?
                    .take(limit)
                {
                    case?;
                    count += 1;
                }
                count
            }
        };
        meta.number_rows = rows as u64;
        info!("Read the dictionary of {} columns", meta.number_columns);
        return Ok((Frame::empty(columns), meta));
    }

    let cases = skip_cases(CaseReader::new(bytes, &dictionary)?, options.row_offset)?;

    let render = CellRenderer {
        endian,
        sysmis: dictionary.sysmis,
        user_missing: options.user_missing,
        convert_dates: !options.disable_datetime_conversion,
        encoding,
    };
    let mut rows = Vec::new();
    for case in cases.take(limit) {
        let case = case?;
        rows.push(
            variables
                .iter()
                .map(|variable| render.cell(variable, &case))
                .collect(),
        );
    }
    meta.number_rows = rows.len() as u64;
    info!(
        "Decoded {} rows of {} columns",
        meta.number_rows, meta.number_columns
    );
    Ok((Frame::new(columns, rows)?, meta))
}

fn skip_cases(mut cases: CaseReader<'_>, count: usize) -> DzipResult<CaseReader<'_>> {
    for _ in 0..count {
        if cases.next().transpose()?.is_none() {
            break;
        }
    }
    Ok(cases)
}

fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _) = encoding.decode_without_bom_handling(bytes);
    text.trim_end_matches([' ', '\0']).to_owned()
}

/// The options' encoding, else the one the file names,
/// else its code page, else windows-1252.
fn pick_encoding(dictionary: &Dictionary, options: &SavOptions) -> &'static Encoding {
    if let Some(encoding) = options.encoding {
        return encoding;
    }
    if let Some(label) = dictionary.encoding {
        match Encoding::for_label(label.trim_ascii()) {
            Some(encoding) => return encoding,
            None => warn!("Unknown encoding {}", String::from_utf8_lossy(label)),
        }
    }
    if let Some(encoding) = dictionary.character_code.and_then(encoding_for_code_page) {
        return encoding;
    }
    encoding_rs::WINDOWS_1252
}

fn encoding_for_code_page(code: i32) -> Option<&'static Encoding> {
    match code {
        65001 => Some(encoding_rs::UTF_8),
        // 7-bit ASCII, generic 8-bit ASCII, Latin-1
        2 | 3 | 20127 | 28591 | 1252 => Some(encoding_rs::WINDOWS_1252),
        874 => Some(encoding_rs::WINDOWS_874),
        932 => Some(encoding_rs::SHIFT_JIS),
        936 => Some(encoding_rs::GBK),
        949 => Some(encoding_rs::EUC_KR),
        950 => Some(encoding_rs::BIG5),
        1250..=1258 => Encoding::for_label(format!("windows-{code}").as_bytes()),
        28592..=28606 => Encoding::for_label(format!("iso-8859-{}", code - 28590).as_bytes()),
        _ => None,
    }
}

fn creation_time(dictionary: &Dictionary) -> Option<NaiveDateTime> {
    let date = String::from_utf8_lossy(dictionary.header.creation_date);
    let time = String::from_utf8_lossy(dictionary.header.creation_time);
    NaiveDateTime::parse_from_str(&format!("{} {}", date.trim(), time.trim()), "%d %b %y %H:%M:%S")
        .ok()
}

/// A column of the frame: one variable record, or several for a very long string
#[derive(Debug)]
struct Variable {
    name: String,
    label: String,
    /// 0 for numeric variables
    width: usize,
    format: Format,
    missing: Vec<MissingRange>,
    /// Byte offset into the case and bytes used, per piece
    pieces: Vec<(usize, usize)>,
    /// Index of the first variable record
    raw_index: usize,
}

impl Variable {
    fn describe_format(&self) -> String {
        if self.width > 0 {
            format!("A{}", self.width)
        } else {
            self.format.describe()
        }
    }
}

/// Parses `KEY=value` pairs separated by `separator`.
fn parse_pairs(text: &str, separator: char) -> HashMap<String, String> {
    text.split(separator)
        .filter_map(|pair| {
            let (key, value) = pair.trim_matches(['\0', '\t']).split_once('=')?;
            Some((key.trim_end().to_owned(), value.trim_matches('\0').to_owned()))
        })
        .collect()
}

/// Applies long names and merges very long strings into single columns.
fn merge_variables(
    dictionary: &Dictionary,
    text: &dyn Fn(&[u8]) -> String,
) -> DzipResult<Vec<Variable>> {
    let long_names = dictionary
        .long_names
        .map(|bytes| parse_pairs(&text(bytes), '\t'))
        .unwrap_or_default();
    let very_long_strings: HashMap<String, usize> = dictionary
        .very_long_strings
        .map(|bytes| parse_pairs(&text(bytes), '\t'))
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(name, width)| Some((name, width.trim().parse().ok()?)))
        .collect();

    let raw = &dictionary.variables;
    let mut variables = Vec::with_capacity(raw.len());
    let mut index = 0;
    while index < raw.len() {
        let first = &raw[index];
        let short_name = text(first.name);

        let (width, pieces) = match very_long_strings.get(&short_name) {
            Some(&width) if first.width > 0 && width > 255 => {
                let count = width.div_ceil(VERY_LONG_STRING_SEGMENT);
                let segments = raw.get(index..index + count).ok_or_else(|| {
                    DzipError::InvalidSav(format!("Very long string {short_name} runs off the end"))
                })?;
                let pieces = segments
                    .iter()
                    .enumerate()
                    .map(|(i, segment)| {
                        let used = if i + 1 < count {
                            VERY_LONG_STRING_SEGMENT
                        } else {
                            width - VERY_LONG_STRING_SEGMENT * (count - 1)
                        };
                        if segment.width == 0 || used > segment.segments * 8 {
                            return Err(DzipError::InvalidSav(format!(
                                "Bad segment {i} of very long string {short_name}"
                            )));
                        }
                        Ok((segment.segment * 8, used))
                    })
                    .collect::<DzipResult<_>>()?;
                (width, pieces)
            }
            _ => {
                let used = if first.width == 0 { 8 } else { first.width };
                (first.width, vec![(first.segment * 8, used)])
            }
        };

        let consumed = pieces.len();
        let name = long_names.get(&short_name).cloned().unwrap_or(short_name);
        debug!("Column {} (width {}, {} pieces)", name, width, consumed);
        variables.push(Variable {
            label: first.label.map(text).unwrap_or_default(),
            width,
            format: first.print,
            missing: missing_ranges(first, dictionary, text),
            pieces,
            raw_index: index,
            name,
        });
        index += consumed;
    }
    Ok(variables)
}

fn missing_ranges(
    variable: &RawVariable,
    dictionary: &Dictionary,
    text: &dyn Fn(&[u8]) -> String,
) -> Vec<MissingRange> {
    let endian = dictionary.header.endian;
    let value = |raw: &[u8; 8]| {
        if variable.width == 0 {
            let value = endian.f64(raw);
            MissingRange::Numeric { lo: value, hi: value }
        } else {
            MissingRange::Text(text(&raw[..]))
        }
    };
    match &variable.missing {
        MissingValues::None => Vec::new(),
        MissingValues::Discrete(values) => values.iter().map(value).collect(),
        MissingValues::Range { lo, hi, discrete } => {
            let mut ranges = vec![MissingRange::Numeric {
                lo: endian.f64(lo),
                hi: endian.f64(hi),
            }];
            ranges.extend(discrete.iter().map(value));
            ranges
        }
    }
}

/// Value labels by column, keyed by the values as they appear in cells
fn value_labels(
    dictionary: &Dictionary,
    variables: &[Variable],
    text: &dyn Fn(&[u8]) -> String,
    endian: Endian,
) -> IndexMap<String, ValueLabels> {
    // Label sets refer to variables by (1-based) segment index.
    let by_segment: HashMap<usize, &Variable> = variables
        .iter()
        .map(|v| (dictionary.variables[v.raw_index].segment + 1, v))
        .collect();

    let mut labels: IndexMap<String, ValueLabels> = IndexMap::new();
    for set in &dictionary.value_labels {
        for index in &set.variables {
            let Some(variable) = by_segment.get(index) else {
                warn!("Value labels for a nonexistent variable {}", index);
                continue;
            };
            let column = labels.entry(variable.name.clone()).or_default();
            for (value, label) in &set.labels {
                let key = if variable.width == 0 {
                    repr_f64(endian.f64(value))
                } else {
                    text(&value[..])
                };
                column.insert(key, text(label));
            }
        }
    }

    for set in &dictionary.long_string_labels {
        let name = text(set.variable);
        let Some(variable) = variables.iter().find(|v| v.name == name) else {
            warn!("Long string value labels for a nonexistent variable {}", name);
            continue;
        };
        let column = labels.entry(variable.name.clone()).or_default();
        for (value, label) in &set.labels {
            column.insert(text(value), text(label));
        }
    }
    labels
}

struct CellRenderer {
    endian: Endian,
    sysmis: f64,
    user_missing: bool,
    convert_dates: bool,
    encoding: &'static Encoding,
}

impl CellRenderer {
    fn cell(&self, variable: &Variable, case: &[u8]) -> String {
        if variable.width > 0 {
            let mut bytes = Vec::with_capacity(variable.width);
            for &(offset, used) in &variable.pieces {
                bytes.extend_from_slice(&case[offset..offset + used]);
            }
            return decode(self.encoding, &bytes);
        }

        let (offset, _) = variable.pieces[0];
        let value = self.endian.f64(&case[offset..offset + 8]);
        if value == self.sysmis || value.is_nan() {
            return String::new();
        }
        if !self.user_missing && variable.missing.iter().any(|m| m.contains(value)) {
            return String::new();
        }
        render_number(value, variable.format, self.convert_dates)
    }
}
