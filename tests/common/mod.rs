//! Builds small SPSS system files for tests.

#![allow(dead_code)]

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use flate2::write::ZlibEncoder;

pub const SYSMIS: f64 = -f64::MAX;

/// `F8.2`
pub const F8_2: i32 = (5 << 16) | (8 << 8) | 2;
/// `F8.0`
pub const F8_0: i32 = (5 << 16) | (8 << 8);
/// `DATE11`
pub const DATE11: i32 = (20 << 16) | (11 << 8);
/// `DATETIME20`
pub const DATETIME20: i32 = (22 << 16) | (20 << 8);
/// `TIME8`
pub const TIME8: i32 = (21 << 16) | (8 << 8);

/// Seconds from 1582-10-14 to 2020-01-02
pub const JAN_2_2020: f64 = 13_797_302_400.0;

const BIAS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Bytecode,
    Zlib,
}

#[derive(Debug, Clone)]
pub enum Cell {
    Num(f64),
    Str(String),
}

pub fn num(value: f64) -> Cell {
    Cell::Num(value)
}

pub fn text(value: &str) -> Cell {
    Cell::Str(value.to_owned())
}

#[derive(Debug, Clone)]
pub enum Missing {
    None,
    Discrete(Vec<f64>),
    Range(f64, f64),
    Strings(Vec<String>),
}

#[derive(Debug, Clone)]
struct Column {
    /// Short names of each variable record
    names: Vec<String>,
    /// 0 for numeric, else the logical string width
    width: usize,
    /// Width of each variable record
    pieces: Vec<usize>,
    label: Option<String>,
    format: i32,
    missing: Missing,
}

pub struct SavBuilder {
    big_endian: bool,
    compression: Compression,
    columns: Vec<Column>,
    value_labels: Vec<(Vec<String>, Vec<(Cell, String)>)>,
    long_string_labels: Vec<(String, usize, Vec<(String, String)>)>,
    long_names: Vec<(String, String)>,
    encoding: Option<String>,
    character_code: Option<i32>,
    display: Option<Vec<(i32, i32)>>,
    documents: Vec<String>,
    file_label: String,
    declared_cases: Option<i32>,
    rows: Vec<Vec<Cell>>,
}

impl Default for SavBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SavBuilder {
    pub fn new() -> Self {
        Self {
            big_endian: false,
            compression: Compression::None,
            columns: Vec::new(),
            value_labels: Vec::new(),
            long_string_labels: Vec::new(),
            long_names: Vec::new(),
            encoding: None,
            character_code: None,
            display: None,
            documents: Vec::new(),
            file_label: String::new(),
            declared_cases: None,
            rows: Vec::new(),
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.big_endian = true;
        self
    }

    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn numeric(mut self, name: &str, label: Option<&str>, format: i32) -> Self {
        self.columns.push(Column {
            names: vec![name.to_owned()],
            width: 0,
            pieces: vec![0],
            label: label.map(str::to_owned),
            format,
            missing: Missing::None,
        });
        self
    }

    pub fn string(mut self, name: &str, width: usize, label: Option<&str>) -> Self {
        assert!((1..=255).contains(&width));
        self.columns.push(Column {
            names: vec![name.to_owned()],
            width,
            pieces: vec![width],
            label: label.map(str::to_owned),
            format: (1 << 16) | ((width as i32) << 8),
            missing: Missing::None,
        });
        self
    }

    /// A string wider than 255 bytes, split over several variable records
    pub fn very_long_string(mut self, name: &str, width: usize) -> Self {
        assert!(width > 255);
        let count = width.div_ceil(252);
        let mut pieces = vec![255; count];
        pieces[count - 1] = width - 252 * (count - 1);
        let names = (0..count)
            .map(|i| {
                if i == 0 {
                    name.to_owned()
                } else {
                    format!("{}{}", &name[..name.len().min(5)], i)
                }
            })
            .collect();
        self.columns.push(Column {
            names,
            width,
            pieces,
            label: None,
            format: (1 << 16) | (255 << 8),
            missing: Missing::None,
        });
        self
    }

    pub fn missing(mut self, name: &str, missing: Missing) -> Self {
        let column = self
            .columns
            .iter_mut()
            .find(|c| c.names[0] == name)
            .expect("no such column");
        column.missing = missing;
        self
    }

    pub fn value_labels(mut self, variables: &[&str], labels: Vec<(Cell, &str)>) -> Self {
        self.value_labels.push((
            variables.iter().map(|v| v.to_string()).collect(),
            labels.into_iter().map(|(v, l)| (v, l.to_owned())).collect(),
        ));
        self
    }

    pub fn long_string_labels(mut self, variable: &str, width: usize, labels: &[(&str, &str)]) -> Self {
        self.long_string_labels.push((
            variable.to_owned(),
            width,
            labels
                .iter()
                .map(|(v, l)| (v.to_string(), l.to_string()))
                .collect(),
        ));
        self
    }

    pub fn long_name(mut self, short: &str, long: &str) -> Self {
        self.long_names.push((short.to_owned(), long.to_owned()));
        self
    }

    pub fn encoding(mut self, name: &str) -> Self {
        self.encoding = Some(name.to_owned());
        self
    }

    pub fn character_code(mut self, code: i32) -> Self {
        self.character_code = Some(code);
        self
    }

    /// Measure and display width of each variable record
    pub fn display(mut self, items: &[(i32, i32)]) -> Self {
        self.display = Some(items.to_vec());
        self
    }

    pub fn document(mut self, line: &str) -> Self {
        self.documents.push(line.to_owned());
        self
    }

    pub fn file_label(mut self, label: &str) -> Self {
        self.file_label = label.to_owned();
        self
    }

    /// Overrides the case count in the header (-1 for unknown).
    pub fn declared_cases(mut self, count: i32) -> Self {
        self.declared_cases = Some(count);
        self
    }

    pub fn row(mut self, cells: Vec<Cell>) -> Self {
        assert_eq!(cells.len(), self.columns.len());
        self.rows.push(cells);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Out {
            bytes: Vec::new(),
            big_endian: self.big_endian,
        };
        let segments: usize = self
            .columns
            .iter()
            .flat_map(|c| c.pieces.iter())
            .map(|w| segments_for(*w))
            .sum();

        // Header
        out.raw(if self.compression == Compression::Zlib {
            b"$FL3"
        } else {
            b"$FL2"
        });
        out.padded(b"@(#) SPSS DATA FILE - dzip test suite", 60);
        out.i32(2);
        out.i32(segments as i32);
        out.i32(match self.compression {
            Compression::None => 0,
            Compression::Bytecode => 1,
            Compression::Zlib => 2,
        });
        out.i32(0);
        out.i32(self.declared_cases.unwrap_or(self.rows.len() as i32));
        out.f64(BIAS);
        out.raw(b"14 Oct 26");
        out.raw(b"12:30:00");
        out.padded(self.file_label.as_bytes(), 64);
        out.raw(&[0; 3]);

        // Variables
        for column in &self.columns {
            for (i, (name, &width)) in column.names.iter().zip(&column.pieces).enumerate() {
                let first = i == 0;
                out.i32(2);
                out.i32(width as i32);
                let label = column.label.as_ref().filter(|_| first);
                out.i32(label.is_some() as i32);
                let missing: Vec<[u8; 8]> = match (&column.missing, first) {
                    (Missing::Discrete(values), true) => {
                        values.iter().map(|v| out.f64_bytes(*v)).collect()
                    }
                    (Missing::Range(lo, hi), true) => vec![out.f64_bytes(*lo), out.f64_bytes(*hi)],
                    (Missing::Strings(values), true) => {
                        values.iter().map(|v| spaces8(v.as_bytes())).collect()
                    }
                    _ => Vec::new(),
                };
                out.i32(match column.missing {
                    Missing::Range(..) if first => -2,
                    _ => missing.len() as i32,
                });
                out.i32(column.format);
                out.i32(column.format);
                out.padded(name.as_bytes(), 8);
                if let Some(label) = label {
                    out.i32(label.len() as i32);
                    out.raw(label.as_bytes());
                    out.raw(&vec![0; label.len().next_multiple_of(4) - label.len()]);
                }
                for value in &missing {
                    out.raw(value);
                }
                for _ in 1..segments_for(width) {
                    out.i32(2);
                    out.i32(-1);
                    out.i32(0);
                    out.i32(0);
                    out.i32(0);
                    out.i32(0);
                    out.raw(b"        ");
                }
            }
        }

        // Value labels
        for (variables, labels) in &self.value_labels {
            out.i32(3);
            out.i32(labels.len() as i32);
            for (value, label) in labels {
                let value = match value {
                    Cell::Num(v) => out.f64_bytes(*v),
                    Cell::Str(s) => spaces8(s.as_bytes()),
                };
                out.raw(&value);
                out.raw(&[label.len() as u8]);
                out.raw(label.as_bytes());
                let padding = (label.len() + 1).next_multiple_of(8) - label.len() - 1;
                out.raw(&vec![b' '; padding]);
            }
            out.i32(4);
            out.i32(variables.len() as i32);
            for variable in variables {
                out.i32(self.dictionary_index(variable) as i32);
            }
        }

        // Documents
        if !self.documents.is_empty() {
            out.i32(6);
            out.i32(self.documents.len() as i32);
            for line in &self.documents {
                out.padded(line.as_bytes(), 80);
            }
        }

        // Extensions
        if let Some(code) = self.character_code {
            let mut payload = Out::like(&out);
            for item in [1, 0, 0, -1, 1, 1, 2, code] {
                payload.i32(item);
            }
            out.extension(3, 4, 8, &payload.bytes);
        }
        let mut floats = Out::like(&out);
        floats.f64(SYSMIS);
        floats.f64(f64::MAX);
        floats.f64(-f64::MAX);
        out.extension(4, 8, 3, &floats.bytes);

        if let Some(items) = &self.display {
            let mut payload = Out::like(&out);
            for (measure, width) in items {
                payload.i32(*measure);
                payload.i32(*width);
                payload.i32(0);
            }
            out.extension(11, 4, items.len() * 3, &payload.bytes);
        }
        if !self.long_names.is_empty() {
            let text = self
                .long_names
                .iter()
                .map(|(short, long)| format!("{short}={long}"))
                .collect::<Vec<_>>()
                .join("\t");
            out.extension(13, 1, text.len(), text.as_bytes());
        }
        let very_long: String = self
            .columns
            .iter()
            .filter(|c| c.width > 255)
            .map(|c| format!("{}={:05}\0\t", c.names[0], c.width))
            .collect();
        if !very_long.is_empty() {
            out.extension(14, 1, very_long.len(), very_long.as_bytes());
        }
        if let Some(encoding) = &self.encoding {
            out.extension(20, 1, encoding.len(), encoding.as_bytes());
        }
        if !self.long_string_labels.is_empty() {
            let mut payload = Out::like(&out);
            for (variable, width, labels) in &self.long_string_labels {
                payload.i32(variable.len() as i32);
                payload.raw(variable.as_bytes());
                payload.i32(*width as i32);
                payload.i32(labels.len() as i32);
                for (value, label) in labels {
                    payload.i32(value.len() as i32);
                    payload.raw(value.as_bytes());
                    payload.i32(label.len() as i32);
                    payload.raw(label.as_bytes());
                }
            }
            out.extension(21, 1, payload.bytes.len(), &payload.bytes);
        }
        // Something no reader knows about
        out.extension(99, 1, 4, b"junk");

        out.i32(999);
        out.i32(0);

        // Cases
        let segments = self.case_segments(&out);
        match self.compression {
            Compression::None => {
                for (segment, _) in segments {
                    out.raw(&segment);
                }
            }
            Compression::Bytecode => {
                let compressed = bytecode(&segments, &out);
                out.raw(&compressed);
            }
            Compression::Zlib => {
                let compressed = bytecode(&segments, &out);
                let zheader_offset = out.bytes.len() as i64;
                let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(&compressed).unwrap();
                let block = encoder.finish().unwrap();
                let ztrailer_offset = zheader_offset + 24 + block.len() as i64;

                out.i64(zheader_offset);
                out.i64(ztrailer_offset);
                out.i64(48);
                out.raw(&block);
                out.i64(-(BIAS as i64));
                out.i64(0);
                out.i32(0x3ff000);
                out.i32(1);
                out.i64(zheader_offset);
                out.i64(zheader_offset + 24);
                out.i32(compressed.len() as i32);
                out.i32(block.len() as i32);
            }
        }
        out.bytes
    }

    /// 1-based index of the column's first variable record, counting continuations
    fn dictionary_index(&self, name: &str) -> usize {
        let mut index = 1;
        for column in &self.columns {
            if column.names[0] == name {
                return index;
            }
            index += column.pieces.iter().map(|w| segments_for(*w)).sum::<usize>();
        }
        panic!("no such column {name}");
    }

    /// Every 8-byte segment of every case, and whether it's numeric
    fn case_segments(&self, out: &Out) -> Vec<([u8; 8], bool)> {
        let mut segments = Vec::new();
        for row in &self.rows {
            for (column, cell) in self.columns.iter().zip(row) {
                match cell {
                    Cell::Num(value) => {
                        assert_eq!(column.width, 0);
                        segments.push((out.f64_bytes(*value), true));
                    }
                    Cell::Str(value) => {
                        assert!(column.width > 0);
                        let bytes = value.as_bytes();
                        let used = if column.width > 255 { 252 } else { column.width };
                        for (i, width) in column.pieces.iter().enumerate() {
                            let start = (i * used).min(bytes.len());
                            let end = (start + used).min(bytes.len());
                            let mut piece = bytes[start..end].to_vec();
                            piece.resize(segments_for(*width) * 8, b' ');
                            for chunk in piece.chunks_exact(8) {
                                let mut segment = [0; 8];
                                segment.copy_from_slice(chunk);
                                segments.push((segment, false));
                            }
                        }
                    }
                }
            }
        }
        segments
    }
}

fn segments_for(width: usize) -> usize {
    width.div_ceil(8).max(1)
}

fn spaces8(bytes: &[u8]) -> [u8; 8] {
    let mut out = [b' '; 8];
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn bytecode(segments: &[([u8; 8], bool)], out: &Out) -> Vec<u8> {
    let mut compressed = Vec::new();
    let mut commands = Vec::new();
    let mut pending: Vec<[u8; 8]> = Vec::new();
    let flush = |commands: &mut Vec<u8>, pending: &mut Vec<[u8; 8]>, compressed: &mut Vec<u8>| {
        commands.resize(8, 0);
        compressed.extend_from_slice(commands);
        for segment in pending.drain(..) {
            compressed.extend_from_slice(&segment);
        }
        commands.clear();
    };

    for (segment, numeric) in segments {
        let command = if *numeric {
            let value = out.f64_from(segment);
            if value == SYSMIS {
                255
            } else if value.fract() == 0.0 && (-99.0..=151.0).contains(&value) {
                (value + BIAS) as u8
            } else {
                pending.push(*segment);
                253
            }
        } else if segment == b"        " {
            254
        } else {
            pending.push(*segment);
            253
        };
        commands.push(command);
        if commands.len() == 8 {
            flush(&mut commands, &mut pending, &mut compressed);
        }
    }
    commands.push(252);
    flush(&mut commands, &mut pending, &mut compressed);
    compressed
}

struct Out {
    bytes: Vec<u8>,
    big_endian: bool,
}

impl Out {
    fn like(other: &Out) -> Self {
        Self {
            bytes: Vec::new(),
            big_endian: other.big_endian,
        }
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    fn padded(&mut self, bytes: &[u8], len: usize) {
        assert!(bytes.len() <= len);
        self.raw(bytes);
        self.raw(&vec![b' '; len - bytes.len()]);
    }

    fn i32(&mut self, value: i32) {
        let mut buf = [0; 4];
        if self.big_endian {
            BigEndian::write_i32(&mut buf, value);
        } else {
            LittleEndian::write_i32(&mut buf, value);
        }
        self.raw(&buf);
    }

    fn i64(&mut self, value: i64) {
        let mut buf = [0; 8];
        if self.big_endian {
            BigEndian::write_i64(&mut buf, value);
        } else {
            LittleEndian::write_i64(&mut buf, value);
        }
        self.raw(&buf);
    }

    fn f64(&mut self, value: f64) {
        let buf = self.f64_bytes(value);
        self.raw(&buf);
    }

    fn f64_bytes(&self, value: f64) -> [u8; 8] {
        let mut buf = [0; 8];
        if self.big_endian {
            BigEndian::write_f64(&mut buf, value);
        } else {
            LittleEndian::write_f64(&mut buf, value);
        }
        buf
    }

    fn f64_from(&self, bytes: &[u8]) -> f64 {
        if self.big_endian {
            BigEndian::read_f64(bytes)
        } else {
            LittleEndian::read_f64(bytes)
        }
    }

    fn extension(&mut self, subtype: i32, size: usize, count: usize, payload: &[u8]) {
        assert_eq!(size * count, payload.len());
        self.i32(7);
        self.i32(subtype);
        self.i32(size as i32);
        self.i32(count as i32);
        self.raw(payload);
    }
}
