//! Rendering SPSS values as text cells

use chrono::{DateTime, NaiveTime};

/// Seconds from the start of the Gregorian calendar (1582-10-14),
/// SPSS's epoch, to the Unix epoch
const SEC_SHIFT_SPSS: i64 = 12_219_379_200;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// A print or write format, packed in the file as `type << 16 | width << 8 | decimals`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Format {
    pub code: u8,
    pub width: u8,
    pub decimals: u8,
}

/// How a numeric variable's values should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Number,
    Date,
    DateTime,
    Time,
}

impl Format {
    pub fn unpack(raw: i32) -> Self {
        let raw = raw as u32;
        Self {
            code: (raw >> 16) as u8,
            width: (raw >> 8) as u8,
            decimals: raw as u8,
        }
    }

    fn name(self) -> &'static str {
        match self.code {
            1 => "A",
            2 => "AHEX",
            3 => "COMMA",
            4 => "DOLLAR",
            5 => "F",
            6 => "IB",
            7 => "PIBHEX",
            8 => "P",
            9 => "PIB",
            10 => "PK",
            11 => "RB",
            12 => "RBHEX",
            15 => "Z",
            16 => "N",
            17 => "E",
            20 => "DATE",
            21 => "TIME",
            22 => "DATETIME",
            23 => "ADATE",
            24 => "JDATE",
            25 => "DTIME",
            26 => "WKDAY",
            27 => "MONTH",
            28 => "MOYR",
            29 => "QYR",
            30 => "WKYR",
            31 => "PCT",
            32 => "DOT",
            33 => "CCA",
            34 => "CCB",
            35 => "CCC",
            36 => "CCD",
            37 => "CCE",
            38 => "EDATE",
            39 => "SDATE",
            40 => "MTIME",
            41 => "YMDHMS",
            // Unknown codes show up as plain numbers.
            _ => "F",
        }
    }

    pub fn kind(self) -> Kind {
        match self.code {
            20 | 23 | 24 | 28 | 29 | 30 | 38 | 39 => Kind::Date,
            22 | 41 => Kind::DateTime,
            21 | 25 | 40 => Kind::Time,
            _ => Kind::Number,
        }
    }

    /// The format as SPSS spells it, e.g. `F8.2`, `DATE11` or `A20`
    pub fn describe(self) -> String {
        if self.decimals > 0 || self.name() == "F" {
            format!("{}{}.{}", self.name(), self.width, self.decimals)
        } else if self.width > 0 {
            format!("{}{}", self.name(), self.width)
        } else {
            self.name().to_owned()
        }
    }
}

/// Renders a (non-missing) numeric value.
///
/// Values with date, datetime or time formats are shown as such if
/// `convert_dates` is set and they're in range; everything else is
/// a float as Python's `repr` would write it.
pub fn render_number(value: f64, format: Format, convert_dates: bool) -> String {
    if convert_dates {
        let rendered = match format.kind() {
            Kind::Number => None,
            Kind::Date => render_date(value),
            Kind::DateTime => render_datetime(value),
            Kind::Time => render_time(value),
        };
        if let Some(text) = rendered {
            return text;
        }
    }
    repr_f64(value)
}

/// Splits seconds into whole seconds and nanoseconds.
fn split_seconds(seconds: f64) -> Option<(i64, u32)> {
    if !seconds.is_finite() || seconds.abs() > i64::MAX as f64 / 2.0 {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    // Rounding can carry a full second.
    if nanos >= 1_000_000_000 {
        Some((whole as i64 + 1, 0))
    } else {
        Some((whole as i64, nanos))
    }
}

fn render_datetime(seconds: f64) -> Option<String> {
    let (whole, nanos) = split_seconds(seconds)?;
    let when = DateTime::from_timestamp(whole.checked_sub(SEC_SHIFT_SPSS)?, nanos)?;
    Some(when.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
}

fn render_date(seconds: f64) -> Option<String> {
    let days = (seconds / SECONDS_PER_DAY).floor();
    let (whole, _) = split_seconds(days * SECONDS_PER_DAY)?;
    let when = DateTime::from_timestamp(whole.checked_sub(SEC_SHIFT_SPSS)?, 0)?;
    Some(when.date_naive().format("%Y-%m-%d").to_string())
}

fn render_time(seconds: f64) -> Option<String> {
    if !(0.0..SECONDS_PER_DAY).contains(&seconds) {
        return None;
    }
    let (whole, nanos) = split_seconds(seconds)?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(whole).ok()?, nanos)?;
    Some(time.format("%H:%M:%S%.f").to_string())
}

/// Formats a float like Python's `repr`: the shortest digits that
/// round-trip, in positional notation for exponents from -4 to 15
/// and scientific notation (`1e+16`, `1.5e-07`) otherwise.
pub fn repr_f64(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_owned();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_owned();
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    if value == 0.0 {
        return format!("{sign}0.0");
    }

    // Rust's `{:e}` already gives the shortest round-tripping digits.
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((scientific.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let integer_len = exponent as usize + 1;
            if digits.len() <= integer_len {
                let zeros = "0".repeat(integer_len - digits.len());
                format!("{sign}{digits}{zeros}.0")
            } else {
                let (integer, fraction) = digits.split_at(integer_len);
                format!("{sign}{integer}.{fraction}")
            }
        } else {
            let zeros = "0".repeat((-exponent - 1) as usize);
            format!("{sign}0.{zeros}{digits}")
        }
    } else {
        let (first, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            first.to_owned()
        } else {
            format!("{first}.{rest}")
        };
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exponent_sign}{:02}", exponent.abs())
    }
}
