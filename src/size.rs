//! Human-readable byte counts

const UNITS: [&str; 8] = ["", "K", "M", "G", "T", "P", "E", "Z"];

/// Formats a byte count with decimal (1000-based) prefixes,
/// e.g. `1000.0` becomes `"1.0KB"`.
///
/// Past zetta, everything is yotta.
pub fn sizeof_fmt(num: f64) -> String {
    let mut num = num;
    for unit in UNITS {
        if num.abs() < 1000.0 {
            return format!("{num:3.1}{unit}B");
        }
        num /= 1000.0;
    }
    format!("{num:.1}YB")
}
