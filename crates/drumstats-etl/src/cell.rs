// Cell coercion helpers.
//
// Hand-maintained sheets mix numbers, numeric text, percentages and blanks
// in the same column. Everything that reads a cell goes through here.

use calamine::Data;

/// Trimmed text of a cell; blank cells give None. Whole floats render
/// without a fraction so a jersey typed as 7 reads "7", not "7.0".
pub fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::Error(_) | Data::Empty => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Whole-number reading of a cell.
pub fn cell_i64(cell: &Data) -> Option<i64> {
    match cell {
        Data::Int(i) => Some(*i),
        Data::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
        Data::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

/// Numeric reading of a cell. Accepts percent strings ("62%" is 0.62) and
/// date serials.
pub fn cell_f64(cell: &Data) -> Option<f64> {
    let value = match cell {
        Data::Int(i) => *i as f64,
        Data::Float(f) => *f,
        Data::DateTime(dt) => dt.as_f64(),
        Data::String(s) => parse_number_text(s)?,
        _ => return None,
    };
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

fn parse_number_text(s: &str) -> Option<f64> {
    let s = s.trim();
    match s.strip_suffix('%') {
        Some(pct) => pct.trim().parse::<f64>().ok().map(|v| v / 100.0),
        None => s.parse::<f64>().ok(),
    }
}

/// `cell_f64` rounded to `places` decimal places.
pub fn cell_decimal(cell: &Data, places: u32) -> Option<f64> {
    let factor = 10f64.powi(places as i32);
    cell_f64(cell).map(|v| (v * factor).round() / factor)
}

pub fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Lowercase, trim and collapse internal whitespace. Used to compare player
/// names across sheets.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Trim and collapse internal whitespace, keeping case.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
