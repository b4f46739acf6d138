//! FILENAME: core/engine/src/number_format.rs
//! PURPOSE: Number and date formatting utilities for displaying cell values.
//! CONTEXT: This module handles the conversion of typed values to formatted
//! display strings based on a column's `NumberFormat` setting. Formatted
//! strings are also what the pivot engine groups discrete keys by.

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Display format attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NumberFormat {
    #[default]
    General,
    Number {
        decimal_places: u8,
        use_thousands_separator: bool,
    },
    Percentage {
        decimal_places: u8,
    },
    Scientific {
        decimal_places: u8,
    },
    Date {
        format: String, // strftime pattern, e.g. "%Y-%m-%d"
    },
}

/// Format a number according to the specified format.
/// A `Date` format applied to a plain number renders it in general format.
pub fn format_number(value: f64, format: &NumberFormat) -> String {
    match format {
        NumberFormat::General | NumberFormat::Date { .. } => format_general(value),
        NumberFormat::Number {
            decimal_places,
            use_thousands_separator,
        } => format_decimal(value, *decimal_places, *use_thousands_separator),
        NumberFormat::Percentage { decimal_places } => format_percentage(value, *decimal_places),
        NumberFormat::Scientific { decimal_places } => format_scientific(value, *decimal_places),
    }
}

/// Format a date. Returns `None` when the pattern is not a valid strftime string.
pub fn format_date(date: NaiveDate, format: &NumberFormat) -> Option<String> {
    let pattern = match format {
        NumberFormat::Date { format } => format.as_str(),
        _ => "%Y-%m-%d",
    };

    let items: Vec<Item> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

/// General format: whole numbers without a fraction, up to ten decimals
/// otherwise, exponent form outside [1e-4, 1e10).
fn format_general(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 {
        "0".to_string()
    } else if !(1e-4..1e10).contains(&magnitude) {
        trim_fraction(&format!("{:.5e}", value))
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        trim_fraction(&format!("{:.10}", value))
    }
}

/// Drops trailing zeros of the mantissa and a dangling decimal point.
fn trim_fraction(text: &str) -> String {
    let (mantissa, exponent) = match text.find('e') {
        Some(at) => text.split_at(at),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exponent)
}

fn format_decimal(value: f64, decimal_places: u8, grouped: bool) -> String {
    let text = format!("{:.*}", decimal_places as usize, value);
    if !grouped {
        return text;
    }

    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((w, f)) => (w, Some(f)),
        None => (unsigned, None),
    };

    let digits: Vec<char> = whole.chars().collect();
    let groups: Vec<String> = digits
        .rchunks(3)
        .rev()
        .map(|chunk| chunk.iter().collect())
        .collect();

    let mut out = format!("{}{}", sign, groups.join(","));
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

fn format_percentage(value: f64, decimal_places: u8) -> String {
    format!("{:.*}%", decimal_places as usize, value * 100.0)
}

fn format_scientific(value: f64, decimal_places: u8) -> String {
    format!("{:.*E}", decimal_places as usize, value)
}
