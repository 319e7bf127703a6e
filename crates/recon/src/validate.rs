use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dataset::Value;

// ---------------------------------------------------------------------------
// Tax identifiers
// ---------------------------------------------------------------------------

/// 2 digits (state), 5 letters + 4 digits + 1 letter (PAN), entity code,
/// literal `Z`, trailing check character. Uppercase only.
const GSTIN_PATTERN: &str = r"^[0-9]{2}[A-Z]{5}[0-9]{4}[A-Z][1-9A-Z]Z[0-9A-Z]$";

fn gstin_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(GSTIN_PATTERN).expect("GSTIN pattern compiles"))
}

/// Structural GSTIN check. False for null and for anything that is not text.
/// No checksum arithmetic is done.
pub fn validate_tax_id(value: &Value) -> bool {
    match value {
        Value::Text(s) => gstin_regex().is_match(s),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Null-safe comparison
// ---------------------------------------------------------------------------

/// Both null is equal, exactly one null is not, otherwise the string forms
/// are compared (case-folded when `ignore_case`).
pub fn safe_equal(a: &Value, b: &Value, ignore_case: bool) -> bool {
    match (a.repr(), b.repr()) {
        (None, None) => true,
        (None, Some(_)) | (Some(_), None) => false,
        (Some(x), Some(y)) => {
            if ignore_case {
                x.to_lowercase() == y.to_lowercase()
            } else {
                x == y
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Numeric tolerance
// ---------------------------------------------------------------------------

/// Absolute floor plus a fraction of the larger operand's magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub abs: f64,
    #[serde(default)]
    pub rel: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { abs: 0.01, rel: 1e-5 }
    }
}

impl Tolerance {
    pub fn absolute(abs: f64) -> Self {
        Self { abs, rel: 0.0 }
    }

    pub fn new(abs: f64, rel: f64) -> Self {
        Self { abs, rel }
    }

    /// `|a-b| <= abs + rel * max(|a|, |b|)`. Symmetric in its operands.
    /// NaN is never close to anything; equal infinities are close.
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        if a == b {
            return true;
        }
        if a.is_infinite() || b.is_infinite() {
            return false;
        }
        (a - b).abs() <= self.abs + self.rel * a.abs().max(b.abs())
    }
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// Outcome of reading a typed value out of an informally typed cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed<T> {
    Missing,
    Invalid,
    Valid(T),
}

impl<T> Parsed<T> {
    pub fn valid(self) -> Option<T> {
        match self {
            Parsed::Valid(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Parsed::Invalid)
    }
}

/// Read an amount. Text goes through [`parse_financial_number`].
pub fn read_amount(value: &Value) -> Parsed<f64> {
    match value {
        Value::Null => Parsed::Missing,
        Value::Number(n) if n.is_nan() => Parsed::Missing,
        Value::Number(n) => Parsed::Valid(*n),
        Value::Text(s) => match parse_financial_number(s) {
            Some(n) => Parsed::Valid(n),
            None => Parsed::Invalid,
        },
        Value::Bool(_) | Value::Date(_) => Parsed::Invalid,
    }
}

/// Parse a financial number string:
/// - Strip `$`, `₹`, commas, whitespace
/// - Handle `(123.45)` → `-123.45`
/// - Accept an exponent (`1.5e3`, `1.2E+07`) as spreadsheets export it
/// - Returns None if non-numeric characters remain after stripping
pub fn parse_financial_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (is_negative, inner) = match trimmed.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    let cleaned: String = inner
        .chars()
        .filter(|c| *c != '$' && *c != '₹' && *c != ',' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    // Mantissa digits, an optional exponent after them, a sign only in
    // front or right after the exponent marker.
    let mut digits = false;
    let mut exponent = false;
    let mut prev = None;
    for (i, c) in cleaned.chars().enumerate() {
        match c {
            '0'..='9' => digits = true,
            '.' if !exponent => {}
            'e' | 'E' if digits && !exponent => exponent = true,
            '-' | '+' if (i == 0 && !is_negative) || matches!(prev, Some('e' | 'E')) => {}
            _ => return None,
        }
        prev = Some(c);
    }

    let value: f64 = cleaned.parse().ok()?;
    Some(if is_negative { -value } else { value })
}

/// Read a date using a chrono format string. A value already typed as a
/// date passes through; text with a trailing time part is accepted when the
/// format itself carries one.
pub fn read_date(value: &Value, format: &str) -> Parsed<NaiveDate> {
    match value {
        Value::Null => Parsed::Missing,
        Value::Date(d) => Parsed::Valid(*d),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(d) = NaiveDate::parse_from_str(s, format) {
                return Parsed::Valid(d);
            }
            match NaiveDateTime::parse_from_str(s, format) {
                Ok(dt) => Parsed::Valid(dt.date()),
                Err(_) => Parsed::Invalid,
            }
        }
        Value::Number(n) if n.is_nan() => Parsed::Missing,
        Value::Number(_) | Value::Bool(_) => Parsed::Invalid,
    }
}

/// yes/true/1/y → true, no/false/0/n → false, anything else → `None`.
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) if *n == 1.0 => Some(true),
        Value::Number(n) if *n == 0.0 => Some(false),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "yes" | "y" | "true" | "1" => Some(true),
            "no" | "n" | "false" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
