// Spreadsheet import (xlsx, xls, xlsb, ods)

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{Days, NaiveDate};

use gstcheck_recon::{Dataset, Value};

use crate::error::IoError;

/// Load the first sheet. Its first row is the header.
pub fn load(path: &Path) -> Result<Dataset, IoError> {
    let fail = |message: String| IoError::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook: Sheets<_> =
        open_workbook_auto(path).map_err(|e| fail(format!("Failed to open spreadsheet: {e}")))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let Some(first) = sheet_names.first() else {
        return Err(fail("Spreadsheet contains no sheets".to_string()));
    };
    if sheet_names.len() > 1 {
        tracing::debug!(path = %path.display(), sheet = %first, "reading first sheet only");
    }

    let range = workbook
        .worksheet_range(first)
        .map_err(|e| fail(format!("Failed to read sheet '{first}': {e}")))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Dataset::default());
    };
    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match header_text(cell) {
            h if h.is_empty() => format!("Unnamed: {i}"),
            h => h,
        })
        .collect();

    let data: Vec<Vec<Value>> = rows
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)))
        .map(|row| row.iter().map(cell_value).collect())
        .collect();

    Dataset::from_rows(columns, data).map_err(|source| IoError::Shape {
        path: path.to_path_buf(),
        source,
    })
}

fn header_text(cell: &Data) -> String {
    match cell_value(cell).repr() {
        Some(s) => s.trim().to_string(),
        None => String::new(),
    }
}

/// Convert one calamine cell. Date-time serials become dates (the time of
/// day is dropped); everything without a natural cell type becomes text.
pub fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Empty => Value::Null,
        Data::String(s) => Value::text(s.as_str()),
        Data::Float(n) => Value::Number(*n),
        Data::Int(n) => Value::Number(*n as f64),
        Data::Bool(b) => Value::Bool(*b),
        Data::Error(e) => Value::Text(format!("#{e:?}")),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            serial_to_date(serial).map(Value::Date).unwrap_or(Value::Number(serial))
        }
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Value::Date)
            .unwrap_or_else(|| Value::text(s.as_str())),
        Data::DurationIso(s) => Value::text(s.as_str()),
    }
}

/// Day serial in the 1900 date system (serial 1 = 1900-01-01, with the
/// fictitious 1900-02-29 accounted for by the 1899-12-30 base).
fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_days(Days::new(serial.floor() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_dates() {
        assert_eq!(serial_to_date(45292.0), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(serial_to_date(45292.75), NaiveDate::from_ymd_opt(2024, 1, 1));
        assert_eq!(serial_to_date(0.5), None);
        assert_eq!(serial_to_date(f64::NAN), None);
    }

    #[test]
    fn test_cell_values() {
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(cell_value(&Data::String("  ".into())), Value::Null);
        assert_eq!(cell_value(&Data::String("INV-1".into())), Value::text("INV-1"));
        assert_eq!(cell_value(&Data::Int(7)), Value::Number(7.0));
        assert_eq!(cell_value(&Data::Float(1.5)), Value::Number(1.5));
        assert_eq!(
            cell_value(&Data::DateTimeIso("2024-04-01T00:00:00".into())),
            Value::Date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())
        );
    }

    #[test]
    fn test_integral_header_has_no_decimals() {
        assert_eq!(header_text(&Data::Float(2024.0)), "2024");
        assert_eq!(header_text(&Data::String(" GSTIN ".into())), "GSTIN");
    }

    #[test]
    fn test_missing_workbook() {
        let err = load(Path::new("/nonexistent/gstr1.xlsx")).unwrap_err();
        assert!(matches!(err, IoError::Spreadsheet { .. }));
    }
}
