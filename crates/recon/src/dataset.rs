use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Scalar values
// ---------------------------------------------------------------------------

/// One cell. Types are informal: a loader may hand over everything as
/// `Text` and the checks decide how to read it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

static NULL: Value = Value::Null;

impl Value {
    /// Text cell, with empty or whitespace-only input normalized to `Null`.
    pub fn text(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(s)
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// String representation used by comparisons and join keys.
    /// `None` for null.
    pub fn repr(&self) -> Option<Cow<'_, str>> {
        match self {
            Value::Null => None,
            Value::Number(n) if n.is_nan() => None,
            Value::Text(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(format_number(*n))),
            Value::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            Value::Date(d) => Some(Cow::Owned(d.format("%Y-%m-%d").to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Some(s) => f.write_str(&s),
            None => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Integers without decimals, everything else with Rust's shortest form.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// An ordered table of named columns.
///
/// Operations never mutate in place: `filter` and `dedup_by` return new
/// datasets. Each row remembers its position in the source it was loaded
/// from, so findings on a derived dataset still point at the original row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    source_index: Vec<usize>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            source_index: Vec::new(),
        }
    }

    /// Build from rows, checking every row has one value per column.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, ReconError> {
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ReconError::RowWidth {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        let source_index = (0..rows.len()).collect();
        Ok(Self {
            columns,
            rows,
            source_index,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Names from `required` that are not columns of this dataset, in order.
    pub fn missing_columns<'a>(&self, required: &[&'a str]) -> Vec<&'a str> {
        required
            .iter()
            .copied()
            .filter(|name| !self.has_column(name))
            .collect()
    }

    pub fn row(&self, position: usize) -> Option<Row<'_>> {
        (position < self.rows.len()).then_some(Row {
            dataset: self,
            position,
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        (0..self.rows.len()).map(move |position| Row {
            dataset: self,
            position,
        })
    }

    /// Cell lookup by row position and column name. `Null` when the column
    /// does not exist.
    pub fn get(&self, position: usize, column: &str) -> &Value {
        match (self.rows.get(position), self.column_index(column)) {
            (Some(row), Some(col)) => &row[col],
            _ => &NULL,
        }
    }

    /// Rows for which `keep` returns true, in their original order.
    pub fn filter(&self, mut keep: impl FnMut(&Row<'_>) -> bool) -> Dataset {
        let mut out = Dataset::new(self.columns.clone());
        for row in self.rows() {
            if keep(&row) {
                out.rows.push(self.rows[row.position].clone());
                out.source_index.push(row.source_index());
            }
        }
        out
    }

    /// First row for each distinct key, in original order. Rows whose key is
    /// `None` are dropped.
    pub fn dedup_by(&self, key: impl Fn(&Row<'_>) -> Option<String>) -> Dataset {
        let mut seen = HashSet::new();
        self.filter(|row| match key(row) {
            Some(k) => seen.insert(k),
            None => false,
        })
    }
}

/// Borrowed view of one dataset row.
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    dataset: &'a Dataset,
    position: usize,
}

impl<'a> Row<'a> {
    /// Position within this dataset.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Zero-based position within the source the dataset was loaded from.
    pub fn source_index(&self) -> usize {
        self.dataset.source_index[self.position]
    }

    pub fn get(&self, column: &str) -> &'a Value {
        self.dataset.get(self.position, column)
    }

    pub fn at(&self, col: usize) -> &'a Value {
        self.dataset.rows[self.position].get(col).unwrap_or(&NULL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> Dataset {
        Dataset::from_rows(
            vec!["name".into(), "amount".into()],
            vec![
                vec!["Asha".into(), Value::Number(100.0)],
                vec!["Ravi".into(), Value::Number(2.5)],
                vec!["Asha".into(), Value::Null],
            ],
        )
        .unwrap()
    }

    #[test]
    fn blank_text_is_null() {
        assert_eq!(Value::text("   "), Value::Null);
        assert_eq!(Value::text(""), Value::Null);
        assert_eq!(Value::text(" x "), Value::Text(" x ".into()));
    }

    #[test]
    fn number_repr_drops_integral_decimals() {
        assert_eq!(Value::Number(1500.0).to_string(), "1500");
        assert_eq!(Value::Number(2.5).to_string(), "2.5");
        assert!(Value::Number(f64::NAN).is_null());
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = Dataset::from_rows(vec!["a".into(), "b".into()], vec![vec![Value::Null]]);
        assert!(matches!(err, Err(ReconError::RowWidth { row: 0, expected: 2, found: 1 })));
    }

    #[test]
    fn filter_keeps_source_positions() {
        let ds = people();
        let ravi_only = ds.filter(|r| r.get("name").to_string() == "Ravi");
        assert_eq!(ravi_only.len(), 1);
        assert_eq!(ravi_only.row(0).unwrap().source_index(), 1);
        // input untouched
        assert_eq!(ds.len(), 3);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let ds = people();
        let unique = ds.dedup_by(|r| r.get("name").repr().map(|s| s.into_owned()));
        assert_eq!(unique.len(), 2);
        assert_eq!(unique.get(0, "amount"), &Value::Number(100.0));
        assert_eq!(unique.row(1).unwrap().source_index(), 1);
    }

    #[test]
    fn missing_column_reads_as_null() {
        let ds = people();
        assert_eq!(ds.get(0, "nope"), &Value::Null);
        assert_eq!(ds.missing_columns(&["name", "gstin", "amount"]), vec!["gstin"]);
    }
}
