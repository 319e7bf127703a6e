// JSON import and report export

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::Serialize;
use serde_json::Value as Json;

use gstcheck_recon::{compute_summary, Dataset, DiscrepancySet, FlatRecord, Report, ReportSummary, Value};

use crate::error::IoError;

/// Load a JSON document: a top-level array of objects, or a single object.
pub fn load(path: &Path) -> Result<Dataset, IoError> {
    let content = crate::csv::read_file_as_utf8(path)?;
    parse(&content).map_err(|message| IoError::Json {
        path: path.to_path_buf(),
        message,
    })
}

/// Columns are the union of object keys in first-seen order. Scalars map to
/// the matching cell type; nested arrays and objects are kept as JSON text.
pub fn parse(content: &str) -> Result<Dataset, String> {
    let doc: Json = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let objects = match doc {
        Json::Array(items) => items,
        obj @ Json::Object(_) => vec![obj],
        _ => return Err("expected an array of objects or a single object".to_string()),
    };

    let mut columns: Vec<String> = Vec::new();
    let mut records = Vec::with_capacity(objects.len());
    for (i, item) in objects.into_iter().enumerate() {
        let Json::Object(map) = item else {
            return Err(format!("element {i} is not an object"));
        };
        for key in map.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        records.push(map);
    }

    let rows: Vec<Vec<Value>> = records
        .iter()
        .map(|map| {
            columns
                .iter()
                .map(|c| map.get(c).map(cell).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Dataset::from_rows(columns, rows).map_err(|e| e.to_string())
}

fn cell(v: &Json) -> Value {
    match v {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
        Json::String(s) => Value::text(s.as_str()),
        nested => Value::Text(nested.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// The serialized shape of a run: summary, structured results per check,
/// and one flat record per discrepancy.
#[derive(Debug, Serialize)]
pub struct ReportDocument<'a> {
    pub version: &'static str,
    pub summary: ReportSummary,
    pub checks: &'a BTreeMap<String, DiscrepancySet>,
    pub flat: Vec<FlatRecord>,
}

impl<'a> ReportDocument<'a> {
    pub fn new(report: &'a Report) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            summary: compute_summary(report),
            checks: &report.checks,
            flat: report.flatten(),
        }
    }
}

/// Write the report as pretty JSON.
pub fn write_report(path: &Path, report: &Report) -> Result<(), IoError> {
    let write_err = |source| IoError::Write {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(write_err)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &ReportDocument::new(report))
        .map_err(|e| write_err(std::io::Error::from(e)))?;
    Ok(())
}
