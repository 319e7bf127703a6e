// CSV/TSV import

use std::io::Read;
use std::path::Path;

use gstcheck_recon::{Dataset, Value};

use crate::error::IoError;

/// Load a delimited text file. The delimiter is sniffed from the first lines;
/// the first record is the header.
pub fn load(path: &Path) -> Result<Dataset, IoError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    parse(&content, delimiter).map_err(|e| match e {
        ParseError::Csv(source) => IoError::Csv {
            path: path.to_path_buf(),
            source,
        },
        ParseError::Shape(source) => IoError::Shape {
            path: path.to_path_buf(),
            source,
        },
    })
}

#[derive(Debug)]
pub enum ParseError {
    Csv(csv::Error),
    Shape(gstcheck_recon::ReconError),
}

/// Parse delimited text with a header row. Header names are trimmed, cells
/// are kept as text and blank cells become null. Short rows are padded with
/// nulls; trailing empty cells past the header width are dropped.
pub fn parse(content: &str, delimiter: u8) -> Result<Dataset, ParseError> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut records = reader.records();
    let columns: Vec<String> = match records.next() {
        Some(header) => header
            .map_err(ParseError::Csv)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect(),
        None => return Ok(Dataset::default()),
    };

    let width = columns.len();
    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(ParseError::Csv)?;
        let mut row: Vec<Value> = record.iter().map(Value::text).collect();
        while row.len() > width && row.last().is_some_and(Value::is_null) {
            row.pop();
        }
        row.resize(width.max(row.len()), Value::Null);
        rows.push(row);
    }

    Dataset::from_rows(columns, rows).map_err(ParseError::Shape)
}

/// Delimiters tried by [`sniff_delimiter`], in tie-break order.
const DELIMITERS: [u8; 4] = [b'\t', b';', b',', b'|'];

/// Lines sampled when sniffing.
const SNIFF_LINES: usize = 10;

/// Pick the delimiter under which the sampled lines agree best with the
/// header's field count. A delimiter that leaves the header as one field
/// never wins; comma is the fallback.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(SNIFF_LINES).collect();

    let mut best = (b',', 0u64);
    for delimiter in DELIMITERS {
        let counts: Vec<usize> = sample.iter().map(|line| field_count(line, delimiter)).collect();
        let Some(&header_width) = counts.first() else {
            break;
        };
        if header_width <= 1 {
            continue;
        }
        let agreeing = counts.iter().filter(|&&c| c == header_width).count() as u64;
        let score = agreeing * header_width as u64;
        if score > best.1 {
            best = (delimiter, score);
        }
    }
    best.0
}

/// Fields in one line, honouring quotes.
fn field_count(line: &str, delimiter: u8) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(Result::ok)
        .map_or(1, |record| record.len())
}

/// Read file and convert to UTF-8 if needed (Excel exports are often Windows-1252).
pub fn read_file_as_utf8(path: &Path) -> Result<String, IoError> {
    let read_err = |source| IoError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::open(path).map_err(read_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(read_err)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            tracing::debug!(path = %path.display(), "decoded as Windows-1252");
            Ok(decoded.into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn sniffs_each_delimiter() {
        for delimiter in DELIMITERS {
            let d = delimiter as char;
            let content = format!(
                "GSTIN{d}Invoice Number{d}Total Amount\n07AAAAA1234A1Z5{d}INV-1{d}1000\n29BBBBB5678B1Z3{d}INV-2{d}250\n"
            );
            assert_eq!(sniff_delimiter(&content), delimiter, "delimiter {d:?}");
        }
    }

    #[test]
    fn quoted_commas_do_not_fool_the_sniffer() {
        let content = "Invoice Number;Description;Total Amount\nINV-1;\"Steel, rolled\";1,000\nINV-2;\"Cement, 50kg\";250\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn single_column_falls_back_to_comma() {
        assert_eq!(sniff_delimiter("GSTIN\n07AAAAA1234A1Z5\n"), b',');
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_header_trimmed_and_blanks_null() {
        let ds = parse(" GSTIN , Invoice Number \n07AAAAA1234A1Z5,  \n", b',').unwrap();
        assert_eq!(ds.columns(), &["GSTIN".to_string(), "Invoice Number".to_string()]);
        assert_eq!(ds.get(0, "GSTIN"), &Value::text("07AAAAA1234A1Z5"));
        assert!(ds.get(0, "Invoice Number").is_null());
    }

    #[test]
    fn test_ragged_rows() {
        let ds = parse("a,b,c\n1\n1,2,3,,\n", b',').unwrap();
        assert_eq!(ds.len(), 2);
        assert!(ds.get(0, "c").is_null());
        assert_eq!(ds.get(1, "c"), &Value::text("3"));

        assert!(matches!(parse("a,b\n1,2,3\n", b','), Err(ParseError::Shape(_))));
    }

    #[test]
    fn test_empty_file_is_empty_dataset() {
        let ds = parse("", b',').unwrap();
        assert!(ds.is_empty());
        assert!(ds.columns().is_empty());
    }

    #[test]
    fn test_semicolon_csv_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gstr2b.csv");
        fs::write(&path, "\u{feff}GSTIN;Invoice Number\n07AAAAA1234A1Z5;INV-1\n").unwrap();

        let ds = load(&path).unwrap();
        assert_eq!(ds.columns()[0], "GSTIN");
        assert_eq!(ds.get(0, "Invoice Number"), &Value::text("INV-1"));
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.csv");
        // "Café" with 0xE9 for é
        fs::write(&path, b"name,city\nCaf\xe9,Pune\n").unwrap();

        let ds = load(&path).unwrap();
        assert_eq!(ds.get(0, "name"), &Value::text("Café"));
    }

    #[test]
    fn test_missing_file() {
        let err = load(Path::new("/nonexistent/gst.csv")).unwrap_err();
        assert!(matches!(err, IoError::Read { .. }));
    }
}
