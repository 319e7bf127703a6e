use std::path::PathBuf;

use gstcheck_recon::ReconError;
use thiserror::Error;

/// A file that could not be turned into a dataset, or a report that could
/// not be written.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: malformed CSV: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{}: malformed JSON: {message}", path.display())]
    Json { path: PathBuf, message: String },

    #[error("{}: {message}", path.display())]
    Spreadsheet { path: PathBuf, message: String },

    #[error("{}: unsupported file type (expected csv, tsv, json, xlsx, xls, xlsb or ods)", path.display())]
    Unsupported { path: PathBuf },

    #[error("{}: {source}", path.display())]
    Shape {
        path: PathBuf,
        #[source]
        source: ReconError,
    },
}

impl IoError {
    pub fn path(&self) -> &std::path::Path {
        match self {
            IoError::Read { path, .. }
            | IoError::Write { path, .. }
            | IoError::Csv { path, .. }
            | IoError::Json { path, .. }
            | IoError::Spreadsheet { path, .. }
            | IoError::Unsupported { path }
            | IoError::Shape { path, .. } => path,
        }
    }
}
