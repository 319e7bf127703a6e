// File I/O: loading documents into datasets and writing reports

pub mod csv;
pub mod discover;
pub mod error;
pub mod json;
pub mod xlsx;

pub use discover::{discover, load_corpus, load_file, LoadedCorpus};
pub use error::IoError;
pub use json::{write_report, ReportDocument};
