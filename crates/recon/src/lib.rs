//! `gstcheck-recon`: GST compliance reconciliation and anomaly detection.
//!
//! Pure engine crate: receives loaded datasets, returns discrepancy reports.
//! No CLI or IO dependencies.

pub mod aggregate;
pub mod checks;
pub mod circular;
pub mod columns;
pub mod config;
pub mod dataset;
pub mod documents;
pub mod engine;
pub mod error;
pub mod evidence;
pub mod matcher;
pub mod model;
pub mod reconcile;
pub mod validate;

pub use columns::DocumentKind;
pub use config::GstConfig;
pub use dataset::{Dataset, Value};
pub use engine::{run, run_with, Check, Corpus, RunOptions};
pub use error::ReconError;
pub use evidence::{compute_summary, FlatRecord, Report, ReportSummary};
pub use model::{CheckStatus, Discrepancy, DiscrepancySet, Reason, Subject};
