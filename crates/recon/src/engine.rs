use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::checks::{run_cross_check, CrossCheck};
use crate::columns::DocumentKind;
use crate::config::GstConfig;
use crate::dataset::Dataset;
use crate::documents::{has_validator, validate_document, DocumentContext};
use crate::error::ReconError;
use crate::evidence::Report;

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// The documents loaded for one run, at most one dataset per kind.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: BTreeMap<DocumentKind, Dataset>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the dataset previously held for `kind`, if any.
    pub fn insert(&mut self, kind: DocumentKind, dataset: Dataset) -> Option<Dataset> {
        self.documents.insert(kind, dataset)
    }

    pub fn get(&self, kind: DocumentKind) -> Option<&Dataset> {
        self.documents.get(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = DocumentKind> + '_ {
        self.documents.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Check identity
// ---------------------------------------------------------------------------

/// Anything that produces one entry in a [`Report`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Check {
    /// Single-document validator, named after the document kind.
    Document(DocumentKind),
    Cross(CrossCheck),
}

impl Check {
    /// Every check in run order: document validators first, then the
    /// cross-document checks.
    pub fn all() -> Vec<Check> {
        DocumentKind::ALL
            .iter()
            .copied()
            .filter(|k| has_validator(*k))
            .map(Check::Document)
            .chain(CrossCheck::ALL.iter().copied().map(Check::Cross))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Check::Document(kind) => kind.as_str(),
            Check::Cross(check) => check.as_str(),
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Check {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Check::all()
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| ReconError::UnknownCheck(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    /// Restrict the run to these checks. `None` runs everything.
    pub only: Option<Vec<Check>>,
}

impl RunOptions {
    /// Parse a list of check names. An empty list means no restriction.
    pub fn only<S: AsRef<str>>(names: &[S]) -> Result<Self, ReconError> {
        if names.is_empty() {
            return Ok(Self::default());
        }
        let checks = names
            .iter()
            .map(|n| n.as_ref().parse::<Check>())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { only: Some(checks) })
    }

    fn selects(&self, check: Check) -> bool {
        self.only.as_ref().map_or(true, |only| only.contains(&check))
    }
}

/// Run every check whose documents are in `corpus`.
pub fn run(config: &GstConfig, corpus: &Corpus, today: NaiveDate) -> Report {
    run_with(config, corpus, today, &RunOptions::default())
}

/// Like [`run`], restricted by `options`. A check that is selected but
/// lacks an input document is left out of the report.
pub fn run_with(config: &GstConfig, corpus: &Corpus, today: NaiveDate, options: &RunOptions) -> Report {
    let mut report = Report::default();
    let ctx = DocumentContext { config, today };

    tracing::info!(documents = corpus.len(), "starting run");

    for check in Check::all() {
        if !options.selects(check) {
            continue;
        }
        let set = match check {
            Check::Document(kind) => corpus.get(kind).and_then(|ds| validate_document(kind, ds, &ctx)),
            Check::Cross(cross) => run_cross_check(cross, config, |k| corpus.get(k)),
        };
        match set {
            Some(set) => {
                tracing::debug!(
                    check = %check,
                    status = ?set.status,
                    records = set.records.len(),
                    "check finished"
                );
                report.insert(set);
            }
            None => tracing::debug!(check = %check, "inputs not loaded, check not run"),
        }
    }

    tracing::info!(checks = report.checks.len(), "run complete");
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;
    use crate::model::CheckStatus;

    fn ds(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter().map(|r| r.iter().map(|v| Value::text(*v)).collect()).collect(),
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 30).unwrap()
    }

    #[test]
    fn check_names_are_unique_and_parse() {
        let all = Check::all();
        assert_eq!(all.len(), 6 + 8);
        for c in &all {
            assert_eq!(c.name().parse::<Check>().unwrap(), *c);
        }
        assert!(matches!("invoice".parse::<Check>(), Err(ReconError::UnknownCheck(_))));
    }

    #[test]
    fn empty_corpus_runs_nothing() {
        let report = run(&GstConfig::default(), &Corpus::new(), today());
        assert!(report.checks.is_empty());
    }

    #[test]
    fn only_present_inputs_run() {
        let mut corpus = Corpus::new();
        corpus.insert(
            DocumentKind::Gstr1,
            ds(&["taxable_value", "igst", "cgst", "sgst"], &[&["100", "18", "0", "0"]]),
        );
        corpus.insert(
            DocumentKind::Gstr3b,
            ds(
                &["GSTIN", "Tax Period", "Total Taxable Value", "IGST Paid", "CGST Paid", "SGST Paid"],
                &[&["07AAAAA1234A1Z5", "2024-05", "100", "18", "0", "0"]],
            ),
        );
        let report = run(&GstConfig::default(), &corpus, today());
        let names: Vec<&str> = report.checks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["gstr1_vs_gstr3b", "gstr3b"]);
        assert!(!report.has_findings());
    }

    #[test]
    fn skipped_check_does_not_stop_siblings() {
        let mut corpus = Corpus::new();
        corpus.insert(DocumentKind::Gstr1, ds(&["igst"], &[&["1"]]));
        corpus.insert(DocumentKind::Gstr3b, ds(&["GSTIN", "Tax Period"], &[&["bad", "2024-05"]]));
        let report = run(&GstConfig::default(), &corpus, today());
        assert_eq!(report.get("gstr1_vs_gstr3b").unwrap().status, CheckStatus::Skipped);
        let gstr3b = report.get("gstr3b").unwrap();
        assert_eq!(gstr3b.status, CheckStatus::Completed);
        assert_eq!(gstr3b.records.len(), 1);
    }

    #[test]
    fn only_restricts_checks() {
        let mut corpus = Corpus::new();
        corpus.insert(DocumentKind::Transactions, ds(&["gstin_supplier", "gstin_recipient"], &[&["A", "B"]]));
        corpus.insert(DocumentKind::Gstr3b, ds(&["GSTIN", "Tax Period"], &[&["bad", "2024-05"]]));

        let options = RunOptions::only(&["circular_trading"]).unwrap();
        let report = run_with(&GstConfig::default(), &corpus, today(), &options);
        let names: Vec<&str> = report.checks.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["circular_trading"]);

        assert!(RunOptions::only(&["nope"]).is_err());
        assert_eq!(RunOptions::only::<&str>(&[]).unwrap(), RunOptions::default());
    }
}
