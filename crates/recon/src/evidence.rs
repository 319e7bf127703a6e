use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{CheckStatus, Discrepancy, DiscrepancySet, Reason, Subject};

/// Header lines above the first data row in a human-facing file.
const HEADER_ROWS: usize = 1;

/// Zero-based source index → one-based, header-aware row number.
pub fn external_row(index: usize) -> usize {
    index + 1 + HEADER_ROWS
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Collects discrepancies for one check. Subjects with no reasons are
/// dropped on the way in.
#[derive(Debug, Default)]
pub struct Findings {
    records: Vec<Discrepancy>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, subject: Subject, reasons: Vec<Reason>) {
        if reasons.is_empty() {
            return;
        }
        self.records.push(Discrepancy { subject, reasons });
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn finish(self, check: &str) -> DiscrepancySet {
        DiscrepancySet {
            check: check.to_string(),
            status: CheckStatus::Completed,
            records: self.records,
        }
    }

    /// Close the check as not run; the collected records explain why.
    pub fn skip(self, check: &str) -> DiscrepancySet {
        tracing::warn!(check, findings = self.records.len(), "check skipped");
        DiscrepancySet {
            check: check.to_string(),
            status: CheckStatus::Skipped,
            records: self.records,
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Results of every check that ran, keyed by check name.
///
/// A check missing from the map was not run. A check present with status
/// `completed` and no records ran clean.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    pub checks: BTreeMap<String, DiscrepancySet>,
}

impl Report {
    pub fn insert(&mut self, set: DiscrepancySet) {
        self.checks.insert(set.check.clone(), set);
    }

    pub fn get(&self, check: &str) -> Option<&DiscrepancySet> {
        self.checks.get(check)
    }

    pub fn has_findings(&self) -> bool {
        self.checks.values().any(|s| !s.records.is_empty())
    }

    /// One flat record per discrepancy, in check-name order.
    pub fn flatten(&self) -> Vec<FlatRecord> {
        self.checks
            .values()
            .flat_map(|set| set.records.iter().map(move |d| flatten_one(&set.check, d)))
            .collect()
    }
}

/// Shape-normalized discrepancy for human-facing output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRecord {
    pub check: String,
    pub documents: Vec<String>,
    /// One-based, header-aware row numbers.
    pub rows: Vec<usize>,
    pub columns: Vec<String>,
    pub values: Vec<String>,
    pub description: String,
}

fn flatten_one(check: &str, d: &Discrepancy) -> FlatRecord {
    let mut columns: Vec<String> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    for reason in &d.reasons {
        let (cols, vals) = reason.context();
        for c in cols {
            if !columns.contains(&c) {
                columns.push(c);
            }
        }
        values.extend(vals.iter().map(|v| v.to_string()));
    }

    let mut description: Vec<String> = Vec::new();
    if let Subject::Cycle { nodes } = &d.subject {
        description.push(format!("Cycle: {}", nodes.join(" -> ")));
    }
    description.extend(d.reasons.iter().map(|r| r.to_string()));

    FlatRecord {
        check: check.to_string(),
        documents: d.subject.documents().into_iter().map(String::from).collect(),
        rows: d.subject.row_indexes().into_iter().map(external_row).collect(),
        columns,
        values,
        description: description.join("; "),
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReportSummary {
    pub checks_run: usize,
    pub checks_clean: usize,
    pub checks_skipped: usize,
    pub records: usize,
    pub reasons: usize,
    pub records_by_check: BTreeMap<String, usize>,
}

/// Compute summary counts for a report.
pub fn compute_summary(report: &Report) -> ReportSummary {
    let mut summary = ReportSummary::default();
    for (name, set) in &report.checks {
        match set.status {
            CheckStatus::Completed => {
                summary.checks_run += 1;
                if set.records.is_empty() {
                    summary.checks_clean += 1;
                }
            }
            CheckStatus::Skipped => summary.checks_skipped += 1,
        }
        summary.records += set.records.len();
        summary.reasons += set.reason_count();
        summary.records_by_check.insert(name.clone(), set.records.len());
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Value;

    fn row(index: usize) -> Subject {
        Subject::Row {
            document: "gst_gen".into(),
            index,
            key: None,
        }
    }

    fn negative(column: &str) -> Reason {
        Reason::NegativeAmount {
            column: column.into(),
            value: Value::Number(-5.0),
        }
    }

    #[test]
    fn empty_reason_lists_are_dropped() {
        let mut f = Findings::new();
        f.record(row(0), vec![]);
        f.record(row(1), vec![negative("Total Amount")]);
        let set = f.finish("gst_gen");
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].subject, row(1));
    }

    #[test]
    fn rows_are_one_based_and_header_aware() {
        assert_eq!(external_row(0), 2);

        let mut f = Findings::new();
        f.record(row(4), vec![negative("Total Amount"), negative("Tax Amount")]);
        let mut report = Report::default();
        report.insert(f.finish("gst_gen"));

        let flat = report.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].rows, vec![6]);
        assert_eq!(flat[0].columns, vec!["Total Amount", "Tax Amount"]);
        assert_eq!(flat[0].values, vec!["-5", "-5"]);
        assert_eq!(
            flat[0].description,
            "Negative value in 'Total Amount': -5; Negative value in 'Tax Amount': -5"
        );
    }

    #[test]
    fn absent_vs_clean_vs_skipped() {
        let mut report = Report::default();
        report.insert(Findings::new().finish("gstr1_vs_gstr3b"));

        let mut f = Findings::new();
        f.record(
            Subject::Dataset { document: "gstr2b".into() },
            vec![Reason::MissingColumn {
                document: "gstr2b".into(),
                column: "GSTIN".into(),
            }],
        );
        report.insert(f.skip("gstr2b"));

        assert!(report.get("gstr1_vs_gstr3b").unwrap().is_clean());
        assert_eq!(report.get("gstr2b").unwrap().status, CheckStatus::Skipped);
        assert!(report.get("circular_trading").is_none());

        let summary = compute_summary(&report);
        assert_eq!(summary.checks_run, 1);
        assert_eq!(summary.checks_clean, 1);
        assert_eq!(summary.checks_skipped, 1);
        assert_eq!(summary.records, 1);
    }
}
