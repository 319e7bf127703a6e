use crate::dataset::Dataset;
use crate::evidence::Findings;
use crate::model::{DiscrepancySet, MetricSummary, Reason, Subject};
use crate::validate::{read_amount, Parsed, Tolerance};

/// One summed column on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub left: String,
    pub right: String,
}

impl MetricSpec {
    pub fn new(name: &str, left: &str, right: &str) -> Self {
        Self {
            name: name.to_string(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }
}

/// A metric derived by adding up other metrics' totals.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedMetric {
    pub name: String,
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    pub check: String,
    pub left_document: String,
    pub right_document: String,
    pub metrics: Vec<MetricSpec>,
    pub combined: Option<CombinedMetric>,
    pub tolerance: Tolerance,
}

/// Sum of the parseable cells of `column`, plus how many non-empty cells
/// could not be read as numbers.
pub fn sum_column(ds: &Dataset, column: &str) -> (f64, usize) {
    let mut total = 0.0;
    let mut unreadable = 0;
    for row in ds.rows() {
        match read_amount(row.get(column)) {
            Parsed::Valid(n) => total += n,
            Parsed::Invalid => unreadable += 1,
            Parsed::Missing => {}
        }
    }
    (total, unreadable)
}

/// Compare column totals between two datasets that share no row key.
///
/// Produces at most one record: a summary of every metric, with one reason
/// per metric whose totals are not close under the plan's tolerance.
pub fn reconcile_totals(plan: &AggregatePlan, left: &Dataset, right: &Dataset) -> DiscrepancySet {
    let mut findings = Findings::new();

    let left_missing: Vec<Reason> = missing(left, &plan.left_document, plan.metrics.iter().map(|m| m.left.as_str()));
    let right_missing: Vec<Reason> =
        missing(right, &plan.right_document, plan.metrics.iter().map(|m| m.right.as_str()));
    if !left_missing.is_empty() || !right_missing.is_empty() {
        findings.record(Subject::Dataset { document: plan.left_document.clone() }, left_missing);
        findings.record(Subject::Dataset { document: plan.right_document.clone() }, right_missing);
        return findings.skip(&plan.check);
    }

    let mut summaries: Vec<MetricSummary> = Vec::with_capacity(plan.metrics.len() + 1);
    for metric in &plan.metrics {
        let (left_total, left_bad) = sum_column(left, &metric.left);
        let (right_total, right_bad) = sum_column(right, &metric.right);
        if left_bad + right_bad > 0 {
            tracing::warn!(
                check = %plan.check,
                metric = %metric.name,
                left_bad,
                right_bad,
                "non-numeric cells left out of totals"
            );
        }
        summaries.push(MetricSummary {
            metric: metric.name.clone(),
            left_total,
            right_total,
            difference: left_total - right_total,
        });
    }

    if let Some(combined) = &plan.combined {
        let parts: Vec<&MetricSummary> = summaries
            .iter()
            .filter(|s| combined.metrics.contains(&s.metric))
            .collect();
        let left_total: f64 = parts.iter().map(|s| s.left_total).sum();
        let right_total: f64 = parts.iter().map(|s| s.right_total).sum();
        summaries.push(MetricSummary {
            metric: combined.name.clone(),
            left_total,
            right_total,
            difference: parts.iter().map(|s| s.difference).sum(),
        });
    }

    let reasons: Vec<Reason> = summaries
        .iter()
        .filter(|s| !plan.tolerance.is_close(s.left_total, s.right_total))
        .map(|s| Reason::MetricOutOfTolerance {
            metric: s.metric.clone(),
            left_total: s.left_total,
            right_total: s.right_total,
            difference: s.difference,
        })
        .collect();

    findings.record(
        Subject::Aggregate {
            left_document: plan.left_document.clone(),
            right_document: plan.right_document.clone(),
            metrics: summaries,
        },
        reasons,
    );
    findings.finish(&plan.check)
}

fn missing<'c>(ds: &Dataset, document: &str, columns: impl Iterator<Item = &'c str>) -> Vec<Reason> {
    let columns: Vec<&str> = columns.collect();
    ds.missing_columns(&columns)
        .into_iter()
        .map(|column| Reason::MissingColumn {
            document: document.to_string(),
            column: column.to_string(),
        })
        .collect()
}
