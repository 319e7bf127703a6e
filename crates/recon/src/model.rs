use std::fmt;

use serde::Serialize;

use crate::dataset::Value;

// ---------------------------------------------------------------------------
// Reasons
// ---------------------------------------------------------------------------

/// Why a subject was flagged. Variants carry structured context; the
/// human-readable text is produced by `Display`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reason {
    /// A compared field differs between two documents.
    FieldMismatch {
        field: String,
        left_column: String,
        right_column: String,
        left: Value,
        right: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        between: Option<(String, String)>,
    },
    /// A value fails the structural GSTIN check.
    InvalidTaxId {
        field: String,
        document: String,
        column: String,
        value: Value,
    },
    /// An amount column holds something that is not a number.
    NonNumeric { column: String, value: Value },
    /// A date column does not parse with the configured format.
    InvalidDate {
        column: String,
        value: Value,
        format: String,
    },
    FutureDate { column: String, value: Value },
    NegativeAmount { column: String, value: Value },
    /// Unmatched row of an outer reconciliation.
    OnlyIn { record: String, document: String },
    /// A later stage of a chained reconciliation has no row for this key.
    MissingRecord { document: String },
    /// `value` is below `required`.
    AmountShortfall {
        field: String,
        reference: String,
        value: Value,
        required: Value,
    },
    CreditIneligible { document: String, column: String, value: Value },
    CreditClaimedOnExport { invoice: Value, column: String, value: Value },
    /// A summed metric differs by more than the aggregate tolerance.
    MetricOutOfTolerance {
        metric: String,
        left_total: f64,
        right_total: f64,
        difference: f64,
    },
    CircularTrading { length: usize },
    /// Cycle enumeration stopped early; the reported cycles are incomplete.
    CycleLimitReached { limit: String, value: usize },
    MissingColumn { document: String, column: String },
    /// A join key column is present but holds no usable value at all.
    UnusableJoinKey { document: String, column: String },
    /// Value outside a configured list of accepted values.
    NotAllowed { column: String, value: Value },
    InvalidFormat {
        column: String,
        value: Value,
        expected: String,
    },
    /// `later` precedes `earlier`.
    DateOrder {
        earlier: String,
        later: String,
        earlier_value: Value,
        later_value: Value,
    },
    TaxInconsistent {
        column: String,
        value: Value,
        expected: f64,
    },
    CreditExceedsTaxPaid { claimed: f64, paid: f64 },
    CreditWithoutTax,
    PeriodTooLong { days: i64, max_days: i64 },
    TaxOnExport { column: String, value: Value },
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldMismatch { field, between: None, .. } => write!(f, "{field} Mismatch"),
            Self::FieldMismatch { field, between: Some((a, b)), .. } => {
                write!(f, "{field} Mismatch between {a} and {b}")
            }
            Self::InvalidTaxId { field, document, .. } => write!(f, "Invalid {field} in {document}"),
            Self::NonNumeric { column, value } => {
                write!(f, "Invalid numeric value in '{column}': '{value}'")
            }
            Self::InvalidDate { column, value, format } => {
                write!(f, "Invalid date in '{column}': '{value}' (expected {format})")
            }
            Self::FutureDate { column, value } => write!(f, "{column} is in the future: {value}"),
            Self::NegativeAmount { column, value } => {
                write!(f, "Negative value in '{column}': {value}")
            }
            Self::OnlyIn { record, document } => write!(f, "{record} only in {document}"),
            Self::MissingRecord { document } => write!(f, "Missing {document}"),
            Self::AmountShortfall { field, reference, .. } => {
                write!(f, "{field} Less Than {reference}")
            }
            Self::CreditIneligible { document, .. } => {
                write!(f, "ITC Not Eligible as per {document}")
            }
            Self::CreditClaimedOnExport { .. } => {
                write!(f, "Export Invoice found in GSTR-2B with ITC claimed")
            }
            Self::MetricOutOfTolerance { metric, difference, .. } => {
                write!(f, "{metric} difference exceeds tolerance ({difference:.2})")
            }
            Self::CircularTrading { length } => {
                write!(f, "Potential circular trading cycle of length {length}")
            }
            Self::CycleLimitReached { limit, value } => {
                write!(f, "Cycle enumeration stopped at {limit} limit ({value}); results are incomplete")
            }
            Self::MissingColumn { column, .. } => write!(f, "Missing required column: {column}"),
            Self::UnusableJoinKey { column, .. } => {
                write!(f, "Join key column '{column}' has no usable values")
            }
            Self::NotAllowed { column, value } => write!(f, "Invalid {column}: '{value}'"),
            Self::InvalidFormat { column, value, expected } => {
                write!(f, "Invalid {column} format: '{value}' (expected {expected})")
            }
            Self::DateOrder { earlier, later, .. } => {
                write!(f, "{later} cannot be before {earlier}")
            }
            Self::TaxInconsistent { expected, .. } => {
                write!(f, "Tax amount inconsistent with GST rate (expected {expected:.2})")
            }
            Self::CreditExceedsTaxPaid { claimed, paid } => write!(
                f,
                "ITC claimed ({claimed:.2}) exceeds 120% of taxes paid ({paid:.2})"
            ),
            Self::CreditWithoutTax => write!(f, "ITC available but all tax amounts are zero"),
            Self::PeriodTooLong { days, max_days } => {
                write!(f, "Refund period of {days} days exceeds {max_days} days")
            }
            Self::TaxOnExport { .. } => write!(f, "Tax should typically be zero for exports"),
        }
    }
}

impl Reason {
    /// Columns and values that locate this reason in the source data.
    pub fn context(&self) -> (Vec<String>, Vec<Value>) {
        match self {
            Self::FieldMismatch { left_column, right_column, left, right, .. } => (
                vec![left_column.clone(), right_column.clone()],
                vec![left.clone(), right.clone()],
            ),
            Self::InvalidTaxId { column, value, .. }
            | Self::NonNumeric { column, value }
            | Self::InvalidDate { column, value, .. }
            | Self::FutureDate { column, value }
            | Self::NegativeAmount { column, value }
            | Self::CreditIneligible { column, value, .. }
            | Self::CreditClaimedOnExport { column, value, .. }
            | Self::NotAllowed { column, value }
            | Self::InvalidFormat { column, value, .. }
            | Self::TaxInconsistent { column, value, .. }
            | Self::TaxOnExport { column, value } => (vec![column.clone()], vec![value.clone()]),
            Self::AmountShortfall { field, reference, value, required } => (
                vec![field.clone(), reference.clone()],
                vec![value.clone(), required.clone()],
            ),
            Self::DateOrder { earlier, later, earlier_value, later_value } => (
                vec![earlier.clone(), later.clone()],
                vec![earlier_value.clone(), later_value.clone()],
            ),
            Self::MetricOutOfTolerance { metric, left_total, right_total, .. } => (
                vec![metric.clone()],
                vec![Value::Number(*left_total), Value::Number(*right_total)],
            ),
            Self::MissingColumn { column, .. } | Self::UnusableJoinKey { column, .. } => {
                (vec![column.clone()], Vec::new())
            }
            Self::CreditExceedsTaxPaid { claimed, paid } => {
                (Vec::new(), vec![Value::Number(*claimed), Value::Number(*paid)])
            }
            Self::OnlyIn { .. }
            | Self::MissingRecord { .. }
            | Self::CircularTrading { .. }
            | Self::CycleLimitReached { .. }
            | Self::CreditWithoutTax
            | Self::PeriodTooLong { .. } => (Vec::new(), Vec::new()),
        }
    }

    /// Configuration-level reasons make the dependent check skip.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::MissingColumn { .. } | Self::UnusableJoinKey { .. })
    }
}

// ---------------------------------------------------------------------------
// Subjects
// ---------------------------------------------------------------------------

/// One summed metric on both sides of an aggregate comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: String,
    pub left_total: f64,
    pub right_total: f64,
    pub difference: f64,
}

/// What a discrepancy is about. Row indexes are zero-based source positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Subject {
    /// A whole dataset (configuration-level findings).
    Dataset { document: String },
    /// A single row, matched or not.
    Row {
        document: String,
        index: usize,
        key: Option<String>,
    },
    /// A matched pair from a two-way reconciliation.
    Pair {
        left_document: String,
        right_document: String,
        left_index: usize,
        right_index: usize,
        key: String,
    },
    /// A primary row and whatever later stages matched it.
    Chain {
        documents: Vec<String>,
        indexes: Vec<Option<usize>>,
        key: Option<String>,
    },
    /// A single summary over two whole datasets.
    Aggregate {
        left_document: String,
        right_document: String,
        metrics: Vec<MetricSummary>,
    },
    /// A ring of counterparties, in traversal order.
    Cycle { nodes: Vec<String> },
}

impl Subject {
    pub fn documents(&self) -> Vec<&str> {
        match self {
            Self::Dataset { document } | Self::Row { document, .. } => vec![document.as_str()],
            Self::Pair { left_document, right_document, .. }
            | Self::Aggregate { left_document, right_document, .. } => {
                vec![left_document.as_str(), right_document.as_str()]
            }
            Self::Chain { documents, .. } => documents.iter().map(String::as_str).collect(),
            Self::Cycle { .. } => Vec::new(),
        }
    }

    /// Zero-based source row indexes this subject points at.
    pub fn row_indexes(&self) -> Vec<usize> {
        match self {
            Self::Row { index, .. } => vec![*index],
            Self::Pair { left_index, right_index, .. } => vec![*left_index, *right_index],
            Self::Chain { indexes, .. } => indexes.iter().flatten().copied().collect(),
            Self::Dataset { .. } | Self::Aggregate { .. } | Self::Cycle { .. } => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Records and result sets
// ---------------------------------------------------------------------------

/// A subject plus the ordered reasons it was flagged for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Discrepancy {
    pub subject: Subject,
    pub reasons: Vec<Reason>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// Ran to completion. No records means it ran clean.
    Completed,
    /// Not run because of configuration-level findings (listed as records).
    Skipped,
}

/// The result of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancySet {
    pub check: String,
    pub status: CheckStatus,
    pub records: Vec<Discrepancy>,
}

impl DiscrepancySet {
    pub fn is_clean(&self) -> bool {
        self.status == CheckStatus::Completed && self.records.is_empty()
    }

    pub fn reason_count(&self) -> usize {
        self.records.iter().map(|r| r.reasons.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_text_matches_report_wording() {
        let r = Reason::OnlyIn {
            record: "Invoice".into(),
            document: "GSTR-2B".into(),
        };
        assert_eq!(r.to_string(), "Invoice only in GSTR-2B");

        let r = Reason::MissingRecord {
            document: "Shipping Bill".into(),
        };
        assert_eq!(r.to_string(), "Missing Shipping Bill");

        let r = Reason::AmountShortfall {
            field: "Realized Amount".into(),
            reference: "Export Value".into(),
            value: Value::Number(90.0),
            required: Value::Number(100.0),
        };
        assert_eq!(r.to_string(), "Realized Amount Less Than Export Value");
    }

    #[test]
    fn reasons_serialize_with_kind_tag() {
        let r = Reason::MissingColumn {
            document: "gstr2b".into(),
            column: "GSTIN".into(),
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "missing_column");
        assert_eq!(json["column"], "GSTIN");
        assert!(r.is_configuration());
    }

    #[test]
    fn pair_subject_locates_both_rows() {
        let s = Subject::Pair {
            left_document: "invoice".into(),
            right_document: "ewaybill".into(),
            left_index: 3,
            right_index: 7,
            key: "INV-1".into(),
        };
        assert_eq!(s.row_indexes(), vec![3, 7]);
        assert_eq!(s.documents(), vec!["invoice", "ewaybill"]);
    }
}
