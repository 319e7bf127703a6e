//! Key-based document reconciliation.
//!
//! Two datasets (or a primary plus a chain of later-stage datasets) are
//! joined on declared key columns, then every matched row is run through
//! field comparison rules and per-side row rules. Failures accumulate: a
//! row carries one reason per failed rule.

use crate::dataset::{Dataset, Row, Value};
use crate::evidence::Findings;
use crate::matcher::{has_usable_key, join, JoinMode, KeyPair, KeyTransform, Origin};
use crate::model::{DiscrepancySet, Reason, Subject};
use crate::validate::{parse_flag, read_amount, safe_equal, validate_tax_id, Parsed, Tolerance};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    /// Null-safe string equality.
    Text { ignore_case: bool },
    /// Numeric closeness.
    Numeric(Tolerance),
    /// The right value must not fall below the left value. `reference`
    /// names the left value in the shortfall reason.
    RightAtLeast { tolerance: Tolerance, reference: String },
}

/// Compare `left` column (first dataset) with `right` column (second
/// dataset, or the later stage of a chain).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub label: String,
    pub left: String,
    pub right: String,
    pub comparator: Comparator,
    /// Document labels named in the mismatch text ("... between A and B").
    pub between: Option<(String, String)>,
}

impl FieldRule {
    pub fn text(label: &str, left: &str, right: &str) -> Self {
        Self::new(label, left, right, Comparator::Text { ignore_case: true })
    }

    pub fn numeric(label: &str, left: &str, right: &str, tolerance: Tolerance) -> Self {
        Self::new(label, left, right, Comparator::Numeric(tolerance))
    }

    pub fn right_at_least(label: &str, reference: &str, left: &str, right: &str, tolerance: Tolerance) -> Self {
        Self::new(
            label,
            left,
            right,
            Comparator::RightAtLeast {
                tolerance,
                reference: reference.to_string(),
            },
        )
    }

    fn new(label: &str, left: &str, right: &str, comparator: Comparator) -> Self {
        Self {
            label: label.to_string(),
            left: left.to_string(),
            right: right.to_string(),
            comparator,
            between: None,
        }
    }

    /// Name both documents in the mismatch text.
    pub fn between(mut self, left: &str, right: &str) -> Self {
        self.between = Some((left.to_string(), right.to_string()));
        self
    }

    /// Evaluate against one pair of cells.
    ///
    /// Numeric comparators never compare a cell that failed to parse: an
    /// unparseable or one-sided missing amount is a format failure on that
    /// side, not a mismatch. Both sides missing counts as equal.
    pub fn evaluate(&self, l: &Value, r: &Value) -> Vec<Reason> {
        match &self.comparator {
            Comparator::Text { ignore_case } => {
                if safe_equal(l, r, *ignore_case) {
                    Vec::new()
                } else {
                    vec![self.mismatch(l, r)]
                }
            }
            Comparator::Numeric(tolerance) => match self.amounts(l, r) {
                Ok(Some((a, b))) if !tolerance.is_close(a, b) => vec![self.mismatch(l, r)],
                Ok(_) => Vec::new(),
                Err(format_failures) => format_failures,
            },
            Comparator::RightAtLeast { tolerance, reference } => match self.amounts(l, r) {
                Ok(Some((required, actual))) if actual < required && !tolerance.is_close(actual, required) => {
                    vec![Reason::AmountShortfall {
                        field: self.label.clone(),
                        reference: reference.clone(),
                        value: r.clone(),
                        required: l.clone(),
                    }]
                }
                Ok(_) => Vec::new(),
                Err(format_failures) => format_failures,
            },
        }
    }

    fn mismatch(&self, l: &Value, r: &Value) -> Reason {
        Reason::FieldMismatch {
            field: self.label.clone(),
            left_column: self.left.clone(),
            right_column: self.right.clone(),
            left: l.clone(),
            right: r.clone(),
            between: self.between.clone(),
        }
    }

    /// `Ok(None)` when both are missing.
    fn amounts(&self, l: &Value, r: &Value) -> Result<Option<(f64, f64)>, Vec<Reason>> {
        match (read_amount(l), read_amount(r)) {
            (Parsed::Valid(a), Parsed::Valid(b)) => Ok(Some((a, b))),
            (Parsed::Missing, Parsed::Missing) => Ok(None),
            (pl, pr) => {
                let mut failures = Vec::new();
                if !matches!(pl, Parsed::Valid(_)) {
                    failures.push(Reason::NonNumeric {
                        column: self.left.clone(),
                        value: l.clone(),
                    });
                }
                if !matches!(pr, Parsed::Valid(_)) {
                    failures.push(Reason::NonNumeric {
                        column: self.right.clone(),
                        value: r.clone(),
                    });
                }
                Err(failures)
            }
        }
    }
}

/// A single-row check run on one side of every matched row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowRule {
    /// Structural GSTIN check, reported as "Invalid {field} in {side}".
    TaxId { field: String, column: String },
    /// A flag explicitly set to false makes the credit ineligible.
    CreditEligible { column: String },
    /// A flag set to true means credit was claimed on an export invoice.
    NoExportCredit { column: String, invoice_column: String },
}

impl RowRule {
    pub fn tax_id(field: &str, column: &str) -> Self {
        Self::TaxId {
            field: field.to_string(),
            column: column.to_string(),
        }
    }

    fn columns(&self) -> Vec<&str> {
        match self {
            Self::TaxId { column, .. } | Self::CreditEligible { column } => vec![column.as_str()],
            Self::NoExportCredit { column, invoice_column } => vec![column.as_str(), invoice_column.as_str()],
        }
    }

    fn apply(&self, row: &Row<'_>, side: &Side) -> Option<Reason> {
        match self {
            Self::TaxId { field, column } => {
                let value = row.get(column);
                (!validate_tax_id(value)).then(|| Reason::InvalidTaxId {
                    field: field.clone(),
                    document: side.label.clone(),
                    column: column.clone(),
                    value: value.clone(),
                })
            }
            Self::CreditEligible { column } => {
                let value = row.get(column);
                (parse_flag(value) == Some(false)).then(|| Reason::CreditIneligible {
                    document: side.label.clone(),
                    column: column.clone(),
                    value: value.clone(),
                })
            }
            Self::NoExportCredit { column, invoice_column } => {
                let value = row.get(column);
                (parse_flag(value) == Some(true)).then(|| Reason::CreditClaimedOnExport {
                    invoice: row.get(invoice_column).clone(),
                    column: column.clone(),
                    value: value.clone(),
                })
            }
        }
    }
}

/// One participating dataset: its document id, the name used in reasons,
/// and the row rules run on its matched rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Side {
    pub document: String,
    pub label: String,
    pub row_rules: Vec<RowRule>,
}

impl Side {
    pub fn new(document: &str, label: &str) -> Self {
        Self {
            document: document.to_string(),
            label: label.to_string(),
            row_rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: RowRule) -> Self {
        self.row_rules.push(rule);
        self
    }

    fn apply_rules(&self, row: &Row<'_>, reasons: &mut Vec<Reason>) {
        reasons.extend(self.row_rules.iter().filter_map(|rule| rule.apply(row, self)));
    }

    fn rule_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.row_rules.iter().flat_map(|r| r.columns())
    }
}

// ---------------------------------------------------------------------------
// Structural pre-checks
// ---------------------------------------------------------------------------

/// Missing-column and unusable-key findings for one dataset. Empty when the
/// dataset can be reconciled.
fn structural_reasons<'c>(
    ds: &Dataset,
    document: &str,
    required: impl IntoIterator<Item = &'c str>,
    keys: impl IntoIterator<Item = &'c str>,
    transform: KeyTransform,
) -> Vec<Reason> {
    let mut reasons = Vec::new();
    let mut seen: Vec<&str> = Vec::new();
    let keys: Vec<&str> = keys.into_iter().collect();
    for column in keys.iter().copied().chain(required) {
        if seen.contains(&column) {
            continue;
        }
        seen.push(column);
        if !ds.has_column(column) {
            reasons.push(Reason::MissingColumn {
                document: document.to_string(),
                column: column.to_string(),
            });
        }
    }
    if reasons.is_empty() && !ds.is_empty() {
        for key in keys {
            if !has_usable_key(ds, key, transform) {
                reasons.push(Reason::UnusableJoinKey {
                    document: document.to_string(),
                    column: key.to_string(),
                });
            }
        }
    }
    reasons
}

// ---------------------------------------------------------------------------
// Two-way
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilePlan {
    pub check: String,
    /// Noun used in "only in" reasons, e.g. "Invoice".
    pub record_label: String,
    pub left: Side,
    pub right: Side,
    pub keys: Vec<KeyPair>,
    pub mode: JoinMode,
    pub transform: KeyTransform,
    pub rules: Vec<FieldRule>,
}

/// Reconcile two datasets.
///
/// Matched rows get field rules plus both sides' row rules. Unmatched rows
/// kept by the join mode get a single reason: "only in" for outer joins,
/// "missing" (the right side) for left joins. Rows with no reasons are not
/// reported. A missing column or unusable key skips the whole check.
pub fn reconcile(plan: &ReconcilePlan, left: &Dataset, right: &Dataset) -> DiscrepancySet {
    let mut findings = Findings::new();

    let left_issues = structural_reasons(
        left,
        &plan.left.document,
        plan.rules.iter().map(|r| r.left.as_str()).chain(plan.left.rule_columns()),
        plan.keys.iter().map(|k| k.left.as_str()),
        plan.transform,
    );
    let right_issues = structural_reasons(
        right,
        &plan.right.document,
        plan.rules.iter().map(|r| r.right.as_str()).chain(plan.right.rule_columns()),
        plan.keys.iter().map(|k| k.right.as_str()),
        plan.transform,
    );
    if !left_issues.is_empty() || !right_issues.is_empty() {
        findings.record(Subject::Dataset { document: plan.left.document.clone() }, left_issues);
        findings.record(Subject::Dataset { document: plan.right.document.clone() }, right_issues);
        return findings.skip(&plan.check);
    }

    let joined = join(left, right, &plan.keys, plan.mode, plan.transform);

    for jr in &joined.rows {
        match (jr.origin, jr.left.and_then(|p| left.row(p)), jr.right.and_then(|p| right.row(p))) {
            (Origin::Both, Some(lrow), Some(rrow)) => {
                let mut reasons: Vec<Reason> = plan
                    .rules
                    .iter()
                    .flat_map(|rule| rule.evaluate(lrow.get(&rule.left), rrow.get(&rule.right)))
                    .collect();
                plan.left.apply_rules(&lrow, &mut reasons);
                plan.right.apply_rules(&rrow, &mut reasons);
                findings.record(
                    Subject::Pair {
                        left_document: plan.left.document.clone(),
                        right_document: plan.right.document.clone(),
                        left_index: lrow.source_index(),
                        right_index: rrow.source_index(),
                        key: jr.key.clone().unwrap_or_default(),
                    },
                    reasons,
                );
            }
            (Origin::LeftOnly, Some(lrow), _) => {
                let reason = if plan.mode == JoinMode::Outer {
                    Reason::OnlyIn {
                        record: plan.record_label.clone(),
                        document: plan.left.label.clone(),
                    }
                } else {
                    Reason::MissingRecord {
                        document: plan.right.label.clone(),
                    }
                };
                findings.record(
                    Subject::Row {
                        document: plan.left.document.clone(),
                        index: lrow.source_index(),
                        key: jr.key.clone(),
                    },
                    vec![reason],
                );
            }
            (Origin::RightOnly, _, Some(rrow)) => findings.record(
                Subject::Row {
                    document: plan.right.document.clone(),
                    index: rrow.source_index(),
                    key: jr.key.clone(),
                },
                vec![Reason::OnlyIn {
                    record: plan.record_label.clone(),
                    document: plan.right.label.clone(),
                }],
            ),
            _ => {}
        }
    }

    tracing::debug!(check = %plan.check, flagged = findings.len(), "reconciliation complete");
    findings.finish(&plan.check)
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// A later stage of a chain, left-joined to the primary dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStage {
    pub side: Side,
    /// Primary column → stage column.
    pub keys: Vec<KeyPair>,
    /// A matched stage row with this column null counts as absent.
    pub presence_column: Option<String>,
    /// Left = primary column, right = stage column.
    pub rules: Vec<FieldRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainPlan {
    pub check: String,
    pub primary: Side,
    pub stages: Vec<ChainStage>,
    pub transform: KeyTransform,
}

/// Reconcile a primary dataset against later stages with sequential left
/// joins. Every primary row survives; an absent stage is itself a reason and
/// that stage's rules are skipped. Primary row rules run on every row.
///
/// `stages` must line up with `plan.stages`.
pub fn reconcile_chain(plan: &ChainPlan, primary: &Dataset, stages: &[&Dataset]) -> DiscrepancySet {
    let mut findings = Findings::new();

    let primary_issues = structural_reasons(
        primary,
        &plan.primary.document,
        plan.stages
            .iter()
            .flat_map(|s| s.rules.iter().map(|r| r.left.as_str()))
            .chain(plan.primary.rule_columns()),
        plan.stages.iter().flat_map(|s| s.keys.iter().map(|k| k.left.as_str())),
        plan.transform,
    );
    let mut blocked = !primary_issues.is_empty();
    findings.record(Subject::Dataset { document: plan.primary.document.clone() }, primary_issues);

    for (stage, ds) in plan.stages.iter().zip(stages) {
        let issues = structural_reasons(
            ds,
            &stage.side.document,
            stage
                .rules
                .iter()
                .map(|r| r.right.as_str())
                .chain(stage.presence_column.as_deref())
                .chain(stage.side.rule_columns()),
            stage.keys.iter().map(|k| k.right.as_str()),
            plan.transform,
        );
        blocked |= !issues.is_empty();
        findings.record(Subject::Dataset { document: stage.side.document.clone() }, issues);
    }
    if blocked {
        return findings.skip(&plan.check);
    }

    // stage_rows[s][p] = matched position in stage s for primary row p
    let stage_rows: Vec<Vec<Option<usize>>> = plan
        .stages
        .iter()
        .zip(stages)
        .map(|(stage, ds)| {
            let mut slots = vec![None; primary.len()];
            for jr in join(primary, ds, &stage.keys, JoinMode::Left, plan.transform).rows {
                if let (Some(p), Some(s)) = (jr.left, jr.right) {
                    slots[p] = Some(s);
                }
            }
            slots
        })
        .collect();

    for prow in primary.rows() {
        let mut reasons = Vec::new();
        let mut indexes = vec![Some(prow.source_index())];

        for (s, (stage, ds)) in plan.stages.iter().zip(stages).enumerate() {
            let srow = stage_rows[s][prow.position()]
                .and_then(|pos| ds.row(pos))
                .filter(|r| match &stage.presence_column {
                    Some(col) => !r.get(col).is_null(),
                    None => true,
                });
            indexes.push(srow.map(|r| r.source_index()));

            match srow {
                None => reasons.push(Reason::MissingRecord {
                    document: stage.side.label.clone(),
                }),
                Some(srow) => {
                    for rule in &stage.rules {
                        reasons.extend(rule.evaluate(prow.get(&rule.left), srow.get(&rule.right)));
                    }
                    stage.side.apply_rules(&srow, &mut reasons);
                }
            }
        }
        plan.primary.apply_rules(&prow, &mut reasons);

        let key = plan
            .stages
            .first()
            .and_then(|s| s.keys.first())
            .and_then(|k| prow.get(&k.left).repr().map(|v| v.into_owned()));

        let mut documents = vec![plan.primary.document.clone()];
        documents.extend(plan.stages.iter().map(|s| s.side.document.clone()));
        findings.record(Subject::Chain { documents, indexes, key }, reasons);
    }

    tracing::debug!(check = %plan.check, flagged = findings.len(), "chain reconciliation complete");
    findings.finish(&plan.check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CheckStatus;

    fn ds(columns: &[&str], rows: &[&[&str]]) -> Dataset {
        Dataset::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Value::text(*v)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn plan(mode: JoinMode) -> ReconcilePlan {
        ReconcilePlan {
            check: "a_vs_b".into(),
            record_label: "Invoice".into(),
            left: Side::new("a", "A").with_rule(RowRule::tax_id("Supplier GSTIN", "gstin")),
            right: Side::new("b", "B"),
            keys: vec![KeyPair::same("inv")],
            mode,
            transform: KeyTransform::None,
            rules: vec![
                FieldRule::text("Invoice Date", "date", "date"),
                FieldRule::numeric("Invoice Value", "value", "value", Tolerance::default()),
            ],
        }
    }

    const GOOD: &str = "07AAAAA1234A1Z5";

    #[test]
    fn clean_rows_are_not_reported() {
        let a = ds(&["inv", "date", "value", "gstin"], &[&["1", "2025-01-01", "100", GOOD]]);
        let b = ds(&["inv", "date", "value"], &[&["1", "2025-01-01", "100.001"]]);
        let set = reconcile(&plan(JoinMode::Inner), &a, &b);
        assert_eq!(set.status, CheckStatus::Completed);
        assert!(set.records.is_empty());
    }

    #[test]
    fn failures_accumulate_on_one_row() {
        let a = ds(&["inv", "date", "value", "gstin"], &[&["1", "2025-01-01", "100", "bad"]]);
        let b = ds(&["inv", "date", "value"], &[&["1", "2025-01-02", "150"]]);
        let set = reconcile(&plan(JoinMode::Inner), &a, &b);
        assert_eq!(set.records.len(), 1);
        let text: Vec<String> = set.records[0].reasons.iter().map(|r| r.to_string()).collect();
        assert_eq!(
            text,
            vec![
                "Invoice Date Mismatch",
                "Invoice Value Mismatch",
                "Invalid Supplier GSTIN in A"
            ]
        );
    }

    #[test]
    fn non_numeric_amount_is_format_failure_not_mismatch() {
        let a = ds(&["inv", "date", "value", "gstin"], &[&["1", "d", "abc", GOOD]]);
        let b = ds(&["inv", "date", "value"], &[&["1", "d", "100"]]);
        let set = reconcile(&plan(JoinMode::Inner), &a, &b);
        let reasons = &set.records[0].reasons;
        assert_eq!(reasons.len(), 1);
        assert!(matches!(&reasons[0], Reason::NonNumeric { column, .. } if column == "value"));
    }

    #[test]
    fn outer_join_only_in_reasons() {
        let a = ds(&["inv", "date", "value", "gstin"], &[&["1", "d", "1", "bad"]]);
        let b = ds(&["inv", "date", "value"], &[&["2", "d", "1"]]);
        let set = reconcile(&plan(JoinMode::Outer), &a, &b);
        assert_eq!(set.records.len(), 2);
        assert_eq!(set.records[0].reasons, vec![Reason::OnlyIn { record: "Invoice".into(), document: "A".into() }]);
        assert_eq!(set.records[1].reasons, vec![Reason::OnlyIn { record: "Invoice".into(), document: "B".into() }]);
    }

    #[test]
    fn missing_column_skips_check() {
        let a = ds(&["inv", "date", "gstin"], &[&["1", "d", GOOD]]);
        let b = ds(&["inv", "date", "value"], &[&["1", "d", "1"]]);
        let set = reconcile(&plan(JoinMode::Inner), &a, &b);
        assert_eq!(set.status, CheckStatus::Skipped);
        assert_eq!(set.records.len(), 1);
        assert_eq!(set.records[0].subject, Subject::Dataset { document: "a".into() });
        assert_eq!(set.records[0].reasons[0].to_string(), "Missing required column: value");
    }

    #[test]
    fn all_null_key_skips_check() {
        let a = ds(&["inv", "date", "value", "gstin"], &[&["", "d", "1", GOOD]]);
        let b = ds(&["inv", "date", "value"], &[&["1", "d", "1"]]);
        let set = reconcile(&plan(JoinMode::Inner), &a, &b);
        assert_eq!(set.status, CheckStatus::Skipped);
        assert!(matches!(set.records[0].reasons[0], Reason::UnusableJoinKey { .. }));
    }

    #[test]
    fn empty_inputs_are_clean() {
        let a = ds(&["inv", "date", "value", "gstin"], &[]);
        let b = ds(&["inv", "date", "value"], &[]);
        let set = reconcile(&plan(JoinMode::Outer), &a, &b);
        assert!(set.is_clean());
    }

    fn chain_plan() -> ChainPlan {
        ChainPlan {
            check: "export_chain".into(),
            primary: Side::new("export_invoice", "Export Invoice")
                .with_rule(RowRule::tax_id("Supplier GSTIN", "gstin_supplier")),
            stages: vec![
                ChainStage {
                    side: Side::new("shipping_bill", "Shipping Bill"),
                    keys: vec![KeyPair::same("invoice_number")],
                    presence_column: Some("shipping_bill_number".into()),
                    rules: vec![FieldRule::numeric(
                        "Export Value",
                        "export_value",
                        "export_value",
                        Tolerance::default(),
                    )],
                },
                ChainStage {
                    side: Side::new("brc", "Bank Realization Certificate"),
                    keys: vec![KeyPair::same("invoice_number")],
                    presence_column: Some("brc_number".into()),
                    rules: vec![FieldRule::right_at_least(
                        "Realized Amount",
                        "Export Value",
                        "export_value",
                        "realized_amount",
                        Tolerance::default(),
                    )],
                },
            ],
            transform: KeyTransform::None,
        }
    }

    #[test]
    fn chain_keeps_every_primary_row() {
        let inv = ds(
            &["invoice_number", "export_value", "gstin_supplier"],
            &[&["E1", "100", GOOD], &["E2", "200", GOOD], &["E3", "300", GOOD]],
        );
        let sb = ds(
            &["invoice_number", "shipping_bill_number", "export_value"],
            &[&["E1", "SB1", "100"], &["E2", "SB2", "250"]],
        );
        let brc = ds(
            &["invoice_number", "brc_number", "realized_amount"],
            &[&["E1", "B1", "90"], &["E3", "B3", "300"]],
        );
        let set = reconcile_chain(&chain_plan(), &inv, &[&sb, &brc]);
        assert_eq!(set.records.len(), 3);

        let texts = |i: usize| -> Vec<String> { set.records[i].reasons.iter().map(|r| r.to_string()).collect() };
        assert_eq!(texts(0), vec!["Realized Amount Less Than Export Value"]);
        assert_eq!(
            texts(1),
            vec!["Export Value Mismatch", "Missing Bank Realization Certificate"]
        );
        assert_eq!(texts(2), vec!["Missing Shipping Bill"]);

        match &set.records[2].subject {
            Subject::Chain { indexes, .. } => assert_eq!(indexes, &vec![Some(2), None, Some(1)]),
            other => panic!("unexpected subject {other:?}"),
        }
    }

    #[test]
    fn chain_presence_column_null_counts_as_missing() {
        let inv = ds(&["invoice_number", "export_value", "gstin_supplier"], &[&["E1", "100", GOOD]]);
        let sb = ds(&["invoice_number", "shipping_bill_number", "export_value"], &[&["E1", "", "999"]]);
        let brc = ds(&["invoice_number", "brc_number", "realized_amount"], &[&["E1", "B1", "100"]]);
        let set = reconcile_chain(&chain_plan(), &inv, &[&sb, &brc]);
        assert_eq!(set.records[0].reasons, vec![Reason::MissingRecord { document: "Shipping Bill".into() }]);
    }
}
