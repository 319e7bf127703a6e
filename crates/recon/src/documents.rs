//! Single-document validators.
//!
//! Each validator checks one dataset row by row and reports every problem it
//! finds on a row as that row's reasons. Required columns missing from the
//! dataset skip the whole check; optional columns that are absent just turn
//! off the rules that read them.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::columns::{
    AnnexureBColumns, DocumentKind, EwayBillColumns, GeneralColumns, Gstr2bColumns, Gstr3bColumns, Rfd01Columns,
};
use crate::config::{GstConfig, GstRate};
use crate::dataset::{Dataset, Row, Value};
use crate::evidence::Findings;
use crate::model::{DiscrepancySet, Reason, Subject};
use crate::validate::{parse_flag, read_amount, read_date, validate_tax_id, Parsed, Tolerance};

/// Longest refund period accepted on an RFD-01 application.
pub const MAX_REFUND_PERIOD_DAYS: i64 = 730;

/// Credit claimed above this multiple of taxes paid is flagged.
pub const CREDIT_TO_TAX_RATIO: f64 = 1.2;

const INVOICE_NUMBER_PATTERN: &str = r"^[A-Za-z0-9/-]+$";
const TAX_PERIOD_PATTERN: &str = r"^\d{4}-(0[1-9]|1[0-2])$";

fn invoice_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(INVOICE_NUMBER_PATTERN).expect("invoice number pattern compiles"))
}

fn tax_period_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TAX_PERIOD_PATTERN).expect("tax period pattern compiles"))
}

/// Inputs shared by every validator besides the dataset itself.
#[derive(Debug, Clone, Copy)]
pub struct DocumentContext<'a> {
    pub config: &'a GstConfig,
    /// Dates after this are "in the future".
    pub today: NaiveDate,
}

/// Run the validator for `kind`. Kinds without a single-document validator
/// return `None`.
pub fn validate_document(kind: DocumentKind, ds: &Dataset, ctx: &DocumentContext<'_>) -> Option<DiscrepancySet> {
    let columns = &ctx.config.columns;
    let set = match kind {
        DocumentKind::GstGen => check_general(ds, &GeneralColumns::resolve(columns), ctx),
        DocumentKind::Gstr2b => check_gstr2b(ds, &Gstr2bColumns::resolve(columns), ctx),
        DocumentKind::Gstr3b => check_gstr3b(ds, &Gstr3bColumns::resolve(columns)),
        DocumentKind::Annexureb => check_annexureb(ds, &AnnexureBColumns::resolve(columns), ctx),
        DocumentKind::Rfd01 => check_rfd01(ds, &Rfd01Columns::resolve(columns), ctx),
        DocumentKind::Ewaybill => check_ewaybill(ds, &EwayBillColumns::resolve(columns), ctx),
        _ => return None,
    };
    Some(set)
}

/// Kinds that have a single-document validator.
pub fn has_validator(kind: DocumentKind) -> bool {
    matches!(
        kind,
        DocumentKind::GstGen
            | DocumentKind::Gstr2b
            | DocumentKind::Gstr3b
            | DocumentKind::Annexureb
            | DocumentKind::Rfd01
            | DocumentKind::Ewaybill
    )
}

// ---------------------------------------------------------------------------
// Row accumulation
// ---------------------------------------------------------------------------

/// Reasons collected for one row. Every helper reports and moves on; none
/// stops the remaining rules.
struct RowCheck<'r> {
    row: Row<'r>,
    reasons: Vec<Reason>,
}

impl<'r> RowCheck<'r> {
    fn new(row: Row<'r>) -> Self {
        Self {
            row,
            reasons: Vec::new(),
        }
    }

    fn tax_id(&mut self, field: &str, kind: DocumentKind, column: &str) {
        let value = self.row.get(column);
        if !validate_tax_id(value) {
            self.reasons.push(Reason::InvalidTaxId {
                field: field.to_string(),
                document: kind.label().to_string(),
                column: column.to_string(),
                value: value.clone(),
            });
        }
    }

    /// A blank cell in a present amount column is as unusable as text.
    fn amount(&mut self, column: &str) -> Option<f64> {
        let value = self.row.get(column);
        match read_amount(value) {
            Parsed::Valid(n) => Some(n),
            Parsed::Missing | Parsed::Invalid => {
                self.reasons.push(Reason::NonNumeric {
                    column: column.to_string(),
                    value: value.clone(),
                });
                None
            }
        }
    }

    fn non_negative(&mut self, column: &str) -> Option<f64> {
        let n = self.amount(column)?;
        if n < 0.0 {
            self.reasons.push(Reason::NegativeAmount {
                column: column.to_string(),
                value: self.row.get(column).clone(),
            });
        }
        Some(n)
    }

    fn date(&mut self, column: &str, format: &str) -> Option<NaiveDate> {
        let value = self.row.get(column);
        match read_date(value, format) {
            Parsed::Valid(d) => Some(d),
            Parsed::Missing | Parsed::Invalid => {
                self.reasons.push(Reason::InvalidDate {
                    column: column.to_string(),
                    value: value.clone(),
                    format: format.to_string(),
                });
                None
            }
        }
    }

    /// `later` must not precede `earlier`.
    fn ordered(&mut self, earlier: (&str, Option<NaiveDate>), later: (&str, Option<NaiveDate>)) {
        if let (Some(e), Some(l)) = (earlier.1, later.1) {
            if l < e {
                self.reasons.push(Reason::DateOrder {
                    earlier: earlier.0.to_string(),
                    later: later.0.to_string(),
                    earlier_value: self.row.get(earlier.0).clone(),
                    later_value: self.row.get(later.0).clone(),
                });
            }
        }
    }

    fn allowed(&mut self, column: &str, accepted: &[String]) {
        let value = self.row.get(column);
        let ok = value
            .repr()
            .is_some_and(|v| accepted.iter().any(|a| a.as_str() == v.trim()));
        if !ok {
            self.reasons.push(Reason::NotAllowed {
                column: column.to_string(),
                value: value.clone(),
            });
        }
    }

    fn matches(&mut self, column: &str, re: &Regex, expected: &str) {
        let value = self.row.get(column);
        if !value.repr().is_some_and(|v| re.is_match(v.trim())) {
            self.reasons.push(Reason::InvalidFormat {
                column: column.to_string(),
                value: value.clone(),
                expected: expected.to_string(),
            });
        }
    }

    fn finish(self, findings: &mut Findings, kind: DocumentKind, key_column: Option<&str>) {
        let key = key_column.and_then(|c| self.row.get(c).repr().map(|k| k.into_owned()));
        findings.record(
            Subject::Row {
                document: kind.as_str().to_string(),
                index: self.row.source_index(),
                key,
            },
            self.reasons,
        );
    }
}

/// Missing-column findings; the check is skipped when any are returned.
fn require(ds: &Dataset, kind: DocumentKind, required: &[&str]) -> Option<DiscrepancySet> {
    let missing = ds.missing_columns(required);
    if missing.is_empty() {
        return None;
    }
    let mut findings = Findings::new();
    findings.record(
        Subject::Dataset {
            document: kind.as_str().to_string(),
        },
        missing
            .into_iter()
            .map(|column| Reason::MissingColumn {
                document: kind.as_str().to_string(),
                column: column.to_string(),
            })
            .collect(),
    );
    Some(findings.skip(kind.as_str()))
}

/// Which optional columns are present; absent ones are logged.
fn optional(ds: &Dataset, kind: DocumentKind, column: &str) -> bool {
    let present = ds.has_column(column);
    if !present {
        tracing::debug!(document = kind.as_str(), column, "optional column absent, rules using it skipped");
    }
    present
}

fn round2(n: f64) -> f64 {
    (n * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// General invoice register
// ---------------------------------------------------------------------------

pub fn check_general(ds: &Dataset, cols: &GeneralColumns, ctx: &DocumentContext<'_>) -> DiscrepancySet {
    let kind = DocumentKind::GstGen;
    if let Some(skipped) = require(
        ds,
        kind,
        &[&cols.gstin, &cols.invoice_number, &cols.invoice_date, &cols.total_amount],
    ) {
        return skipped;
    }
    let format = ctx.config.date_format.as_str();

    let has_tax = optional(ds, kind, &cols.tax_amount);
    let rate_column = match &ctx.config.gst_rate {
        Some(GstRate::Column(c)) if !ds.has_column(c) => {
            tracing::warn!(column = %c, "gst_rate column not in general data; tax consistency not checked");
            None
        }
        Some(GstRate::Column(c)) => Some(c.as_str()),
        _ => None,
    };
    let tax_tolerance = Tolerance::absolute(0.01);

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        check.tax_id("GSTIN", kind, &cols.gstin);

        if let Some(date) = check.date(&cols.invoice_date, format) {
            if date > ctx.today {
                check.reasons.push(Reason::FutureDate {
                    column: cols.invoice_date.clone(),
                    value: row.get(&cols.invoice_date).clone(),
                });
            }
        }

        let total = check.non_negative(&cols.total_amount);

        if has_tax {
            let tax = check.amount(&cols.tax_amount);
            let rate = match (&ctx.config.gst_rate, rate_column) {
                (Some(GstRate::Percent(p)), _) => Some(*p),
                (_, Some(c)) => read_amount(row.get(c)).valid(),
                _ => None,
            };
            if let (Some(total), Some(tax), Some(rate)) = (total, tax, rate) {
                let expected = round2(total * rate / 100.0);
                if !tax_tolerance.is_close(tax, expected) {
                    check.reasons.push(Reason::TaxInconsistent {
                        column: cols.tax_amount.clone(),
                        value: row.get(&cols.tax_amount).clone(),
                        expected,
                    });
                }
            }
        }

        check.matches(&cols.invoice_number, invoice_number_regex(), "letters, digits, '-' or '/'");
        check.finish(&mut findings, kind, Some(&cols.invoice_number));
    }
    findings.finish(kind.as_str())
}

// ---------------------------------------------------------------------------
// GSTR-2B
// ---------------------------------------------------------------------------

pub fn check_gstr2b(ds: &Dataset, cols: &Gstr2bColumns, ctx: &DocumentContext<'_>) -> DiscrepancySet {
    let kind = DocumentKind::Gstr2b;
    let taxes = [cols.igst.as_str(), cols.cgst.as_str(), cols.sgst.as_str()];
    if let Some(skipped) = require(
        ds,
        kind,
        &[
            &cols.gstin,
            &cols.invoice_number,
            &cols.invoice_date,
            taxes[0],
            taxes[1],
            taxes[2],
            &cols.taxable_value,
            &cols.itc_available,
        ],
    ) {
        return skipped;
    }
    let format = ctx.config.date_format.as_str();

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        check.tax_id("GSTIN", kind, &cols.gstin);
        check.date(&cols.invoice_date, format);

        let amounts: Vec<Option<f64>> = taxes.iter().map(|c| check.non_negative(c)).collect();
        check.non_negative(&cols.taxable_value);

        let all_zero = amounts.iter().all(|a| *a == Some(0.0));
        if all_zero && parse_flag(row.get(&cols.itc_available)) == Some(true) {
            check.reasons.push(Reason::CreditWithoutTax);
        }

        check.finish(&mut findings, kind, Some(&cols.invoice_number));
    }
    findings.finish(kind.as_str())
}

// ---------------------------------------------------------------------------
// Annexure B (exports)
// ---------------------------------------------------------------------------

pub fn check_annexureb(ds: &Dataset, cols: &AnnexureBColumns, ctx: &DocumentContext<'_>) -> DiscrepancySet {
    let kind = DocumentKind::Annexureb;
    if let Some(skipped) = require(
        ds,
        kind,
        &[
            &cols.gstin,
            &cols.export_invoice_number,
            &cols.export_date,
            &cols.port_code,
            &cols.shipping_bill_number,
            &cols.shipping_bill_date,
            &cols.export_value,
            &cols.tax_paid,
            &cols.country_of_destination,
        ],
    ) {
        return skipped;
    }
    let format = ctx.config.date_format.as_str();
    let ports = &ctx.config.valid_values.port_codes;

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        check.tax_id("GSTIN", kind, &cols.gstin);

        let exported = check.date(&cols.export_date, format);
        let shipped = check.date(&cols.shipping_bill_date, format);
        check.ordered((cols.export_date.as_str(), exported), (cols.shipping_bill_date.as_str(), shipped));

        check.allowed(&cols.port_code, ports);

        check.non_negative(&cols.export_value);
        if let Some(tax) = check.amount(&cols.tax_paid) {
            if tax != 0.0 {
                check.reasons.push(Reason::TaxOnExport {
                    column: cols.tax_paid.clone(),
                    value: row.get(&cols.tax_paid).clone(),
                });
            }
        }

        check.finish(&mut findings, kind, Some(&cols.export_invoice_number));
    }
    findings.finish(kind.as_str())
}

// ---------------------------------------------------------------------------
// GSTR-3B
// ---------------------------------------------------------------------------

pub fn check_gstr3b(ds: &Dataset, cols: &Gstr3bColumns) -> DiscrepancySet {
    let kind = DocumentKind::Gstr3b;
    if let Some(skipped) = require(ds, kind, &[&cols.gstin, &cols.tax_period]) {
        return skipped;
    }

    let amount_columns: Vec<&str> = [
        &cols.taxable_value,
        &cols.igst_paid,
        &cols.cgst_paid,
        &cols.sgst_paid,
        &cols.itc_claimed,
    ]
    .into_iter()
    .map(String::as_str)
    .filter(|c| optional(ds, kind, c))
    .collect();
    let paid_columns = [cols.igst_paid.as_str(), cols.cgst_paid.as_str(), cols.sgst_paid.as_str()];
    let credit_rule = amount_columns.contains(&cols.itc_claimed.as_str())
        && paid_columns.iter().all(|c| amount_columns.contains(c));

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        check.tax_id("GSTIN", kind, &cols.gstin);

        if !matches!(row.get(&cols.tax_period), Value::Date(_)) {
            check.matches(&cols.tax_period, tax_period_regex(), "YYYY-MM");
        }

        let read: Vec<(&str, Option<f64>)> = amount_columns.iter().map(|c| (*c, check.non_negative(c))).collect();
        let value_of = |column: &str| read.iter().find(|(c, _)| *c == column).and_then(|(_, v)| *v);

        if credit_rule {
            let paid: Option<f64> = paid_columns.iter().map(|c| value_of(*c)).sum();
            if let (Some(claimed), Some(paid)) = (value_of(&cols.itc_claimed), paid) {
                if claimed > paid * CREDIT_TO_TAX_RATIO {
                    check.reasons.push(Reason::CreditExceedsTaxPaid { claimed, paid });
                }
            }
        }

        check.finish(&mut findings, kind, Some(&cols.tax_period));
    }
    findings.finish(kind.as_str())
}

// ---------------------------------------------------------------------------
// RFD-01 (refund application)
// ---------------------------------------------------------------------------

pub fn check_rfd01(ds: &Dataset, cols: &Rfd01Columns, ctx: &DocumentContext<'_>) -> DiscrepancySet {
    let kind = DocumentKind::Rfd01;
    if let Some(skipped) = require(ds, kind, &[&cols.gstin, &cols.refund_period_from, &cols.refund_period_to]) {
        return skipped;
    }
    let format = ctx.config.date_format.as_str();
    let has_reason = optional(ds, kind, &cols.reason_for_refund);
    let has_amount = optional(ds, kind, &cols.refund_amount_claimed);

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        check.tax_id("GSTIN", kind, &cols.gstin);

        let from = check.date(&cols.refund_period_from, format);
        let to = check.date(&cols.refund_period_to, format);
        check.ordered((cols.refund_period_from.as_str(), from), (cols.refund_period_to.as_str(), to));
        if let (Some(from), Some(to)) = (from, to) {
            let days = (to - from).num_days();
            if days > MAX_REFUND_PERIOD_DAYS {
                check.reasons.push(Reason::PeriodTooLong {
                    days,
                    max_days: MAX_REFUND_PERIOD_DAYS,
                });
            }
        }

        if has_amount {
            check.non_negative(&cols.refund_amount_claimed);
        }
        if has_reason {
            check.allowed(&cols.reason_for_refund, &ctx.config.valid_values.refund_reasons);
        }

        check.finish(&mut findings, kind, None);
    }
    findings.finish(kind.as_str())
}

// ---------------------------------------------------------------------------
// E-way bills
// ---------------------------------------------------------------------------

pub fn check_ewaybill(ds: &Dataset, cols: &EwayBillColumns, ctx: &DocumentContext<'_>) -> DiscrepancySet {
    let kind = DocumentKind::Ewaybill;
    if let Some(skipped) = require(ds, kind, &[&cols.eway_bill_number]) {
        return skipped;
    }
    let format = ctx.config.date_format.as_str();
    let present = |c: &str| optional(ds, kind, c);
    let supplier = present(&cols.supplier_gstin);
    let recipient = present(&cols.recipient_gstin);
    let generated = present(&cols.generated_date);
    let valid_until = present(&cols.valid_until);
    let invoice_date = present(&cols.invoice_date);
    let total = present(&cols.total_value);
    let mode = present(&cols.transport_mode);
    let distance = present(&cols.distance);

    let mut findings = Findings::new();
    for row in ds.rows() {
        let mut check = RowCheck::new(row);
        if supplier {
            check.tax_id("Supplier GSTIN", kind, &cols.supplier_gstin);
        }
        if recipient {
            check.tax_id("Recipient GSTIN", kind, &cols.recipient_gstin);
        }

        let gen = generated.then(|| check.date(&cols.generated_date, format)).flatten();
        let until = valid_until.then(|| check.date(&cols.valid_until, format)).flatten();
        let invoiced = invoice_date.then(|| check.date(&cols.invoice_date, format)).flatten();
        check.ordered((cols.generated_date.as_str(), gen), (cols.valid_until.as_str(), until));
        check.ordered((cols.invoice_date.as_str(), invoiced), (cols.generated_date.as_str(), gen));

        if total {
            check.non_negative(&cols.total_value);
        }
        if mode {
            check.allowed(&cols.transport_mode, &ctx.config.valid_values.transport_modes);
        }
        if distance {
            check.non_negative(&cols.distance);
        }

        check.finish(&mut findings, kind, Some(&cols.eway_bill_number));
    }
    findings.finish(kind.as_str())
}
