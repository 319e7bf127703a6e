//! The built-in GST cross-document checks.
//!
//! Each check resolves its column mapping once, builds a plan for one of
//! the three engines (key-based, chained, or aggregate), and hands the plan
//! its datasets.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::aggregate::{reconcile_totals, AggregatePlan, CombinedMetric, MetricSpec};
use crate::circular::{detect_circular_trading, CircularPlan};
use crate::columns::{
    AnnexureBColumns, BrcColumns, DocumentKind, EwayBillColumns, ExportInvoiceColumns, GeneralColumns, Gstr1Columns,
    Gstr2bColumns, Gstr3bColumns, InvoiceColumns, PurchaseColumns, ShippingBillColumns, TransactionColumns,
};
use crate::config::GstConfig;
use crate::dataset::Dataset;
use crate::error::ReconError;
use crate::matcher::{apply_key_transform, JoinMode, KeyPair, KeyTransform};
use crate::model::DiscrepancySet;
use crate::reconcile::{reconcile, reconcile_chain, ChainPlan, ChainStage, FieldRule, ReconcilePlan, RowRule, Side};
use crate::validate::{parse_flag, read_amount, Tolerance};

/// Register totals are filed independently of the return, so drift is
/// judged relative to size.
pub const GENERAL_TOTAL_TOLERANCE: Tolerance = Tolerance { abs: 0.01, rel: 0.01 };

// ---------------------------------------------------------------------------
// Check identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossCheck {
    InvoiceVsEwaybill,
    Gstr2bVsPurchase,
    ExportChain,
    Gstr1VsGstr3b,
    Gstr3bVsGeneral,
    EwaybillVsGeneral,
    Gstr2bVsAnnexureb,
    CircularTrading,
}

impl CrossCheck {
    pub const ALL: [CrossCheck; 8] = [
        Self::InvoiceVsEwaybill,
        Self::Gstr2bVsPurchase,
        Self::ExportChain,
        Self::Gstr1VsGstr3b,
        Self::Gstr3bVsGeneral,
        Self::EwaybillVsGeneral,
        Self::Gstr2bVsAnnexureb,
        Self::CircularTrading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvoiceVsEwaybill => "invoice_vs_ewaybill",
            Self::Gstr2bVsPurchase => "gstr2b_vs_purchase",
            Self::ExportChain => "export_chain",
            Self::Gstr1VsGstr3b => "gstr1_vs_gstr3b",
            Self::Gstr3bVsGeneral => "gstr3b_vs_general",
            Self::EwaybillVsGeneral => "ewaybill_vs_general",
            Self::Gstr2bVsAnnexureb => "gstr2b_vs_annexureb",
            Self::CircularTrading => "circular_trading",
        }
    }

    /// Documents that must all be loaded for the check to run. Circular
    /// trading picks its source separately; see [`circular_source`].
    pub fn inputs(&self) -> &'static [DocumentKind] {
        use DocumentKind::*;
        match self {
            Self::InvoiceVsEwaybill => &[Invoice, Ewaybill],
            Self::Gstr2bVsPurchase => &[Gstr2b, Purchase],
            Self::ExportChain => &[ExportInvoice, ShippingBill, Brc],
            Self::Gstr1VsGstr3b => &[Gstr1, Gstr3b],
            Self::Gstr3bVsGeneral => &[Gstr3b, GstGen],
            Self::EwaybillVsGeneral => &[Ewaybill, GstGen],
            Self::Gstr2bVsAnnexureb => &[Annexureb, Gstr2b],
            Self::CircularTrading => &[Transactions],
        }
    }
}

impl fmt::Display for CrossCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CrossCheck {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ReconError::UnknownCheck(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Invoice vs e-way bill
// ---------------------------------------------------------------------------

pub fn invoice_vs_ewaybill_plan(config: &GstConfig) -> ReconcilePlan {
    let inv = InvoiceColumns::resolve(&config.columns);
    let ewb = EwayBillColumns::resolve(&config.columns);
    let tolerance = config.tolerance.field();

    ReconcilePlan {
        check: CrossCheck::InvoiceVsEwaybill.to_string(),
        record_label: "Invoice".into(),
        left: Side::new(DocumentKind::Invoice.as_str(), "Invoice")
            .with_rule(RowRule::tax_id("Supplier GSTIN", &inv.gstin_supplier))
            .with_rule(RowRule::tax_id("Recipient GSTIN", &inv.gstin_recipient)),
        right: Side::new(DocumentKind::Ewaybill.as_str(), "Ewaybill")
            .with_rule(RowRule::tax_id("Supplier GSTIN", &ewb.supplier_gstin))
            .with_rule(RowRule::tax_id("Recipient GSTIN", &ewb.recipient_gstin)),
        keys: vec![KeyPair::new(&inv.invoice_number, &ewb.invoice_number)],
        mode: JoinMode::Inner,
        transform: KeyTransform::None,
        rules: vec![
            FieldRule::text("Invoice Date", &inv.invoice_date, &ewb.invoice_date),
            FieldRule::text("Supplier GSTIN", &inv.gstin_supplier, &ewb.supplier_gstin),
            FieldRule::text("Recipient GSTIN", &inv.gstin_recipient, &ewb.recipient_gstin),
            FieldRule::numeric("Invoice Value", &inv.invoice_value, &ewb.total_value, tolerance),
        ],
    }
}

// ---------------------------------------------------------------------------
// GSTR-2B vs purchase register
// ---------------------------------------------------------------------------

pub fn gstr2b_vs_purchase_plan(config: &GstConfig) -> ReconcilePlan {
    let g2b = Gstr2bColumns::resolve(&config.columns);
    let pur = PurchaseColumns::resolve(&config.columns);

    ReconcilePlan {
        check: CrossCheck::Gstr2bVsPurchase.to_string(),
        record_label: "Invoice".into(),
        left: Side::new(DocumentKind::Gstr2b.as_str(), "GSTR-2B")
            .with_rule(RowRule::CreditEligible {
                column: g2b.itc_eligible.clone(),
            })
            .with_rule(RowRule::tax_id("Supplier GSTIN", &g2b.gstin)),
        right: Side::new(DocumentKind::Purchase.as_str(), "Purchase Records")
            .with_rule(RowRule::tax_id("Supplier GSTIN", &pur.gstin_supplier)),
        keys: vec![
            KeyPair::new(&g2b.invoice_number, &pur.invoice_number),
            KeyPair::new(&g2b.gstin, &pur.gstin_supplier),
        ],
        mode: JoinMode::Outer,
        transform: KeyTransform::None,
        rules: vec![
            FieldRule::text("Invoice Date", &g2b.invoice_date, &pur.invoice_date),
            FieldRule::numeric("ITC Amount", &g2b.itc_amount, &pur.itc_claimed, config.tolerance.field()),
        ],
    }
}

// ---------------------------------------------------------------------------
// Export chain: invoice → shipping bill → bank realization
// ---------------------------------------------------------------------------

pub fn export_chain_plan(config: &GstConfig) -> ChainPlan {
    let exp = ExportInvoiceColumns::resolve(&config.columns);
    let sb = ShippingBillColumns::resolve(&config.columns);
    let brc = BrcColumns::resolve(&config.columns);
    let tolerance = config.tolerance.field();

    ChainPlan {
        check: CrossCheck::ExportChain.to_string(),
        primary: Side::new(DocumentKind::ExportInvoice.as_str(), "Export Invoice")
            .with_rule(RowRule::tax_id("Supplier GSTIN", &exp.gstin_supplier)),
        stages: vec![
            ChainStage {
                side: Side::new(DocumentKind::ShippingBill.as_str(), "Shipping Bill"),
                keys: vec![KeyPair::new(&exp.invoice_number, &sb.invoice_number)],
                presence_column: Some(sb.shipping_bill_number.clone()),
                rules: vec![
                    FieldRule::text("Invoice Date and Shipping Date", &exp.invoice_date, &sb.shipping_date),
                    FieldRule::numeric("Export Value", &exp.export_value, &sb.export_value, tolerance)
                        .between("Invoice", "Shipping Bill"),
                ],
            },
            ChainStage {
                side: Side::new(DocumentKind::Brc.as_str(), "Bank Realization Certificate"),
                keys: vec![KeyPair::new(&exp.invoice_number, &brc.invoice_number)],
                presence_column: Some(brc.brc_number.clone()),
                rules: vec![FieldRule::right_at_least(
                    "Realized Amount",
                    "Export Value",
                    &exp.export_value,
                    &brc.realized_amount,
                    tolerance,
                )],
            },
        ],
        transform: KeyTransform::None,
    }
}

// ---------------------------------------------------------------------------
// Aggregate checks
// ---------------------------------------------------------------------------

pub fn gstr1_vs_gstr3b_plan(config: &GstConfig) -> AggregatePlan {
    let r1 = Gstr1Columns::resolve(&config.columns);
    let r3 = Gstr3bColumns::resolve(&config.columns);

    AggregatePlan {
        check: CrossCheck::Gstr1VsGstr3b.to_string(),
        left_document: DocumentKind::Gstr1.as_str().into(),
        right_document: DocumentKind::Gstr3b.as_str().into(),
        metrics: vec![
            MetricSpec::new("taxable_value", &r1.taxable_value, &r3.taxable_value),
            MetricSpec::new("igst", &r1.igst, &r3.igst_paid),
            MetricSpec::new("cgst", &r1.cgst, &r3.cgst_paid),
            MetricSpec::new("sgst", &r1.sgst, &r3.sgst_paid),
        ],
        combined: Some(CombinedMetric {
            name: "total".into(),
            metrics: vec!["igst".into(), "cgst".into(), "sgst".into()],
        }),
        tolerance: config.tolerance.aggregate(),
    }
}

pub fn gstr3b_vs_general_plan(config: &GstConfig) -> AggregatePlan {
    let r3 = Gstr3bColumns::resolve(&config.columns);
    let gen = GeneralColumns::resolve(&config.columns);

    AggregatePlan {
        check: CrossCheck::Gstr3bVsGeneral.to_string(),
        left_document: DocumentKind::Gstr3b.as_str().into(),
        right_document: DocumentKind::GstGen.as_str().into(),
        metrics: vec![MetricSpec::new("taxable_value", &r3.taxable_value, &gen.total_amount)],
        combined: None,
        tolerance: GENERAL_TOTAL_TOLERANCE,
    }
}

// ---------------------------------------------------------------------------
// E-way bill vs general register
// ---------------------------------------------------------------------------

pub fn ewaybill_vs_general_plan(config: &GstConfig) -> ReconcilePlan {
    let ewb = EwayBillColumns::resolve(&config.columns);
    let gen = GeneralColumns::resolve(&config.columns);

    ReconcilePlan {
        check: CrossCheck::EwaybillVsGeneral.to_string(),
        record_label: "Invoice".into(),
        left: Side::new(DocumentKind::Ewaybill.as_str(), "Ewaybill"),
        right: Side::new(DocumentKind::GstGen.as_str(), "General Data"),
        keys: vec![KeyPair::new(&ewb.invoice_number, &gen.invoice_number)],
        mode: JoinMode::Inner,
        transform: KeyTransform::Lowercase,
        rules: vec![FieldRule::numeric(
            "E-way Bill Total Value",
            &ewb.total_value,
            &gen.total_amount,
            config.tolerance.field(),
        )],
    }
}

/// Rows with a usable key and a readable amount, first occurrence per key.
fn comparable_rows(ds: &Dataset, key: &str, amount: &str, transform: KeyTransform, document: &str) -> Dataset {
    let usable = ds.filter(|row| read_amount(row.get(amount)).valid().is_some());
    let dropped = ds.len() - usable.len();
    if dropped > 0 {
        tracing::warn!(document, dropped, column = amount, "rows without a readable amount left out");
    }
    usable.dedup_by(|row| {
        row.get(key)
            .repr()
            .map(|k| apply_key_transform(&k, transform))
            .filter(|k| !k.is_empty())
    })
}

pub fn ewaybill_vs_general(config: &GstConfig, ewaybill: &Dataset, general: &Dataset) -> DiscrepancySet {
    let plan = ewaybill_vs_general_plan(config);
    let (lk, rk) = (&plan.keys[0].left, &plan.keys[0].right);
    let (la, ra) = (&plan.rules[0].left, &plan.rules[0].right);

    // Column checks must see the datasets as loaded.
    if !ewaybill.has_column(lk) || !ewaybill.has_column(la) || !general.has_column(rk) || !general.has_column(ra) {
        return reconcile(&plan, ewaybill, general);
    }
    let left = comparable_rows(ewaybill, lk, la, plan.transform, DocumentKind::Ewaybill.as_str());
    let right = comparable_rows(general, rk, ra, plan.transform, DocumentKind::GstGen.as_str());
    reconcile(&plan, &left, &right)
}

// ---------------------------------------------------------------------------
// GSTR-2B vs Annexure B
// ---------------------------------------------------------------------------

pub fn gstr2b_vs_annexureb_plan(config: &GstConfig) -> ReconcilePlan {
    let ann = AnnexureBColumns::resolve(&config.columns);
    let g2b = Gstr2bColumns::resolve(&config.columns);

    ReconcilePlan {
        check: CrossCheck::Gstr2bVsAnnexureb.to_string(),
        record_label: "Export Invoice".into(),
        left: Side::new(DocumentKind::Annexureb.as_str(), "Annexure B"),
        right: Side::new(DocumentKind::Gstr2b.as_str(), "GSTR-2B").with_rule(RowRule::NoExportCredit {
            column: g2b.itc_available.clone(),
            invoice_column: g2b.invoice_number.clone(),
        }),
        keys: vec![KeyPair::new(&ann.export_invoice_number, &g2b.invoice_number)],
        mode: JoinMode::Inner,
        transform: KeyTransform::Lowercase,
        rules: Vec::new(),
    }
}

/// Export invoices must not show up in GSTR-2B with credit available. Only
/// 2B rows flagged as credit-available take part, so every match is a
/// finding.
pub fn gstr2b_vs_annexureb(config: &GstConfig, annexureb: &Dataset, gstr2b: &Dataset) -> DiscrepancySet {
    let plan = gstr2b_vs_annexureb_plan(config);
    let itc = Gstr2bColumns::resolve(&config.columns).itc_available;
    let claimed = gstr2b.filter(|row| parse_flag(row.get(&itc)) == Some(true));
    reconcile(&plan, annexureb, &claimed)
}

// ---------------------------------------------------------------------------
// Circular trading
// ---------------------------------------------------------------------------

/// Where circular trading reads supplier → recipient edges from: the
/// transactions document when loaded, otherwise the first of the general
/// register and the invoice document that carries both columns.
pub fn circular_source<'c>(
    config: &GstConfig,
    lookup: impl Fn(DocumentKind) -> Option<&'c Dataset>,
) -> Option<(CircularPlan, &'c Dataset)> {
    let c = &config.circular;
    let plan = |kind: DocumentKind, supplier: String, recipient: String| CircularPlan {
        check: CrossCheck::CircularTrading.to_string(),
        document: kind.as_str().to_string(),
        supplier_column: c.supplier_column.clone().unwrap_or(supplier),
        recipient_column: c.recipient_column.clone().unwrap_or(recipient),
        threshold: c.threshold,
        limits: c.limits(),
    };

    if let Some(ds) = lookup(DocumentKind::Transactions) {
        let cols = TransactionColumns::resolve(&config.columns);
        return Some((plan(DocumentKind::Transactions, cols.gstin_supplier, cols.gstin_recipient), ds));
    }

    let gen = GeneralColumns::resolve(&config.columns);
    let inv = InvoiceColumns::resolve(&config.columns);
    let fallbacks = [
        (DocumentKind::GstGen, gen.supplier_gstin, gen.recipient_gstin),
        (DocumentKind::Invoice, inv.gstin_supplier, inv.gstin_recipient),
    ];
    for (kind, supplier, recipient) in fallbacks {
        let Some(ds) = lookup(kind) else { continue };
        let p = plan(kind, supplier, recipient);
        if ds.has_column(&p.supplier_column) && ds.has_column(&p.recipient_column) {
            tracing::info!(document = kind.as_str(), "circular trading reads edges from fallback document");
            return Some((p, ds));
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run one cross-check if its documents are available. `None` means the
/// check was not run.
pub fn run_cross_check<'c>(
    check: CrossCheck,
    config: &GstConfig,
    lookup: impl Fn(DocumentKind) -> Option<&'c Dataset>,
) -> Option<DiscrepancySet> {
    if check == CrossCheck::CircularTrading {
        let (plan, ds) = circular_source(config, lookup)?;
        return Some(detect_circular_trading(&plan, ds));
    }

    let inputs: Vec<&Dataset> = check.inputs().iter().map(|k| lookup(*k)).collect::<Option<_>>()?;
    let set = match check {
        CrossCheck::InvoiceVsEwaybill => reconcile(&invoice_vs_ewaybill_plan(config), inputs[0], inputs[1]),
        CrossCheck::Gstr2bVsPurchase => reconcile(&gstr2b_vs_purchase_plan(config), inputs[0], inputs[1]),
        CrossCheck::ExportChain => reconcile_chain(&export_chain_plan(config), inputs[0], &inputs[1..]),
        CrossCheck::Gstr1VsGstr3b => reconcile_totals(&gstr1_vs_gstr3b_plan(config), inputs[0], inputs[1]),
        CrossCheck::Gstr3bVsGeneral => reconcile_totals(&gstr3b_vs_general_plan(config), inputs[0], inputs[1]),
        CrossCheck::EwaybillVsGeneral => ewaybill_vs_general(config, inputs[0], inputs[1]),
        CrossCheck::Gstr2bVsAnnexureb => gstr2b_vs_annexureb(config, inputs[0], inputs[1]),
        CrossCheck::CircularTrading => return None,
    };
    Some(set)
}
