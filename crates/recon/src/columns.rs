//! Document kinds and their column mappings.
//!
//! Every check reads its columns through a typed struct resolved once from
//! the configured overrides: a per-kind override wins, then a `default`
//! override, then the built-in name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Document kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// General invoice register.
    GstGen,
    Gstr1,
    Gstr2b,
    Gstr3b,
    /// Annexure B export statement.
    Annexureb,
    /// RFD-01 refund application.
    Rfd01,
    Ewaybill,
    Invoice,
    Purchase,
    ExportInvoice,
    ShippingBill,
    /// Bank realization certificates.
    Brc,
    Transactions,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 13] = [
        Self::GstGen,
        Self::Gstr1,
        Self::Gstr2b,
        Self::Gstr3b,
        Self::Annexureb,
        Self::Rfd01,
        Self::Ewaybill,
        Self::Invoice,
        Self::Purchase,
        Self::ExportInvoice,
        Self::ShippingBill,
        Self::Brc,
        Self::Transactions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GstGen => "gst_gen",
            Self::Gstr1 => "gstr1",
            Self::Gstr2b => "gstr2b",
            Self::Gstr3b => "gstr3b",
            Self::Annexureb => "annexureb",
            Self::Rfd01 => "rfd01",
            Self::Ewaybill => "ewaybill",
            Self::Invoice => "invoice",
            Self::Purchase => "purchase",
            Self::ExportInvoice => "export_invoice",
            Self::ShippingBill => "shipping_bill",
            Self::Brc => "brc",
            Self::Transactions => "transactions",
        }
    }

    /// Name used in reason text ("Invalid Supplier GSTIN in GSTR-2B").
    pub fn label(&self) -> &'static str {
        match self {
            Self::GstGen => "General Data",
            Self::Gstr1 => "GSTR-1",
            Self::Gstr2b => "GSTR-2B",
            Self::Gstr3b => "GSTR-3B",
            Self::Annexureb => "Annexure B",
            Self::Rfd01 => "RFD-01",
            Self::Ewaybill => "Ewaybill",
            Self::Invoice => "Invoice",
            Self::Purchase => "Purchase Records",
            Self::ExportInvoice => "Export Invoice",
            Self::ShippingBill => "Shipping Bill",
            Self::Brc => "Bank Realization Certificate",
            Self::Transactions => "Transactions",
        }
    }

    /// File-name prefix used by directory discovery when none is configured.
    pub fn default_prefix(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = ReconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ReconError::UnknownDocument(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Overrides
// ---------------------------------------------------------------------------

/// Section name whose entries apply to every document kind.
pub const DEFAULT_SECTION: &str = "default";

/// `[columns.<kind>]` and `[columns.default]` tables: logical field name to
/// actual column name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ColumnOverrides(pub BTreeMap<String, BTreeMap<String, String>>);

impl ColumnOverrides {
    pub fn resolve(&self, kind: DocumentKind, field: &str, builtin: &str) -> String {
        self.0
            .get(kind.as_str())
            .and_then(|m| m.get(field))
            .or_else(|| self.0.get(DEFAULT_SECTION).and_then(|m| m.get(field)))
            .cloned()
            .unwrap_or_else(|| builtin.to_string())
    }

    pub fn set(&mut self, section: &str, field: &str, column: &str) {
        self.0
            .entry(section.to_string())
            .or_default()
            .insert(field.to_string(), column.to_string());
    }

    /// Reject unknown sections and fields no document kind has.
    pub fn validate(&self) -> Result<(), ReconError> {
        for (section, fields) in &self.0 {
            let known: Vec<&str> = if section == DEFAULT_SECTION {
                DocumentKind::ALL.iter().flat_map(|k| fields_of(*k).iter().copied()).collect()
            } else {
                let kind: DocumentKind = section.parse().map_err(|_| {
                    ReconError::ConfigValidation(format!("columns: unknown document kind '{section}'"))
                })?;
                fields_of(kind).to_vec()
            };
            for (field, column) in fields {
                if !known.contains(&field.as_str()) {
                    return Err(ReconError::ConfigValidation(format!(
                        "columns.{section}: unknown field '{field}'"
                    )));
                }
                if column.trim().is_empty() {
                    return Err(ReconError::ConfigValidation(format!(
                        "columns.{section}.{field} must not be empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed column sets
// ---------------------------------------------------------------------------

macro_rules! column_set {
    (
        $(#[$meta:meta])*
        $name:ident for $kind:expr => {
            $( $(#[$fmeta:meta])* $field:ident = $builtin:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: String, )*
        }

        impl $name {
            pub const KIND: DocumentKind = $kind;
            pub const FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];

            pub fn resolve(overrides: &ColumnOverrides) -> Self {
                Self {
                    $( $field: overrides.resolve($kind, stringify!($field), $builtin), )*
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::resolve(&ColumnOverrides::default())
            }
        }
    };
}

column_set! {
    /// General invoice register.
    GeneralColumns for DocumentKind::GstGen => {
        gstin = "GSTIN",
        invoice_number = "Invoice Number",
        invoice_date = "Invoice Date",
        total_amount = "Total Amount",
        tax_amount = "Tax Amount",
        /// Only read by circular trading detection.
        supplier_gstin = "Supplier GSTIN",
        recipient_gstin = "Recipient GSTIN",
    }
}

column_set! {
    Gstr1Columns for DocumentKind::Gstr1 => {
        taxable_value = "taxable_value",
        igst = "igst",
        cgst = "cgst",
        sgst = "sgst",
    }
}

column_set! {
    Gstr2bColumns for DocumentKind::Gstr2b => {
        /// Supplier GSTIN as reported in the statement.
        gstin = "GSTIN",
        invoice_number = "Invoice Number",
        invoice_date = "Invoice Date",
        igst = "IGST Amount",
        cgst = "CGST Amount",
        sgst = "SGST Amount",
        taxable_value = "Total Taxable Value",
        itc_available = "ITC Available",
        itc_amount = "ITC Amount",
        itc_eligible = "ITC Eligible",
    }
}

column_set! {
    Gstr3bColumns for DocumentKind::Gstr3b => {
        gstin = "GSTIN",
        tax_period = "Tax Period",
        taxable_value = "Total Taxable Value",
        igst_paid = "IGST Paid",
        cgst_paid = "CGST Paid",
        sgst_paid = "SGST Paid",
        itc_claimed = "ITC Claimed",
    }
}

column_set! {
    AnnexureBColumns for DocumentKind::Annexureb => {
        gstin = "GSTIN",
        export_invoice_number = "Export Invoice Number",
        export_date = "Export Date",
        port_code = "Port Code",
        shipping_bill_number = "Shipping Bill Number",
        shipping_bill_date = "Shipping Bill Date",
        export_value = "Export Value",
        tax_paid = "Tax Paid",
        country_of_destination = "Country of Destination",
    }
}

column_set! {
    Rfd01Columns for DocumentKind::Rfd01 => {
        gstin = "GSTIN",
        refund_period_from = "Refund Period From",
        refund_period_to = "Refund Period To",
        reason_for_refund = "Reason for Refund",
        refund_amount_claimed = "Refund Amount Claimed",
    }
}

column_set! {
    EwayBillColumns for DocumentKind::Ewaybill => {
        eway_bill_number = "E-way Bill Number",
        generated_date = "Generated Date",
        valid_until = "Valid Until",
        supplier_gstin = "Supplier GSTIN",
        recipient_gstin = "Recipient GSTIN",
        invoice_number = "Invoice Number",
        invoice_date = "Invoice Date",
        total_value = "Total Value",
        transport_mode = "Transport Mode",
        distance = "Distance (km)",
    }
}

column_set! {
    InvoiceColumns for DocumentKind::Invoice => {
        invoice_number = "invoice_number",
        invoice_date = "invoice_date",
        gstin_supplier = "gstin_supplier",
        gstin_recipient = "gstin_recipient",
        invoice_value = "invoice_value",
    }
}

column_set! {
    PurchaseColumns for DocumentKind::Purchase => {
        invoice_number = "invoice_number",
        invoice_date = "invoice_date",
        gstin_supplier = "gstin_supplier",
        itc_claimed = "itc_claimed",
    }
}

column_set! {
    ExportInvoiceColumns for DocumentKind::ExportInvoice => {
        invoice_number = "invoice_number",
        invoice_date = "invoice_date",
        gstin_supplier = "gstin_supplier",
        export_value = "export_value",
    }
}

column_set! {
    ShippingBillColumns for DocumentKind::ShippingBill => {
        shipping_bill_number = "shipping_bill_number",
        invoice_number = "invoice_number",
        shipping_date = "shipping_date",
        export_value = "export_value",
    }
}

column_set! {
    BrcColumns for DocumentKind::Brc => {
        brc_number = "brc_number",
        invoice_number = "invoice_number",
        realized_amount = "realized_amount",
    }
}

column_set! {
    TransactionColumns for DocumentKind::Transactions => {
        gstin_supplier = "gstin_supplier",
        gstin_recipient = "gstin_recipient",
    }
}

/// Logical field names accepted under `[columns.<kind>]`.
pub fn fields_of(kind: DocumentKind) -> &'static [&'static str] {
    match kind {
        DocumentKind::GstGen => GeneralColumns::FIELDS,
        DocumentKind::Gstr1 => Gstr1Columns::FIELDS,
        DocumentKind::Gstr2b => Gstr2bColumns::FIELDS,
        DocumentKind::Gstr3b => Gstr3bColumns::FIELDS,
        DocumentKind::Annexureb => AnnexureBColumns::FIELDS,
        DocumentKind::Rfd01 => Rfd01Columns::FIELDS,
        DocumentKind::Ewaybill => EwayBillColumns::FIELDS,
        DocumentKind::Invoice => InvoiceColumns::FIELDS,
        DocumentKind::Purchase => PurchaseColumns::FIELDS,
        DocumentKind::ExportInvoice => ExportInvoiceColumns::FIELDS,
        DocumentKind::ShippingBill => ShippingBillColumns::FIELDS,
        DocumentKind::Brc => BrcColumns::FIELDS,
        DocumentKind::Transactions => TransactionColumns::FIELDS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_round_trip() {
        for kind in DocumentKind::ALL {
            assert_eq!(kind.as_str().parse::<DocumentKind>().unwrap(), kind);
        }
        assert!(matches!("gstr9".parse::<DocumentKind>(), Err(ReconError::UnknownDocument(_))));
    }

    #[test]
    fn kind_override_beats_default_section() {
        let mut o = ColumnOverrides::default();
        o.set("default", "gstin", "Tax ID");
        o.set("gstr2b", "gstin", "Supplier GSTIN");

        assert_eq!(Gstr2bColumns::resolve(&o).gstin, "Supplier GSTIN");
        assert_eq!(GeneralColumns::resolve(&o).gstin, "Tax ID");
        assert_eq!(Gstr3bColumns::resolve(&o).tax_period, "Tax Period");
    }

    #[test]
    fn builtin_names() {
        let cols = EwayBillColumns::default();
        assert_eq!(cols.distance, "Distance (km)");
        assert_eq!(InvoiceColumns::default().gstin_supplier, "gstin_supplier");
    }

    #[test]
    fn rejects_unknown_sections_and_fields() {
        let mut o = ColumnOverrides::default();
        o.set("gstr9", "gstin", "x");
        assert!(o.validate().is_err());

        let mut o = ColumnOverrides::default();
        o.set("gstr3b", "port_code", "x");
        assert!(o.validate().is_err());

        // port_code exists on annexureb, so the default section accepts it
        let mut o = ColumnOverrides::default();
        o.set("default", "port_code", "Port");
        assert!(o.validate().is_ok());
    }
}
