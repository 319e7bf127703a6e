use std::collections::BTreeMap;

use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};

use crate::circular::CycleLimits;
use crate::columns::{ColumnOverrides, DocumentKind};
use crate::error::ReconError;
use crate::validate::Tolerance;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything a run can be tuned with. Every section has defaults, so an
/// empty document is a valid config.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GstConfig {
    /// chrono format string used for every date column.
    #[serde(default = "default_date_format")]
    pub date_format: String,
    /// Percentage applied to the general register's total amount, or the
    /// name of a column holding a per-row percentage. Unset disables the
    /// tax consistency rule.
    #[serde(default)]
    pub gst_rate: Option<GstRate>,
    #[serde(default)]
    pub tolerance: ToleranceConfig,
    #[serde(default)]
    pub circular: CircularConfig,
    #[serde(default)]
    pub valid_values: ValidValues,
    /// Document kind → file-name prefix, on top of the built-in prefixes.
    #[serde(default)]
    pub file_prefixes: BTreeMap<String, String>,
    #[serde(default)]
    pub columns: ColumnOverrides,
}

impl Default for GstConfig {
    fn default() -> Self {
        Self {
            date_format: default_date_format(),
            gst_rate: None,
            tolerance: ToleranceConfig::default(),
            circular: CircularConfig::default(),
            valid_values: ValidValues::default(),
            file_prefixes: BTreeMap::new(),
            columns: ColumnOverrides::default(),
        }
    }
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GstRate {
    Percent(f64),
    Column(String),
}

// ---------------------------------------------------------------------------
// Tolerance
// ---------------------------------------------------------------------------

/// Row-level comparisons use `field_*`; sum-level comparisons between
/// independently filed returns use the coarser `aggregate_*`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ToleranceConfig {
    #[serde(default = "default_field_abs")]
    pub field_abs: f64,
    #[serde(default = "default_field_rel")]
    pub field_rel: f64,
    #[serde(default = "default_aggregate_abs")]
    pub aggregate_abs: f64,
    #[serde(default)]
    pub aggregate_rel: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            field_abs: default_field_abs(),
            field_rel: default_field_rel(),
            aggregate_abs: default_aggregate_abs(),
            aggregate_rel: 0.0,
        }
    }
}

fn default_field_abs() -> f64 {
    0.01
}

fn default_field_rel() -> f64 {
    1e-5
}

fn default_aggregate_abs() -> f64 {
    1.0
}

impl ToleranceConfig {
    pub fn field(&self) -> Tolerance {
        Tolerance::new(self.field_abs, self.field_rel)
    }

    pub fn aggregate(&self) -> Tolerance {
        Tolerance::new(self.aggregate_abs, self.aggregate_rel)
    }
}

// ---------------------------------------------------------------------------
// Circular trading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircularConfig {
    /// Minimum ring size reported.
    #[serde(default = "default_threshold")]
    pub threshold: usize,
    /// Overrides the supplier column of whichever document feeds detection.
    #[serde(default)]
    pub supplier_column: Option<String>,
    #[serde(default)]
    pub recipient_column: Option<String>,
    #[serde(default)]
    pub max_nodes: Option<usize>,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: Option<usize>,
    #[serde(default)]
    pub max_cycle_length: Option<usize>,
}

impl Default for CircularConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            supplier_column: None,
            recipient_column: None,
            max_nodes: None,
            max_cycles: default_max_cycles(),
            max_cycle_length: None,
        }
    }
}

fn default_threshold() -> usize {
    3
}

fn default_max_cycles() -> Option<usize> {
    CycleLimits::default().max_cycles
}

impl CircularConfig {
    pub fn limits(&self) -> CycleLimits {
        CycleLimits {
            max_nodes: self.max_nodes,
            max_cycles: self.max_cycles,
            max_length: self.max_cycle_length,
        }
    }
}

// ---------------------------------------------------------------------------
// Accepted values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValidValues {
    #[serde(default = "default_port_codes")]
    pub port_codes: Vec<String>,
    #[serde(default = "default_transport_modes")]
    pub transport_modes: Vec<String>,
    #[serde(default = "default_refund_reasons")]
    pub refund_reasons: Vec<String>,
}

impl Default for ValidValues {
    fn default() -> Self {
        Self {
            port_codes: default_port_codes(),
            transport_modes: default_transport_modes(),
            refund_reasons: default_refund_reasons(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_port_codes() -> Vec<String> {
    strings(&["INBOM", "INDEL", "INMAA"])
}

fn default_transport_modes() -> Vec<String> {
    strings(&["Road", "Rail", "Air", "Ship", "Vehicle"])
}

fn default_refund_reasons() -> Vec<String> {
    strings(&[
        "Excess cash balance in electronic cash ledger",
        "Export of goods/services (with payment of tax)",
        "Export of goods/services (without payment of tax)",
        "Inverted tax structure",
        "Refund by recipient of deemed export",
    ])
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl GstConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: GstConfig = toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.date_format.trim().is_empty() {
            return Err(ReconError::ConfigValidation("date_format must not be empty".into()));
        }
        if StrftimeItems::new(&self.date_format).any(|item| matches!(item, Item::Error)) {
            return Err(ReconError::ConfigValidation(format!(
                "date_format '{}' is not a valid chrono format",
                self.date_format
            )));
        }

        let t = &self.tolerance;
        for (name, value) in [
            ("field_abs", t.field_abs),
            ("field_rel", t.field_rel),
            ("aggregate_abs", t.aggregate_abs),
            ("aggregate_rel", t.aggregate_rel),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReconError::ConfigValidation(format!(
                    "tolerance.{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let c = &self.circular;
        if c.threshold < 2 {
            return Err(ReconError::ConfigValidation(format!(
                "circular.threshold must be at least 2, got {}",
                c.threshold
            )));
        }
        for (name, value) in [
            ("max_nodes", c.max_nodes),
            ("max_cycles", c.max_cycles),
            ("max_cycle_length", c.max_cycle_length),
        ] {
            if value == Some(0) {
                return Err(ReconError::ConfigValidation(format!("circular.{name} must be positive")));
            }
        }
        if let Some(max) = c.max_cycle_length {
            if max < c.threshold {
                return Err(ReconError::ConfigValidation(format!(
                    "circular.max_cycle_length ({max}) is below circular.threshold ({})",
                    c.threshold
                )));
            }
        }
        for (name, value) in [("supplier_column", &c.supplier_column), ("recipient_column", &c.recipient_column)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!("circular.{name} must not be empty")));
            }
        }

        match &self.gst_rate {
            Some(GstRate::Percent(p)) if !(p.is_finite() && (0.0..=100.0).contains(p)) => {
                return Err(ReconError::ConfigValidation(format!(
                    "gst_rate must be between 0 and 100, got {p}"
                )));
            }
            Some(GstRate::Column(c)) if c.trim().is_empty() => {
                return Err(ReconError::ConfigValidation("gst_rate column name must not be empty".into()));
            }
            _ => {}
        }

        let v = &self.valid_values;
        for (name, list) in [
            ("port_codes", &v.port_codes),
            ("transport_modes", &v.transport_modes),
            ("refund_reasons", &v.refund_reasons),
        ] {
            if list.is_empty() {
                return Err(ReconError::ConfigValidation(format!("valid_values.{name} must not be empty")));
            }
        }

        for (kind, prefix) in &self.file_prefixes {
            kind.parse::<DocumentKind>()
                .map_err(|_| ReconError::ConfigValidation(format!("file_prefixes: unknown document kind '{kind}'")))?;
            if prefix.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!("file_prefixes.{kind} must not be empty")));
            }
        }

        self.columns.validate()
    }

    /// Configured prefix for `kind`, or its built-in one.
    pub fn prefix(&self, kind: DocumentKind) -> &str {
        self.file_prefixes
            .get(kind.as_str())
            .map(String::as_str)
            .unwrap_or_else(|| kind.default_prefix())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
