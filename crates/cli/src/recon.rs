//! `gstcheck run | check | circular | validate-config`.

use std::path::{Path, PathBuf};

use gstcheck_io::ReportDocument;
use gstcheck_recon::checks::CrossCheck;
use gstcheck_recon::circular::{detect_circular_trading, CircularPlan};
use gstcheck_recon::columns::TransactionColumns;
use gstcheck_recon::documents::{has_validator, validate_document, DocumentContext};
use gstcheck_recon::{compute_summary, Check, CheckStatus, DocumentKind, GstConfig, Report, RunOptions};

use crate::exit_codes::{EXIT_FINDINGS, EXIT_NO_DOCUMENTS};
use crate::CliError;

/// Config file picked up from the input directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "gstcheck.toml";

/// Flat records listed per check in the human summary.
const SUMMARY_RECORD_LIMIT: usize = 20;

// ============================================================================
// run
// ============================================================================

pub fn cmd_run(
    dir: PathBuf,
    config_path: Option<PathBuf>,
    only: Vec<String>,
    json_output: bool,
    output_file: Option<PathBuf>,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref(), Some(&dir))?;

    let options = RunOptions::only(only.as_slice()).map_err(|e| {
        let names: Vec<&str> = Check::all().iter().map(|c| c.name()).collect();
        CliError::args(e.to_string()).with_hint(format!("valid checks: {}", names.join(", ")))
    })?;

    let loaded = gstcheck_io::load_corpus(&dir, &config)?;
    for failure in &loaded.failures {
        eprintln!("warning: {failure}");
    }
    if loaded.corpus.is_empty() {
        if !loaded.failures.is_empty() {
            return Err(CliError::io(format!("no document in {} could be loaded", dir.display())));
        }
        return Err(CliError::new(
            EXIT_NO_DOCUMENTS,
            format!("no input documents found in {}", dir.display()),
        )
        .with_hint("file names must start with a document prefix, e.g. gstr2b_april.csv or ewaybill.xlsx"));
    }

    let report = gstcheck_recon::run_with(&config, &loaded.corpus, today(), &options);
    emit(&report, json_output, output_file.as_deref())
}

// ============================================================================
// check
// ============================================================================

pub fn cmd_check(kind: String, file: PathBuf, config_path: Option<PathBuf>, json_output: bool) -> Result<(), CliError> {
    let validated: Vec<&str> = DocumentKind::ALL
        .iter()
        .filter(|k| has_validator(**k))
        .map(|k| k.as_str())
        .collect();
    let hint = format!("document kinds with a validator: {}", validated.join(", "));

    let kind: DocumentKind = kind
        .parse()
        .map_err(|e: gstcheck_recon::ReconError| CliError::args(e.to_string()).with_hint(hint.clone()))?;
    if !has_validator(kind) {
        return Err(CliError::args(format!("'{kind}' has no single-document validator")).with_hint(hint));
    }

    let config = load_config(config_path.as_deref(), None)?;
    let dataset = gstcheck_io::load_file(&file)?;
    let ctx = DocumentContext {
        config: &config,
        today: today(),
    };

    let mut report = Report::default();
    if let Some(set) = validate_document(kind, &dataset, &ctx) {
        report.insert(set);
    }
    emit(&report, json_output, None)
}

// ============================================================================
// circular
// ============================================================================

pub fn cmd_circular(
    file: PathBuf,
    threshold: Option<u64>,
    supplier: Option<String>,
    recipient: Option<String>,
    config_path: Option<PathBuf>,
    json_output: bool,
) -> Result<(), CliError> {
    let config = load_config(config_path.as_deref(), None)?;
    let c = &config.circular;
    let defaults = TransactionColumns::resolve(&config.columns);

    let threshold = threshold.map(|t| t as usize).unwrap_or(c.threshold);
    let limits = c.limits();
    if let Some(max) = limits.max_length {
        if max < threshold {
            return Err(CliError::args(format!(
                "--threshold {threshold} exceeds max_cycle_length {max} from config"
            )));
        }
    }

    let plan = CircularPlan {
        check: CrossCheck::CircularTrading.to_string(),
        document: file.display().to_string(),
        supplier_column: supplier
            .or_else(|| c.supplier_column.clone())
            .unwrap_or(defaults.gstin_supplier),
        recipient_column: recipient
            .or_else(|| c.recipient_column.clone())
            .unwrap_or(defaults.gstin_recipient),
        threshold,
        limits,
    };

    let dataset = gstcheck_io::load_file(&file)?;
    let mut report = Report::default();
    report.insert(detect_circular_trading(&plan, &dataset));
    emit(&report, json_output, None)
}

// ============================================================================
// validate-config
// ============================================================================

pub fn cmd_validate_config(config_path: PathBuf) -> Result<(), CliError> {
    let config = load_config(Some(&config_path), None)?;
    eprintln!(
        "config OK: date format {}, circular threshold {}, {} column override section(s)",
        config.date_format,
        config.circular.threshold,
        config.columns.0.len()
    );
    Ok(())
}

// ============================================================================
// Shared
// ============================================================================

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

/// An explicit path must exist. Without one, `<dir>/gstcheck.toml` is used
/// when present, else the defaults.
fn load_config(explicit: Option<&Path>, dir: Option<&Path>) -> Result<GstConfig, CliError> {
    let path = match (explicit, dir) {
        (Some(p), _) => p.to_path_buf(),
        (None, Some(d)) if d.join(DEFAULT_CONFIG_FILE).is_file() => d.join(DEFAULT_CONFIG_FILE),
        _ => return Ok(GstConfig::default()),
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("cannot read config {}: {e}", path.display())))?;
    tracing::info!(config = %path.display(), "using config file");
    GstConfig::from_toml(&text).map_err(|e| CliError::config(format!("{}: {e}", path.display())))
}

/// Write and print the report, then turn findings into the exit code.
fn emit(report: &Report, json_output: bool, output_file: Option<&Path>) -> Result<(), CliError> {
    if let Some(path) = output_file {
        gstcheck_io::write_report(path, report)?;
        eprintln!("wrote {}", path.display());
    }

    if json_output {
        let json_str = serde_json::to_string_pretty(&ReportDocument::new(report))
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    } else {
        print_details(report);
    }

    // Human summary to stderr
    let s = compute_summary(report);
    eprintln!(
        "{} check(s): {} clean, {} with findings, {} skipped ({} record(s), {} reason(s))",
        report.checks.len(),
        s.checks_clean,
        s.checks_run - s.checks_clean,
        s.checks_skipped,
        s.records,
        s.reasons,
    );

    if report.has_findings() {
        return Err(CliError::new(EXIT_FINDINGS, "discrepancies found"));
    }
    Ok(())
}

fn print_details(report: &Report) {
    let flat = report.flatten();
    for (name, set) in &report.checks {
        let status = match set.status {
            CheckStatus::Skipped => "skipped".to_string(),
            CheckStatus::Completed if set.records.is_empty() => "clean".to_string(),
            CheckStatus::Completed => format!("{} record(s)", set.records.len()),
        };
        eprintln!("{name:<24} {status}");

        let records: Vec<_> = flat.iter().filter(|f| &f.check == name).collect();
        for record in records.iter().take(SUMMARY_RECORD_LIMIT) {
            // Chains list every stage but only the rows that matched.
            let shown = if record.documents.len() == record.rows.len() { record.rows.len() } else { 1 };
            let location = record
                .documents
                .iter()
                .zip(record.rows.iter())
                .take(shown)
                .map(|(doc, row)| format!("{doc} row {row}"))
                .collect::<Vec<_>>()
                .join(", ");
            if location.is_empty() {
                eprintln!("  {}", record.description);
            } else {
                eprintln!("  [{location}] {}", record.description);
            }
        }
        if records.len() > SUMMARY_RECORD_LIMIT {
            eprintln!("  ... and {} more", records.len() - SUMMARY_RECORD_LIMIT);
        }
    }
}
