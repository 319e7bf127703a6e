// Integration tests for the gstcheck binary: exit codes and the --json
// stdout contract.
//
// Run with: cargo test -p gstcheck-cli --test cli_tests -- --nocapture

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn gstcheck() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_gstcheck"));
    cmd.env_remove("GSTCHECK_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run(args: &[&str]) -> Output {
    gstcheck().args(args).output().expect("gstcheck runs")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Assert stdout is a single, parseable JSON value with no extra lines.
fn assert_single_json(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    assert!(!trimmed.is_empty(), "stdout should not be empty");
    serde_json::from_str(trimmed)
        .unwrap_or_else(|e| panic!("stdout must be valid JSON.\nParse error: {e}\nstdout:\n{trimmed}"))
}

const GOOD_A: &str = "07AAAAA1234A1Z5";
const GOOD_B: &str = "29BBBBB5678B1Z3";
const GOOD_C: &str = "27CCCCC9012C1Z1";

fn write_clean_filings(dir: &Path) {
    fs::write(
        dir.join("gstr1_may.csv"),
        "taxable_value,igst,cgst,sgst\n1000,180,0,0\n",
    )
    .unwrap();
    fs::write(
        dir.join("gstr3b_may.csv"),
        format!(
            "GSTIN,Tax Period,Total Taxable Value,IGST Paid,CGST Paid,SGST Paid\n{GOOD_A},2024-05,1000,180,0,0\n"
        ),
    )
    .unwrap();
}

// ===========================================================================
// run
// ===========================================================================

#[test]
fn run_clean_directory_exits_zero() {
    let dir = tempdir().unwrap();
    write_clean_filings(dir.path());

    let output = run(&["run", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let err = stderr(&output);
    assert!(err.contains("gstr1_vs_gstr3b"), "stderr: {err}");
    assert!(err.contains("clean"), "stderr: {err}");
    assert!(output.stdout.is_empty());
}

#[test]
fn run_with_findings_exits_one_and_emits_json() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("invoice.csv"),
        format!(
            "invoice_number,invoice_date,gstin_supplier,gstin_recipient,invoice_value\n\
             INV-1,2024-04-01,{GOOD_A},{GOOD_B},1000\n\
             INV-2,2024-04-02,{GOOD_B},{GOOD_C},2000\n\
             INV-3,2024-04-03,{GOOD_C},{GOOD_A},1500\n"
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("ewaybill.csv"),
        format!(
            "E-way Bill Number,Invoice Number,Invoice Date,Supplier GSTIN,Recipient GSTIN,Total Value\n\
             EW1,INV-1,2024-04-01,{GOOD_A},{GOOD_B},1000\n\
             EW2,INV-2,2024-04-02,{GOOD_B},{GOOD_C},2100\n"
        ),
    )
    .unwrap();

    let output = run(&["run", dir.path().to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));

    let val = assert_single_json(&output.stdout);
    let checks = val["checks"].as_object().expect("checks object");
    assert!(checks.contains_key("invoice_vs_ewaybill"));
    assert!(checks.contains_key("circular_trading"));
    assert!(!checks.contains_key("gstr1_vs_gstr3b"), "check without inputs must be absent");

    let ivs = &val["checks"]["invoice_vs_ewaybill"];
    assert_eq!(ivs["status"], "completed");
    assert_eq!(ivs["records"][0]["reasons"][0]["kind"], "field_mismatch");
    assert_eq!(ivs["records"][0]["reasons"][0]["field"], "Invoice Value");

    let flat = val["flat"].as_array().unwrap();
    assert!(flat
        .iter()
        .any(|f| f["check"] == "circular_trading" && f["description"].as_str().unwrap().contains("length 3")));
}

#[test]
fn run_only_restricts_and_output_writes_file() {
    let dir = tempdir().unwrap();
    write_clean_filings(dir.path());
    let out = dir.path().join("report.json");

    let output = run(&[
        "run",
        dir.path().to_str().unwrap(),
        "--only",
        "gstr3b",
        "--output",
        out.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("wrote "));

    let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    let names: Vec<&String> = written["checks"].as_object().unwrap().keys().collect();
    assert_eq!(names, vec!["gstr3b"]);
}

#[test]
fn run_unknown_check_is_usage_error() {
    let dir = tempdir().unwrap();
    write_clean_filings(dir.path());
    let output = run(&["run", dir.path().to_str().unwrap(), "--only", "gstr9"]);
    assert_eq!(output.status.code(), Some(2));
    let err = stderr(&output);
    assert!(err.contains("unknown check"), "stderr: {err}");
    assert!(err.contains("hint:"), "stderr: {err}");
}

#[test]
fn run_empty_directory_exits_five() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("notes.csv"), "a\n1\n").unwrap();
    let output = run(&["run", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn run_missing_directory_exits_four() {
    let output = run(&["run", "/nonexistent/gstcheck/filings"]);
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn run_picks_up_config_from_directory() {
    let dir = tempdir().unwrap();
    write_clean_filings(dir.path());
    fs::write(dir.path().join("gstcheck.toml"), "[tolerance]\naggregate_abs = -1.0\n").unwrap();

    let output = run(&["run", dir.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(3), "stderr: {}", stderr(&output));
}

// ===========================================================================
// check
// ===========================================================================

#[test]
fn check_single_document() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("g2b.csv");
    fs::write(
        &file,
        format!(
            "GSTIN,Invoice Number,Invoice Date,IGST Amount,CGST Amount,SGST Amount,Total Taxable Value,ITC Available\n\
             {GOOD_A},INV-1,2024-04-01,0,0,0,1000,Yes\n\
             {GOOD_A},INV-2,2024-04-02,180,0,0,1000,Yes\n"
        ),
    )
    .unwrap();

    let output = run(&["check", "gstr2b", file.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(1), "stderr: {}", stderr(&output));
    let val = assert_single_json(&output.stdout);
    let records = val["checks"]["gstr2b"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["reasons"][0]["kind"], "credit_without_tax");
    // second data row, below the header
    assert_eq!(val["flat"][0]["rows"][0], 3);
}

#[test]
fn check_rejects_kind_without_validator() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("brc.csv");
    fs::write(&file, "brc_number\nB1\n").unwrap();

    let output = run(&["check", "brc", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));

    let output = run(&["check", "gstr9", file.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
}

// ===========================================================================
// circular
// ===========================================================================

#[test]
fn circular_threshold_controls_reciprocal_pairs() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("tx.csv");
    fs::write(&file, "seller,buyer\nA,B\nB,A\nA,B\n").unwrap();
    let path = file.to_str().unwrap();

    let output = run(&["circular", path, "--supplier", "seller", "--recipient", "buyer"]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));

    let output = run(&[
        "circular", path, "--supplier", "seller", "--recipient", "buyer", "--threshold", "2", "--json",
    ]);
    assert_eq!(output.status.code(), Some(1));
    let val = assert_single_json(&output.stdout);
    let records = val["checks"]["circular_trading"]["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["subject"]["nodes"], serde_json::json!(["A", "B"]));
}

#[test]
fn circular_threshold_below_two_is_rejected() {
    let output = run(&["circular", "tx.csv", "--threshold", "1"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn circular_missing_columns_skips() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("tx.csv");
    fs::write(&file, "from,to\nA,B\n").unwrap();

    let output = run(&["circular", file.to_str().unwrap(), "--json"]);
    assert_eq!(output.status.code(), Some(1));
    let val = assert_single_json(&output.stdout);
    assert_eq!(val["checks"]["circular_trading"]["status"], "skipped");
}

// ===========================================================================
// validate-config
// ===========================================================================

#[test]
fn validate_config_ok_and_invalid() {
    let dir = tempdir().unwrap();
    let good = dir.path().join("good.toml");
    fs::write(&good, "date_format = \"%d/%m/%Y\"\n[circular]\nthreshold = 4\n").unwrap();
    let output = run(&["validate-config", good.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stderr(&output).contains("config OK"));

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "[circular]\nthreshold = 1\n").unwrap();
    assert_eq!(run(&["validate-config", bad.to_str().unwrap()]).status.code(), Some(3));

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[circular\n").unwrap();
    assert_eq!(run(&["validate-config", broken.to_str().unwrap()]).status.code(), Some(3));

    assert_eq!(run(&["validate-config", "/nonexistent.toml"]).status.code(), Some(4));
}
