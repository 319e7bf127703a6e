// gstcheck CLI - GST document reconciliation and anomaly checks

mod exit_codes;
mod recon;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_INVALID_CONFIG, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "gstcheck")]
#[command(about = "Reconcile GST filings and flag discrepancies and circular trading")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More logging on stderr (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every applicable check over the documents in a directory
    #[command(after_help = "\
Files are matched to document kinds by name prefix (gstr2b_april.csv is a
GSTR-2B, ewaybill.xlsx an e-way bill register, ...). A check runs only when
all of its documents are present.

Examples:
  gstcheck run ./filings
  gstcheck run ./filings --json
  gstcheck run ./filings --only gstr2b_vs_purchase --only export_chain
  gstcheck run ./filings --config gstcheck.toml --output report.json")]
    Run {
        /// Directory holding the document files
        dir: PathBuf,

        /// Config file (default: <DIR>/gstcheck.toml when present)
        #[arg(long, short = 'c', env = "GSTCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Run only this check. Repeatable.
        #[arg(long, value_name = "CHECK")]
        only: Vec<String>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,

        /// Write JSON report to file
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Validate a single document
    #[command(after_help = "\
Examples:
  gstcheck check gstr2b gstr2b_april.csv
  gstcheck check ewaybill eway.xlsx --json")]
    Check {
        /// Document kind (gst_gen, gstr2b, gstr3b, annexureb, rfd01, ewaybill)
        kind: String,

        /// Document file
        file: PathBuf,

        /// Config file
        #[arg(long, short = 'c', env = "GSTCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Look for circular trading rings in a transaction file
    #[command(after_help = "\
Examples:
  gstcheck circular transactions.csv
  gstcheck circular ledger.xlsx --supplier 'Seller GSTIN' --recipient 'Buyer GSTIN'
  gstcheck circular transactions.csv --threshold 2 --json")]
    Circular {
        /// Transaction file with supplier and recipient columns
        file: PathBuf,

        /// Shortest ring reported
        #[arg(long, value_parser = clap::value_parser!(u64).range(2..))]
        threshold: Option<u64>,

        /// Supplier column
        #[arg(long, value_name = "COL")]
        supplier: Option<String>,

        /// Recipient column
        #[arg(long, value_name = "COL")]
        recipient: Option<String>,

        /// Config file
        #[arg(long, short = 'c', env = "GSTCHECK_CONFIG")]
        config: Option<PathBuf>,

        /// Output JSON to stdout instead of human summary
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file without running
    #[command(after_help = "\
Examples:
  gstcheck validate-config gstcheck.toml")]
    ValidateConfig {
        /// Path to the config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\ntarget:  ", env!("TARGET"),
    )
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run { dir, config, only, json, output } => recon::cmd_run(dir, config, only, json, output),
        Commands::Check { kind, file, config, json } => recon::cmd_check(kind, file, config, json),
        Commands::Circular { file, threshold, supplier, recipient, config, json } => {
            recon::cmd_circular(file, threshold, supplier, recipient, config, json)
        }
        Commands::ValidateConfig { config } => recon::cmd_validate_config(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), hint: None }
    }

    pub fn args(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(EXIT_IO, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(EXIT_INVALID_CONFIG, msg)
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<gstcheck_io::IoError> for CliError {
    fn from(err: gstcheck_io::IoError) -> Self {
        CliError::io(err.to_string())
    }
}
