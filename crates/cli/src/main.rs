// tgrid - marketplace VAT transaction reports for Spanish filings

mod exit_codes;
mod tax;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use taxgrid_io::{Declarant, Form369Regime};
use taxgrid_vat::TransformError;
use tracing_subscriber::EnvFilter;

use exit_codes::{transform_exit_code, EXIT_ERROR, EXIT_RATE_CONFIG, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "tgrid")]
#[command(about = "Turn marketplace VAT transaction exports into filing-ready reports")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). Overrides RUST_LOG.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a transaction CSV into the REGULAR/INTERNATIONAL workbook
    #[command(after_help = "\
Examples:
  tgrid transform vat_2024Q1.csv -o report.xlsx
  tgrid transform vat.csv -o report.xlsx --rates rates.toml --json
  tgrid transform vat.txt -o report.xlsx --delimiter tab")]
    Transform {
        /// Transaction CSV export
        input: PathBuf,

        /// Output workbook
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Rate table TOML (built-in table when omitted)
        #[arg(long, env = "TGRID_RATES")]
        rates: Option<PathBuf>,

        /// Field delimiter: a single character or "tab" (sniffed when omitted)
        #[arg(long)]
        delimiter: Option<String>,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the activity periods in a CSV and check the per-file limit
    Periods {
        /// Transaction CSV export
        input: PathBuf,

        /// Field delimiter (sniffed when omitted)
        #[arg(long)]
        delimiter: Option<String>,

        /// Print the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write intra-community supplies as a Form 349 import file
    Form349 {
        /// Transaction CSV export
        input: PathBuf,

        /// Output CSV (Windows-1252, semicolon-separated)
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Rate table TOML (built-in table when omitted)
        #[arg(long, env = "TGRID_RATES")]
        rates: Option<PathBuf>,

        /// Field delimiter (sniffed when omitted)
        #[arg(long)]
        delimiter: Option<String>,
    },

    /// Write OSS or IOSS totals as a Form 369 return
    #[command(after_help = "\
Examples:
  tgrid form369 vat_2024Q1.csv -o 369.txt --nif B12345678 --name \"Comercial Norte SL\"
  tgrid form369 vat.csv -o 369.txt --regime import --ioss-number IM7240000001 --period 2024-FEB")]
    Form369 {
        /// Transaction CSV export
        input: PathBuf,

        /// Output return (Windows-1252, fixed width)
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Rate table TOML (built-in table when omitted)
        #[arg(long, env = "TGRID_RATES")]
        rates: Option<PathBuf>,

        /// Field delimiter (sniffed when omitted)
        #[arg(long)]
        delimiter: Option<String>,

        /// Special scheme to declare
        #[arg(long, value_enum, default_value = "union")]
        regime: Regime,

        /// Declarant NIF
        #[arg(long, env = "TGRID_NIF")]
        nif: String,

        /// Declarant name
        #[arg(long, env = "TGRID_NAME")]
        name: String,

        /// IOSS number, required with --regime import
        #[arg(long, env = "TGRID_IOSS_NUMBER")]
        ioss_number: Option<String>,

        /// Filing period as 2024Q1 or 2024-JAN (first activity period when omitted)
        #[arg(long)]
        period: Option<String>,
    },

    /// Print the effective rate table as TOML
    Rates {
        /// Rate table TOML to validate and print (built-in table when omitted)
        #[arg(long, env = "TGRID_RATES")]
        rates: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Regime {
    /// Union scheme (OSS sales)
    Union,
    /// Import scheme (IOSS sales)
    Import,
}

impl From<Regime> for Form369Regime {
    fn from(regime: Regime) -> Self {
        match regime {
            Regime::Union => Form369Regime::Union,
            Regime::Import => Form369Regime::Import,
        }
    }
}

fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "tgrid starting");

    let result = match cli.command {
        Commands::Transform { input, output, rates, delimiter, json } => {
            tax::cmd_transform(input, output, rates, delimiter, json)
        }
        Commands::Periods { input, delimiter, json } => tax::cmd_periods(input, delimiter, json),
        Commands::Form349 { input, output, rates, delimiter } => {
            tax::cmd_form349(input, output, rates, delimiter)
        }
        Commands::Form369 { input, output, rates, delimiter, regime, nif, name, ioss_number, period } => {
            let declarant = Declarant { nif, name, ioss_number };
            tax::cmd_form369(input, output, rates, delimiter, regime.into(), declarant, period)
        }
        Commands::Rates { rates } => tax::cmd_rates(rates),
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
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    /// Rate table problems exit with the rate-config code whatever the cause.
    pub fn rates(err: TransformError) -> Self {
        Self { code: EXIT_RATE_CONFIG, message: err.to_string(), hint: None }
            .with_hint("run `tgrid rates` to see the expected TOML layout")
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<TransformError> for CliError {
    fn from(err: TransformError) -> Self {
        let hint = match &err {
            TransformError::TooManyPeriods { .. } => {
                Some("split the export so each file covers at most three activity periods".to_string())
            }
            TransformError::MissingColumn { .. } => {
                Some("check the delimiter; pass --delimiter if sniffing picked the wrong one".to_string())
            }
            _ => None,
        };
        Self { code: transform_exit_code(&err), message: err.to_string(), hint }
    }
}
