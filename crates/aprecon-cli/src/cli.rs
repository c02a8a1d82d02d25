//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use aprecon_core::YearMonth;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// aprecon - Monthly Accounts Payable reconciliation
#[derive(Parser)]
#[command(name = "aprecon")]
#[command(
    about = "Reconcile a supplier statement against the general ledger and explain large movements",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the data directory override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Per-run overrides applied on top of the loaded configuration
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// General ledger CSV
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Directory searched for the supplier statement
    #[arg(long, global = true)]
    pub statement_dir: Option<PathBuf>,

    /// Statement file name pattern (`*` and `?` wildcards)
    #[arg(long, global = true)]
    pub statement_pattern: Option<String>,

    /// Communications (email) CSV
    #[arg(long, global = true)]
    pub emails: Option<PathBuf>,

    /// Reconciliation report path
    #[arg(long, global = true)]
    pub report: Option<PathBuf>,

    /// Ledger account code to reconcile
    #[arg(long, global = true)]
    pub account: Option<String>,

    /// Prior period (YYYY-MM)
    #[arg(long, global = true)]
    pub prior: Option<YearMonth>,

    /// Current period (YYYY-MM)
    #[arg(long, global = true)]
    pub current: Option<YearMonth>,

    /// Materiality threshold in percent
    #[arg(long, global = true)]
    pub threshold: Option<Decimal>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the statement total, aggregate the ledger, and write the report
    Reconcile,

    /// Investigate the saved report's month-over-month movement
    Investigate,

    /// Reconcile, then investigate
    Run,

    /// Print the total extracted from a statement document
    Extract {
        /// Statement file (PDF or text)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Inspect the saved reconciliation report
    Report {
        #[command(subcommand)]
        action: Option<ReportAction>,
    },

    /// Manage investigation prompts
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
pub enum ReportAction {
    /// Print the summary and detail sections
    Show,

    /// Export the report
    Export {
        /// Output format
        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List available prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., investigate_variance)
        prompt_id: String,
    },

    /// Show the path where prompt overrides should be placed
    Path,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Show the path of the config override file
    Path,
}
