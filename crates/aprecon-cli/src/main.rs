//! aprecon CLI - Monthly Accounts Payable reconciliation
//!
//! Usage:
//!   aprecon reconcile           Build the reconciliation report
//!   aprecon investigate         Explain a material month-over-month movement
//!   aprecon run                 Reconcile, then investigate
//!   aprecon report show         Print the saved report

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Reconcile => {
            let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
            commands::cmd_reconcile(&config)
        }
        Commands::Investigate => {
            let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
            let client = commands::narrative_client();
            commands::cmd_investigate(&config, client.as_ref()).await
        }
        Commands::Run => {
            let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
            let client = commands::narrative_client();
            commands::cmd_run(&config, client.as_ref()).await
        }
        Commands::Extract { file } => {
            let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
            commands::cmd_extract(&config, &file)
        }
        Commands::Report { action } => {
            let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
            match action {
                None | Some(ReportAction::Show) => commands::cmd_report_show(&config.paths.report),
                Some(ReportAction::Export { format, output }) => {
                    commands::cmd_report_export(&config.paths.report, format, output.as_deref())
                }
            }
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Config { action } => match action {
            None | Some(ConfigAction::Show) => {
                let config = commands::load_config(cli.config.as_deref(), &cli.overrides)?;
                commands::cmd_config_show(&config)
            }
            Some(ConfigAction::Path) => commands::cmd_config_path(),
        },
    }
}
