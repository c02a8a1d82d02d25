//! Reconciliation and investigation command implementations

use anyhow::{Context, Result};
use aprecon_core::{
    reconcile, InvestigationOutcome, Investigator, NarrativeBackend, NarrativeClient,
    PromptLibrary, ReconConfig, ReconcileOutcome, TriggerState,
};

pub fn cmd_reconcile(config: &ReconConfig) -> Result<()> {
    println!("📄 Reconciling account {}...", config.reconciliation.account_code);
    let outcome = reconcile(config).context("Reconciliation failed")?;
    print_reconcile(&outcome);
    Ok(())
}

pub async fn cmd_investigate(config: &ReconConfig, client: Option<&NarrativeClient>) -> Result<()> {
    println!("🔍 Checking month-over-month movement...");
    let outcome = investigate(config, client).await?;
    print_investigation(&outcome, config);
    Ok(())
}

pub async fn cmd_run(config: &ReconConfig, client: Option<&NarrativeClient>) -> Result<()> {
    cmd_reconcile(config)?;
    println!();
    cmd_investigate(config, client).await
}

async fn investigate(
    config: &ReconConfig,
    client: Option<&NarrativeClient>,
) -> Result<InvestigationOutcome> {
    let backend = client.map(|c| c as &dyn NarrativeBackend);
    Investigator::new(config, backend)
        .with_prompts(PromptLibrary::new())
        .run(&config.paths.report)
        .await
        .with_context(|| {
            format!(
                "Failed to investigate report {}",
                config.paths.report.display()
            )
        })
}

fn print_reconcile(outcome: &ReconcileOutcome) {
    let aggregate = &outcome.aggregate;
    println!("   Statement: {}", outcome.statement_path.display());
    println!(
        "   Statement total: {} ({})",
        outcome.total.amount, outcome.total.provenance
    );
    println!(
        "   GL {}: {}",
        aggregate.prior.period.month_name(),
        aggregate.prior.net
    );
    println!(
        "   GL {}: {}",
        aggregate.current.period.month_name(),
        aggregate.current.net
    );
    println!(
        "   Movement: {} ({})",
        aggregate.movement.delta, aggregate.movement.delta_pct
    );
    println!(
        "   Rows: {} matched, {} undated",
        aggregate.matched_rows, aggregate.undated_rows
    );
    println!("✅ Report written to {}", outcome.report_path.display());
}

fn print_investigation(outcome: &InvestigationOutcome, config: &ReconConfig) {
    println!(
        "   MoM change: {} ({})",
        outcome.reading.display_percent(),
        outcome.reading.direction()
    );
    match outcome.state {
        TriggerState::WithinThreshold => println!(
            "✅ Within the {}% threshold, no explanation needed",
            config.investigation.threshold_percent
        ),
        TriggerState::Indeterminate => {
            println!("⚠️  Movement could not be measured, no explanation written")
        }
        _ => {
            println!("📝 Reason:");
            if let Some(reason) = &outcome.reason {
                for line in reason.lines() {
                    println!("   {}", line);
                }
            }
        }
    }
}
