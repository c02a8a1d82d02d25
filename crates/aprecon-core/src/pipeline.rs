//! End-to-end reconciliation run
//!
//! `reconcile` builds and saves the report; `run` follows it with the
//! investigation trigger. Steps execute strictly in sequence. Only a
//! missing statement aborts; every other failure degrades to defaults.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::ai::NarrativeBackend;
use crate::config::ReconConfig;
use crate::error::Result;
use crate::import::load_ledger;
use crate::investigate::{InvestigationOutcome, Investigator};
use crate::ledger::{aggregate, LedgerAggregate};
use crate::models::ExtractedTotal;
use crate::prompts::PromptLibrary;
use crate::report::ReconciliationReport;
use crate::statement::{find_statement, StatementDocument};

/// What a reconcile step produced
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub statement_path: PathBuf,
    pub total: ExtractedTotal,
    pub aggregate: LedgerAggregate,
    pub report_path: PathBuf,
}

/// Assemble the report for a computed total and ledger aggregate
pub fn assemble_report(
    config: &ReconConfig,
    total: &ExtractedTotal,
    aggregate: &LedgerAggregate,
    document: &StatementDocument,
) -> ReconciliationReport {
    ReconciliationReport::assemble(
        total,
        aggregate,
        document,
        config.reconciliation.fallback_invoice_total,
    )
}

/// Locate the statement, extract its total, aggregate the ledger, and save the report
pub fn reconcile(config: &ReconConfig) -> Result<ReconcileOutcome> {
    let paths = &config.paths;
    let recon = &config.reconciliation;

    let statement_path = find_statement(&paths.statement_dir, &paths.statement_pattern)?;
    info!(path = %statement_path.display(), "Using statement");

    let document = StatementDocument::open(&statement_path);
    let total = document.extract_total(recon.fallback_statement_total);
    info!(
        total = %total.amount,
        provenance = %total.provenance,
        "Statement total extracted"
    );

    let rows = load_ledger(&paths.ledger).unwrap_or_else(|e| {
        warn!(error = %e, "Ledger unavailable, GL balances will be zero");
        Vec::new()
    });
    let aggregate = aggregate(
        &rows,
        &recon.account_code,
        recon.prior_period,
        recon.current_period,
    );

    let mut report = assemble_report(config, &total, &aggregate, &document);
    report.save(&paths.report)?;

    Ok(ReconcileOutcome {
        statement_path,
        total,
        aggregate,
        report_path: paths.report.clone(),
    })
}

/// Reconcile, then investigate the saved report
pub async fn run(
    config: &ReconConfig,
    backend: Option<&dyn NarrativeBackend>,
    prompts: PromptLibrary,
) -> Result<(ReconcileOutcome, InvestigationOutcome)> {
    let reconciled = reconcile(config)?;
    let investigated = Investigator::new(config, backend)
        .with_prompts(prompts)
        .run(&reconciled.report_path)
        .await?;
    Ok((reconciled, investigated))
}
