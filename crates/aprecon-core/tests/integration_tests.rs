//! Integration tests for aprecon-core
//!
//! These tests exercise the full statement → ledger → report → investigation
//! workflow against files in a temporary directory.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;

use aprecon_core::{
    extract_total,
    investigate::{EMPTY_NARRATIVE_MESSAGE, NO_BACKEND_MESSAGE},
    pipeline, reconcile, Error, Investigator, MockBackend, MovementPct, NarrativeBackend,
    NarrativeClient, PromptLibrary, Provenance, ReconConfig, ReconciliationReport, TriggerState,
};
use rust_decimal::Decimal;
use tempfile::TempDir;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// General ledger with account 2000 moving from `aug` to `sep`
///
/// Also carries noise: another account, an out-of-range month, and an
/// undated row.
fn ledger_csv(aug: &str, sep: &str) -> String {
    format!(
        "date,account_code,description,debit,credit
2024-08-05,2000,Invoice ACME-101,0,{aug}
2024-09-12,2000.0,Invoice ACME-103,0,{sep}
2024-09-14,1000,Cash receipt,0,77777
2024-07-31,2000,Invoice ACME-099,0,5000
TBD,2000,Manual accrual,0,999
"
    )
}

const STATEMENT: &str = "ACME SUPPLIES LTD
Statement of Account
Account: Example Corp
Opening Balance $100,000.00
Invoice ACME-103 $40,000.00
Payments received $0.00
Closing Balance $140,000.00
";

const EMAILS: &str = "from,subject,body
billing@acme.com,September invoices,Large shipment of raw materials invoiced 12 Sep
ap@example.com,Re: September invoices,Approved for payment in October
";

struct Fixture {
    _dir: TempDir,
    config: ReconConfig,
}

impl Fixture {
    fn new(aug: &str, sep: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let statement_dir = dir.path().join("statement");
        fs::create_dir(&statement_dir).unwrap();
        fs::write(
            statement_dir.join("acme_supplier_statement_custom.txt"),
            STATEMENT,
        )
        .unwrap();
        fs::write(dir.path().join("gl.csv"), ledger_csv(aug, sep)).unwrap();
        fs::write(dir.path().join("emails.csv"), EMAILS).unwrap();

        let mut config = ReconConfig::embedded().unwrap();
        config.paths.ledger = dir.path().join("gl.csv");
        config.paths.statement_dir = statement_dir;
        config.paths.statement_pattern = "*supplier_statement_custom*.txt".to_string();
        config.paths.emails = dir.path().join("emails.csv");
        config.paths.report = dir.path().join("AP_Reconciliation.json");

        Self { _dir: dir, config }
    }

    fn report_path(&self) -> PathBuf {
        self.config.paths.report.clone()
    }

    fn report(&self) -> ReconciliationReport {
        ReconciliationReport::load(&self.report_path()).unwrap()
    }
}

// =============================================================================
// Statement extraction
// =============================================================================

#[test]
fn test_extract_labeled_total() {
    let text = "Acme Supplies\nInvoice ACME-101 12 units\nTotal Balance Due: $1,234.56\nThank you";
    assert_eq!(extract_total(text, dec("125000")), dec("1234.56"));
}

#[test]
fn test_extract_contextual_total() {
    let text = "Acme Supplies\nAccount summary\n$950.00 remaining\nThank you";
    assert_eq!(extract_total(text, dec("125000")), dec("950.00"));
}

#[test]
fn test_extract_fallback() {
    assert_eq!(extract_total("", dec("125000")), dec("125000"));
    assert_eq!(
        extract_total("Nothing to see here", dec("125000")),
        dec("125000")
    );
}

// =============================================================================
// Reconcile
// =============================================================================

#[test]
fn test_reconcile_builds_report() {
    let fx = Fixture::new("100000", "140000");
    let outcome = reconcile(&fx.config).unwrap();

    assert_eq!(outcome.total.amount, dec("140000.00"));
    assert_eq!(outcome.total.provenance, Provenance::LabeledLine);
    assert_eq!(outcome.aggregate.prior.net, dec("100000"));
    assert_eq!(outcome.aggregate.current.net, dec("140000"));
    assert_eq!(outcome.aggregate.movement.delta, dec("40000"));
    assert_eq!(
        outcome.aggregate.movement.delta_pct,
        MovementPct::Defined(dec("40"))
    );
    assert_eq!(outcome.aggregate.undated_rows, 1);

    let report = fx.report();
    assert_eq!(report.statement_total(), Some(dec("140000")));
    assert_eq!(report.prior_balance(), Some(dec("100000")));
    assert_eq!(report.current_balance(), Some(dec("140000")));
    assert_eq!(report.reason(), None);

    let attachment = report.detail.attachment.as_ref().unwrap();
    assert_eq!(attachment.sha256.as_ref().map(|h| h.len()), Some(64));
    assert!(attachment.preview.contains("Closing Balance $140,000.00"));
}

#[test]
fn test_reconcile_without_statement_aborts() {
    let mut fx = Fixture::new("100000", "140000");
    fx.config.paths.statement_pattern = "*no_such_statement*.pdf".to_string();

    let err = reconcile(&fx.config).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(!fx.report_path().exists());
}

// =============================================================================
// Investigation
// =============================================================================

#[tokio::test]
async fn test_large_movement_is_investigated() {
    let fx = Fixture::new("100000", "140000");
    let mock = MockBackend::with_response("Raw material invoices from Acme drove the increase.");

    let (_, outcome) = pipeline::run(&fx.config, Some(&mock), PromptLibrary::embedded_only())
        .await
        .unwrap();

    assert!(outcome.transitions.contains(&TriggerState::Investigating));
    assert_eq!(outcome.state, TriggerState::ReportUpdated);
    assert_eq!(
        fx.report().reason(),
        Some("Raw material invoices from Acme drove the increase.")
    );

    let requests = mock.requests();
    assert_eq!(requests.len(), 1);
    let prompt = &requests[0].prompt;
    assert!((requests[0].temperature - 0.2).abs() < f32::EPSILON);
    assert!(prompt.contains("40.0% change month-over-month (increase)"));
    assert!(prompt.contains("SEPTEMBER GENERAL LEDGER ENTRIES"));
    assert!(prompt.contains("Invoice ACME-103"));
    assert!(!prompt.contains("Invoice ACME-101"), "prior-period row leaked");
    assert!(!prompt.contains("Cash receipt"), "other account leaked");
    assert!(prompt.contains("Large shipment of raw materials"));
}

#[tokio::test]
async fn test_small_movement_is_within_threshold() {
    let fx = Fixture::new("100000", "103000");
    let mock = MockBackend::new();

    let (_, outcome) = pipeline::run(&fx.config, Some(&mock), PromptLibrary::embedded_only())
        .await
        .unwrap();

    assert_eq!(outcome.state, TriggerState::WithinThreshold);
    assert_eq!(outcome.reading.percentage, MovementPct::Defined(dec("3")));
    assert!(outcome.reason.is_none());
    assert_eq!(mock.call_count(), 0);
    assert_eq!(fx.report().reason(), None);
}

#[tokio::test]
async fn test_transport_error_becomes_reason() {
    let fx = Fixture::new("100000", "140000");
    reconcile(&fx.config).unwrap();

    // Nothing listens on port 1
    let client = NarrativeClient::openai_compatible("http://127.0.0.1:1", "gpt-4", None);
    let outcome = Investigator::new(&fx.config, Some(&client as &dyn NarrativeBackend))
        .with_prompts(PromptLibrary::embedded_only())
        .run(&fx.report_path())
        .await
        .unwrap();

    assert_eq!(outcome.state, TriggerState::ReportUpdated);
    let reason = fx.report().reason().unwrap().to_string();
    assert!(reason.starts_with("Unable to generate AI analysis due to API error: HTTP request error"));
}

#[tokio::test]
async fn test_rerun_replaces_reason() {
    let fx = Fixture::new("100000", "140000");
    reconcile(&fx.config).unwrap();

    for text in ["first narrative", "second narrative"] {
        let mock = MockBackend::with_response(text);
        Investigator::new(&fx.config, Some(&mock))
            .with_prompts(PromptLibrary::embedded_only())
            .run(&fx.report_path())
            .await
            .unwrap();
    }

    let report = fx.report();
    let reasons = report
        .summary
        .iter()
        .filter(|row| row.item == "Reason")
        .count();
    assert_eq!(reasons, 1);
    assert_eq!(report.reason(), Some("second narrative"));
}

#[tokio::test]
async fn test_rerun_below_threshold_removes_reason() {
    let mut fx = Fixture::new("100000", "140000");
    let mock = MockBackend::new();
    pipeline::run(&fx.config, Some(&mock), PromptLibrary::embedded_only())
        .await
        .unwrap();
    assert!(fx.report().reason().is_some());

    fx.config.investigation.threshold_percent = dec("50");
    let outcome = Investigator::new(&fx.config, Some(&mock))
        .with_prompts(PromptLibrary::embedded_only())
        .run(&fx.report_path())
        .await
        .unwrap();

    assert_eq!(outcome.state, TriggerState::WithinThreshold);
    assert_eq!(fx.report().reason(), None);
}

#[tokio::test]
async fn test_zero_prior_balance() {
    let fx = Fixture::new("0", "50000");
    let mock = MockBackend::new();

    let (reconciled, outcome) =
        pipeline::run(&fx.config, Some(&mock), PromptLibrary::embedded_only())
            .await
            .unwrap();

    assert_eq!(
        reconciled.aggregate.movement.delta_pct,
        MovementPct::Undefined
    );
    assert_eq!(outcome.reading.percentage, MovementPct::Undefined);
    assert_eq!(outcome.state, TriggerState::ReportUpdated);
    assert!(fx.report().summary_text().contains("#DIV/0!"));
}

#[tokio::test]
async fn test_missing_auxiliary_inputs_still_complete() {
    let mut fx = Fixture::new("100000", "140000");
    reconcile(&fx.config).unwrap();
    fx.config.paths.emails = PathBuf::from("/nonexistent/emails.csv");
    fx.config.paths.ledger = PathBuf::from("/nonexistent/gl.csv");

    let outcome = Investigator::new(&fx.config, None)
        .with_prompts(PromptLibrary::embedded_only())
        .run(&fx.report_path())
        .await
        .unwrap();

    assert_eq!(outcome.state, TriggerState::ReportUpdated);
    assert_eq!(fx.report().reason(), Some(NO_BACKEND_MESSAGE));
}

#[tokio::test]
async fn test_empty_model_output() {
    let fx = Fixture::new("100000", "140000");
    let mock = MockBackend::with_response("");
    pipeline::run(&fx.config, Some(&mock), PromptLibrary::embedded_only())
        .await
        .unwrap();
    assert_eq!(fx.report().reason(), Some(EMPTY_NARRATIVE_MESSAGE));
}
