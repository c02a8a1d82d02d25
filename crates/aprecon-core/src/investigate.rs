//! Threshold-gated variance investigation
//!
//! Runs against a persisted report:
//!
//! ```text
//! Idle -> ReasonCleared -> Evaluating -> WithinThreshold
//!                                     -> Indeterminate
//!                                     -> Investigating -> NarrativeRequested -> ReportUpdated
//! ```
//!
//! The report is loaded once and saved once per run, so a stale Reason
//! never survives a run that ends below threshold. Failures on auxiliary
//! inputs (ledger, emails, narrative service) degrade to empty context or
//! a visible failure message; only an unreadable report is an error.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::{NarrativeBackend, NarrativeRequest};
use crate::config::ReconConfig;
use crate::error::Result;
use crate::import::{load_communications, load_ledger};
use crate::ledger::period_entries;
use crate::models::{MovementPct, MovementResult};
use crate::prompts::{Prompt, PromptId, PromptLibrary};
use crate::report::{CellValue, ReconciliationReport, MOM_PCT_CHANGE};

pub const NO_BACKEND_MESSAGE: &str =
    "Error: no narrative backend configured (set AI_BACKEND and its host variables)";
pub const EMPTY_NARRATIVE_MESSAGE: &str = "No analysis could be generated from the provided data";

/// Failure message written as the Reason when generation fails
pub fn narrative_failure_message(cause: &str) -> String {
    format!("Unable to generate AI analysis due to API error: {}", cause)
}

/// Investigation trigger states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerState {
    Idle,
    ReasonCleared,
    Evaluating,
    /// |percentage| at or below threshold; terminal
    WithinThreshold,
    /// Percentage undefined and policy says not to investigate; terminal
    Indeterminate,
    Investigating,
    NarrativeRequested,
    /// Narrative written back; terminal
    ReportUpdated,
}

impl TriggerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ReasonCleared => "reason_cleared",
            Self::Evaluating => "evaluating",
            Self::WithinThreshold => "within_threshold",
            Self::Indeterminate => "indeterminate",
            Self::Investigating => "investigating",
            Self::NarrativeRequested => "narrative_requested",
            Self::ReportUpdated => "report_updated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::WithinThreshold | Self::Indeterminate | Self::ReportUpdated
        )
    }
}

impl std::fmt::Display for TriggerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where the movement percentage came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PctSource {
    /// The report's "MoM % Change" cell
    Stored,
    /// Recomputed from the two GL balance rows
    Recomputed,
}

/// Movement percentage recovered from a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VarianceReading {
    pub percentage: MovementPct,
    pub source: PctSource,
    pub prior: Option<Decimal>,
    pub current: Option<Decimal>,
}

impl VarianceReading {
    /// "increase" or "decrease", qualified when there is no prior base
    pub fn direction(&self) -> &'static str {
        match self.percentage {
            MovementPct::Defined(p) if p > Decimal::ZERO => "increase",
            MovementPct::Defined(_) => "decrease",
            MovementPct::Undefined => {
                let prior = self.prior.unwrap_or_default();
                let current = self.current.unwrap_or_default();
                match (prior.is_zero(), current >= prior) {
                    (true, true) => "increase from a zero base",
                    (true, false) => "decrease from a zero base",
                    (false, true) => "increase",
                    (false, false) => "decrease",
                }
            }
        }
    }

    fn zero_prior(&self) -> bool {
        self.prior.unwrap_or_default().is_zero()
    }

    /// Percentage as shown to the narrative service ("40.0%")
    pub fn display_percent(&self) -> String {
        match self.percentage {
            MovementPct::Defined(p) => format!("{:.1}%", p),
            MovementPct::Undefined if self.zero_prior() => {
                "undefined (zero prior balance)".to_string()
            }
            MovementPct::Undefined => "undefined (out of range)".to_string(),
        }
    }
}

/// Recover the movement percentage from the report
///
/// A stored numeric value (or text parseable after stripping '%') wins;
/// otherwise the percentage is recomputed from the GL balance rows, and
/// is Undefined when the prior balance is zero or missing.
pub fn read_movement_pct(report: &ReconciliationReport) -> VarianceReading {
    let prior = report.prior_balance();
    let current = report.current_balance();

    let stored = report.row(MOM_PCT_CHANGE).and_then(|row| match &row.value {
        CellValue::Text { value } => Decimal::from_str(value.replace('%', "").trim()).ok(),
        other => other.as_decimal(),
    });

    if let Some(pct) = stored {
        debug!(percentage = %pct, "Using stored movement percentage");
        return VarianceReading {
            percentage: MovementPct::Defined(pct),
            source: PctSource::Stored,
            prior,
            current,
        };
    }

    let percentage = match (prior, current) {
        (Some(p), Some(c)) => MovementResult::between(p, c).delta_pct,
        _ => {
            warn!("Report is missing a GL balance row, movement percentage undefined");
            MovementPct::Undefined
        }
    };
    debug!(percentage = %percentage, "Recomputed movement percentage from GL balances");

    VarianceReading {
        percentage,
        source: PctSource::Recomputed,
        prior,
        current,
    }
}

/// Flattened evidence sent to the narrative service
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvestigationContext {
    pub summary: String,
    pub detail: String,
    pub ledger_entries: String,
    pub emails: String,
}

impl InvestigationContext {
    /// Snapshot the report and read the auxiliary sources
    ///
    /// Ledger entries are the current-period rows for the report's account.
    /// Read failures leave the corresponding block empty.
    pub fn gather(report: &ReconciliationReport, config: &ReconConfig) -> Self {
        let ledger_entries = match load_ledger(&config.paths.ledger) {
            Ok(rows) => {
                let entries =
                    period_entries(&rows, &report.account_code, report.current_period);
                info!(
                    entries = entries.len(),
                    account = %report.account_code,
                    period = %report.current_period,
                    "Current-period ledger entries gathered"
                );
                entries
                    .iter()
                    .map(|row| row.to_context_line())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            Err(e) => {
                warn!(error = %e, "Ledger unavailable, continuing without ledger entries");
                String::new()
            }
        };

        let emails = match load_communications(&config.paths.emails) {
            Ok(text) => truncate_chars(&text, config.investigation.email_char_budget).to_string(),
            Err(e) => {
                warn!(error = %e, "Communications unavailable, continuing without emails");
                String::new()
            }
        };

        Self {
            summary: report.summary_text(),
            detail: report.detail_text(),
            ledger_entries,
            emails,
        }
    }
}

/// Result of one trigger run
#[derive(Debug, Clone, Serialize)]
pub struct InvestigationOutcome {
    /// Terminal state reached
    pub state: TriggerState,
    pub reading: VarianceReading,
    /// Narrative written, if any
    pub reason: Option<String>,
    /// Every state entered, in order
    pub transitions: Vec<TriggerState>,
}

/// Runs the investigation trigger against a report
pub struct Investigator<'a> {
    config: &'a ReconConfig,
    backend: Option<&'a dyn NarrativeBackend>,
    prompts: PromptLibrary,
}

impl<'a> Investigator<'a> {
    pub fn new(config: &'a ReconConfig, backend: Option<&'a dyn NarrativeBackend>) -> Self {
        Self {
            config,
            backend,
            prompts: PromptLibrary::new(),
        }
    }

    /// Use a specific prompt library
    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = prompts;
        self
    }

    /// Load the report, run the trigger, and save the report once
    pub async fn run(&mut self, report_path: &Path) -> Result<InvestigationOutcome> {
        let mut report = ReconciliationReport::load(report_path)?;
        let outcome = self.run_on(&mut report).await;
        report.save(report_path)?;

        info!(
            state = %outcome.state,
            percentage = %outcome.reading.display_percent(),
            "Variance investigation complete"
        );
        Ok(outcome)
    }

    /// Run the trigger against an in-memory report
    pub async fn run_on(&mut self, report: &mut ReconciliationReport) -> InvestigationOutcome {
        let mut transitions = vec![TriggerState::Idle];

        report.clear_reason();
        enter(&mut transitions, TriggerState::ReasonCleared);

        enter(&mut transitions, TriggerState::Evaluating);
        let reading = read_movement_pct(report);
        let threshold = self.config.investigation.threshold_percent;

        let investigate = match reading.percentage {
            MovementPct::Defined(pct) => pct.abs() > threshold,
            MovementPct::Undefined => {
                let moved = reading.current.is_some_and(|c| !c.is_zero());
                if self.config.investigation.investigate_undefined && moved {
                    true
                } else {
                    warn!("Movement percentage undefined, no threshold comparison possible");
                    enter(&mut transitions, TriggerState::Indeterminate);
                    return InvestigationOutcome {
                        state: TriggerState::Indeterminate,
                        reading,
                        reason: None,
                        transitions,
                    };
                }
            }
        };

        if !investigate {
            info!(
                percentage = %reading.display_percent(),
                threshold = %threshold,
                "Movement within threshold, no investigation needed"
            );
            enter(&mut transitions, TriggerState::WithinThreshold);
            return InvestigationOutcome {
                state: TriggerState::WithinThreshold,
                reading,
                reason: None,
                transitions,
            };
        }

        info!(
            percentage = %reading.display_percent(),
            threshold = %threshold,
            "Movement exceeds threshold, investigating"
        );
        enter(&mut transitions, TriggerState::Investigating);
        let context = InvestigationContext::gather(report, self.config);

        let reason = match self.build_request(report, &reading, &context) {
            Ok(request) => {
                enter(&mut transitions, TriggerState::NarrativeRequested);
                generate_narrative(self.backend, &request).await
            }
            Err(e) => {
                warn!(error = %e, "Investigation prompt unavailable");
                enter(&mut transitions, TriggerState::NarrativeRequested);
                narrative_failure_message(&e.to_string())
            }
        };

        report.set_reason(reason.clone());
        enter(&mut transitions, TriggerState::ReportUpdated);

        InvestigationOutcome {
            state: TriggerState::ReportUpdated,
            reading,
            reason: Some(reason),
            transitions,
        }
    }

    /// Render the investigation prompt into a generation request
    pub fn build_request(
        &mut self,
        report: &ReconciliationReport,
        reading: &VarianceReading,
        context: &InvestigationContext,
    ) -> Result<NarrativeRequest> {
        let prompt = self.investigation_prompt()?;

        let percent = reading.display_percent();
        let period = report.current_period.month_name().to_uppercase();
        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("account_code", &report.account_code);
        vars.insert("mom_percent", &percent);
        vars.insert("direction", reading.direction());
        vars.insert("current_period", &period);
        vars.insert("summary", &context.summary);
        vars.insert("detail", &context.detail);
        vars.insert("ledger_entries", &context.ledger_entries);
        vars.insert("emails", &context.emails);

        Ok(NarrativeRequest {
            system: prompt.system_section().unwrap_or_default().to_string(),
            prompt: prompt.render_user(&vars),
            max_tokens: self.config.investigation.max_tokens,
            temperature: self.config.investigation.temperature,
        })
    }

    /// The override prompt if it loads, otherwise the embedded default
    fn investigation_prompt(&mut self) -> Result<Prompt> {
        match self.prompts.get(PromptId::InvestigateVariance) {
            Ok(prompt) => Ok(prompt.clone()),
            Err(e) => {
                warn!(error = %e, "Prompt override unusable, using embedded default");
                Ok(PromptLibrary::embedded_only()
                    .get(PromptId::InvestigateVariance)?
                    .clone())
            }
        }
    }
}

fn enter(transitions: &mut Vec<TriggerState>, state: TriggerState) {
    debug!(state = %state, "Investigation state");
    transitions.push(state);
}

/// Ask the backend for a narrative; never fails
pub async fn generate_narrative(
    backend: Option<&dyn NarrativeBackend>,
    request: &NarrativeRequest,
) -> String {
    let Some(backend) = backend else {
        warn!("No narrative backend configured");
        return NO_BACKEND_MESSAGE.to_string();
    };

    debug!(
        host = backend.host(),
        model = backend.model(),
        prompt_chars = request.prompt.len(),
        "Requesting narrative"
    );

    match backend.generate(request).await {
        Ok(text) if text.trim().is_empty() => EMPTY_NARRATIVE_MESSAGE.to_string(),
        Ok(text) => text.trim().to_string(),
        Err(e) => {
            warn!(error = %e, "Narrative generation failed");
            narrative_failure_message(&e.to_string())
        }
    }
}

/// Longest prefix of `s` with at most `max_chars` characters
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;
    use crate::ledger::LedgerAggregate;
    use crate::models::{ExtractedTotal, PeriodBalance, Provenance, YearMonth};
    use crate::report::{SummaryRow, REASON};
    use crate::statement::StatementDocument;
    use std::path::PathBuf;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn config() -> ReconConfig {
        let mut config = ReconConfig::embedded().unwrap();
        config.paths.ledger = PathBuf::from("/nonexistent/gl.csv");
        config.paths.emails = PathBuf::from("/nonexistent/emails.csv");
        config
    }

    fn report(prior: &str, current: &str) -> ReconciliationReport {
        report_between(
            YearMonth::new(2024, 8).unwrap(),
            YearMonth::new(2024, 9).unwrap(),
            prior,
            current,
        )
    }

    fn report_between(
        prior_period: YearMonth,
        current_period: YearMonth,
        prior: &str,
        current: &str,
    ) -> ReconciliationReport {
        let aggregate = LedgerAggregate {
            account_code: "2000".to_string(),
            prior: PeriodBalance {
                period: prior_period,
                net: dec(prior),
            },
            current: PeriodBalance {
                period: current_period,
                net: dec(current),
            },
            movement: MovementResult::between(dec(prior), dec(current)),
            matched_rows: 2,
            undated_rows: 0,
        };
        let document = StatementDocument {
            path: PathBuf::from("statement.txt"),
            text: None,
            sha256: None,
        };
        let total = ExtractedTotal {
            amount: dec("125000"),
            provenance: Provenance::Fallback,
        };
        ReconciliationReport::assemble(&total, &aggregate, &document, dec("5000"))
    }

    fn prompts() -> PromptLibrary {
        PromptLibrary::embedded_only()
    }

    #[test]
    fn test_read_stored_percentage() {
        let reading = read_movement_pct(&report("100000", "140000"));
        assert_eq!(reading.percentage, MovementPct::Defined(dec("40")));
        assert_eq!(reading.source, PctSource::Stored);
        assert_eq!(reading.direction(), "increase");
        assert_eq!(reading.display_percent(), "40.0%");
    }

    #[test]
    fn test_read_text_percentage_strips_sign() {
        let mut r = report("100000", "140000");
        for row in &mut r.summary {
            if row.item == MOM_PCT_CHANGE {
                row.value = CellValue::text(" -12.5 % ");
            }
        }
        let reading = read_movement_pct(&r);
        assert_eq!(reading.percentage, MovementPct::Defined(dec("-12.5")));
        assert_eq!(reading.source, PctSource::Stored);
        assert_eq!(reading.direction(), "decrease");
    }

    #[test]
    fn test_read_recomputes_when_missing() {
        let mut r = report("100000", "103000");
        r.summary.retain(|row| row.item != MOM_PCT_CHANGE);
        let reading = read_movement_pct(&r);
        assert_eq!(reading.percentage, MovementPct::Defined(dec("3")));
        assert_eq!(reading.source, PctSource::Recomputed);
    }

    #[test]
    fn test_read_zero_prior_is_undefined_not_zero() {
        let reading = read_movement_pct(&report("0", "50000"));
        assert_eq!(reading.percentage, MovementPct::Undefined);
        assert_eq!(reading.source, PctSource::Recomputed);
        assert_eq!(reading.direction(), "increase from a zero base");
    }

    #[tokio::test]
    async fn test_above_threshold_writes_reason() {
        let config = config();
        let mock = MockBackend::with_response("  Large September invoices from Acme.  ");
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("100000", "140000");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::ReportUpdated);
        assert_eq!(
            outcome.transitions,
            vec![
                TriggerState::Idle,
                TriggerState::ReasonCleared,
                TriggerState::Evaluating,
                TriggerState::Investigating,
                TriggerState::NarrativeRequested,
                TriggerState::ReportUpdated,
            ]
        );
        assert_eq!(r.reason(), Some("Large September invoices from Acme."));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].max_tokens, 400);
        assert!(requests[0].prompt.contains("account code 2000"));
        assert!(requests[0].prompt.contains("40.0% change month-over-month (increase)"));
        assert!(requests[0].prompt.contains("B7: 40"));
        assert!(requests[0].system.contains("Senior Accounts Payable Accountant"));
    }

    #[tokio::test]
    async fn test_within_threshold_clears_stale_reason() {
        let config = config();
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("100000", "103000");
        r.set_reason("stale narrative");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::WithinThreshold);
        assert!(outcome.reason.is_none());
        assert_eq!(r.reason(), None);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_year_over_year_same_month_is_investigated() {
        let config = config();
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report_between(
            YearMonth::new(2023, 9).unwrap(),
            YearMonth::new(2024, 9).unwrap(),
            "100000",
            "140000",
        );
        r.summary.retain(|row| row.item != MOM_PCT_CHANGE);

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.reading.source, PctSource::Recomputed);
        assert_eq!(outcome.reading.percentage, MovementPct::Defined(dec("40")));
        assert_eq!(outcome.state, TriggerState::ReportUpdated);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let config = config();
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("100000", "90000");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.reading.percentage, MovementPct::Defined(dec("-10")));
        assert_eq!(outcome.state, TriggerState::WithinThreshold);
    }

    #[tokio::test]
    async fn test_backend_failure_becomes_reason() {
        let config = config();
        let mock = MockBackend::failing("connection refused");
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("100000", "140000");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::ReportUpdated);
        let reason = r.reason().unwrap();
        assert!(reason.starts_with("Unable to generate AI analysis due to API error: "));
        assert!(reason.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_no_backend_message() {
        let config = config();
        let mut investigator = Investigator::new(&config, None).with_prompts(prompts());
        let mut r = report("100000", "140000");

        investigator.run_on(&mut r).await;
        assert_eq!(r.reason(), Some(NO_BACKEND_MESSAGE));
    }

    #[tokio::test]
    async fn test_empty_narrative_message() {
        let config = config();
        let mock = MockBackend::with_response("   ");
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("100000", "140000");

        investigator.run_on(&mut r).await;
        assert_eq!(r.reason(), Some(EMPTY_NARRATIVE_MESSAGE));
    }

    #[tokio::test]
    async fn test_zero_prior_investigates_by_default() {
        let config = config();
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("0", "50000");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::ReportUpdated);
        assert!(mock.requests()[0]
            .prompt
            .contains("(increase from a zero base)"));
    }

    #[tokio::test]
    async fn test_zero_prior_indeterminate_when_disabled() {
        let mut config = config();
        config.investigation.investigate_undefined = false;
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("0", "50000");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::Indeterminate);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_to_zero_is_indeterminate() {
        let config = config();
        let mock = MockBackend::new();
        let mut investigator = Investigator::new(&config, Some(&mock)).with_prompts(prompts());
        let mut r = report("0", "0");

        let outcome = investigator.run_on(&mut r).await;
        assert_eq!(outcome.state, TriggerState::Indeterminate);
        assert!(outcome.state.is_terminal());
    }

    #[tokio::test]
    async fn test_rerun_keeps_single_reason() {
        let config = config();
        let mut r = report("100000", "140000");
        r.summary.push(SummaryRow::new(REASON, CellValue::text("older")));

        let first = MockBackend::with_response("first run");
        Investigator::new(&config, Some(&first))
            .with_prompts(prompts())
            .run_on(&mut r)
            .await;
        let second = MockBackend::with_response("second run");
        Investigator::new(&config, Some(&second))
            .with_prompts(prompts())
            .run_on(&mut r)
            .await;

        let reasons: Vec<_> = r.summary.iter().filter(|row| row.item == REASON).collect();
        assert_eq!(reasons.len(), 1);
        assert_eq!(r.reason(), Some("second run"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("€€€€", 2), "€€");
        assert_eq!(truncate_chars("", 5), "");
    }

    #[test]
    fn test_gather_degrades_to_empty() {
        let context = InvestigationContext::gather(&report("100000", "140000"), &config());
        assert!(context.ledger_entries.is_empty());
        assert!(context.emails.is_empty());
        assert!(context.summary.starts_with("A1: Item | B1: Amount"));
        assert!(!context.detail.is_empty());
    }
}
