//! aprecon Core Library
//!
//! Monthly Accounts Payable reconciliation:
//! - Statement total extraction with tiered fallback
//! - General ledger aggregation and month-over-month movement
//! - Reconciliation report assembly and persistence
//! - Threshold-gated variance investigation
//! - Pluggable narrative backends (OpenAI-compatible, Ollama)
//! - Prompt library for customizable investigation prompts

pub mod ai;
pub mod config;
pub mod error;
pub mod import;
pub mod investigate;
pub mod ledger;
pub mod models;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod statement;

/// Test utilities including mock narrative server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    MockBackend, NarrativeBackend, NarrativeClient, NarrativeRequest, OllamaBackend,
    OpenAICompatibleBackend,
};
pub use config::ReconConfig;
pub use error::{Error, Result};
pub use investigate::{
    InvestigationContext, InvestigationOutcome, Investigator, TriggerState, VarianceReading,
};
pub use ledger::{aggregate, LedgerAggregate};
pub use models::{
    ExtractedTotal, LedgerRow, MovementPct, MovementResult, PeriodBalance, Provenance, YearMonth,
};
pub use pipeline::{reconcile, ReconcileOutcome};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use report::{CellValue, ReconciliationReport, SummaryRow};
pub use statement::{extract_total, StatementDocument};
