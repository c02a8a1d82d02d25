//! Reconciliation report: assembly, persistence, and narrative bookkeeping
//!
//! The report is a single in-memory document with explicit load/save
//! boundaries. The summary is an ordered list of `Item | Amount` rows laid
//! out like a two-column sheet (header on row 1), so derived cells carry a
//! spreadsheet-style formula next to their computed value.
//!
//! Invariant: at most one "Reason" row. `set_reason` replaces, and `save`
//! collapses any duplicates before writing.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ledger::LedgerAggregate;
use crate::models::{ExtractedTotal, MovementResult, YearMonth};
use crate::statement::StatementDocument;

pub const STATEMENT_CLOSING_BALANCE: &str = "Statement Closing Balance";
pub const MOVEMENT_MOM: &str = "Movement MoM";
pub const VARIANCE: &str = "Variance";
pub const MOM_PCT_CHANGE: &str = "MoM % Change";
pub const REASON: &str = "Reason";

/// Rendered in place of a derived value that cannot be computed
pub const DIV_ZERO: &str = "#DIV/0!";

const REVIEW_NOTE: &str = "Variance present. Evidence required for review.";
const ATTACHMENT_LABEL: &str = "Supporting Invoice Screenshot:";

/// Summary labels for the prior and current GL balance rows
///
/// "GL Balance August" normally; the year is appended to both when the
/// month names collide ("GL Balance September 2023").
pub fn gl_balance_labels(prior: YearMonth, current: YearMonth) -> (String, String) {
    let label = |period: YearMonth| {
        if prior.month_name() == current.month_name() {
            format!("GL Balance {} {}", period.month_name(), period.year)
        } else {
            format!("GL Balance {}", period.month_name())
        }
    };
    (label(prior), label(current))
}

/// Value of a summary cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CellValue {
    Amount { value: Decimal },
    /// Formula cell with its cached result; None when not computable
    Derived {
        formula: String,
        value: Option<Decimal>,
    },
    Text { value: String },
}

impl CellValue {
    pub fn amount(value: Decimal) -> Self {
        Self::Amount { value }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    /// Numeric value, if the cell holds one
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Amount { value } => Some(*value),
            Self::Derived { value, .. } => *value,
            Self::Text { .. } => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Amount { value } => write!(f, "{}", value.round_dp(2).normalize()),
            Self::Derived {
                value: Some(value), ..
            } => write!(f, "{}", value.round_dp(2).normalize()),
            Self::Derived { value: None, .. } => write!(f, "{}", DIV_ZERO),
            Self::Text { value } => write!(f, "{}", value),
        }
    }
}

/// One `Item | Amount` row of the summary section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub item: String,
    pub value: CellValue,
}

impl SummaryRow {
    pub fn new(item: impl Into<String>, value: CellValue) -> Self {
        Self {
            item: item.into(),
            value,
        }
    }

    fn is_reason(&self) -> bool {
        self.item.trim().eq_ignore_ascii_case(REASON)
    }
}

/// Audit copy of the statement the total was read from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub label: String,
    pub path: String,
    pub sha256: Option<String>,
    /// Leading lines of the extracted text
    pub preview: String,
}

/// Supporting evidence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailSection {
    pub rows: Vec<String>,
    pub attachment: Option<DocumentAttachment>,
}

/// The persisted reconciliation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub account_code: String,
    pub prior_period: YearMonth,
    pub current_period: YearMonth,
    pub generated_at: DateTime<Utc>,
    pub note: String,
    pub summary: Vec<SummaryRow>,
    pub detail: DetailSection,
}

impl ReconciliationReport {
    /// Build the report from the computed statement total and GL balances
    pub fn assemble(
        statement: &ExtractedTotal,
        aggregate: &LedgerAggregate,
        document: &StatementDocument,
        fallback_invoice_total: Decimal,
    ) -> Self {
        let generated_at = Utc::now();
        let prior_period = aggregate.prior.period;
        let current_period = aggregate.current.period;

        let (prior_label, current_label) = gl_balance_labels(prior_period, current_period);

        let summary = vec![
            SummaryRow::new(STATEMENT_CLOSING_BALANCE, CellValue::amount(statement.amount)),
            SummaryRow::new(prior_label, CellValue::amount(aggregate.prior.net)),
            SummaryRow::new(current_label, CellValue::amount(aggregate.current.net)),
            SummaryRow::new(MOVEMENT_MOM, empty_derived()),
            SummaryRow::new(VARIANCE, empty_derived()),
            SummaryRow::new(MOM_PCT_CHANGE, empty_derived()),
        ];

        let detail = DetailSection {
            rows: vec![
                ATTACHMENT_LABEL.to_string(),
                format!("Statement document: {}", document.file_name()),
                format!("Statement total source: {}", statement.provenance),
                format!("Expected invoice total: {}", fallback_invoice_total.round_dp(2)),
                format!(
                    "GL rows for account {}: {} ({} with unparsable dates)",
                    aggregate.account_code, aggregate.matched_rows, aggregate.undated_rows
                ),
            ],
            attachment: Some(DocumentAttachment {
                label: ATTACHMENT_LABEL.trim_end_matches(':').to_string(),
                path: document.path.display().to_string(),
                sha256: document.sha256.clone(),
                preview: document.preview(),
            }),
        };

        let mut report = Self {
            account_code: aggregate.account_code.clone(),
            prior_period,
            current_period,
            generated_at,
            note: format!("{}\nGenerated: {}", REVIEW_NOTE, generated_at.to_rfc3339()),
            summary,
            detail,
        };
        report.recalculate();
        report
    }

    /// Load a report from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::NotFound(format!("Report {} unreadable: {}", path.display(), e))
        })?;
        let mut report: Self = serde_json::from_str(&content)?;
        report.enforce_single_reason();
        debug!(path = %path.display(), rows = report.summary.len(), "Report loaded");
        Ok(report)
    }

    /// Write the report atomically, enforcing its invariants first
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.enforce_single_reason();
        self.recalculate();

        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &*self)?;
        tmp.write_all(b"\n")?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!(path = %path.display(), "Reconciliation report saved");
        Ok(())
    }

    /// Find a summary row by item label
    pub fn row(&self, item: &str) -> Option<&SummaryRow> {
        self.summary.iter().find(|r| r.item == item)
    }

    /// Sheet reference of a row's value cell ("B4"); row 1 is the header
    pub fn cell_ref(&self, item: &str) -> Option<String> {
        self.summary
            .iter()
            .position(|r| r.item == item)
            .map(|i| format!("B{}", i + 2))
    }

    pub fn statement_total(&self) -> Option<Decimal> {
        self.row(STATEMENT_CLOSING_BALANCE)
            .and_then(|r| r.value.as_decimal())
    }

    /// Row indexes of the prior and current GL balances
    ///
    /// The current balance is the last row carrying its label, so identical
    /// labels still resolve to two distinct rows.
    fn balance_rows(&self) -> (Option<usize>, Option<usize>) {
        let (prior_label, current_label) =
            gl_balance_labels(self.prior_period, self.current_period);
        let prior = self.summary.iter().position(|r| r.item == prior_label);
        let current = self.summary.iter().rposition(|r| r.item == current_label);
        (prior, current)
    }

    fn amount_at(&self, index: Option<usize>) -> Option<Decimal> {
        index
            .and_then(|i| self.summary.get(i))
            .and_then(|r| r.value.as_decimal())
    }

    pub fn prior_balance(&self) -> Option<Decimal> {
        self.amount_at(self.balance_rows().0)
    }

    pub fn current_balance(&self) -> Option<Decimal> {
        self.amount_at(self.balance_rows().1)
    }

    /// Recompute every derived cell from the amount rows
    pub fn recalculate(&mut self) {
        let statement_ref = self.cell_ref(STATEMENT_CLOSING_BALANCE);
        let (prior_row, current_row) = self.balance_rows();
        let prior_ref = prior_row.map(|i| format!("B{}", i + 2));
        let current_ref = current_row.map(|i| format!("B{}", i + 2));

        let statement = self.statement_total();
        let prior = self.prior_balance();
        let current = self.current_balance();
        let movement = prior.zip(current).map(|(p, c)| MovementResult::between(p, c));

        let r = |cell: &Option<String>| cell.clone().unwrap_or_else(|| "#REF!".to_string());
        let (s, p, c) = (r(&statement_ref), r(&prior_ref), r(&current_ref));

        for row in &mut self.summary {
            let (formula, value) = match row.item.as_str() {
                MOVEMENT_MOM => (format!("={}-{}", c, p), movement.map(|m| m.delta)),
                VARIANCE => (
                    format!("={}-{}", s, c),
                    statement.zip(current).and_then(|(s, c)| s.checked_sub(c)),
                ),
                MOM_PCT_CHANGE => (
                    format!("=({}-{})/{}*100", c, p, p),
                    movement.and_then(|m| m.delta_pct.value()),
                ),
                _ => continue,
            };
            if matches!(row.value, CellValue::Derived { .. }) {
                row.value = CellValue::Derived { formula, value };
            }
        }
    }

    /// The narrative, if one has been written
    pub fn reason(&self) -> Option<&str> {
        self.summary
            .iter()
            .find(|r| r.is_reason())
            .map(|r| match &r.value {
                CellValue::Text { value } => value.as_str(),
                _ => "",
            })
    }

    /// Remove any stored narrative; returns true if one was present
    pub fn clear_reason(&mut self) -> bool {
        let before = self.summary.len();
        self.summary.retain(|r| !r.is_reason());
        let cleared = self.summary.len() != before;
        if cleared {
            debug!("Cleared existing reason from report");
        }
        cleared
    }

    /// Write the narrative as the sole Reason row
    ///
    /// Replaces an existing Reason in place, otherwise appends after the
    /// last summary row.
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        let value = CellValue::text(reason);
        if let Some(row) = self.summary.iter_mut().find(|r| r.is_reason()) {
            row.value = value;
            debug!("Updated existing reason in report");
        } else {
            self.summary.push(SummaryRow::new(REASON, value));
            debug!("Added new reason to report");
        }
        self.enforce_single_reason();
    }

    /// Collapse duplicate Reason rows, keeping the last one's text in the first slot
    fn enforce_single_reason(&mut self) {
        let positions: Vec<usize> = self
            .summary
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_reason())
            .map(|(i, _)| i)
            .collect();

        if positions.len() <= 1 {
            return;
        }

        warn!(count = positions.len(), "Multiple Reason rows found, keeping the latest");
        let last = positions[positions.len() - 1];
        let latest = self.summary[last].value.clone();
        self.summary[positions[0]].value = latest;
        for &i in positions[1..].iter().rev() {
            self.summary.remove(i);
        }
    }

    /// Summary flattened as sheet cells ("A2: Item | B2: value")
    pub fn summary_text(&self) -> String {
        std::iter::once("A1: Item | B1: Amount".to_string())
            .chain(self.summary.iter().enumerate().map(|(i, row)| {
                let n = i + 2;
                format!("A{}: {} | B{}: {}", n, row.item, n, row.value)
            }))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Detail section flattened to text, noting the attached document
    pub fn detail_text(&self) -> String {
        let mut text = self.detail.rows.join(" ");
        if let Some(ref attachment) = self.detail.attachment {
            text.push_str(&format!(
                " Contains supporting document image for review: {}",
                attachment.path
            ));
            if !attachment.preview.is_empty() {
                text.push_str(&format!("\nDocument preview:\n{}", attachment.preview));
            }
        }
        text
    }

    /// Summary as `Item,Amount` CSV
    pub fn export_csv(&self) -> Result<String> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(["Item", "Amount"])?;
        for row in &self.summary {
            wtr.write_record([row.item.as_str(), row.value.to_string().as_str()])?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| Error::InvalidData(format!("CSV export failed: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| Error::InvalidData(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn empty_derived() -> CellValue {
    CellValue::Derived {
        formula: String::new(),
        value: None,
    }
}
