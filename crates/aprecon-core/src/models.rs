//! Domain models for aprecon

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A calendar month, the unit of a reconciliation period
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Create a year/month, returning None for an out-of-range month
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// The month a date falls in
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    /// The previous calendar month
    pub fn pred(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// The next calendar month
    pub fn succ(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// English month name ("August")
    pub fn month_name(&self) -> &'static str {
        const NAMES: [&str; 12] = [
            "January",
            "February",
            "March",
            "April",
            "May",
            "June",
            "July",
            "August",
            "September",
            "October",
            "November",
            "December",
        ];
        NAMES[(self.month as usize - 1) % 12]
    }
}

impl std::str::FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("Invalid period '{}' (expected YYYY-MM)", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid year in period '{}'", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month in period '{}'", s))?;
        Self::new(year, month).ok_or_else(|| format!("Month out of range in period '{}'", s))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for YearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// A single general ledger line
///
/// `date` is None when the source value could not be coerced to a date.
/// `fields` keeps the original record (column, value) in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRow {
    pub date: Option<NaiveDate>,
    pub account_code: String,
    pub credit: Decimal,
    pub debit: Decimal,
    pub fields: Vec<(String, String)>,
}

impl LedgerRow {
    /// Signed contribution of this row to an AP balance (credit - debit)
    ///
    /// None when the difference is outside the representable range.
    pub fn net(&self) -> Option<Decimal> {
        self.credit.checked_sub(self.debit)
    }

    /// Flatten the source record to "column: value | column: value"
    pub fn to_context_line(&self) -> String {
        flatten_fields(&self.fields)
    }
}

/// Flatten (column, value) pairs, skipping empty values
pub fn flatten_fields(fields: &[(String, String)]) -> String {
    fields
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Net AP balance for one period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBalance {
    pub period: YearMonth,
    pub net: Decimal,
}

/// Percentage movement between two periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum MovementPct {
    Defined(Decimal),
    /// Prior balance was zero
    Undefined,
}

impl MovementPct {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            Self::Defined(v) => Some(*v),
            Self::Undefined => None,
        }
    }
}

impl std::fmt::Display for MovementPct {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defined(v) => write!(f, "{}%", v.round_dp(1)),
            Self::Undefined => write!(f, "undefined (no usable prior balance)"),
        }
    }
}

/// Month-over-month movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementResult {
    pub prior: Decimal,
    pub current: Decimal,
    pub delta: Decimal,
    pub delta_pct: MovementPct,
}

impl MovementResult {
    /// Movement from `prior` to `current`; never panics
    ///
    /// The percentage is Undefined when the prior balance is zero or the
    /// arithmetic leaves the representable range.
    pub fn between(prior: Decimal, current: Decimal) -> Self {
        let checked_delta = current.checked_sub(prior);
        let delta = checked_delta.unwrap_or_else(|| current.saturating_sub(prior));

        let delta_pct = if prior.is_zero() {
            MovementPct::Undefined
        } else {
            match checked_delta
                .and_then(|d| d.checked_div(prior))
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            {
                Some(pct) => MovementPct::Defined(pct),
                None => {
                    warn!(
                        %prior,
                        %current,
                        "Movement percentage out of range, treating as undefined"
                    );
                    MovementPct::Undefined
                }
            }
        };
        Self {
            prior,
            current,
            delta,
            delta_pct,
        }
    }
}

/// Which extraction tier produced a statement total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Trailing amount on a "balance"/"total" line
    LabeledLine,
    /// Last amount on a currency or balance line
    ContextualNumeric,
    /// Configured fallback constant
    Fallback,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LabeledLine => "labeled_line",
            Self::ContextualNumeric => "contextual_numeric",
            Self::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A statement total together with the tier that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTotal {
    pub amount: Decimal,
    pub provenance: Provenance,
}
