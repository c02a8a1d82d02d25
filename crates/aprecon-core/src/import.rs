//! CSV loaders for general ledger and communications exports

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{flatten_fields, LedgerRow};

/// Convert a CSV record to (column, value) pairs using headers as keys
fn record_fields(headers: &StringRecord, record: &StringRecord) -> Vec<(String, String)> {
    headers
        .iter()
        .enumerate()
        .filter_map(|(i, header)| {
            record
                .get(i)
                .map(|value| (header.to_string(), value.to_string()))
        })
        .collect()
}

/// Column positions of the ledger fields we need
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerColumns {
    account: usize,
    date: usize,
    credit: Option<usize>,
    debit: Option<usize>,
}

impl LedgerColumns {
    /// Locate columns by header name
    ///
    /// The account column is `account_code` if present, otherwise the first
    /// header containing "account".
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };

        let account = find("account_code")
            .or_else(|| {
                headers
                    .iter()
                    .position(|h| h.to_lowercase().contains("account"))
            })
            .ok_or_else(|| Error::Import("Ledger has no account column".into()))?;

        let date = find("date").ok_or_else(|| Error::Import("Ledger has no date column".into()))?;

        let credit = find("credit");
        let debit = find("debit");
        if credit.is_none() {
            warn!("Ledger has no credit column, treating credits as zero");
        }
        if debit.is_none() {
            warn!("Ledger has no debit column, treating debits as zero");
        }

        Ok(Self {
            account,
            date,
            credit,
            debit,
        })
    }
}

/// Parse general ledger CSV data into rows
///
/// Unparsable dates become `None`; the row is kept.
pub fn parse_ledger_csv<R: Read>(reader: R) -> Result<Vec<LedgerRow>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = LedgerColumns::locate(&headers)?;
    let mut rows = Vec::new();

    for result in rdr.records() {
        let record = result?;

        let date_str = record.get(columns.date).unwrap_or_default();
        let date = parse_date(date_str);
        if date.is_none() {
            debug!(value = date_str, "Unparsable ledger date");
        }

        let account_code = normalize_account_code(record.get(columns.account).unwrap_or_default());
        let credit = amount_at(&record, columns.credit);
        let debit = amount_at(&record, columns.debit);

        rows.push(LedgerRow {
            date,
            account_code,
            credit,
            debit,
            fields: record_fields(&headers, &record),
        });
    }

    debug!("Parsed {} ledger rows", rows.len());
    Ok(rows)
}

/// Load a general ledger CSV file
pub fn load_ledger(path: &Path) -> Result<Vec<LedgerRow>> {
    info!(path = %path.display(), "Loading general ledger");
    let file = File::open(path)
        .map_err(|e| Error::Import(format!("Failed to open {}: {}", path.display(), e)))?;
    let rows = parse_ledger_csv(file)?;
    info!(rows = rows.len(), "General ledger loaded");
    Ok(rows)
}

/// Flatten an arbitrary CSV into one "column: value | ..." line per row
pub fn flatten_csv<R: Read>(reader: R) -> Result<String> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut lines = Vec::new();

    for result in rdr.records() {
        let record = result?;
        let line = flatten_fields(&record_fields(&headers, &record));
        if !line.is_empty() {
            lines.push(line);
        }
    }

    Ok(lines.join("\n"))
}

/// Load the communications export as flattened text
pub fn load_communications(path: &Path) -> Result<String> {
    let file = File::open(path)
        .map_err(|e| Error::Import(format!("Failed to open {}: {}", path.display(), e)))?;
    let text = flatten_csv(file)?;
    info!(
        path = %path.display(),
        records = text.lines().count(),
        "Communications loaded"
    );
    Ok(text)
}

/// Normalize an account code for comparison
///
/// Trims whitespace and renders whole-number codes exported as floats
/// ("2000.0") in their integer form.
pub fn normalize_account_code(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some((whole, frac)) = trimmed.split_once('.') {
        if !whole.is_empty()
            && whole.chars().all(|c| c.is_ascii_digit())
            && !frac.is_empty()
            && frac.chars().all(|c| c == '0')
        {
            return whole.to_string();
        }
    }
    trimmed.to_string()
}

fn amount_at(record: &StringRecord, column: Option<usize>) -> Decimal {
    let Some(raw) = column.and_then(|i| record.get(i)) else {
        return Decimal::ZERO;
    };
    match parse_amount(raw) {
        Ok(amount) => amount,
        Err(e) => {
            warn!(error = %e, "Treating unparsable ledger amount as zero");
            Decimal::ZERO
        }
    }
}

/// Coerce a date cell in any of the formats spreadsheets commonly export
///
/// Bare numbers are read as spreadsheet serial days (1900 date system).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let date_formats = [
        "%Y-%m-%d", // 2024-08-15
        "%m/%d/%Y", // 08/15/2024
        "%m/%d/%y", // 08/15/24
        "%d-%b-%Y", // 15-Aug-2024
        "%Y/%m/%d", // 2024/08/15
    ];
    for fmt in date_formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S", // pandas export
        "%Y-%m-%dT%H:%M:%S", // ISO 8601
        "%Y-%m-%d %H:%M:%S%.f",
    ];
    for fmt in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    serial_date(s)
}

/// Spreadsheet serial day number (days since 1899-12-30)
fn serial_date(s: &str) -> Option<NaiveDate> {
    let days: f64 = s.parse().ok()?;
    if !(1.0..=2_958_465.0).contains(&days) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    epoch.checked_add_signed(Duration::days(days.trunc() as i64))
}

/// Parse an amount string, handling currency symbols and commas
pub fn parse_amount(s: &str) -> Result<Decimal> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }

    let cleaned: String = trimmed
        .replace(['$', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .map_err(|_| Error::Import(format!("Unable to parse amount: {}", s)))
}
