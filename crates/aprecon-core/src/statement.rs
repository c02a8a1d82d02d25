//! Supplier statement discovery and closing-balance extraction
//!
//! The extractor is an ordered list of tiers. Each tier is a pure function
//! from document text to an optional amount; the first tier that finds one
//! wins, and the caller-supplied fallback is used when none does.
//!
//! 1. Labeled line: bottom-up scan for lines mentioning "balance" or "total",
//!    taking the right-most numeric token on the line.
//! 2. Contextual numeric: top-down scan for lines with a currency marker or
//!    "balance" plus a digit, taking the last numeric token on the line.
//! 3. Fallback: the configured constant.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use regex::Regex;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{ExtractedTotal, Provenance};

/// Currency symbols that mark a line as carrying an amount
const CURRENCY_MARKERS: [char; 4] = ['$', '€', '£', '¥'];

/// Number of document lines kept as the audit preview
const PREVIEW_LINES: usize = 20;

type Tier = fn(&str) -> Option<Decimal>;

/// Extraction tiers in priority order
const TIERS: [(Provenance, Tier); 2] = [
    (Provenance::LabeledLine, labeled_line_total),
    (Provenance::ContextualNumeric, contextual_numeric_total),
];

/// Extract a statement total, never failing
pub fn extract_total(document_text: &str, fallback: Decimal) -> Decimal {
    extract_total_with_provenance(Some(document_text), fallback).amount
}

/// Extract a statement total and report which tier produced it
///
/// `None` text means the document could not be read at all.
pub fn extract_total_with_provenance(
    document_text: Option<&str>,
    fallback: Decimal,
) -> ExtractedTotal {
    if let Some(text) = document_text {
        for (provenance, tier) in TIERS {
            if let Some(amount) = tier(text) {
                info!(%amount, tier = %provenance, "Statement total found");
                return ExtractedTotal { amount, provenance };
            }
        }
        warn!(%fallback, "No statement total found in document text, using fallback");
    } else {
        warn!(%fallback, "Statement text unavailable, using fallback");
    }

    ExtractedTotal {
        amount: fallback,
        provenance: Provenance::Fallback,
    }
}

/// Tier 1: trailing amount on the last "balance"/"total" line
pub fn labeled_line_total(text: &str) -> Option<Decimal> {
    for line in text.lines().rev() {
        let lower = line.to_lowercase();
        if !(lower.contains("balance") || lower.contains("total")) {
            continue;
        }

        if let Some(amount) = line.split_whitespace().rev().find_map(parse_amount_token) {
            debug!(line = line.trim(), %amount, "Total from labeled line");
            return Some(amount);
        }
    }
    None
}

/// Tier 2: last amount on the first line with a currency marker or "balance"
pub fn contextual_numeric_total(text: &str) -> Option<Decimal> {
    for line in text.lines() {
        let has_marker = line.contains(CURRENCY_MARKERS.as_slice())
            || line.to_lowercase().contains("balance");
        if !has_marker || !line.chars().any(|c| c.is_ascii_digit()) {
            continue;
        }

        if let Some(amount) = line.split_whitespace().filter_map(parse_amount_token).last() {
            debug!(line = line.trim(), %amount, "Total from contextual line");
            return Some(amount);
        }
    }
    None
}

/// Clean a whitespace token down to an amount
///
/// Keeps only digits, '.' and ',', drops grouping commas, and accepts the
/// result only if it is digits with at most one decimal point.
pub fn parse_amount_token(token: &str) -> Option<Decimal> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.matches('.').count() > 1 || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.starts_with('.'), cleaned.ends_with('.')) {
        (true, _) => format!("0{}", cleaned),
        (false, true) => cleaned.trim_end_matches('.').to_string(),
        (false, false) => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Find the first statement document in `dir` whose file name matches `pattern`
///
/// The pattern supports `*` (any run) and `?` (any single character).
/// Matches are sorted by file name so discovery is deterministic.
pub fn find_statement(dir: &Path, pattern: &str) -> Result<PathBuf> {
    info!(dir = %dir.display(), pattern, "Locating supplier statement");
    let re = wildcard_regex(pattern)?;

    let entries = fs::read_dir(dir).map_err(|e| {
        Error::NotFound(format!(
            "Statement directory {} unreadable: {}",
            dir.display(),
            e
        ))
    })?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| re.is_match(name))
        })
        .collect();
    matches.sort();

    debug!(count = matches.len(), "Statement candidates");

    matches.into_iter().next().ok_or_else(|| {
        Error::NotFound(format!(
            "No statement matching '{}' found in {}",
            pattern,
            dir.display()
        ))
    })
}

/// Compile a shell-style wildcard into an anchored, case-sensitive regex
pub fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
        }
    }
    expr.push('$');
    Ok(Regex::new(&expr)?)
}

/// Whole-name wildcard match; an uncompilable pattern matches nothing
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    wildcard_regex(pattern).is_ok_and(|re| re.is_match(name))
}

/// Read the text of a statement document
///
/// PDFs go through `pdf_extract`; anything else is read as UTF-8 text.
pub fn read_document_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));

    let text = if is_pdf {
        pdf_extract::extract_text(path)
            .map_err(|e| Error::Document(format!("{}: {}", path.display(), e)))?
    } else {
        fs::read_to_string(path)?
    };

    debug!(
        chars = text.len(),
        preview = %text.chars().take(200).collect::<String>(),
        "Extracted statement text"
    );
    Ok(text)
}

/// A located statement with its (possibly unavailable) text
#[derive(Debug, Clone)]
pub struct StatementDocument {
    pub path: PathBuf,
    /// None when text extraction failed
    pub text: Option<String>,
    /// SHA-256 of the file bytes, when the file could be read
    pub sha256: Option<String>,
}

impl StatementDocument {
    /// Open a statement, absorbing text extraction failures
    pub fn open(path: &Path) -> Self {
        let text = match read_document_text(path) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(error = %e, "Could not extract text from statement");
                None
            }
        };

        let sha256 = fs::read(path).ok().map(|bytes| {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            hex::encode(hasher.finalize())
        });

        Self {
            path: path.to_path_buf(),
            text,
            sha256,
        }
    }

    /// Extract the total using the configured fallback
    pub fn extract_total(&self, fallback: Decimal) -> ExtractedTotal {
        extract_total_with_provenance(self.text.as_deref(), fallback)
    }

    /// First lines of the text, for the audit attachment
    pub fn preview(&self) -> String {
        self.text
            .as_deref()
            .map(|t| t.lines().take(PREVIEW_LINES).collect::<Vec<_>>().join("\n"))
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn fallback() -> Decimal {
        dec("125000.00")
    }

    #[test]
    fn test_labeled_total_balance_due() {
        let text = "Acme Supplies\nInvoice 1001  $500.00\nTotal Balance Due: $1,234.56\n";
        assert_eq!(extract_total(text, fallback()), dec("1234.56"));
    }

    #[test]
    fn test_labeled_prefers_bottom_line() {
        let text = "Opening balance 10,000.00\nPurchases 2,500.00\nClosing balance 12,500.00";
        let total = extract_total_with_provenance(Some(text), fallback());
        assert_eq!(total.amount, dec("12500.00"));
        assert_eq!(total.provenance, Provenance::LabeledLine);
    }

    #[test]
    fn test_labeled_takes_rightmost_token() {
        let text = "TOTAL 3 invoices 4,200.00";
        assert_eq!(labeled_line_total(text), Some(dec("4200.00")));
    }

    #[test]
    fn test_labeled_skips_lines_without_amount() {
        let text = "Balance forward 900.00\nTotal due upon receipt";
        assert_eq!(labeled_line_total(text), Some(dec("900.00")));
    }

    #[test]
    fn test_contextual_tier() {
        let text = "Statement for September\nAccount 2000\n$950.00 remaining\n";
        let total = extract_total_with_provenance(Some(text), fallback());
        assert_eq!(total.amount, dec("950.00"));
        assert_eq!(total.provenance, Provenance::ContextualNumeric);
    }

    #[test]
    fn test_contextual_takes_last_number_on_line() {
        let text = "Qty 4 @ $25.00 = $100.00";
        assert_eq!(contextual_numeric_total(text), Some(dec("100.00")));
    }

    #[test]
    fn test_contextual_uses_first_qualifying_line() {
        let text = "$10.00 first\n$20.00 second";
        assert_eq!(contextual_numeric_total(text), Some(dec("10.00")));
    }

    #[test]
    fn test_fallback_when_nothing_matches() {
        let text = "Thank you for your business.\nNo figures here.";
        let total = extract_total_with_provenance(Some(text), fallback());
        assert_eq!(total.amount, fallback());
        assert_eq!(total.provenance, Provenance::Fallback);
    }

    #[test]
    fn test_fallback_when_unreadable() {
        let total = extract_total_with_provenance(None, fallback());
        assert_eq!(total.amount, fallback());
        assert_eq!(total.provenance, Provenance::Fallback);
        assert_eq!(extract_total("", fallback()), fallback());
    }

    #[test]
    fn test_parse_amount_token() {
        assert_eq!(parse_amount_token("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount_token("1500"), Some(dec("1500")));
        assert_eq!(parse_amount_token("USD"), None);
        assert_eq!(parse_amount_token("."), None);
        assert_eq!(parse_amount_token("1.2.3"), None);
        assert_eq!(parse_amount_token("5."), Some(dec("5")));
        assert_eq!(parse_amount_token(".75"), Some(dec("0.75")));
    }

    #[test]
    fn test_multi_dot_token_not_coerced() {
        // The version string is rejected, so the earlier amount wins
        let text = "Total 800.00 v1.2.3";
        assert_eq!(labeled_line_total(text), Some(dec("800.00")));
    }

    #[test]
    fn test_wildcard_match() {
        let pattern = "*supplier_statement_custom*.pdf";
        assert!(wildcard_match(pattern, "2024-09_supplier_statement_custom_acme.pdf"));
        assert!(wildcard_match(pattern, "supplier_statement_custom.pdf"));
        assert!(!wildcard_match(pattern, "supplier_statement_custom.txt"));
        assert!(!wildcard_match(pattern, "invoice.pdf"));
        assert!(wildcard_match("stmt_??.txt", "stmt_09.txt"));
        assert!(!wildcard_match("stmt_??.txt", "stmt_9.txt"));
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        assert!(wildcard_match("acme (v2)+[final].pdf", "acme (v2)+[final].pdf"));
        assert!(!wildcard_match("acme.pdf", "acmexpdf"));
        assert!(wildcard_match("*.PDF", "STATEMENT.PDF"));
        assert!(!wildcard_match("*.PDF", "statement.pdf"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn test_find_statement_picks_first_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b_statement.txt", "a_statement.txt", "notes.md"] {
            fs::write(dir.path().join(name), "Total 1.00").unwrap();
        }

        let found = find_statement(dir.path(), "*statement*.txt").unwrap();
        assert_eq!(found.file_name().unwrap(), "a_statement.txt");
    }

    #[test]
    fn test_find_statement_no_match_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = find_statement(dir.path(), "*statement*.pdf").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_statement_document_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statement.txt");
        let mut f = fs::File::create(&path).unwrap();
        writeln!(f, "Acme Supplies").unwrap();
        writeln!(f, "Closing Balance $42,000.00").unwrap();

        let doc = StatementDocument::open(&path);
        assert!(doc.text.is_some());
        assert_eq!(doc.sha256.as_ref().map(|h| h.len()), Some(64));
        assert_eq!(doc.extract_total(fallback()).amount, dec("42000.00"));
        assert!(doc.preview().starts_with("Acme Supplies"));
    }

    #[test]
    fn test_statement_document_bad_pdf_falls_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("statement.pdf");
        fs::write(&path, b"not really a pdf").unwrap();

        let doc = StatementDocument::open(&path);
        assert!(doc.text.is_none());
        let total = doc.extract_total(fallback());
        assert_eq!(total.provenance, Provenance::Fallback);
        assert_eq!(total.amount, fallback());
    }
}
