//! General ledger aggregation for a single AP account

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::import::normalize_account_code;
use crate::models::{LedgerRow, MovementResult, PeriodBalance, YearMonth};

/// Balances for two periods of one account
#[derive(Debug, Clone, Serialize)]
pub struct LedgerAggregate {
    pub account_code: String,
    pub prior: PeriodBalance,
    pub current: PeriodBalance,
    pub movement: MovementResult,
    /// Rows matching the account, dated or not
    pub matched_rows: usize,
    /// Matching rows excluded from period assignment for lack of a date
    pub undated_rows: usize,
}

/// Compute per-period balances (credit - debit) and the movement between them
///
/// Order-independent: only sums are taken.
pub fn aggregate(
    rows: &[LedgerRow],
    account_code: &str,
    prior_period: YearMonth,
    current_period: YearMonth,
) -> LedgerAggregate {
    let target = normalize_account_code(account_code);

    let mut prior = Decimal::ZERO;
    let mut current = Decimal::ZERO;
    let mut matched_rows = 0;
    let mut undated_rows = 0;

    for row in rows
        .iter()
        .filter(|r| normalize_account_code(&r.account_code) == target)
    {
        matched_rows += 1;

        let Some(date) = row.date else {
            undated_rows += 1;
            continue;
        };

        let balance = if prior_period.contains(date) {
            &mut prior
        } else if current_period.contains(date) {
            &mut current
        } else {
            continue;
        };

        match row.net().and_then(|net| balance.checked_add(net)) {
            Some(total) => *balance = total,
            None => warn!(
                %date,
                credit = %row.credit,
                debit = %row.debit,
                "Ledger amount out of range, row excluded from period balance"
            ),
        }
    }

    if undated_rows > 0 {
        warn!(
            undated_rows,
            account = %target,
            "Ledger rows with unparsable dates excluded from period balances"
        );
    }

    let movement = MovementResult::between(prior, current);

    info!(
        account = %target,
        rows = matched_rows,
        prior = %prior,
        current = %current,
        movement = %movement.delta,
        "Ledger balances computed"
    );

    LedgerAggregate {
        account_code: target,
        prior: PeriodBalance {
            period: prior_period,
            net: prior,
        },
        current: PeriodBalance {
            period: current_period,
            net: current,
        },
        movement,
        matched_rows,
        undated_rows,
    }
}

/// Rows for `account_code` dated within `period`
pub fn period_entries<'a>(
    rows: &'a [LedgerRow],
    account_code: &str,
    period: YearMonth,
) -> Vec<&'a LedgerRow> {
    let target = normalize_account_code(account_code);
    rows.iter()
        .filter(|r| normalize_account_code(&r.account_code) == target)
        .filter(|r| r.date.is_some_and(|d| period.contains(d)))
        .collect()
}
