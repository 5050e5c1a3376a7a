use std::collections::HashMap;

use super::{Account, AccountId, Cents, Transaction};

/// Fold a ledger into a balance: deposits add, withdrawals subtract.
pub fn ledger_balance(transactions: &[Transaction]) -> Cents {
    transactions.iter().map(Transaction::signed_amount).sum()
}

/// An account whose stored balance disagrees with its ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub account_id: AccountId,
    pub stored: Cents,
    pub ledger: Cents,
}

/// Counters gathered from the store for the integrity check.
#[derive(Debug, Clone, Default)]
pub struct IntegrityStats {
    pub user_count: i64,
    pub account_count: i64,
    pub transaction_count: i64,
    pub orphaned_accounts: i64,
    pub orphaned_transactions: i64,
    pub invalid_amounts: i64,
}

#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub user_count: i64,
    pub account_count: i64,
    pub transaction_count: i64,
    pub mismatches: Vec<BalanceMismatch>,
    pub negative_balances: Vec<AccountId>,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare every account's stored balance with the signed sum of its ledger.
/// Accounts missing from `ledger_sums` have an empty ledger.
pub fn build_integrity_report(
    accounts: &[Account],
    ledger_sums: &HashMap<AccountId, Cents>,
    stats: &IntegrityStats,
) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut mismatches = Vec::new();
    let mut negative_balances = Vec::new();

    for account in accounts {
        let ledger = ledger_sums.get(&account.id).copied().unwrap_or(0);
        if ledger != account.balance {
            issues.push(format!(
                "Account {} balance {} does not match ledger sum {}",
                account.id,
                super::format_cents(account.balance),
                super::format_cents(ledger)
            ));
            mismatches.push(BalanceMismatch {
                account_id: account.id,
                stored: account.balance,
                ledger,
            });
        }
        if account.balance < 0 {
            issues.push(format!(
                "Account {} is overdrawn: {}",
                account.id,
                super::format_cents(account.balance)
            ));
            negative_balances.push(account.id);
        }
    }

    if stats.orphaned_accounts > 0 {
        issues.push(format!(
            "{} account(s) reference a missing user",
            stats.orphaned_accounts
        ));
    }
    if stats.orphaned_transactions > 0 {
        issues.push(format!(
            "{} transaction(s) reference a missing account",
            stats.orphaned_transactions
        ));
    }
    if stats.invalid_amounts > 0 {
        issues.push(format!(
            "{} transaction(s) have a non-positive amount",
            stats.invalid_amounts
        ));
    }

    IntegrityReport {
        user_count: stats.user_count,
        account_count: stats.account_count,
        transaction_count: stats.transaction_count,
        mismatches,
        negative_balances,
        issues,
    }
}
