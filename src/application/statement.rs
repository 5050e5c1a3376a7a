use serde::{Deserialize, Serialize};

use crate::domain::{ledger_balance, Account, AccountId, Transaction, UserId};

use super::service::ensure_owner;
use super::{AppError, BankService};

/// An account together with its full ledger, most recent entry first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub account: Account,
    pub transactions: Vec<Transaction>,
}

impl Statement {
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// The most recent entry, if any.
    pub fn latest(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Balance recomputed from the listed entries.
    pub fn ledger_balance(&self) -> crate::domain::Cents {
        ledger_balance(&self.transactions)
    }
}

impl BankService {
    /// Read-only history of one of the caller's accounts.
    pub async fn get_statement(
        &self,
        account_id: AccountId,
        caller: UserId,
    ) -> Result<Statement, AppError> {
        let (account, transactions) = self
            .repository()
            .get_account_with_ledger(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))?;
        ensure_owner(&account, caller)?;

        Ok(Statement {
            account,
            transactions,
        })
    }
}
