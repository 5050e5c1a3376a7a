use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(TransactionKind::Deposit),
            "withdraw" => Some(TransactionKind::Withdraw),
            _ => None,
        }
    }

    /// Description recorded when the caller does not supply one.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "Deposit",
            TransactionKind::Withdraw => "Withdrawal",
        }
    }

    /// Sign applied to the amount when folding the ledger into a balance.
    pub fn sign(&self) -> Cents {
        match self {
            TransactionKind::Deposit => 1,
            TransactionKind::Withdraw => -1,
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable ledger entry. Transactions are only created by a successful
/// balance mutation and are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Store-assigned, strictly increasing; breaks ties between equal timestamps
    pub sequence: i64,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    /// Always positive; the direction comes from `kind`
    pub amount_cents: Cents,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a pending transaction. The sequence number is assigned by the repository.
    pub fn new(account_id: AccountId, kind: TransactionKind, amount_cents: Cents) -> Self {
        assert!(amount_cents > 0, "Transaction amount must be positive");
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            account_id,
            kind,
            amount_cents,
            description: None,
            occurred_at: super::now(),
        }
    }

    pub fn deposit(account_id: AccountId, amount_cents: Cents) -> Self {
        Self::new(account_id, TransactionKind::Deposit, amount_cents)
    }

    pub fn withdrawal(account_id: AccountId, amount_cents: Cents) -> Self {
        Self::new(account_id, TransactionKind::Withdraw, amount_cents)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Amount with the kind's sign applied: deposits positive, withdrawals negative.
    pub fn signed_amount(&self) -> Cents {
        self.kind.sign() * self.amount_cents
    }
}
