use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, UserId};

pub type AccountId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Everyday spending account
    Checking,
    /// Savings account
    Savings,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
        }
    }

    /// Accepts the canonical names plus the legacy `corrente` / `poupanca` tags.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "checking" | "corrente" => Some(AccountType::Checking),
            "savings" | "poupanca" | "poupança" => Some(AccountType::Savings),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bank account. `balance` is a cached projection of the account's ledger
/// and is only ever changed together with a ledger append.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner: UserId,
    pub account_type: AccountType,
    pub balance: Cents,
    pub opened_at: DateTime<Utc>,
}

impl Account {
    pub fn open(owner: UserId, account_type: AccountType) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            account_type,
            balance: 0,
            opened_at: super::now(),
        }
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }
}
