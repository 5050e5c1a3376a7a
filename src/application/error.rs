use thiserror::Error;

use crate::domain::{format_cents, AccountId, Cents};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid amount: {} (must be greater than zero)", money(.0))]
    InvalidAmount(Cents),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Access denied to account {0}")]
    Forbidden(AccountId),

    #[error("Insufficient funds in account {account_id}: balance {}, requested {}", money(.balance), money(.requested))]
    InsufficientFunds {
        account_id: AccountId,
        balance: Cents,
        requested: Cents,
    },

    #[error("Deposit into account {account_id} exceeds the balance limit: balance {}, requested {}", money(.balance), money(.requested))]
    BalanceLimitExceeded {
        account_id: AccountId,
        balance: Cents,
        requested: Cents,
    },

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Database error: {0}")]
    Store(#[source] anyhow::Error),
}

/// Every store failure passes through here on its way out of the service, so
/// it is logged once with its full context chain.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        log::error!("store failure: {:#}", err);
        AppError::Store(err)
    }
}

fn money(cents: &Cents) -> String {
    format_cents(*cents)
}

impl AppError {
    /// True for failures of the storage layer rather than of the request.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, AppError::Store(_))
    }

    /// Message suitable for showing to the person who made the request.
    /// Store failures are reduced to a generic message; the details were
    /// logged when the error was created.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidAmount(_) => "Amount must be greater than zero.".to_string(),
            AppError::AccountNotFound(_) => "Account not found.".to_string(),
            AppError::UserNotFound(_) => "User not found.".to_string(),
            AppError::Forbidden(_) => "Access denied.".to_string(),
            AppError::InsufficientFunds { balance, .. } => format!(
                "Insufficient funds: available balance is {}.",
                format_cents(*balance)
            ),
            AppError::BalanceLimitExceeded { .. } => {
                "Deposit rejected: the account cannot hold a larger balance.".to_string()
            }
            AppError::EmailTaken(_) => "Email already registered.".to_string(),
            AppError::InvalidCredentials => "Incorrect email or password.".to_string(),
            AppError::Store(_) => {
                "Something went wrong while processing the request. No changes were made."
                    .to_string()
            }
        }
    }
}
