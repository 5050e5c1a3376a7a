// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use minibank::application::{Argon2PasswordHasher, BankService};
use minibank::domain::{Account, AccountType, Cents, User};
use minibank::storage::Repository;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database.
/// Passwords are hashed with deliberately cheap Argon2 parameters.
pub async fn test_service() -> Result<(BankService, TempDir)> {
    let (repo, temp_dir) = test_repository().await?;
    let hasher = Argon2PasswordHasher::with_params(1024, 1, 1)?;
    let service = BankService::with_hasher(repo, Arc::new(hasher));
    Ok((service, temp_dir))
}

/// Helper to create a bare repository with a temporary database
pub async fn test_repository() -> Result<(Repository, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let repo = Repository::init(&format!("sqlite:{}?mode=rwc", db_path.display())).await?;
    Ok((repo, temp_dir))
}

pub const PASSWORD: &str = "correct horse battery staple";

/// Test fixture: registered customers with accounts
pub struct Customers;

impl Customers {
    /// Register a user with the shared test password
    pub async fn register(service: &BankService, name: &str) -> Result<User> {
        let email = format!("{}@example.com", name.to_lowercase());
        Ok(service.register(name.into(), &email, PASSWORD).await?)
    }

    /// Register a user and open a checking account for them
    pub async fn with_checking(service: &BankService, name: &str) -> Result<(User, Account)> {
        let user = Self::register(service, name).await?;
        let account = service.open_account(user.id, AccountType::Checking).await?;
        Ok((user, account))
    }

    /// Register a user and open a checking account holding `balance`
    pub async fn with_balance(
        service: &BankService,
        name: &str,
        balance: Cents,
    ) -> Result<(User, Account)> {
        let (user, account) = Self::with_checking(service, name).await?;
        service
            .deposit(account.id, user.id, balance, Some("Opening deposit".into()))
            .await?;
        let account = service.get_account(account.id, user.id).await?;
        Ok((user, account))
    }
}
