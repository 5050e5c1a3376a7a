use std::sync::Arc;

use log::{debug, info};

use crate::domain::{
    build_integrity_report, normalize_email, Account, AccountId, AccountType, Cents,
    IntegrityReport, Transaction, TransactionKind, User, UserId,
};
use crate::storage::{ApplyOutcome, Repository, SaveUserOutcome};

use super::{AppError, Argon2PasswordHasher, PasswordHasher};

/// Application service providing the banking operations.
/// Every account operation takes the caller's user id explicitly; the
/// service never reads identity from ambient state.
#[derive(Clone)]
pub struct BankService {
    repo: Repository,
    hasher: Arc<dyn PasswordHasher>,
}

impl BankService {
    /// Create a new service with the default password hasher.
    pub fn new(repo: Repository) -> Self {
        Self::with_hasher(repo, Arc::new(Argon2PasswordHasher::default()))
    }

    pub fn with_hasher(repo: Repository, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { repo, hasher }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    // ========================
    // Identity operations
    // ========================

    /// Register a new user. Emails are unique, compared case-insensitively.
    pub async fn register(
        &self,
        name: String,
        email: &str,
        password: &str,
    ) -> Result<User, AppError> {
        let email = normalize_email(email);
        if self.repo.get_user_by_email(&email).await?.is_some() {
            return Err(AppError::EmailTaken(email));
        }

        let user = User::new(name, &email, self.hasher.hash(password)?);
        if self.repo.save_user(&user).await? == SaveUserOutcome::EmailTaken {
            return Err(AppError::EmailTaken(email));
        }
        info!("registered user {}", user.id);
        Ok(user)
    }

    /// Resolve credentials to a user. Unknown emails and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self
            .repo
            .get_user_by_email(&normalize_email(email))
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        if !self.hasher.verify(password, &user.password_hash) {
            debug!("rejected credentials for user {}", user.id);
            return Err(AppError::InvalidCredentials);
        }
        Ok(user)
    }

    pub async fn get_user(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    // ========================
    // Account operations
    // ========================

    /// Open an account with a zero balance.
    pub async fn open_account(
        &self,
        owner: UserId,
        account_type: AccountType,
    ) -> Result<Account, AppError> {
        let user = self.get_user(owner).await?;

        let account = Account::open(user.id, account_type);
        self.repo.save_account(&account).await?;
        info!("opened {} account {} for user {}", account_type, account.id, owner);
        Ok(account)
    }

    /// List the caller's accounts, oldest first.
    pub async fn list_accounts(&self, caller: UserId) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts_for_user(caller).await?)
    }

    /// Get one of the caller's accounts.
    pub async fn get_account(
        &self,
        account_id: AccountId,
        caller: UserId,
    ) -> Result<Account, AppError> {
        let account = self
            .repo
            .get_account(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))?;
        ensure_owner(&account, caller)?;
        Ok(account)
    }

    /// Deposit into one of the caller's accounts.
    pub async fn deposit(
        &self,
        account_id: AccountId,
        caller: UserId,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        self.apply(
            account_id,
            caller,
            TransactionKind::Deposit,
            amount_cents,
            description,
        )
        .await
    }

    /// Withdraw from one of the caller's accounts. Never overdraws, even when
    /// several withdrawals race on the same account.
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        caller: UserId,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        self.apply(
            account_id,
            caller,
            TransactionKind::Withdraw,
            amount_cents,
            description,
        )
        .await
    }

    async fn apply(
        &self,
        account_id: AccountId,
        caller: UserId,
        kind: TransactionKind,
        amount_cents: Cents,
        description: Option<String>,
    ) -> Result<Transaction, AppError> {
        if amount_cents <= 0 {
            debug!("rejected {} of {} cents on {}", kind, amount_cents, account_id);
            return Err(AppError::InvalidAmount(amount_cents));
        }

        let account = self.get_account(account_id, caller).await?;

        let mut transaction = Transaction::new(account.id, kind, amount_cents)
            .with_description(description.unwrap_or_else(|| kind.label().to_string()));

        match self.repo.apply_transaction(&mut transaction).await? {
            ApplyOutcome::Applied { balance } => {
                info!(
                    "{} of {} cents on account {} (balance now {})",
                    kind, amount_cents, account_id, balance
                );
                Ok(transaction)
            }
            ApplyOutcome::Rejected { balance } => {
                debug!(
                    "rejected {} of {} cents on {}: balance {}",
                    kind, amount_cents, account_id, balance
                );
                Err(AppError::InsufficientFunds {
                    account_id,
                    balance,
                    requested: amount_cents,
                })
            }
            ApplyOutcome::LimitExceeded { balance } => {
                debug!(
                    "rejected {} of {} cents on {}: balance {} at limit",
                    kind, amount_cents, account_id, balance
                );
                Err(AppError::BalanceLimitExceeded {
                    account_id,
                    balance,
                    requested: amount_cents,
                })
            }
            ApplyOutcome::Missing => Err(AppError::AccountNotFound(account_id)),
        }
    }

    // ========================
    // Integrity operations
    // ========================

    /// Verify that every stored balance equals the signed sum of its ledger.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let stats = self.repo.get_integrity_stats().await?;
        let accounts = self.repo.list_accounts().await?;
        let sums = self.repo.ledger_sums().await?;

        Ok(build_integrity_report(&accounts, &sums, &stats))
    }
}

pub(super) fn ensure_owner(account: &Account, caller: UserId) -> Result<(), AppError> {
    if account.is_owned_by(caller) {
        Ok(())
    } else {
        debug!("user {} denied access to account {}", caller, account.id);
        Err(AppError::Forbidden(account.id))
    }
}
