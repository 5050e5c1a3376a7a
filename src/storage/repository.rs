use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, Cents, IntegrityStats, Transaction, TransactionKind, User,
    UserId,
};

use super::MIGRATION_001_INITIAL;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of applying a transaction to an account's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Balance updated and ledger entry appended; carries the new balance.
    Applied { balance: Cents },
    /// The write would have overdrawn the account; nothing was changed.
    Rejected { balance: Cents },
    /// The write would have pushed the balance past `Cents::MAX`; nothing was
    /// changed.
    LimitExceeded { balance: Cents },
    /// The account does not exist.
    Missing,
}

/// Result of inserting a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveUserOutcome {
    Saved,
    /// Another user already holds this email.
    EmailTaken,
}

/// Repository for persisting and querying users, accounts and their ledgers.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL, e.g. `sqlite:bank.db?mode=rwc`.
    /// Foreign keys are enforced on every pooled connection, and writers wait
    /// up to `BUSY_TIMEOUT` for each other instead of failing immediately.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Insert a user. The email's UNIQUE constraint is the arbiter between
    /// concurrent registrations, so a violation is reported as an outcome.
    pub async fn save_user(&self, user: &User) -> Result<SaveUserOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(encode_timestamp(user.created_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(SaveUserOutcome::Saved),
            Err(sqlx::Error::Database(err))
                if err.is_unique_violation() && err.message().contains("users.email") =>
            {
                Ok(SaveUserOutcome::EmailTaken)
            }
            Err(err) => Err(err).context("Failed to save user"),
        }
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Look up a user by an already normalized email.
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, email, password_hash, created_at
            FROM users
            WHERE email = ?
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by email")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            name: row.get("name"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            created_at: decode_timestamp(&created_at_str).context("Invalid created_at")?,
        })
    }

    // ========================
    // Account operations
    // ========================

    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, account_type, balance_cents, user_id, opened_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(account.account_type.as_str())
        .bind(account.balance)
        .bind(account.owner.to_string())
        .bind(encode_timestamp(account.opened_at))
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT id, account_type, balance_cents, user_id, opened_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// List a user's accounts, oldest first.
    pub async fn list_accounts_for_user(&self, owner: UserId) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_type, balance_cents, user_id, opened_at
            FROM accounts
            WHERE user_id = ?
            ORDER BY opened_at, id
            "#,
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts for user")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_type, balance_cents, user_id, opened_at
            FROM accounts
            ORDER BY opened_at, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(Self::row_to_account).collect()
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let id_str: String = row.get("id");
        let owner_str: String = row.get("user_id");
        let type_str: String = row.get("account_type");
        let opened_at_str: String = row.get("opened_at");

        Ok(Account {
            id: Uuid::parse_str(&id_str).context("Invalid account ID")?,
            owner: Uuid::parse_str(&owner_str).context("Invalid account owner ID")?,
            account_type: AccountType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid account type: {}", type_str))?,
            balance: row.get("balance_cents"),
            opened_at: decode_timestamp(&opened_at_str).context("Invalid opened_at")?,
        })
    }

    // ========================
    // Ledger operations
    // ========================

    /// Apply a transaction's signed amount to its account and append it to the
    /// ledger, as one database transaction.
    ///
    /// The overdraft bound and the `Cents::MAX` ceiling are part of the
    /// `UPDATE` itself, so the check and the write cannot be separated by a
    /// concurrent writer. SQLite promotes an overflowing integer sum to REAL,
    /// so the ceiling is compared against the stored balance, never the sum.
    /// On success the store-assigned sequence number is written back into
    /// `transaction`.
    /// Any early return drops the uncommitted transaction, which rolls it back.
    pub async fn apply_transaction(&self, transaction: &mut Transaction) -> Result<ApplyOutcome> {
        let delta = transaction.signed_amount();
        let ceiling = Cents::MAX - delta.max(0);
        let account_id = transaction.account_id.to_string();

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin ledger transaction")?;

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET balance_cents = balance_cents + ?
            WHERE id = ? AND balance_cents <= ? AND balance_cents + ? >= 0
            RETURNING balance_cents
            "#,
        )
        .bind(delta)
        .bind(&account_id)
        .bind(ceiling)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to update account balance")?;

        let balance: Cents = match updated {
            Some(row) => row
                .try_get("balance_cents")
                .context("Invalid updated balance")?,
            None => {
                let current = sqlx::query("SELECT balance_cents FROM accounts WHERE id = ?")
                    .bind(&account_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .context("Failed to read account balance")?;
                tx.rollback()
                    .await
                    .context("Failed to roll back ledger transaction")?;

                let Some(row) = current else {
                    return Ok(ApplyOutcome::Missing);
                };
                let balance: Cents = row
                    .try_get("balance_cents")
                    .context("Invalid account balance")?;
                return Ok(if delta > 0 {
                    ApplyOutcome::LimitExceeded { balance }
                } else {
                    ApplyOutcome::Rejected { balance }
                });
            }
        };

        let row = sqlx::query(
            r#"
            INSERT INTO transactions (id, kind, amount_cents, description, occurred_at, account_id)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING sequence
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.kind.as_str())
        .bind(transaction.amount_cents)
        .bind(&transaction.description)
        .bind(encode_timestamp(transaction.occurred_at))
        .bind(&account_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to append ledger entry")?;

        tx.commit()
            .await
            .context("Failed to commit ledger transaction")?;

        transaction.sequence = row.try_get("sequence").context("Invalid sequence")?;
        Ok(ApplyOutcome::Applied { balance })
    }

    /// List an account's ledger, most recent first.
    pub async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, kind, amount_cents, description, occurred_at, account_id
            FROM transactions
            WHERE account_id = ?
            ORDER BY occurred_at DESC, sequence DESC
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list transactions for account")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Read an account and its ledger (most recent first) from one snapshot,
    /// so the balance shown always matches the entries listed.
    pub async fn get_account_with_ledger(
        &self,
        account_id: AccountId,
    ) -> Result<Option<(Account, Vec<Transaction>)>> {
        let id = account_id.to_string();
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin statement read")?;

        let account_row = sqlx::query(
            r#"
            SELECT id, account_type, balance_cents, user_id, opened_at
            FROM accounts
            WHERE id = ?
            "#,
        )
        .bind(&id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch account")?;

        let Some(account_row) = account_row else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT sequence, id, kind, amount_cents, description, occurred_at, account_id
            FROM transactions
            WHERE account_id = ?
            ORDER BY occurred_at DESC, sequence DESC
            "#,
        )
        .bind(&id)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list transactions for account")?;

        tx.commit().await.context("Failed to end statement read")?;

        let account = Self::row_to_account(&account_row)?;
        let transactions = rows
            .iter()
            .map(Self::row_to_transaction)
            .collect::<Result<Vec<_>>>()?;
        Ok(Some((account, transactions)))
    }

    /// Signed sum of an account's ledger, computed in SQL.
    pub async fn ledger_sum(&self, account_id: AccountId) -> Result<Cents> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(CASE WHEN kind = 'deposit' THEN amount_cents ELSE -amount_cents END), 0) AS total
            FROM transactions
            WHERE account_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to sum ledger")?;

        Ok(row.get("total"))
    }

    /// Signed ledger sums for every account with at least one transaction.
    pub async fn ledger_sums(&self) -> Result<HashMap<AccountId, Cents>> {
        let rows = sqlx::query(
            r#"
            SELECT
                account_id,
                SUM(CASE WHEN kind = 'deposit' THEN amount_cents ELSE -amount_cents END) AS total
            FROM transactions
            GROUP BY account_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum ledgers")?;

        let mut sums = HashMap::new();
        for row in rows {
            let account_id_str: String = row.get("account_id");
            let account_id = Uuid::parse_str(&account_id_str).context("Invalid account ID")?;
            sums.insert(account_id, row.get("total"));
        }
        Ok(sums)
    }

    /// Gather counters for the integrity check.
    pub async fn get_integrity_stats(&self) -> Result<IntegrityStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users) AS user_count,
                (SELECT COUNT(*) FROM accounts) AS account_count,
                (SELECT COUNT(*) FROM transactions) AS transaction_count,
                (SELECT COUNT(*) FROM accounts a
                    WHERE NOT EXISTS (SELECT 1 FROM users u WHERE u.id = a.user_id)) AS orphaned_accounts,
                (SELECT COUNT(*) FROM transactions t
                    WHERE NOT EXISTS (SELECT 1 FROM accounts a WHERE a.id = t.account_id)) AS orphaned_transactions,
                (SELECT COUNT(*) FROM transactions WHERE amount_cents <= 0) AS invalid_amounts
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to gather integrity stats")?;

        Ok(IntegrityStats {
            user_count: row.get("user_count"),
            account_count: row.get("account_count"),
            transaction_count: row.get("transaction_count"),
            orphaned_accounts: row.get("orphaned_accounts"),
            orphaned_transactions: row.get("orphaned_transactions"),
            invalid_amounts: row.get("invalid_amounts"),
        })
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let account_id_str: String = row.get("account_id");
        let kind_str: String = row.get("kind");
        let occurred_at_str: String = row.get("occurred_at");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            account_id: Uuid::parse_str(&account_id_str).context("Invalid account ID")?,
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            amount_cents: row.get("amount_cents"),
            description: row.get("description"),
            occurred_at: decode_timestamp(&occurred_at_str).context("Invalid occurred_at")?,
        })
    }
}

/// Timestamps are stored fixed-width so that text order matches time order.
fn encode_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
