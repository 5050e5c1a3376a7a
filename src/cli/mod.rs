use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{AppError, BankService, Statement};
use crate::domain::{format_cents, parse_cents, AccountId, AccountType, UserId};

/// minibank - personal banking ledger
#[derive(Parser)]
#[command(name = "minibank")]
#[command(about = "Open accounts, deposit, withdraw and read statements")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "MINIBANK_DATABASE", default_value = "minibank.db")]
    pub database: String,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Email of the user performing the command
    #[arg(long, env = "MINIBANK_EMAIL", global = true)]
    pub email: Option<String>,

    /// Password of the user performing the command
    #[arg(long, env = "MINIBANK_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a new user with --email and --password
    Register {
        /// Display name
        #[arg(long)]
        name: String,
    },

    /// Account management commands
    #[command(subcommand)]
    Account(AccountCommands),

    /// Deposit into one of your accounts
    Deposit {
        /// Account ID
        account: String,

        /// Amount (e.g., "100.00" or "100")
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Description recorded on the statement
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Withdraw from one of your accounts
    Withdraw {
        /// Account ID
        account: String,

        /// Amount (e.g., "60.00" or "60")
        #[arg(allow_hyphen_values = true)]
        amount: String,

        /// Description recorded on the statement
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Show an account's transaction history, most recent first
    Statement {
        /// Account ID
        account: String,

        /// Output format: table, csv, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Verify that every balance matches its ledger
    Check,
}

#[derive(Subcommand)]
pub enum AccountCommands {
    /// Open a new account with a zero balance
    Open {
        /// Account type: checking, savings
        account_type: String,
    },

    /// List your accounts
    List,

    /// Show account details
    Show {
        /// Account ID
        id: String,
    },
}

/// Credentials supplied on the command line or through the environment.
struct Credentials {
    email: Option<String>,
    password: Option<String>,
}

impl Credentials {
    fn require(&self) -> Result<(&str, &str)> {
        let email = self
            .email
            .as_deref()
            .context("Missing --email (or MINIBANK_EMAIL)")?;
        let password = self
            .password
            .as_deref()
            .context("Missing --password (or MINIBANK_PASSWORD)")?;
        Ok((email, password))
    }

    /// Resolve the caller's identity. Every account command goes through here.
    async fn caller(&self, service: &BankService) -> Result<UserId> {
        let (email, password) = self.require()?;
        let user = service.authenticate(email, password).await?;
        Ok(user.id)
    }
}

impl Cli {
    /// Install the global logger. `RUST_LOG` wins over `--verbose`.
    pub fn init_logging(&self) {
        let default_filter = if self.verbose { "debug" } else { "warn" };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
            .init();
    }

    /// Run the command, turning application errors into user-facing messages.
    pub async fn run(self) -> Result<()> {
        self.execute().await.map_err(present_error)
    }

    async fn execute(self) -> Result<()> {
        let credentials = Credentials {
            email: self.email,
            password: self.password,
        };
        let database = self.database;

        match self.command {
            Commands::Init => {
                BankService::init(&database).await?;
                println!("Database initialized: {}", database);
            }

            Commands::Register { name } => {
                let service = BankService::connect(&database).await?;
                let (email, password) = credentials.require()?;
                let user = service.register(name, email, password).await?;
                println!("Registered {} <{}> ({})", user.name, user.email, user.id);
            }

            Commands::Account(account_cmd) => {
                let service = BankService::connect(&database).await?;
                let caller = credentials.caller(&service).await?;
                run_account_command(&service, caller, account_cmd).await?;
            }

            Commands::Deposit {
                account,
                amount,
                description,
            } => {
                let service = BankService::connect(&database).await?;
                let caller = credentials.caller(&service).await?;
                let account_id = parse_account_id(&account)?;
                let amount_cents = parse_amount(&amount)?;

                let transaction = service
                    .deposit(account_id, caller, amount_cents, description)
                    .await?;
                println!(
                    "Deposited {} into {} ({})",
                    format_cents(transaction.amount_cents),
                    account_id,
                    transaction.id
                );
            }

            Commands::Withdraw {
                account,
                amount,
                description,
            } => {
                let service = BankService::connect(&database).await?;
                let caller = credentials.caller(&service).await?;
                let account_id = parse_account_id(&account)?;
                let amount_cents = parse_amount(&amount)?;

                let transaction = service
                    .withdraw(account_id, caller, amount_cents, description)
                    .await?;
                println!(
                    "Withdrew {} from {} ({})",
                    format_cents(transaction.amount_cents),
                    account_id,
                    transaction.id
                );
            }

            Commands::Statement {
                account,
                format,
                output,
            } => {
                let service = BankService::connect(&database).await?;
                let caller = credentials.caller(&service).await?;
                let account_id = parse_account_id(&account)?;

                let statement = service.get_statement(account_id, caller).await?;
                run_statement_output(&statement, &format, output.as_deref())?;
            }

            Commands::Check => {
                let service = BankService::connect(&database).await?;
                run_check_command(&service).await?;
            }
        }

        Ok(())
    }
}

/// Map application errors to their user-facing message. Store failures are
/// reported generically; their details are already in the log.
fn present_error(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<AppError>() {
        Some(app_err) => anyhow::anyhow!(app_err.user_message()),
        None => err,
    }
}

async fn run_account_command(
    service: &BankService,
    caller: UserId,
    cmd: AccountCommands,
) -> Result<()> {
    match cmd {
        AccountCommands::Open { account_type } => {
            let at = AccountType::from_str(&account_type).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid account type '{}'. Valid types: checking, savings",
                    account_type
                )
            })?;

            let account = service.open_account(caller, at).await?;
            println!("Opened {} account {}", account.account_type, account.id);
        }

        AccountCommands::List => {
            let accounts = service.list_accounts(caller).await?;
            if accounts.is_empty() {
                println!("No accounts found.");
            } else {
                println!("{:<38} {:<10} {:>12}", "ID", "TYPE", "BALANCE");
                println!("{}", "-".repeat(62));
                for account in accounts {
                    println!(
                        "{:<38} {:<10} {:>12}",
                        account.id,
                        account.account_type,
                        format_cents(account.balance)
                    );
                }
            }
        }

        AccountCommands::Show { id } => {
            let account_id = parse_account_id(&id)?;
            let account = service.get_account(account_id, caller).await?;

            println!("Account: {}", account.id);
            println!("  Type:    {}", account.account_type);
            println!("  Balance: {}", format_cents(account.balance));
            println!(
                "  Opened:  {}",
                account.opened_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(())
}

fn run_statement_output(statement: &Statement, format: &str, output: Option<&str>) -> Result<()> {
    use crate::io::{ExportFormat, StatementExporter};
    use std::fs::File;
    use std::io::{stdout, Write};

    if format.eq_ignore_ascii_case("table") {
        print_statement(statement);
        return Ok(());
    }

    let export_format = ExportFormat::from_str(format).ok_or_else(|| {
        anyhow::anyhow!("Invalid format '{}'. Valid formats: table, csv, json", format)
    })?;

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let count = StatementExporter::new(statement).export(export_format, writer)?;
    if output.is_some() {
        eprintln!("Exported {} transactions", count);
    }
    Ok(())
}

fn print_statement(statement: &Statement) {
    let account = &statement.account;
    println!(
        "Statement for {} account {}",
        account.account_type, account.id
    );
    println!("Balance: {}", format_cents(account.balance));
    println!();

    if statement.is_empty() {
        println!("No transactions yet.");
        return;
    }

    println!(
        "{:<20} {:<10} {:>12}  DESCRIPTION",
        "DATE", "KIND", "AMOUNT"
    );
    println!("{}", "-".repeat(70));
    for transaction in &statement.transactions {
        let amount = format_cents(transaction.signed_amount());
        println!(
            "{:<20} {:<10} {:>12}  {}",
            transaction.occurred_at.format("%Y-%m-%d %H:%M:%S"),
            transaction.kind,
            amount,
            truncate(transaction.description.as_deref().unwrap_or(""), 30)
        );
    }
}

async fn run_check_command(service: &BankService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let report = service.check_integrity().await?;

    println!("Users:        {}", report.user_count);
    println!("Accounts:     {}", report.account_count);
    println!("Transactions: {}", report.transaction_count);
    println!();

    if report.is_healthy() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

fn parse_account_id(s: &str) -> Result<AccountId> {
    Uuid::parse_str(s.trim()).context("Invalid account ID format (expected UUID)")
}

fn parse_amount(s: &str) -> Result<i64> {
    parse_cents(s).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", s))
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
