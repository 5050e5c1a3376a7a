mod common;

use anyhow::Result;
use common::{test_service, Customers};
use minibank::application::{AppError, BankService};
use minibank::domain::{Account, TransactionKind, UserId};

/// Stored balance and signed ledger sum for an account.
async fn balance_and_ledger(
    service: &BankService,
    account: &Account,
    owner: UserId,
) -> Result<(i64, i64)> {
    let stored = service.get_account(account.id, owner).await?.balance;
    let ledger = service.repository().ledger_sum(account.id).await?;
    Ok((stored, ledger))
}

#[tokio::test]
async fn test_deposit_into_new_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_checking(&service, "Ana").await?;

    let transaction = service.deposit(account.id, user.id, 10000, None).await?;

    assert_eq!(transaction.kind, TransactionKind::Deposit);
    assert_eq!(transaction.amount_cents, 10000);
    assert_eq!(transaction.account_id, account.id);
    assert_eq!(transaction.description.as_deref(), Some("Deposit"));
    assert!(transaction.sequence > 0);

    let statement = service.get_statement(account.id, user.id).await?;
    assert_eq!(statement.account.balance, 10000);
    assert_eq!(statement.transactions, vec![transaction]);
    Ok(())
}

#[tokio::test]
async fn test_withdraw_decrements_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 10000).await?;

    let transaction = service
        .withdraw(account.id, user.id, 6000, Some("Rent".into()))
        .await?;

    assert_eq!(transaction.kind, TransactionKind::Withdraw);
    assert_eq!(transaction.amount_cents, 6000);
    assert_eq!(transaction.description.as_deref(), Some("Rent"));
    assert_eq!(balance_and_ledger(&service, &account, user.id).await?, (4000, 4000));
    Ok(())
}

#[tokio::test]
async fn test_withdraw_entire_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 2500).await?;

    service.withdraw(account.id, user.id, 2500, None).await?;

    assert_eq!(balance_and_ledger(&service, &account, user.id).await?, (0, 0));
    Ok(())
}

#[tokio::test]
async fn test_non_positive_deposit_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_checking(&service, "Ana").await?;

    for amount in [0, -500] {
        let result = service.deposit(account.id, user.id, amount, None).await;
        assert!(matches!(result, Err(AppError::InvalidAmount(a)) if a == amount));
    }

    let statement = service.get_statement(account.id, user.id).await?;
    assert!(statement.is_empty());
    assert_eq!(statement.account.balance, 0);
    Ok(())
}

#[tokio::test]
async fn test_non_positive_withdrawal_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 10000).await?;

    let result = service.withdraw(account.id, user.id, 0, None).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(0))));

    let result = service.withdraw(account.id, user.id, -100, None).await;
    assert!(matches!(result, Err(AppError::InvalidAmount(-100))));

    assert_eq!(
        balance_and_ledger(&service, &account, user.id).await?,
        (10000, 10000)
    );
    Ok(())
}

#[tokio::test]
async fn test_overdraft_leaves_account_unchanged() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 10000).await?;
    let before = service.get_statement(account.id, user.id).await?;

    let result = service.withdraw(account.id, user.id, 15000, None).await;
    match result {
        Err(AppError::InsufficientFunds {
            account_id,
            balance,
            requested,
        }) => {
            assert_eq!(account_id, account.id);
            assert_eq!(balance, 10000);
            assert_eq!(requested, 15000);
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }

    let after = service.get_statement(account.id, user.id).await?;
    assert_eq!(after, before);
    assert_eq!(after.account.balance, 10000);
    Ok(())
}

#[tokio::test]
async fn test_deposit_past_balance_limit_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 100).await?;

    let result = service.deposit(account.id, user.id, i64::MAX, None).await;
    match result {
        Err(AppError::BalanceLimitExceeded {
            account_id,
            balance,
            requested,
        }) => {
            assert_eq!(account_id, account.id);
            assert_eq!(balance, 100);
            assert_eq!(requested, i64::MAX);
        }
        other => panic!("expected BalanceLimitExceeded, got {:?}", other),
    }

    assert_eq!(balance_and_ledger(&service, &account, user.id).await?, (100, 100));
    let report = service.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    Ok(())
}

#[tokio::test]
async fn test_deposit_into_someone_elses_account_is_forbidden() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (bruno, bruno_account) = Customers::with_balance(&service, "Bruno", 5000).await?;
    let ana = Customers::register(&service, "Ana").await?;
    let before = service.get_statement(bruno_account.id, bruno.id).await?;

    let deposit = service.deposit(bruno_account.id, ana.id, 1000, None).await;
    assert!(matches!(deposit, Err(AppError::Forbidden(id)) if id == bruno_account.id));

    let withdrawal = service.withdraw(bruno_account.id, ana.id, 1000, None).await;
    assert!(matches!(withdrawal, Err(AppError::Forbidden(_))));

    let after = service.get_statement(bruno_account.id, bruno.id).await?;
    assert_eq!(after, before);
    Ok(())
}

#[tokio::test]
async fn test_mutations_on_unknown_account() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let user = Customers::register(&service, "Ana").await?;
    let missing = uuid::Uuid::new_v4();

    let deposit = service.deposit(missing, user.id, 1000, None).await;
    assert!(matches!(deposit, Err(AppError::AccountNotFound(id)) if id == missing));

    let withdrawal = service.withdraw(missing, user.id, 1000, None).await;
    assert!(matches!(withdrawal, Err(AppError::AccountNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_balance_always_matches_ledger() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_checking(&service, "Ana").await?;

    let operations: [(TransactionKind, i64); 7] = [
        (TransactionKind::Deposit, 10000),
        (TransactionKind::Withdraw, 3000),
        (TransactionKind::Withdraw, 9000), // overdraft, rejected
        (TransactionKind::Deposit, 1),
        (TransactionKind::Deposit, 0), // invalid, rejected
        (TransactionKind::Withdraw, 7001),
        (TransactionKind::Deposit, 4550),
    ];

    for (kind, amount) in operations {
        let _ = match kind {
            TransactionKind::Deposit => service.deposit(account.id, user.id, amount, None).await,
            TransactionKind::Withdraw => service.withdraw(account.id, user.id, amount, None).await,
        };
        let (stored, ledger) = balance_and_ledger(&service, &account, user.id).await?;
        assert_eq!(stored, ledger, "balance drifted after {} of {}", kind, amount);
        assert!(stored >= 0);
    }

    let statement = service.get_statement(account.id, user.id).await?;
    assert_eq!(statement.account.balance, 4550);
    assert_eq!(statement.transactions.len(), 5);
    assert_eq!(statement.ledger_balance(), 4550);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_withdrawals_never_overdraw() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 10000).await?;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            let (account_id, owner) = (account.id, user.id);
            tokio::spawn(async move { service.withdraw(account_id, owner, 6000, None).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => insufficient += 1,
            Err(other) => return Err(other.into()),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(insufficient, 1);
    assert_eq!(balance_and_ledger(&service, &account, user.id).await?, (4000, 4000));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_concurrent_withdrawals_stop_at_zero() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, account) = Customers::with_balance(&service, "Ana", 10000).await?;

    let handles: Vec<_> = (0..10)
        .map(|_| {
            let service = service.clone();
            let (account_id, owner) = (account.id, user.id);
            tokio::spawn(async move { service.withdraw(account_id, owner, 3000, None).await })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => succeeded += 1,
            Err(AppError::InsufficientFunds { .. }) => {}
            Err(other) => return Err(other.into()),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(balance_and_ledger(&service, &account, user.id).await?, (1000, 1000));
    Ok(())
}

#[tokio::test]
async fn test_integrity_check_on_healthy_ledger() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (ana, ana_account) = Customers::with_balance(&service, "Ana", 10000).await?;
    Customers::with_checking(&service, "Bruno").await?;
    service.withdraw(ana_account.id, ana.id, 2500, None).await?;

    let report = service.check_integrity().await?;

    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.user_count, 2);
    assert_eq!(report.account_count, 2);
    assert_eq!(report.transaction_count, 2);
    Ok(())
}
