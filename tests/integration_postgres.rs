//! PostgreSQL Integration Tests
//!
//! Need a running database. Run with:
//! DATABASE_URL=postgres://... cargo test --test integration_postgres -- --ignored

use std::sync::Arc;

use rust_decimal_macros::dec;

use peerpay::domain::{Balance, OperationContext, TransferError, MAX_AMOUNT};
use peerpay::engine::{TransferCommand, TransferEngine};
use peerpay::history::{Direction, HistoryQuery};
use peerpay::identity::PgDirectory;
use peerpay::store::{AccountStore, LedgerStore, PgStorage};

mod common;

use common::{seed_user, setup_test_db, unique_user};

fn engine_for(pool: &sqlx::PgPool) -> TransferEngine {
    TransferEngine::new(
        Arc::new(PgStorage::new(pool.clone())),
        Arc::new(PgDirectory::new(pool.clone())),
    )
}

#[tokio::test]
#[ignore] // Requires database
async fn test_transfer_commits_with_names() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");

    seed_user(&pool, &alice, "Alice", "Liddell").await;
    seed_user(&pool, &bob, "Bob", "Builder").await;
    storage.open_account(&alice, Balance::new(1000).unwrap()).await.unwrap();
    storage.open_account(&bob, Balance::new(50).unwrap()).await.unwrap();

    let command = TransferCommand::new(alice.clone(), bob.as_str(), dec!(200)).with_note("rent");
    let result = engine_for(&pool)
        .transfer(command, &OperationContext::new())
        .await
        .unwrap();

    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 800);
    assert_eq!(storage.get_balance(&bob).await.unwrap().units(), 250);

    let record = storage.get_transfer(result.transfer_id).await.unwrap().unwrap();
    assert_eq!(record.sender_name, "Alice Liddell");
    assert_eq!(record.receiver_name, "Bob Builder");
    assert_eq!(record.note.as_str(), "rent");

    let history = HistoryQuery::new(
        Arc::new(storage.clone()),
        Arc::new(PgDirectory::new(pool.clone())),
    );
    let entries = history.history(&bob, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].direction, Direction::Received);
    assert_eq!(entries[0].counterparty_name, "Alice Liddell");
}

#[tokio::test]
#[ignore] // Requires database
async fn test_insufficient_funds_leaves_no_trace() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    storage.open_account(&alice, Balance::new(50).unwrap()).await.unwrap();
    storage.open_account(&bob, Balance::zero()).await.unwrap();

    let err = engine_for(&pool)
        .transfer(
            TransferCommand::new(alice.clone(), bob.as_str(), dec!(200)),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InsufficientFunds { .. }));
    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 50);
    assert_eq!(storage.get_balance(&bob).await.unwrap().units(), 0);
    assert!(storage.query_by_participant(&alice, 10).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore] // Requires database
async fn test_unknown_recipient() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    storage.open_account(&alice, Balance::new(100).unwrap()).await.unwrap();
    let ghost = unique_user("ghost");

    let err = engine_for(&pool)
        .transfer(
            TransferCommand::new(alice.clone(), ghost.as_str(), dec!(10)),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(err, TransferError::UnknownRecipient(ghost));
    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 100);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_debits_never_overdraw() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    let carol = unique_user("carol");
    storage.open_account(&alice, Balance::new(100).unwrap()).await.unwrap();
    storage.open_account(&bob, Balance::zero()).await.unwrap();
    storage.open_account(&carol, Balance::zero()).await.unwrap();

    let engine = Arc::new(engine_for(&pool));
    let first = {
        let engine = Arc::clone(&engine);
        let command = TransferCommand::new(alice.clone(), bob.as_str(), dec!(60));
        tokio::spawn(async move { engine.transfer(command, &OperationContext::new()).await })
    };
    let second = {
        let engine = Arc::clone(&engine);
        let command = TransferCommand::new(alice.clone(), carol.as_str(), dec!(60));
        tokio::spawn(async move { engine.transfer(command, &OperationContext::new()).await })
    };

    let outcomes = [first.await.unwrap(), second.await.unwrap()];
    let committed = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(committed, 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(TransferError::InsufficientFunds { .. }))));

    let alice_balance = storage.get_balance(&alice).await.unwrap().units();
    let bob_balance = storage.get_balance(&bob).await.unwrap().units();
    let carol_balance = storage.get_balance(&carol).await.unwrap().units();
    assert_eq!(alice_balance, 40);
    assert_eq!(alice_balance + bob_balance + carol_balance, 100);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_idempotent_replay() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    storage.open_account(&alice, Balance::new(500).unwrap()).await.unwrap();
    storage.open_account(&bob, Balance::zero()).await.unwrap();

    let engine = engine_for(&pool);
    let command =
        || TransferCommand::new(alice.clone(), bob.as_str(), dec!(100)).with_idempotency_key("pay-1");

    let first = engine.transfer(command(), &OperationContext::new()).await.unwrap();
    let second = engine.transfer(command(), &OperationContext::new()).await.unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(first.transfer_id, second.transfer_id);
    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 400);

    let err = engine
        .transfer(
            TransferCommand::new(alice.clone(), bob.as_str(), dec!(7)).with_idempotency_key("pay-1"),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::IdempotencyConflict(_)));
}

#[tokio::test]
#[ignore] // Requires database
async fn test_concurrent_duplicates_draining_sender_share_one_record() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    storage.open_account(&alice, Balance::new(100).unwrap()).await.unwrap();
    storage.open_account(&bob, Balance::zero()).await.unwrap();

    let engine = Arc::new(engine_for(&pool));
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let command = TransferCommand::new(alice.clone(), bob.as_str(), dec!(100))
                .with_idempotency_key("pay-once");
            tokio::spawn(async move { engine.transfer(command, &OperationContext::new()).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(results[0].transfer_id, results[1].transfer_id);
    assert_eq!(results.iter().filter(|r| r.replayed).count(), 1);
    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 0);
    assert_eq!(storage.get_balance(&bob).await.unwrap().units(), 100);
    assert_eq!(storage.query_by_participant(&alice, 10).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore] // Requires database
async fn test_credit_past_balance_cap_is_rejected() {
    let pool = setup_test_db().await;
    let storage = PgStorage::new(pool.clone());
    let alice = unique_user("alice");
    let bob = unique_user("bob");
    storage.open_account(&alice, Balance::new(10).unwrap()).await.unwrap();
    storage
        .open_account(&bob, Balance::new(MAX_AMOUNT).unwrap())
        .await
        .unwrap();

    let err = engine_for(&pool)
        .transfer(
            TransferCommand::new(alice.clone(), bob.as_str(), dec!(1)),
            &OperationContext::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::InvalidRequest(_)), "{err:?}");
    assert_eq!(storage.get_balance(&alice).await.unwrap().units(), 10);
    assert_eq!(storage.get_balance(&bob).await.unwrap().units(), MAX_AMOUNT);
}
