//! AccountLedger interface tests.
//!
//! Covers the conditional debit: a payment is `Finished` only if the balance
//! covered it, and no interleaving of debits takes a balance below zero.

use futures::future::join_all;
use ledgerbridge::domain::{OrderCreated, PaymentOutcome, PaymentStatus, ValidationError};
use ledgerbridge::storage::{AccountLedger, InboxOutcome, InboxStore, OutboxStore, StorageError};
use uuid::Uuid;

const REPLY_TOPIC: &str = "payments.processed";

async fn funded<S: AccountLedger>(store: &S, balance: i64) -> Uuid {
    let user = Uuid::new_v4();
    store.create_account(user).await.expect("create_account should succeed");
    if balance > 0 {
        store.deposit(user, balance).await.expect("deposit should succeed");
    }
    user
}

fn order_for(user_id: Uuid, amount: i64) -> OrderCreated {
    OrderCreated {
        order_id: Uuid::new_v4(),
        user_id,
        amount,
    }
}

async fn reply_for<S: OutboxStore>(store: &S, order_id: Uuid) -> Vec<PaymentOutcome> {
    store
        .list_outbox()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.message_key == order_id.to_string())
        .map(|e| {
            assert_eq!(e.topic, REPLY_TOPIC);
            serde_json::from_str(&e.payload).unwrap()
        })
        .collect()
}

// =============================================================================
// Account management
// =============================================================================

pub async fn test_create_account_starts_empty<S: AccountLedger>(store: &S) {
    let user = Uuid::new_v4();
    let account = store.create_account(user).await.unwrap();
    assert_eq!(account.balance, 0);

    let fetched = store.get_account(user).await.unwrap().unwrap();
    assert_eq!(fetched, account);
}

pub async fn test_duplicate_account_rejected<S: AccountLedger>(store: &S) {
    let user = funded(store, 50).await;

    let result = store.create_account(user).await;

    assert!(matches!(result, Err(StorageError::DuplicateAccount(id)) if id == user));
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 50);
}

pub async fn test_deposit_accumulates<S: AccountLedger>(store: &S) {
    let user = funded(store, 0).await;

    store.deposit(user, 300).await.unwrap();
    let account = store.deposit(user, 200).await.unwrap();

    assert_eq!(account.balance, 500);
}

pub async fn test_deposit_unknown_account<S: AccountLedger>(store: &S) {
    let user = Uuid::new_v4();
    let result = store.deposit(user, 10).await;
    assert!(matches!(result, Err(StorageError::AccountNotFound(id)) if id == user));
    assert!(store.get_account(user).await.unwrap().is_none());
}

pub async fn test_deposit_overflow_rejected<S: AccountLedger>(store: &S) {
    let user = funded(store, i64::MAX - 10).await;

    let result = store.deposit(user, 100).await;

    assert!(matches!(
        result,
        Err(StorageError::Validation(ValidationError::BalanceOverflow { user_id, amount: 100 }))
            if user_id == user
    ));
    assert_eq!(
        store.get_account(user).await.unwrap().unwrap().balance,
        i64::MAX - 10
    );

    let account = store.deposit(user, 10).await.unwrap();
    assert_eq!(account.balance, i64::MAX);
}

// =============================================================================
// Inbox-guarded debit
// =============================================================================

pub async fn test_debit_within_balance<S: AccountLedger + OutboxStore>(store: &S) {
    let user = funded(store, 1000).await;
    let event = order_for(user, 500);

    let result = store
        .apply_order_created(&Uuid::new_v4().to_string(), &event, REPLY_TOPIC)
        .await
        .unwrap();

    assert_eq!(result, InboxOutcome::Applied(PaymentStatus::Finished));
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 500);
    assert_eq!(
        reply_for(store, event.order_id).await,
        vec![PaymentOutcome {
            order_id: event.order_id,
            status: PaymentStatus::Finished,
        }]
    );
}

pub async fn test_insufficient_funds_cancels<S: AccountLedger + OutboxStore>(store: &S) {
    let user = funded(store, 1000).await;
    let event = order_for(user, 1500);

    let result = store
        .apply_order_created(&Uuid::new_v4().to_string(), &event, REPLY_TOPIC)
        .await
        .unwrap();

    assert_eq!(result, InboxOutcome::Applied(PaymentStatus::Cancelled));
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 1000);
    assert_eq!(reply_for(store, event.order_id).await[0].status, PaymentStatus::Cancelled);
}

pub async fn test_unknown_account_cancels<S: AccountLedger + OutboxStore>(store: &S) {
    let event = order_for(Uuid::new_v4(), 10);

    let result = store
        .apply_order_created(&Uuid::new_v4().to_string(), &event, REPLY_TOPIC)
        .await
        .unwrap();

    assert_eq!(result, InboxOutcome::Applied(PaymentStatus::Cancelled));
    assert_eq!(reply_for(store, event.order_id).await.len(), 1);
}

pub async fn test_exact_balance_finishes<S: AccountLedger + OutboxStore>(store: &S) {
    let user = funded(store, 700).await;
    let event = order_for(user, 700);

    let result = store
        .apply_order_created(&Uuid::new_v4().to_string(), &event, REPLY_TOPIC)
        .await
        .unwrap();

    assert_eq!(result, InboxOutcome::Applied(PaymentStatus::Finished));
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 0);
}

pub async fn test_redelivery_debits_once<S: AccountLedger + OutboxStore + InboxStore>(store: &S) {
    let user = funded(store, 1000).await;
    let event = order_for(user, 500);
    let message_id = Uuid::new_v4().to_string();

    let first = store
        .apply_order_created(&message_id, &event, REPLY_TOPIC)
        .await
        .unwrap();
    let second = store
        .apply_order_created(&message_id, &event, REPLY_TOPIC)
        .await
        .unwrap();

    assert_eq!(first, InboxOutcome::Applied(PaymentStatus::Finished));
    assert_eq!(second, InboxOutcome::Duplicate);
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 500);
    assert_eq!(reply_for(store, event.order_id).await.len(), 1, "one reply only");
    assert!(store.is_processed(&message_id).await.unwrap());
}

pub async fn test_concurrent_debits_never_overdraw<S: AccountLedger + OutboxStore>(store: &S) {
    let user = funded(store, 1000).await;
    let events: Vec<OrderCreated> = (0..8).map(|_| order_for(user, 300)).collect();
    let ids: Vec<String> = events.iter().map(|_| Uuid::new_v4().to_string()).collect();

    let results = join_all(
        events
            .iter()
            .zip(&ids)
            .map(|(event, id)| store.apply_order_created(id, event, REPLY_TOPIC)),
    )
    .await;

    let finished = results
        .into_iter()
        .map(|r| r.expect("debit should not error"))
        .filter(|r| *r == InboxOutcome::Applied(PaymentStatus::Finished))
        .count();

    assert_eq!(finished, 3, "1000 covers exactly three debits of 300");
    assert_eq!(store.get_account(user).await.unwrap().unwrap().balance, 100);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all AccountLedger interface tests against a store implementation.
#[macro_export]
macro_rules! run_account_ledger_tests {
    ($store:expr) => {
        use $crate::storage::account_ledger_tests::*;

        test_create_account_starts_empty($store).await;
        println!("  test_create_account_starts_empty: PASSED");

        test_duplicate_account_rejected($store).await;
        println!("  test_duplicate_account_rejected: PASSED");

        test_deposit_accumulates($store).await;
        println!("  test_deposit_accumulates: PASSED");

        test_deposit_unknown_account($store).await;
        println!("  test_deposit_unknown_account: PASSED");

        test_deposit_overflow_rejected($store).await;
        println!("  test_deposit_overflow_rejected: PASSED");

        test_debit_within_balance($store).await;
        println!("  test_debit_within_balance: PASSED");

        test_insufficient_funds_cancels($store).await;
        println!("  test_insufficient_funds_cancels: PASSED");

        test_unknown_account_cancels($store).await;
        println!("  test_unknown_account_cancels: PASSED");

        test_exact_balance_finishes($store).await;
        println!("  test_exact_balance_finishes: PASSED");

        test_redelivery_debits_once($store).await;
        println!("  test_redelivery_debits_once: PASSED");

        test_concurrent_debits_never_overdraw($store).await;
        println!("  test_concurrent_debits_never_overdraw: PASSED");
    };
}
