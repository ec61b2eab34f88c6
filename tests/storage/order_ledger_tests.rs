//! OrderLedger interface tests.

use ledgerbridge::domain::{NewOrder, OrderStatus, PaymentOutcome, PaymentStatus};
use ledgerbridge::storage::{InboxOutcome, InboxStore, OrderLedger, StatusChange};
use uuid::Uuid;

const TOPIC: &str = "orders.created";

fn message_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Reads
// =============================================================================

pub async fn test_create_and_get<S: OrderLedger>(store: &S) {
    let user = Uuid::new_v4();
    let created = store
        .create_order(NewOrder::new(user, 500, "book").unwrap(), TOPIC)
        .await
        .expect("create_order should succeed");

    assert_eq!(created.status, OrderStatus::New);

    let fetched = store
        .get_order(created.id)
        .await
        .expect("get_order should succeed")
        .expect("order should exist");
    assert_eq!(fetched, created, "stored order should read back unchanged");
}

pub async fn test_get_nonexistent<S: OrderLedger>(store: &S) {
    let result = store.get_order(Uuid::new_v4()).await.unwrap();
    assert!(result.is_none());
}

pub async fn test_list_newest_first_per_user<S: OrderLedger>(store: &S) {
    let user = Uuid::new_v4();
    let other = Uuid::new_v4();
    let mut created = Vec::new();
    for amount in [100, 200, 300] {
        let order = store
            .create_order(NewOrder::new(user, amount, "").unwrap(), TOPIC)
            .await
            .unwrap();
        created.push(order.id);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    store
        .create_order(NewOrder::new(other, 999, "").unwrap(), TOPIC)
        .await
        .unwrap();

    let listed: Vec<Uuid> = store
        .list_orders(user)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.id)
        .collect();

    created.reverse();
    assert_eq!(listed, created, "orders should be newest first");
}

// =============================================================================
// Inbox-guarded status updates
// =============================================================================

pub async fn test_apply_outcome_updates_status<S: OrderLedger + InboxStore>(store: &S) {
    let user = Uuid::new_v4();
    let order = store
        .create_order(NewOrder::new(user, 500, "").unwrap(), TOPIC)
        .await
        .unwrap();
    let id = message_id();

    let result = store
        .apply_payment_outcome(
            &id,
            &PaymentOutcome {
                order_id: order.id,
                status: PaymentStatus::Finished,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        result,
        InboxOutcome::Applied(StatusChange::Updated {
            user_id: user,
            status: OrderStatus::Finished,
        })
    );
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Finished);
    assert!(store.is_processed(&id).await.unwrap());
}

pub async fn test_duplicate_outcome_is_ignored<S: OrderLedger + InboxStore>(store: &S) {
    let order = store
        .create_order(NewOrder::new(Uuid::new_v4(), 500, "").unwrap(), TOPIC)
        .await
        .unwrap();
    let id = message_id();

    store
        .apply_payment_outcome(
            &id,
            &PaymentOutcome {
                order_id: order.id,
                status: PaymentStatus::Cancelled,
            },
        )
        .await
        .unwrap();

    // Same message id, different body: must not be applied.
    let second = store
        .apply_payment_outcome(
            &id,
            &PaymentOutcome {
                order_id: order.id,
                status: PaymentStatus::Finished,
            },
        )
        .await
        .unwrap();

    assert!(second.is_duplicate());
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
}

pub async fn test_outcome_for_unknown_order<S: OrderLedger + InboxStore>(store: &S) {
    let id = message_id();
    let before = store.inbox_len().await.unwrap();

    let result = store
        .apply_payment_outcome(
            &id,
            &PaymentOutcome {
                order_id: Uuid::new_v4(),
                status: PaymentStatus::Finished,
            },
        )
        .await
        .unwrap();

    assert_eq!(result, InboxOutcome::Applied(StatusChange::OrderNotFound));
    assert!(store.is_processed(&id).await.unwrap());
    assert_eq!(store.inbox_len().await.unwrap(), before + 1);
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run all OrderLedger interface tests against a store implementation.
#[macro_export]
macro_rules! run_order_ledger_tests {
    ($store:expr) => {
        use $crate::storage::order_ledger_tests::*;

        test_create_and_get($store).await;
        println!("  test_create_and_get: PASSED");

        test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");

        test_list_newest_first_per_user($store).await;
        println!("  test_list_newest_first_per_user: PASSED");

        test_apply_outcome_updates_status($store).await;
        println!("  test_apply_outcome_updates_status: PASSED");

        test_duplicate_outcome_is_ignored($store).await;
        println!("  test_duplicate_outcome_is_ignored: PASSED");

        test_outcome_for_unknown_order($store).await;
        println!("  test_outcome_for_unknown_order: PASSED");
    };
}
