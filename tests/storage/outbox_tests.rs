//! OutboxStore interface tests.
//!
//! Outbox rows are produced through `OrderLedger::create_order`, the same way
//! the service produces them. Every test starts by draining whatever earlier
//! tests left pending.

use std::time::Duration;

use ledgerbridge::domain::NewOrder;
use ledgerbridge::storage::{OrderLedger, OutboxStore};
use uuid::Uuid;

const TOPIC: &str = "orders.created";
const PROMPT: Duration = Duration::from_secs(1);

/// Mark every pending entry published.
pub async fn drain<S: OutboxStore>(store: &S) {
    loop {
        let mut claim = store.claim_pending(100).await.expect("claim should succeed");
        let ids: Vec<Uuid> = claim.entries().iter().map(|e| e.id).collect();
        if ids.is_empty() {
            return;
        }
        for id in ids {
            claim.mark_published(id).await.expect("mark should succeed");
        }
        claim.commit().await.expect("commit should succeed");
    }
}

async fn create_orders<S: OrderLedger>(store: &S, count: i64) -> Vec<Uuid> {
    let user = Uuid::new_v4();
    let mut ids = Vec::new();
    for i in 1..=count {
        let order = store
            .create_order(NewOrder::new(user, i * 100, "item").unwrap(), TOPIC)
            .await
            .expect("create_order should succeed");
        ids.push(order.id);
    }
    ids
}

// =============================================================================
// Atomic write
// =============================================================================

pub async fn test_create_order_writes_outbox_entry<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    let order_ids = create_orders(store, 1).await;

    let claim = store.claim_pending(10).await.unwrap();
    assert_eq!(claim.entries().len(), 1, "one outbox row per order");

    let entry = &claim.entries()[0];
    assert_eq!(entry.topic, TOPIC);
    assert_eq!(entry.message_key, order_ids[0].to_string());
    assert!(!entry.published);

    let payload: serde_json::Value = serde_json::from_str(&entry.payload).unwrap();
    assert_eq!(payload["order_id"], order_ids[0].to_string());
    assert_eq!(payload["amount"], 100);
}

// =============================================================================
// Claiming
// =============================================================================

pub async fn test_claim_in_creation_order<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    let order_ids = create_orders(store, 3).await;

    let claim = store.claim_pending(10).await.unwrap();
    let keys: Vec<String> = claim
        .entries()
        .iter()
        .map(|e| e.message_key.clone())
        .collect();
    let expected: Vec<String> = order_ids.iter().map(Uuid::to_string).collect();
    assert_eq!(keys, expected, "entries should come oldest first");

    let seqs: Vec<i64> = claim.entries().iter().map(|e| e.seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seq should increase");
}

pub async fn test_claim_respects_limit<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    create_orders(store, 5).await;

    let claim = store.claim_pending(2).await.unwrap();
    assert_eq!(claim.entries().len(), 2);
}

pub async fn test_commit_marks_published<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    let order_ids = create_orders(store, 2).await;

    let mut claim = store.claim_pending(10).await.unwrap();
    let first = claim.entries()[0].id;
    claim.mark_published(first).await.unwrap();
    claim.commit().await.unwrap();
    drop(claim);

    let claim = store.claim_pending(10).await.unwrap();
    assert_eq!(claim.entries().len(), 1, "only the unmarked entry is pending");
    assert_eq!(claim.entries()[0].message_key, order_ids[1].to_string());
    drop(claim);

    let all = store.list_outbox().await.unwrap();
    let marked = all.iter().find(|e| e.id == first).unwrap();
    assert!(marked.published);
}

pub async fn test_dropped_claim_releases_entries<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    let order_ids = create_orders(store, 2).await;

    {
        let claim = store.claim_pending(10).await.unwrap();
        assert_eq!(claim.entries().len(), 2);
        // dropped without marks or commit
    }

    let claim = store.claim_pending(10).await.unwrap();
    let keys: Vec<String> = claim.entries().iter().map(|e| e.message_key.clone()).collect();
    let expected: Vec<String> = order_ids.iter().map(Uuid::to_string).collect();
    assert_eq!(keys, expected, "released entries should be claimable again");
}

/// A relay holding a claim while it waits on the broker must not stall the
/// business writes of the same service.
pub async fn test_writes_proceed_while_claim_open<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    create_orders(store, 1).await;

    let mut claim = store.claim_pending(10).await.unwrap();
    let id = claim.entries()[0].id;
    claim.mark_published(id).await.unwrap();

    let write = tokio::time::timeout(
        PROMPT,
        store.create_order(NewOrder::new(Uuid::new_v4(), 700, "late").unwrap(), TOPIC),
    )
    .await;
    let order = write
        .expect("create_order should not wait for the open claim")
        .unwrap();
    let read = tokio::time::timeout(PROMPT, store.get_order(order.id)).await;
    assert_eq!(read.expect("get_order should not wait").unwrap(), Some(order.clone()));

    claim.commit().await.unwrap();
    drop(claim);

    let claim = store.claim_pending(10).await.unwrap();
    assert_eq!(claim.entries().len(), 1, "the late order is still pending");
    assert_eq!(claim.entries()[0].message_key, order.id.to_string());
}

/// Marks are undone when the claim is dropped without commit. Needs a backend
/// whose claim owns a transaction; SQLite marks are independent statements.
pub async fn test_dropped_claim_rolls_back_marks<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    create_orders(store, 1).await;

    {
        let mut claim = store.claim_pending(10).await.unwrap();
        let id = claim.entries()[0].id;
        claim.mark_published(id).await.unwrap();
        // dropped without commit
    }

    let claim = store.claim_pending(10).await.unwrap();
    assert_eq!(claim.entries().len(), 1, "mark should roll back with the claim");
}

/// Claims held at the same time never share an entry.
pub async fn test_concurrent_claims_are_disjoint<S: OrderLedger + OutboxStore>(store: &S) {
    drain(store).await;
    create_orders(store, 4).await;

    let first = store.claim_pending(3).await.unwrap();
    let second = store.claim_pending(3).await.unwrap();

    assert_eq!(first.entries().len(), 3);
    assert_eq!(second.entries().len(), 1, "locked rows should be skipped");
    let held: Vec<i64> = first.entries().iter().map(|e| e.seq).collect();
    assert!(!held.contains(&second.entries()[0].seq));
}

// =============================================================================
// Test runner macro
// =============================================================================

/// Run the OutboxStore interface tests against a store implementation.
#[macro_export]
macro_rules! run_outbox_tests {
    ($store:expr) => {
        use $crate::storage::outbox_tests::*;

        test_create_order_writes_outbox_entry($store).await;
        println!("  test_create_order_writes_outbox_entry: PASSED");

        test_claim_in_creation_order($store).await;
        println!("  test_claim_in_creation_order: PASSED");

        test_claim_respects_limit($store).await;
        println!("  test_claim_respects_limit: PASSED");

        test_commit_marks_published($store).await;
        println!("  test_commit_marks_published: PASSED");

        test_dropped_claim_releases_entries($store).await;
        println!("  test_dropped_claim_releases_entries: PASSED");

        test_writes_proceed_while_claim_open($store).await;
        println!("  test_writes_proceed_while_claim_open: PASSED");

        test_concurrent_claims_are_disjoint($store).await;
        println!("  test_concurrent_claims_are_disjoint: PASSED");
    };
}
