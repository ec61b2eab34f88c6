use std::collections::VecDeque;
use std::sync::Mutex;

use uuid::Uuid;

use super::*;
use crate::bus::{BusError, Delivery};
use crate::domain::{NewOrder, OrderCreated, OrderStatus, PaymentOutcome, PaymentStatus};
use crate::notify::NotificationHub;
use crate::storage::{AccountLedger, InMemoryLedger, InboxStore, OrderLedger, OutboxStore};
use crate::utils::ShutdownTrigger;

/// Hands out a fixed list of deliveries, then reports the bus closed.
struct ScriptedSubscription {
    deliveries: VecDeque<Delivery>,
    acked: Arc<Mutex<Vec<i64>>>,
}

#[async_trait]
impl Subscription for ScriptedSubscription {
    async fn next(&mut self) -> crate::bus::Result<Option<Delivery>> {
        Ok(self.deliveries.pop_front())
    }

    async fn ack(&mut self, delivery: &Delivery) -> crate::bus::Result<()> {
        self.acked.lock().unwrap().push(delivery.offset);
        Ok(())
    }
}

/// Never yields; used to test shutdown while idle.
struct IdleSubscription;

#[async_trait]
impl Subscription for IdleSubscription {
    async fn next(&mut self) -> crate::bus::Result<Option<Delivery>> {
        std::future::pending().await
    }

    async fn ack(&mut self, _delivery: &Delivery) -> crate::bus::Result<()> {
        Err(BusError::Closed)
    }
}

fn delivery(topic: &str, message_id: &str, offset: i64, payload: Vec<u8>) -> Delivery {
    Delivery {
        topic: topic.to_string(),
        key: None,
        message_id: Some(message_id.to_string()),
        payload,
        partition: 0,
        offset,
    }
}

fn order_created(user_id: Uuid, amount: i64) -> (Uuid, Vec<u8>) {
    let order_id = Uuid::new_v4();
    let payload = serde_json::to_vec(&OrderCreated {
        order_id,
        user_id,
        amount,
    })
    .unwrap();
    (order_id, payload)
}

fn consumer_config() -> ConsumerConfig {
    ConsumerConfig {
        retry_interval_ms: 10,
        ..Default::default()
    }
}

fn scripted(
    deliveries: Vec<Delivery>,
    handler: Arc<dyn MessageHandler>,
) -> (IdempotentConsumer, Arc<Mutex<Vec<i64>>>) {
    let acked = Arc::new(Mutex::new(Vec::new()));
    let subscription = ScriptedSubscription {
        deliveries: deliveries.into(),
        acked: acked.clone(),
    };
    let consumer = IdempotentConsumer::new(Box::new(subscription), handler, &consumer_config());
    (consumer, acked)
}

async fn funded_account(ledger: &InMemoryLedger, balance: i64) -> Uuid {
    let user = Uuid::new_v4();
    ledger.create_account(user).await.unwrap();
    ledger.deposit(user, balance).await.unwrap();
    user
}

#[tokio::test]
async fn test_payment_applied_once_across_redelivery() {
    let ledger = Arc::new(InMemoryLedger::new());
    let user = funded_account(&ledger, 1000).await;
    let (_, payload) = order_created(user, 500);
    let handler = Arc::new(PaymentHandler::new(ledger.clone(), "payments.processed"));

    let (consumer, acked) = scripted(
        vec![
            delivery("orders.created", "m-1", 0, payload.clone()),
            delivery("orders.created", "m-1", 0, payload),
        ],
        handler,
    );
    let (_trigger, shutdown) = ShutdownTrigger::new();
    consumer.run(shutdown).await;

    assert_eq!(*acked.lock().unwrap(), vec![0, 0]);
    assert_eq!(ledger.get_account(user).await.unwrap().unwrap().balance, 500);
    assert_eq!(ledger.list_outbox().await.unwrap().len(), 1);
    assert_eq!(ledger.inbox_len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_insufficient_funds_replies_cancelled() {
    let ledger = Arc::new(InMemoryLedger::new());
    let user = funded_account(&ledger, 1000).await;
    let (order_id, payload) = order_created(user, 1500);
    let handler = PaymentHandler::new(ledger.clone(), "payments.processed");

    let outcome = handler
        .handle(&delivery("orders.created", "m-1", 0, payload))
        .await
        .unwrap();

    assert_eq!(outcome, HandleOutcome::Applied);
    assert_eq!(ledger.get_account(user).await.unwrap().unwrap().balance, 1000);
    let outbox = ledger.list_outbox().await.unwrap();
    let reply: PaymentOutcome = serde_json::from_str(&outbox[0].payload).unwrap();
    assert_eq!(
        reply,
        PaymentOutcome {
            order_id,
            status: PaymentStatus::Cancelled
        }
    );
    assert_eq!(outbox[0].message_key, order_id.to_string());
}

#[tokio::test]
async fn test_malformed_payload_is_acked_and_dropped() {
    let ledger = Arc::new(InMemoryLedger::new());
    let handler = Arc::new(PaymentHandler::new(ledger.clone(), "payments.processed"));

    let (consumer, acked) = scripted(
        vec![delivery("orders.created", "m-1", 3, b"not json".to_vec())],
        handler,
    );
    let (_trigger, shutdown) = ShutdownTrigger::new();
    consumer.run(shutdown).await;

    assert_eq!(*acked.lock().unwrap(), vec![3]);
    assert_eq!(ledger.inbox_len().await.unwrap(), 0);
    assert!(ledger.list_outbox().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_failure_retries_same_delivery() {
    let ledger = Arc::new(InMemoryLedger::new());
    let user = funded_account(&ledger, 1000).await;
    let (_, payload) = order_created(user, 200);
    let handler = Arc::new(PaymentHandler::new(ledger.clone(), "payments.processed"));
    ledger.set_unavailable(true);

    let (consumer, acked) = scripted(vec![delivery("orders.created", "m-1", 0, payload)], handler);
    let (_trigger, shutdown) = ShutdownTrigger::new();
    let task = tokio::spawn(consumer.run(shutdown));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(acked.lock().unwrap().is_empty());

    ledger.set_unavailable(false);
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*acked.lock().unwrap(), vec![0]);
    assert_eq!(ledger.get_account(user).await.unwrap().unwrap().balance, 800);
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_wait() {
    let ledger = Arc::new(InMemoryLedger::new());
    let (_, payload) = order_created(Uuid::new_v4(), 200);
    let handler = Arc::new(PaymentHandler::new(ledger.clone(), "payments.processed"));
    ledger.set_unavailable(true);

    let (consumer, acked) = scripted(vec![delivery("orders.created", "m-1", 0, payload)], handler);
    let handle = spawn_consumer(consumer);
    tokio::time::sleep(Duration::from_millis(30)).await;

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .unwrap();
    assert!(acked.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_shutdown_while_idle() {
    let ledger = Arc::new(InMemoryLedger::new());
    let handler = Arc::new(PaymentHandler::new(ledger, "payments.processed"));
    let consumer =
        IdempotentConsumer::new(Box::new(IdleSubscription), handler, &consumer_config());

    let handle = spawn_consumer(consumer);
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_order_outcome_updates_status_and_notifies_owner() {
    let ledger = Arc::new(InMemoryLedger::new());
    let hub = NotificationHub::new();
    let user = Uuid::new_v4();
    let order = ledger
        .create_order(NewOrder::new(user, 500, "book").unwrap(), "orders.created")
        .await
        .unwrap();
    let (_reg, mut rx) = hub.register(user);
    let handler = OrderOutcomeHandler::new(ledger.clone(), hub.clone());

    let payload = serde_json::to_vec(&PaymentOutcome {
        order_id: order.id,
        status: PaymentStatus::Finished,
    })
    .unwrap();
    let message = delivery("payments.processed", "p-1", 0, payload);

    assert_eq!(handler.handle(&message).await.unwrap(), HandleOutcome::Applied);
    assert_eq!(
        ledger.get_order(order.id).await.unwrap().unwrap().status,
        OrderStatus::Finished
    );
    let pushed: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(pushed["type"], "ORDER_UPDATED");
    assert_eq!(pushed["status"], "FINISHED");

    assert_eq!(handler.handle(&message).await.unwrap(), HandleOutcome::Duplicate);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_outcome_for_unknown_order_is_dropped() {
    let ledger = Arc::new(InMemoryLedger::new());
    let handler = OrderOutcomeHandler::new(ledger.clone(), NotificationHub::new());
    let payload = serde_json::to_vec(&PaymentOutcome {
        order_id: Uuid::new_v4(),
        status: PaymentStatus::Cancelled,
    })
    .unwrap();

    let outcome = handler
        .handle(&delivery("payments.processed", "p-9", 0, payload))
        .await
        .unwrap();

    assert_eq!(outcome, HandleOutcome::Dropped);
    assert!(ledger.is_processed("p-9").await.unwrap());
}

#[tokio::test]
async fn test_missing_message_id_falls_back_to_coordinates() {
    let ledger = Arc::new(InMemoryLedger::new());
    let user = funded_account(&ledger, 1000).await;
    let (_, payload) = order_created(user, 100);
    let handler = PaymentHandler::new(ledger.clone(), "payments.processed");
    let mut message = delivery("orders.created", "", 7, payload);
    message.message_id = None;

    handler.handle(&message).await.unwrap();

    assert!(ledger.is_processed("orders.created/0/7").await.unwrap());
}
