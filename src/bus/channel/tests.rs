use super::*;
use std::time::Duration;

fn message(topic: &str, key: &str, id: &str) -> OutboundMessage {
    OutboundMessage {
        topic: topic.to_string(),
        key: key.to_string(),
        message_id: id.to_string(),
        payload: format!(r#"{{"id":"{id}"}}"#).into_bytes(),
    }
}

#[tokio::test]
async fn test_channel_publish_no_subscribers() {
    let bus = ChannelBus::new();

    // Should not error even with no subscribers
    let result = bus.publish(&message("orders.created", "k", "m1")).await;
    assert!(result.is_ok());
    assert_eq!(bus.published_count("orders.created"), 1);
}

#[tokio::test]
async fn test_channel_subscribe_and_receive() {
    let bus = ChannelBus::new();
    let mut sub = bus.subscribe("orders.created", "payments").await.unwrap();

    bus.publish(&message("orders.created", "k1", "m1")).await.unwrap();

    let delivery = sub.next().await.unwrap().unwrap();
    assert_eq!(delivery.message_id.as_deref(), Some("m1"));
    assert_eq!(delivery.key.as_deref(), Some("k1"));
    assert_eq!(delivery.offset, 0);
}

#[tokio::test]
async fn test_channel_waits_for_publish() {
    let bus = ChannelBus::new();
    let mut sub = bus.subscribe("t", "g").await.unwrap();

    let publisher = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        publisher.publish(&message("t", "k", "late")).await.unwrap();
    });

    let delivery = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .expect("delivery should arrive")
        .unwrap()
        .unwrap();
    assert_eq!(delivery.message_id.as_deref(), Some("late"));
}

#[tokio::test]
async fn test_channel_unacked_message_is_redelivered() {
    let bus = ChannelBus::new();
    bus.publish(&message("t", "k", "m1")).await.unwrap();
    bus.publish(&message("t", "k", "m2")).await.unwrap();

    {
        let mut sub = bus.subscribe("t", "g").await.unwrap();
        let first = sub.next().await.unwrap().unwrap();
        sub.ack(&first).await.unwrap();
        // m2 handed out but never acked
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.message_id.as_deref(), Some("m2"));
    }

    let mut sub = bus.subscribe("t", "g").await.unwrap();
    let again = sub.next().await.unwrap().unwrap();
    assert_eq!(again.message_id.as_deref(), Some("m2"));
    assert_eq!(bus.committed_offset("t", "g"), 1);
}

#[tokio::test]
async fn test_channel_groups_are_independent() {
    let bus = ChannelBus::new();
    bus.publish(&message("t", "k", "m1")).await.unwrap();

    let mut a = bus.subscribe("t", "a").await.unwrap();
    let mut b = bus.subscribe("t", "b").await.unwrap();

    let da = a.next().await.unwrap().unwrap();
    a.ack(&da).await.unwrap();
    let db = b.next().await.unwrap().unwrap();

    assert_eq!(da.message_id, db.message_id);
    assert_eq!(bus.committed_offset("t", "a"), 1);
    assert_eq!(bus.committed_offset("t", "b"), 0);
}

#[tokio::test]
async fn test_channel_acked_records_are_released() {
    let bus = ChannelBus::new();
    for id in ["m1", "m2", "m3"] {
        bus.publish(&message("t", "k", id)).await.unwrap();
    }

    {
        let mut sub = bus.subscribe("t", "g").await.unwrap();
        for _ in 0..2 {
            let delivery = sub.next().await.unwrap().unwrap();
            sub.ack(&delivery).await.unwrap();
        }
        // m3 handed out but never acked
        let third = sub.next().await.unwrap().unwrap();
        assert_eq!(third.offset, 2);
    }

    assert_eq!(bus.retained_count("t"), 1);
    assert_eq!(bus.published_count("t"), 3);

    let mut sub = bus.subscribe("t", "g").await.unwrap();
    let again = sub.next().await.unwrap().unwrap();
    assert_eq!(again.message_id.as_deref(), Some("m3"));
    assert_eq!(again.offset, 2, "offsets survive compaction");

    bus.publish(&message("t", "k", "m4")).await.unwrap();
    sub.ack(&again).await.unwrap();
    let fourth = sub.next().await.unwrap().unwrap();
    assert_eq!(fourth.message_id.as_deref(), Some("m4"));
    assert_eq!(fourth.offset, 3);
    assert_eq!(bus.retained_count("t"), 1);
}

#[tokio::test]
async fn test_channel_slowest_group_holds_records() {
    let bus = ChannelBus::new();
    let mut fast = bus.subscribe("t", "fast").await.unwrap();
    let mut slow = bus.subscribe("t", "slow").await.unwrap();
    bus.publish(&message("t", "k", "m1")).await.unwrap();
    bus.publish(&message("t", "k", "m2")).await.unwrap();

    for _ in 0..2 {
        let delivery = fast.next().await.unwrap().unwrap();
        fast.ack(&delivery).await.unwrap();
    }
    assert_eq!(bus.retained_count("t"), 2, "slow has acked nothing yet");

    let first = slow.next().await.unwrap().unwrap();
    slow.ack(&first).await.unwrap();
    assert_eq!(bus.retained_count("t"), 1);

    let second = slow.next().await.unwrap().unwrap();
    assert_eq!(second.message_id.as_deref(), Some("m2"));
    slow.ack(&second).await.unwrap();
    assert_eq!(bus.retained_count("t"), 0);
}

#[tokio::test]
async fn test_channel_late_group_starts_at_retained_records() {
    let bus = ChannelBus::new();
    let mut early = bus.subscribe("t", "early").await.unwrap();
    bus.publish(&message("t", "k", "m1")).await.unwrap();
    let delivery = early.next().await.unwrap().unwrap();
    early.ack(&delivery).await.unwrap();
    bus.publish(&message("t", "k", "m2")).await.unwrap();

    let mut late = bus.subscribe("t", "late").await.unwrap();
    let first = late.next().await.unwrap().unwrap();

    assert_eq!(first.message_id.as_deref(), Some("m2"));
    assert_eq!(bus.committed_offset("t", "late"), 1);
}

#[tokio::test]
async fn test_channel_close_ends_subscription() {
    let bus = ChannelBus::new();
    let mut sub = bus.subscribe("t", "g").await.unwrap();

    let closer = bus.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        closer.close();
    });

    let next = tokio::time::timeout(Duration::from_secs(1), sub.next())
        .await
        .expect("close should wake the subscription")
        .unwrap();
    assert!(next.is_none());
    assert!(matches!(
        bus.publish(&message("t", "k", "m")).await,
        Err(BusError::Closed)
    ));
}
