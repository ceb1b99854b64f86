use std::sync::Arc;
use std::time::Duration;

use queue::{FifoQueue, QueueSettings, ReleaseOutcome};
use relay::{Deduplication, GroupKey, OutboundMessage, QueueName};
use tokio::time::{timeout, Instant};

fn queue(settings: QueueSettings) -> FifoQueue {
    FifoQueue::new(QueueName::new("relay.fifo").unwrap(), settings)
}

fn message(group: &str, body: &str) -> OutboundMessage {
    OutboundMessage {
        group_key: GroupKey::new(group).unwrap(),
        body: body.to_string(),
        deduplication: Deduplication::ContentBased,
    }
}

async fn nothing_deliverable(queue: &FifoQueue) -> bool {
    timeout(Duration::from_millis(100), queue.receive())
        .await
        .is_err()
}

#[tokio::test]
async fn group_is_delivered_in_publish_order_one_at_a_time() {
    let queue = queue(QueueSettings::default());
    for body in ["a", "b", "c"] {
        queue.publish(message("orders", body)).unwrap();
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let delivery = queue.receive().await;
        assert!(nothing_deliverable(&queue).await, "head of group is in flight");
        seen.push(delivery.message.body.clone());
        queue.ack(&delivery.receipt).unwrap();
    }

    assert_eq!(seen, vec!["a", "b", "c"]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn different_groups_are_delivered_concurrently() {
    let queue = queue(QueueSettings::default());
    queue.publish(message("g1", "a")).unwrap();
    queue.publish(message("g1", "b")).unwrap();
    queue.publish(message("g2", "c")).unwrap();

    let first = queue.receive().await;
    let second = queue.receive().await;

    assert_eq!(first.message.body, "a");
    assert_eq!(second.message.body, "c");
    assert!(nothing_deliverable(&queue).await);
}

#[tokio::test]
async fn released_message_is_redelivered_before_its_successors() {
    let queue = queue(QueueSettings::default());
    queue.publish(message("orders", "first")).unwrap();
    queue.publish(message("orders", "second")).unwrap();

    let delivery = queue.receive().await;
    let released_at = Instant::now();
    assert_eq!(
        queue
            .release(&delivery.receipt, Duration::from_millis(150))
            .unwrap(),
        ReleaseOutcome::Requeued
    );

    let again = queue.receive().await;

    assert!(released_at.elapsed() >= Duration::from_millis(150));
    assert_eq!(again.message.body, "first");
    assert_eq!(again.message.message_id, delivery.message.message_id);
    assert_eq!(again.message.receive_count, 2);
}

#[tokio::test]
async fn receive_limit_moves_the_message_to_dead_letters() {
    let queue = queue(QueueSettings {
        max_receive_count: Some(2),
        ..QueueSettings::default()
    });
    queue.publish(message("orders", "poison")).unwrap();
    queue.publish(message("orders", "next")).unwrap();

    let first = queue.receive().await;
    queue.release(&first.receipt, Duration::ZERO).unwrap();
    let second = queue.receive().await;
    let outcome = queue.release(&second.receipt, Duration::ZERO).unwrap();

    assert_eq!(outcome, ReleaseOutcome::DeadLettered);
    let dead = queue.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, "poison");
    assert_eq!(dead[0].receive_count, 2);
    assert_eq!(queue.receive().await.message.body, "next");
}

#[tokio::test]
async fn waiting_receiver_wakes_on_publish() {
    let queue = Arc::new(queue(QueueSettings::default()));
    let receiver = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.receive().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let id = queue.publish(message("orders", "late")).unwrap();

    let delivery = timeout(Duration::from_secs(2), receiver)
        .await
        .expect("receiver woke")
        .unwrap();
    assert_eq!(delivery.message.message_id, id);
}

#[tokio::test]
async fn dedup_window_expires() {
    let queue = queue(QueueSettings {
        dedup_window: Duration::from_millis(50),
        ..QueueSettings::default()
    });

    let first = queue.publish(message("orders", "same")).unwrap();
    tokio::time::sleep(Duration::from_millis(80)).await;
    let second = queue.publish(message("orders", "same")).unwrap();

    assert_ne!(first, second);
    assert_eq!(queue.len(), 2);
}
