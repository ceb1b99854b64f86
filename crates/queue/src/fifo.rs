use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use relay::{
    Deduplication, DeliveredMessage, GroupKey, MessageId, OutboundMessage, PublishError,
    QueueName, QueuePublisher,
};
use sha2::{Digest, Sha256};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::journal::{self, Journal, JournalEntry};
use crate::QueueError;

/// Queue behaviour knobs.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// How long a published body suppresses identical publishes.
    pub dedup_window: Duration,
    /// Receives after which a released message is dead-lettered instead of
    /// requeued. `None` retries forever.
    pub max_receive_count: Option<u32>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(300),
            max_receive_count: None,
        }
    }
}

/// Proof of one delivery, needed to acknowledge or release it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    message_id: MessageId,
    group_key: GroupKey,
    token: Uuid,
}

impl Receipt {
    /// The delivered message.
    pub fn message_id(&self) -> &MessageId {
        &self.message_id
    }
}

/// A received message together with its receipt.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: DeliveredMessage,
    pub receipt: Receipt,
}

/// What [`FifoQueue::release`] did with the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Back at the head of its group, visible again after the delay.
    Requeued,
    /// Receive limit reached; moved to the dead-letter list.
    DeadLettered,
}

#[derive(Debug)]
struct QueuedMessage {
    id: MessageId,
    sequence: u64,
    body: String,
    receive_count: u32,
    visible_at: Instant,
    in_flight: Option<Uuid>,
}

#[derive(Debug, Default)]
struct QueueState {
    groups: HashMap<GroupKey, VecDeque<QueuedMessage>>,
    dedup: HashMap<[u8; 32], (MessageId, Instant)>,
    dead_letters: Vec<DeliveredMessage>,
    next_sequence: u64,
    closed: bool,
    journal: Option<Journal>,
}

enum NextDelivery {
    Ready(Delivery),
    VisibleAt(Instant),
    Empty,
}

impl QueueState {
    /// Rebuilds the state a journal describes. Every restored message is
    /// visible at `now` and none is in flight.
    fn restore(entries: Vec<JournalEntry>, now: Instant) -> Self {
        let mut state = QueueState::default();
        for entry in entries {
            match entry {
                JournalEntry::Published {
                    message_id,
                    group_key,
                    sequence,
                    body,
                    receive_count,
                } => {
                    state.next_sequence = state.next_sequence.max(sequence + 1);
                    state
                        .groups
                        .entry(group_key)
                        .or_default()
                        .push_back(QueuedMessage {
                            id: message_id,
                            sequence,
                            body,
                            receive_count,
                            visible_at: now,
                            in_flight: None,
                        });
                }
                JournalEntry::Acked {
                    message_id,
                    group_key,
                } => {
                    state.remove(&group_key, &message_id);
                }
                JournalEntry::Released {
                    message_id,
                    group_key,
                    receive_count,
                } => {
                    let held = state
                        .groups
                        .get_mut(&group_key)
                        .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id));
                    if let Some(message) = held {
                        message.receive_count = receive_count;
                    }
                }
                JournalEntry::DeadLettered {
                    message_id,
                    group_key,
                    body,
                    receive_count,
                } => {
                    state.remove(&group_key, &message_id);
                    state.dead_letters.push(DeliveredMessage {
                        message_id,
                        group_key,
                        body,
                        receive_count,
                    });
                }
            }
        }
        state
    }

    /// The shortest journal that restores this state.
    fn snapshot(&self) -> Vec<JournalEntry> {
        let mut held: Vec<(&GroupKey, &QueuedMessage)> = self
            .groups
            .iter()
            .flat_map(|(group, messages)| messages.iter().map(move |m| (group, m)))
            .collect();
        held.sort_by_key(|(_, m)| m.sequence);

        let published = held.into_iter().map(|(group, m)| JournalEntry::Published {
            message_id: m.id.clone(),
            group_key: group.clone(),
            sequence: m.sequence,
            body: m.body.clone(),
            receive_count: m.receive_count,
        });
        let dead = self.dead_letters.iter().map(|d| JournalEntry::DeadLettered {
            message_id: d.message_id.clone(),
            group_key: d.group_key.clone(),
            body: d.body.clone(),
            receive_count: d.receive_count,
        });
        published.chain(dead).collect()
    }

    fn record(&mut self, entry: &JournalEntry) -> std::io::Result<()> {
        match &mut self.journal {
            Some(journal) => journal.append(entry),
            None => Ok(()),
        }
    }

    fn remove(&mut self, group: &GroupKey, id: &MessageId) -> Option<QueuedMessage> {
        let messages = self.groups.get_mut(group)?;
        let position = messages.iter().position(|m| &m.id == id)?;
        let removed = messages.remove(position);
        if messages.is_empty() {
            self.groups.remove(group);
        }
        removed
    }

    fn take_next(&mut self, now: Instant) -> NextDelivery {
        let mut ready: Option<(&GroupKey, u64)> = None;
        let mut earliest: Option<Instant> = None;

        for (group, messages) in &self.groups {
            let Some(head) = messages.front() else {
                continue;
            };
            if head.in_flight.is_some() {
                continue;
            }
            if head.visible_at > now {
                earliest = Some(earliest.map_or(head.visible_at, |e| e.min(head.visible_at)));
                continue;
            }
            if ready.map_or(true, |(_, sequence)| head.sequence < sequence) {
                ready = Some((group, head.sequence));
            }
        }

        let Some((group, _)) = ready else {
            return earliest.map_or(NextDelivery::Empty, NextDelivery::VisibleAt);
        };
        let group = group.clone();
        let Some(head) = self.groups.get_mut(&group).and_then(|m| m.front_mut()) else {
            return NextDelivery::Empty;
        };

        let token = Uuid::new_v4();
        head.in_flight = Some(token);
        head.receive_count += 1;
        NextDelivery::Ready(Delivery {
            message: DeliveredMessage {
                message_id: head.id.clone(),
                group_key: group.clone(),
                body: head.body.clone(),
                receive_count: head.receive_count,
            },
            receipt: Receipt {
                message_id: head.id.clone(),
                group_key: group,
                token,
            },
        })
    }

    fn in_flight_head(
        &mut self,
        receipt: &Receipt,
    ) -> Result<&mut VecDeque<QueuedMessage>, QueueError> {
        let stale = || QueueError::StaleReceipt {
            message_id: receipt.message_id.clone(),
        };
        let messages = self.groups.get_mut(&receipt.group_key).ok_or_else(stale)?;
        let current = messages.front().is_some_and(|head| {
            head.id == receipt.message_id && head.in_flight == Some(receipt.token)
        });
        if current {
            Ok(messages)
        } else {
            Err(stale())
        }
    }

    fn pop_head(&mut self, group: &GroupKey) -> Option<QueuedMessage> {
        let messages = self.groups.get_mut(group)?;
        let head = messages.pop_front();
        if messages.is_empty() {
            self.groups.remove(group);
        }
        head
    }
}

/// Ordered, deduplicating, redelivering in-process queue.
///
/// A queue created with [`FifoQueue::open`] journals every publish, ack and
/// release to disk, so accepted messages survive a restart. Journal appends
/// happen under the state lock and are flushed before the call returns.
#[derive(Debug)]
pub struct FifoQueue {
    name: QueueName,
    settings: QueueSettings,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl FifoQueue {
    /// Creates an empty queue.
    pub fn new(name: QueueName, settings: QueueSettings) -> Self {
        Self {
            name,
            settings,
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    /// Opens the journaled queue `name` under `dir`, restoring the messages
    /// and dead letters the journal holds. The dedup window starts empty.
    pub fn open(
        dir: impl AsRef<Path>,
        name: QueueName,
        settings: QueueSettings,
    ) -> Result<Self, QueueError> {
        let path = dir.as_ref().join(journal::file_name(name.as_str()));
        let journal_error = |e: std::io::Error| QueueError::Journal {
            path: path.display().to_string(),
            message: e.to_string(),
        };

        std::fs::create_dir_all(dir.as_ref()).map_err(journal_error)?;
        let replay = Journal::replay(&path).map_err(journal_error)?;
        let mut state = QueueState::restore(replay.entries, Instant::now());
        let journal = Journal::rewrite(&path, &state.snapshot()).map_err(journal_error)?;

        let held: usize = state.groups.values().map(VecDeque::len).sum();
        if replay.skipped > 0 {
            warn!(queue = %name, skipped = replay.skipped, "Unreadable journal lines skipped");
        }
        info!(
            queue = %name,
            journal = %journal.path().display(),
            messages = held,
            dead_letters = state.dead_letters.len(),
            "Queue restored from journal"
        );
        state.journal = Some(journal);

        Ok(Self {
            name,
            settings,
            state: Mutex::new(state),
            notify: Notify::new(),
        })
    }

    /// The queue name.
    pub fn name(&self) -> &QueueName {
        &self.name
    }

    // A panic while holding the lock cannot leave the state half-updated in
    // a way later operations depend on, so poisoning is ignored.
    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publishes `message` and returns its id, or the id of the original
    /// message when content-based deduplication collapses it.
    pub fn publish(&self, message: OutboundMessage) -> Result<MessageId, QueueError> {
        let now = Instant::now();
        let mut state = self.state();
        if state.closed {
            return Err(QueueError::Closed);
        }

        let window = self.settings.dedup_window;
        state
            .dedup
            .retain(|_, (_, published_at)| now.duration_since(*published_at) < window);

        let digest: Option<[u8; 32]> = match message.deduplication {
            Deduplication::ContentBased => Some(Sha256::digest(message.body.as_bytes()).into()),
            Deduplication::Disabled => None,
        };
        if let Some((original, _)) = digest.as_ref().and_then(|d| state.dedup.get(d)) {
            debug!(queue = %self.name, message_id = %original, "Duplicate publish collapsed");
            return Ok(original.clone());
        }

        let id = MessageId::random();
        let sequence = state.next_sequence;
        state
            .record(&JournalEntry::Published {
                message_id: id.clone(),
                group_key: message.group_key.clone(),
                sequence,
                body: message.body.clone(),
                receive_count: 0,
            })
            .map_err(|e| self.journal_error(&state, e))?;
        state.next_sequence += 1;
        if let Some(digest) = digest {
            state.dedup.insert(digest, (id.clone(), now));
        }
        state
            .groups
            .entry(message.group_key.clone())
            .or_default()
            .push_back(QueuedMessage {
                id: id.clone(),
                sequence,
                body: message.body,
                receive_count: 0,
                visible_at: now,
                in_flight: None,
            });
        drop(state);

        debug!(
            queue = %self.name,
            message_id = %id,
            group_key = %message.group_key,
            "Message published"
        );
        self.notify.notify_waiters();
        Ok(id)
    }

    /// Waits for the next deliverable message: the oldest visible message at
    /// the head of a group with nothing in flight.
    pub async fn receive(&self) -> Delivery {
        loop {
            // Registered before inspecting the state so a publish in between
            // is not missed.
            let notified = self.notify.notified();
            let next = self.state().take_next(Instant::now());
            match next {
                NextDelivery::Ready(delivery) => return delivery,
                NextDelivery::VisibleAt(at) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                NextDelivery::Empty => notified.await,
            }
        }
    }

    /// Removes an in-flight message, letting the next one in its group
    /// through.
    pub fn ack(&self, receipt: &Receipt) -> Result<(), QueueError> {
        let mut state = self.state();
        state.in_flight_head(receipt)?;
        let entry = JournalEntry::Acked {
            message_id: receipt.message_id.clone(),
            group_key: receipt.group_key.clone(),
        };
        if let Err(e) = state.record(&entry) {
            warn!(
                queue = %self.name,
                message_id = %receipt.message_id,
                error = %e,
                "Ack not journaled, message will be redelivered after a restart"
            );
        }
        state.pop_head(&receipt.group_key);
        drop(state);

        debug!(queue = %self.name, message_id = %receipt.message_id, "Message acknowledged");
        self.notify.notify_waiters();
        Ok(())
    }

    /// Returns an in-flight message to the head of its group, visible again
    /// after `delay`, or dead-letters it once its receive limit is reached.
    pub fn release(
        &self,
        receipt: &Receipt,
        delay: Duration,
    ) -> Result<ReleaseOutcome, QueueError> {
        let mut state = self.state();
        let exhausted = {
            let messages = state.in_flight_head(receipt)?;
            match (messages.front(), self.settings.max_receive_count) {
                (Some(head), Some(max)) => head.receive_count >= max,
                _ => false,
            }
        };

        let outcome = if exhausted {
            if let Some(head) = state.pop_head(&receipt.group_key) {
                self.journal_best_effort(
                    &mut state,
                    &JournalEntry::DeadLettered {
                        message_id: head.id.clone(),
                        group_key: receipt.group_key.clone(),
                        body: head.body.clone(),
                        receive_count: head.receive_count,
                    },
                );
                warn!(
                    queue = %self.name,
                    message_id = %head.id,
                    receive_count = head.receive_count,
                    "Receive limit reached, message dead-lettered"
                );
                state.dead_letters.push(DeliveredMessage {
                    message_id: head.id,
                    group_key: receipt.group_key.clone(),
                    body: head.body,
                    receive_count: head.receive_count,
                });
            }
            ReleaseOutcome::DeadLettered
        } else {
            let head = state
                .groups
                .get_mut(&receipt.group_key)
                .and_then(VecDeque::front_mut);
            let mut receive_count = None;
            if let Some(head) = head {
                head.in_flight = None;
                head.visible_at = Instant::now() + delay;
                receive_count = Some(head.receive_count);
            }
            if let Some(receive_count) = receive_count {
                self.journal_best_effort(
                    &mut state,
                    &JournalEntry::Released {
                        message_id: receipt.message_id.clone(),
                        group_key: receipt.group_key.clone(),
                        receive_count,
                    },
                );
            }
            debug!(
                queue = %self.name,
                message_id = %receipt.message_id,
                delay_ms = delay.as_millis() as u64,
                "Message released for redelivery"
            );
            ReleaseOutcome::Requeued
        };
        drop(state);

        self.notify.notify_waiters();
        Ok(outcome)
    }

    fn journal_error(&self, state: &QueueState, e: std::io::Error) -> QueueError {
        QueueError::Journal {
            path: state
                .journal
                .as_ref()
                .map_or_else(|| self.name.to_string(), |j| j.path().display().to_string()),
            message: e.to_string(),
        }
    }

    // Acks and releases stay applied in memory when the journal write fails;
    // the worst case after a restart is one extra delivery.
    fn journal_best_effort(&self, state: &mut QueueState, entry: &JournalEntry) {
        if let Err(e) = state.record(entry) {
            warn!(queue = %self.name, error = %e, "Queue journal write failed");
        }
    }

    /// Stops accepting publishes. Messages already queued can still be
    /// received.
    pub fn close(&self) {
        self.state().closed = true;
        info!(queue = %self.name, "Queue closed");
    }

    /// Messages held, in flight included.
    pub fn len(&self) -> usize {
        self.state().groups.values().map(VecDeque::len).sum()
    }

    /// Returns `true` if no message is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Messages that exhausted their receive limit, oldest first.
    pub fn dead_letters(&self) -> Vec<DeliveredMessage> {
        self.state().dead_letters.clone()
    }
}

#[async_trait]
impl QueuePublisher for FifoQueue {
    async fn publish(&self, message: OutboundMessage) -> Result<MessageId, PublishError> {
        FifoQueue::publish(self, message).map_err(|e| PublishError::Unavailable {
            message: format!("{}: {e}", self.name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> FifoQueue {
        FifoQueue::new(QueueName::new("relay.fifo").unwrap(), QueueSettings::default())
    }

    fn message(group: &str, body: &str) -> OutboundMessage {
        OutboundMessage {
            group_key: GroupKey::new(group).unwrap(),
            body: body.to_string(),
            deduplication: Deduplication::ContentBased,
        }
    }

    #[test]
    fn oldest_head_across_groups_goes_first() {
        let mut state = QueueState::default();
        let now = Instant::now();
        for (group, sequence) in [("b", 1), ("a", 0)] {
            state
                .groups
                .entry(GroupKey::new(group).unwrap())
                .or_default()
                .push_back(QueuedMessage {
                    id: MessageId::new(format!("m-{sequence}")).unwrap(),
                    sequence,
                    body: String::new(),
                    receive_count: 0,
                    visible_at: now,
                    in_flight: None,
                });
        }

        let NextDelivery::Ready(first) = state.take_next(now) else {
            panic!("expected a delivery");
        };
        assert_eq!(first.message.group_key.as_str(), "a");
        assert_eq!(first.message.receive_count, 1);
    }

    #[test]
    fn identical_bodies_collapse_within_the_window() {
        let queue = queue();

        let first = queue.publish(message("g", "same")).unwrap();
        let second = queue.publish(message("g", "same")).unwrap();

        assert_eq!(first, second);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn disabled_dedup_keeps_every_publish() {
        let queue = queue();
        let mut outbound = message("g", "same");
        outbound.deduplication = Deduplication::Disabled;

        let first = queue.publish(outbound.clone()).unwrap();
        let second = queue.publish(outbound).unwrap();

        assert_ne!(first, second);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn closed_queue_rejects_publishes() {
        let queue = queue();
        queue.close();

        assert_eq!(queue.publish(message("g", "x")), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn publisher_port_maps_closure_to_unavailable() {
        let queue = queue();
        queue.close();

        let err = QueuePublisher::publish(&queue, message("g", "x")).await.unwrap_err();

        assert!(matches!(err, PublishError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn receipts_are_single_use() {
        let queue = queue();
        queue.publish(message("g", "x")).unwrap();
        let delivery = queue.receive().await;

        queue.ack(&delivery.receipt).unwrap();

        assert!(matches!(
            queue.ack(&delivery.receipt),
            Err(QueueError::StaleReceipt { .. })
        ));
        assert!(queue.is_empty());
    }
}
