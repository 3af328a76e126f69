//! Batched, topic-grouped publishing of committed outbox rows.
//!
//! Messages are grouped by topic in first-seen order. Each topic gets its own
//! sender, and its messages are packed into size-bounded batches in input
//! order. When a message does not fit, the current batch is sent and a fresh
//! one started. A message that does not fit an empty batch aborts the call.
//! Rows are marked processed as soon as the batch carrying them has been
//! acknowledged, so a later failure never re-marks or un-marks earlier ones.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tasklist_core::broker::{BrokerMessage, MessageBatch, MessageBroker, TopicSender};
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::event::is_routable_topic;
use tasklist_core::outbox::{OutboxMessage, OutboxRepository};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// One acknowledged batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentBatch {
    /// The topic the batch went to.
    pub topic: String,
    /// Ids of the carried outbox rows, in send order.
    pub message_ids: Vec<Uuid>,
    /// The `processed_on` stamp written for these rows.
    pub processed_on: DateTime<Utc>,
}

/// Result of a [`BatchPublisher::publish`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Acknowledged batches, in send order.
    pub batches: Vec<SentBatch>,
    /// Ids of rows that were not sent because their topic is blank.
    pub skipped: Vec<Uuid>,
}

impl PublishReport {
    /// Ids of every published row, in send order.
    #[must_use]
    pub fn published_ids(&self) -> Vec<Uuid> {
        self.batches
            .iter()
            .flat_map(|batch| batch.message_ids.iter().copied())
            .collect()
    }

    /// Number of rows published.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.message_ids.len()).sum()
    }

    /// Mirrors the processed stamps onto in-memory copies of the rows.
    pub fn apply_to(&self, messages: &mut [OutboxMessage]) {
        for batch in &self.batches {
            for message in messages
                .iter_mut()
                .filter(|message| batch.message_ids.contains(&message.id))
            {
                message.mark_processed(batch.processed_on);
            }
        }
    }
}

/// Publishes outbox rows to a [`MessageBroker`] in topic-grouped batches.
pub struct BatchPublisher {
    broker: Arc<dyn MessageBroker>,
    outbox: Arc<dyn OutboxRepository>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BatchPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchPublisher").finish_non_exhaustive()
    }
}

impl BatchPublisher {
    /// Creates a publisher that marks rows processed in `outbox`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        outbox: Arc<dyn OutboxRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            broker,
            outbox,
            clock,
        }
    }

    /// Sends `messages` and marks each acknowledged batch processed.
    ///
    /// Rows with a blank topic are logged and reported as skipped; they stay
    /// unprocessed. An empty input returns an empty report without touching
    /// the broker.
    ///
    /// # Errors
    ///
    /// - `DomainError::MessageTooLarge` if a message does not fit an empty batch.
    /// - `DomainError::Broker` if opening a sender or sending a batch fails.
    /// - `DomainError::Cancelled` if `cancel` fires before a topic starts or
    ///   while a batch is in flight.
    /// - `DomainError::Infrastructure` if marking rows processed fails.
    ///
    /// Batches acknowledged before the error stay processed.
    #[instrument(skip_all, fields(message_count = messages.len()))]
    pub async fn publish(
        &self,
        messages: &[OutboxMessage],
        cancel: &CancellationToken,
    ) -> Result<PublishReport, DomainError> {
        let mut report = PublishReport::default();
        if messages.is_empty() {
            debug!("no outbox messages to publish");
            return Ok(report);
        }

        for (topic, group) in group_by_topic(messages) {
            if !is_routable_topic(topic) {
                warn!(
                    count = group.len(),
                    "outbox messages have an empty topic; they will not be sent"
                );
                report.skipped.extend(group.iter().map(|message| message.id));
                continue;
            }
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }

            info!(topic, count = group.len(), "sending outbox messages");
            let mut sender = self.broker.create_sender(topic).await?;
            let outcome = self
                .send_group(sender.as_mut(), &group, cancel, &mut report)
                .await;
            if let Err(err) = sender.close().await {
                warn!(topic, error = %err, "failed to close broker sender");
            }
            outcome?;
        }

        Ok(report)
    }

    async fn send_group(
        &self,
        sender: &mut dyn TopicSender,
        group: &[&OutboxMessage],
        cancel: &CancellationToken,
        report: &mut PublishReport,
    ) -> Result<(), DomainError> {
        let mut batch = sender.create_batch().await?;
        let mut batch_ids = Vec::new();

        for message in group {
            let broker_message = to_broker_message(message)?;
            if let Err(rejected) = batch.try_add(broker_message) {
                if batch.is_empty() {
                    return Err(too_large(message));
                }
                let full = std::mem::replace(&mut batch, sender.create_batch().await?);
                self.flush(sender, full, std::mem::take(&mut batch_ids), cancel, report)
                    .await?;
                if batch.try_add(rejected).is_err() {
                    return Err(too_large(message));
                }
            }
            batch_ids.push(message.id);
        }

        if !batch.is_empty() {
            self.flush(sender, batch, batch_ids, cancel, report).await?;
        }
        Ok(())
    }

    async fn flush(
        &self,
        sender: &mut dyn TopicSender,
        batch: Box<dyn MessageBatch>,
        ids: Vec<Uuid>,
        cancel: &CancellationToken,
        report: &mut PublishReport,
    ) -> Result<(), DomainError> {
        let size = batch.len();
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DomainError::Cancelled),
            result = sender.send_batch(batch) => result?,
        }

        let processed_on = self.clock.now();
        self.outbox.mark_processed(&ids, processed_on).await?;
        debug!(topic = sender.topic(), size, "batch acknowledged");

        report.batches.push(SentBatch {
            topic: sender.topic().to_owned(),
            message_ids: ids,
            processed_on,
        });
        Ok(())
    }
}

/// Groups `messages` by topic, keeping first-seen topic order and row order.
pub(crate) fn group_by_topic(messages: &[OutboxMessage]) -> Vec<(&str, Vec<&OutboxMessage>)> {
    let mut groups: Vec<(&str, Vec<&OutboxMessage>)> = Vec::new();
    for message in messages {
        let topic = message.topic.as_str();
        if let Some(index) = groups.iter().position(|(seen, _)| *seen == topic) {
            groups[index].1.push(message);
        } else {
            groups.push((topic, vec![message]));
        }
    }
    groups
}

/// The broker body is the whole outbox row, not just the event content.
fn to_broker_message(message: &OutboxMessage) -> Result<BrokerMessage, DomainError> {
    let body = serde_json::to_vec(message)?;
    Ok(BrokerMessage::json(
        message.id,
        body,
        message.message_type.clone(),
    ))
}

fn too_large(message: &OutboxMessage) -> DomainError {
    DomainError::MessageTooLarge {
        message_id: message.id,
        topic: message.topic.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasklist_broker::InMemoryBroker;
    use tasklist_core::broker::BatchLimits;
    use tasklist_test_support::{
        FailingBroker, FixedClock, InMemoryOutbox, StallingBroker, outbox_message,
    };

    fn publisher_with(
        broker: Arc<dyn MessageBroker>,
        outbox: Arc<InMemoryOutbox>,
    ) -> BatchPublisher {
        BatchPublisher::new(broker, outbox, Arc::new(FixedClock::default()))
    }

    #[tokio::test]
    async fn test_empty_input_does_not_touch_broker() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::default());
        let publisher = publisher_with(broker.clone(), Arc::new(InMemoryOutbox::new()));

        // Act
        let report = publisher
            .publish(&[], &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(report, PublishReport::default());
        assert!(broker.senders_opened().is_empty());
    }

    #[tokio::test]
    async fn test_groups_by_topic_in_first_seen_order() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::default());
        let outbox = Arc::new(InMemoryOutbox::new());
        let messages = vec![
            outbox_message("A"),
            outbox_message("B"),
            outbox_message("A"),
        ];
        outbox.seed(messages.clone());
        let publisher = publisher_with(broker.clone(), outbox.clone());

        // Act
        let report = publisher
            .publish(&messages, &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(broker.senders_opened(), vec!["A", "B"]);
        assert_eq!(broker.open_senders(), 0);
        let a_ids: Vec<Uuid> = broker
            .messages_for("A")
            .iter()
            .map(|m| m.message_id)
            .collect();
        assert_eq!(a_ids, vec![messages[0].id, messages[2].id]);
        assert_eq!(report.batches.len(), 2);
        assert_eq!(report.published_count(), 3);
        assert!(outbox.messages().iter().all(|m| m.processed));
    }

    #[tokio::test]
    async fn test_body_is_outbox_row_json_with_type_subject() {
        let broker = Arc::new(InMemoryBroker::default());
        let message = outbox_message("A");
        let publisher = publisher_with(broker.clone(), Arc::new(InMemoryOutbox::new()));

        publisher
            .publish(std::slice::from_ref(&message), &CancellationToken::new())
            .await
            .unwrap();

        let sent = broker.messages_for("A");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, message.message_type);
        assert_eq!(sent[0].content_type, "application/json");
        let body: serde_json::Value = serde_json::from_slice(&sent[0].body).unwrap();
        assert_eq!(body["id"], message.id.to_string());
        assert_eq!(body["type"], message.message_type);
        assert_eq!(body["content"], message.content);
        assert_eq!(body["processed"], false);
    }

    #[tokio::test]
    async fn test_overflow_splits_into_several_batches_in_order() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::new(
            BatchLimits::default().with_max_messages(2),
        ));
        let outbox = Arc::new(InMemoryOutbox::new());
        let messages: Vec<OutboxMessage> = (0..5).map(|_| outbox_message("A")).collect();
        outbox.seed(messages.clone());
        let publisher = publisher_with(broker.clone(), outbox.clone());

        // Act
        let report = publisher
            .publish(&messages, &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        let sizes: Vec<usize> = broker
            .deliveries()
            .iter()
            .map(|d| d.messages.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(report.batches.len(), 3);
        assert_eq!(
            report.published_ids(),
            messages.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        assert_eq!(broker.senders_opened().len(), 1);
    }

    #[tokio::test]
    async fn test_message_too_large_for_empty_batch_fails() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::new(BatchLimits::bytes(16)));
        let message = outbox_message("A");
        let publisher = publisher_with(broker.clone(), Arc::new(InMemoryOutbox::new()));

        // Act
        let result = publisher
            .publish(std::slice::from_ref(&message), &CancellationToken::new())
            .await;

        // Assert
        match result {
            Err(DomainError::MessageTooLarge { message_id, topic }) => {
                assert_eq!(message_id, message.id);
                assert_eq!(topic, "A");
            }
            other => panic!("expected MessageTooLarge, got {other:?}"),
        }
        assert!(broker.deliveries().is_empty());
        assert_eq!(broker.open_senders(), 0);
    }

    #[tokio::test]
    async fn test_blank_topic_is_skipped_and_left_unprocessed() {
        // Arrange
        let broker = Arc::new(InMemoryBroker::default());
        let outbox = Arc::new(InMemoryOutbox::new());
        let messages = vec![outbox_message("  "), outbox_message("A")];
        outbox.seed(messages.clone());
        let publisher = publisher_with(broker.clone(), outbox.clone());

        // Act
        let report = publisher
            .publish(&messages, &CancellationToken::new())
            .await
            .unwrap();

        // Assert
        assert_eq!(report.skipped, vec![messages[0].id]);
        assert_eq!(report.published_ids(), vec![messages[1].id]);
        assert_eq!(broker.senders_opened(), vec!["A"]);
        assert!(!outbox.message(messages[0].id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_broker_failure_propagates_and_closes_sender() {
        let broker = Arc::new(FailingBroker::on_send());
        let outbox = Arc::new(InMemoryOutbox::new());
        let messages = vec![outbox_message("A")];
        outbox.seed(messages.clone());
        let publisher = publisher_with(broker.clone(), outbox.clone());

        let result = publisher
            .publish(&messages, &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(DomainError::Broker(_))));
        assert_eq!(broker.closed(), 1);
        assert!(!outbox.message(messages[0].id).unwrap().processed);
    }

    #[tokio::test]
    async fn test_sender_creation_failure_propagates() {
        let broker = Arc::new(FailingBroker::on_create_sender());
        let publisher = publisher_with(broker, Arc::new(InMemoryOutbox::new()));

        let result = publisher
            .publish(&[outbox_message("A")], &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(DomainError::Broker(_))));
    }

    #[tokio::test]
    async fn test_cancelled_token_sends_nothing() {
        let broker = Arc::new(InMemoryBroker::default());
        let publisher = publisher_with(broker.clone(), Arc::new(InMemoryOutbox::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = publisher.publish(&[outbox_message("A")], &cancel).await;

        assert!(matches!(result, Err(DomainError::Cancelled)));
        assert!(broker.senders_opened().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_send_keeps_acknowledged_batches_only() {
        // Arrange
        let limits = BatchLimits::default().with_max_messages(1);
        let broker = Arc::new(StallingBroker::after(1, limits));
        let outbox = Arc::new(InMemoryOutbox::new());
        let messages = vec![outbox_message("A"), outbox_message("A")];
        outbox.seed(messages.clone());
        let publisher = publisher_with(broker.clone(), outbox.clone());
        let cancel = CancellationToken::new();

        // Act
        let (result, ()) = tokio::join!(publisher.publish(&messages, &cancel), async {
            broker.wait_until_stalled().await;
            cancel.cancel();
        });

        // Assert
        assert!(matches!(result, Err(DomainError::Cancelled)));
        assert_eq!(broker.acknowledged(), vec![messages[0].id]);
        assert!(outbox.message(messages[0].id).unwrap().processed);
        assert!(!outbox.message(messages[1].id).unwrap().processed);
        assert_eq!(broker.closed(), 1);
    }

    #[test]
    fn test_apply_to_marks_only_published_rows() {
        let mut messages = vec![outbox_message("A"), outbox_message("B")];
        let at = FixedClock::default().now();
        let report = PublishReport {
            batches: vec![SentBatch {
                topic: "A".to_owned(),
                message_ids: vec![messages[0].id],
                processed_on: at,
            }],
            skipped: Vec::new(),
        };

        report.apply_to(&mut messages);

        assert_eq!(messages[0].processed_on, Some(at));
        assert!(!messages[1].processed);
    }
}
