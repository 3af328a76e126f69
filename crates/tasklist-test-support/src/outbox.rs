//! In-memory unit of work, outbox repository and aggregate store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tasklist_core::capture::{Participant, capture_events};
use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::outbox::{OutboxMessage, OutboxRepository};
use tasklist_core::repository::{AggregateStore, CommitReceipt, StoredAggregate, UnitOfWork};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::clock::FixedClock;

#[derive(Debug, Default)]
struct State {
    aggregates: HashMap<(String, Uuid), StoredAggregate>,
    messages: Vec<OutboxMessage>,
    fail_next_commit: bool,
}

/// Stores aggregates and outbox rows in memory with the same all-or-nothing
/// commit semantics as the Postgres unit of work.
#[derive(Debug, Default)]
pub struct InMemoryOutbox {
    state: Mutex<State>,
    clock: FixedClock,
}

impl InMemoryOutbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts outbox rows directly, as if committed earlier.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, messages: Vec<OutboxMessage>) {
        self.state.lock().unwrap().messages.extend(messages);
    }

    /// Makes the next commit fail after capture, writing nothing.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_commit(&self) {
        self.state.lock().unwrap().fail_next_commit = true;
    }

    /// Snapshot of every stored outbox row, in insertion order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn messages(&self) -> Vec<OutboxMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// The stored row with `id`, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn message(&self, id: Uuid) -> Option<OutboxMessage> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|message| message.id == id)
            .cloned()
    }

    /// Number of stored aggregate snapshots.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn aggregate_count(&self) -> usize {
        self.state.lock().unwrap().aggregates.len()
    }
}

#[async_trait]
impl UnitOfWork for InMemoryOutbox {
    async fn commit(
        &self,
        participants: &mut [&mut dyn Participant],
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let updated_at = self.clock.now();
        let snapshots = participants
            .iter()
            .map(|participant| {
                Ok(StoredAggregate {
                    aggregate_type: participant.aggregate_type().to_owned(),
                    aggregate_id: participant.aggregate_id(),
                    state: participant.snapshot()?,
                    version: participant.expected_version() + 1,
                    updated_at,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;
        let captured = capture_events(participants)?;

        let mut state = self.state.lock().unwrap();
        if std::mem::take(&mut state.fail_next_commit) {
            return Err(DomainError::Infrastructure(
                "simulated commit failure".into(),
            ));
        }
        for (participant, snapshot) in participants.iter().zip(&snapshots) {
            let stored = state
                .aggregates
                .get(&(snapshot.aggregate_type.clone(), snapshot.aggregate_id))
                .map_or(0, |stored| stored.version);
            if stored != snapshot.version - 1 {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: participant.aggregate_type(),
                    aggregate_id: participant.aggregate_id(),
                    expected: snapshot.version - 1,
                });
            }
        }
        let aggregates_written = snapshots.len();
        for snapshot in snapshots {
            state.aggregates.insert(
                (snapshot.aggregate_type.clone(), snapshot.aggregate_id),
                snapshot,
            );
        }
        let mut inserted = Vec::with_capacity(captured.len());
        for message in captured {
            if state.messages.iter().all(|existing| existing.id != message.id) {
                state.messages.push(message.clone());
                inserted.push(message);
            }
        }

        drop(state);

        for participant in participants.iter_mut() {
            let version = participant.expected_version() + 1;
            participant.mark_committed(version);
        }
        Ok(CommitReceipt {
            aggregates_written,
            outbox_messages: inserted,
        })
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOutbox {
    async fn find_unprocessed(&self, ids: &[Uuid]) -> Result<Vec<OutboxMessage>, DomainError> {
        let state = self.state.lock().unwrap();
        let mut found: Vec<OutboxMessage> = state
            .messages
            .iter()
            .filter(|message| !message.processed && ids.contains(&message.id))
            .cloned()
            .collect();
        found.sort_by_key(|message| message.occurred_on);
        Ok(found)
    }

    async fn mark_processed(
        &self,
        ids: &[Uuid],
        processed_on: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let mut state = self.state.lock().unwrap();
        let mut changed = 0;
        for message in state
            .messages
            .iter_mut()
            .filter(|message| !message.processed && ids.contains(&message.id))
        {
            message.mark_processed(processed_on);
            changed += 1;
        }
        Ok(changed)
    }

    async fn find_stale(
        &self,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<OutboxMessage>, DomainError> {
        let state = self.state.lock().unwrap();
        let mut stale: Vec<OutboxMessage> = state
            .messages
            .iter()
            .filter(|message| {
                !message.processed
                    && message.occurred_on < older_than
                    && message.attempts < max_attempts
            })
            .cloned()
            .collect();
        stale.sort_by_key(|message| message.occurred_on);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }

    async fn record_attempt(&self, ids: &[Uuid]) -> Result<(), DomainError> {
        let mut state = self.state.lock().unwrap();
        for message in state
            .messages
            .iter_mut()
            .filter(|message| ids.contains(&message.id))
        {
            message.attempts += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl AggregateStore for InMemoryOutbox {
    async fn load(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Option<StoredAggregate>, DomainError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .aggregates
            .get(&(aggregate_type.to_owned(), aggregate_id))
            .cloned())
    }
}
