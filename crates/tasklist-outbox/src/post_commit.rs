//! Unit of work decorator that publishes the outbox rows it just committed.

use std::sync::Arc;

use async_trait::async_trait;
use tasklist_core::capture::Participant;
use tasklist_core::error::DomainError;
use tasklist_core::repository::{CommitReceipt, UnitOfWork};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::batch_publisher::BatchPublisher;

/// Commits through `inner`, then hands the receipt's rows to the
/// [`BatchPublisher`].
///
/// The commit result is what the caller sees. A publish failure after a
/// successful commit is logged and swallowed: the rows stay unprocessed in the
/// outbox and the sweep delivers them later.
pub struct PublishingUnitOfWork {
    inner: Arc<dyn UnitOfWork>,
    publisher: Arc<BatchPublisher>,
}

impl PublishingUnitOfWork {
    /// Wraps `inner` so every successful commit is followed by a publish.
    #[must_use]
    pub fn new(inner: Arc<dyn UnitOfWork>, publisher: Arc<BatchPublisher>) -> Self {
        Self { inner, publisher }
    }
}

impl std::fmt::Debug for PublishingUnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishingUnitOfWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl UnitOfWork for PublishingUnitOfWork {
    async fn commit(
        &self,
        participants: &mut [&mut dyn Participant],
        cancel: &CancellationToken,
    ) -> Result<CommitReceipt, DomainError> {
        let mut receipt = self.inner.commit(participants, cancel).await?;
        if receipt.outbox_messages.is_empty() {
            return Ok(receipt);
        }

        match self.publisher.publish(&receipt.outbox_messages, cancel).await {
            Ok(report) => {
                report.apply_to(&mut receipt.outbox_messages);
                info!(
                    published = report.published_count(),
                    skipped = report.skipped.len(),
                    "post-commit publish finished"
                );
            }
            Err(err) => {
                warn!(
                    error = %err,
                    count = receipt.outbox_messages.len(),
                    "post-commit publish failed; rows left for redelivery"
                );
            }
        }
        Ok(receipt)
    }
}
