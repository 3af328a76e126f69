//! Background redelivery of outbox rows left unprocessed.

use std::sync::Arc;
use std::time::Duration;

use tasklist_core::clock::Clock;
use tasklist_core::error::DomainError;
use tasklist_core::outbox::{OutboxMessage, OutboxRepository};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::batch_publisher::{BatchPublisher, group_by_topic};

/// Tuning for [`OutboxSweeper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepConfig {
    /// Time between sweeps. Must be non-zero for [`OutboxSweeper::run`].
    pub interval: Duration,
    /// Rows younger than this are left to the post-commit publish.
    pub min_age: Duration,
    /// Rows attempted this many times are no longer selected.
    pub max_attempts: i32,
    /// Maximum rows per sweep.
    pub batch_size: i64,
}

impl SweepConfig {
    /// Longest accepted `min_age`.
    pub const MAX_MIN_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

    /// Checks the values a sweep depends on.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a non-positive batch size or
    /// attempt limit, or a `min_age` above [`Self::MAX_MIN_AGE`].
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.batch_size < 1 {
            return Err(DomainError::Validation(format!(
                "sweep batch size must be positive, got {}",
                self.batch_size
            )));
        }
        if self.max_attempts < 1 {
            return Err(DomainError::Validation(format!(
                "sweep max attempts must be positive, got {}",
                self.max_attempts
            )));
        }
        if self.min_age > Self::MAX_MIN_AGE {
            return Err(DomainError::Validation(format!(
                "sweep min age must not exceed {}s",
                Self::MAX_MIN_AGE.as_secs()
            )));
        }
        Ok(())
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            min_age: Duration::from_secs(60),
            max_attempts: 5,
            batch_size: 100,
        }
    }
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub selected: usize,
    pub published: usize,
    pub skipped: usize,
    /// Rows in topics whose publish failed. Batches acknowledged before the
    /// failure are already processed and also counted here.
    pub failed: usize,
}

/// Periodically republishes stale unprocessed outbox rows.
pub struct OutboxSweeper {
    outbox: Arc<dyn OutboxRepository>,
    publisher: Arc<BatchPublisher>,
    clock: Arc<dyn Clock>,
    config: SweepConfig,
}

impl std::fmt::Debug for OutboxSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxSweeper")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OutboxSweeper {
    #[must_use]
    pub fn new(
        outbox: Arc<dyn OutboxRepository>,
        publisher: Arc<BatchPublisher>,
        clock: Arc<dyn Clock>,
        config: SweepConfig,
    ) -> Self {
        Self {
            outbox,
            publisher,
            clock,
            config,
        }
    }

    /// Selects stale rows and republishes them one topic at a time.
    ///
    /// Each topic's rows are charged an attempt just before they are offered
    /// to the broker, so a row that keeps failing stops being selected after
    /// `max_attempts` sweeps. Rows with a blank topic are charged too. A
    /// failing topic is logged and counted in [`SweepReport::failed`]; the
    /// remaining topics are still published.
    ///
    /// # Errors
    ///
    /// - `DomainError::Validation` if the configuration is out of range.
    /// - `DomainError::Cancelled` if `cancel` fires.
    /// - Repository errors from selecting rows or recording attempts.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<SweepReport, DomainError> {
        self.config.validate()?;
        let older_than = chrono::Duration::from_std(self.config.min_age)
            .ok()
            .and_then(|min_age| self.clock.now().checked_sub_signed(min_age))
            .ok_or_else(|| DomainError::Validation("sweep min age is out of range".into()))?;

        let stale = self
            .outbox
            .find_stale(older_than, self.config.max_attempts, self.config.batch_size)
            .await?;
        if stale.is_empty() {
            debug!("no stale outbox messages");
            return Ok(SweepReport::default());
        }
        info!(count = stale.len(), "republishing stale outbox messages");

        let mut report = SweepReport {
            selected: stale.len(),
            ..SweepReport::default()
        };
        for (topic, group) in group_by_topic(&stale) {
            if cancel.is_cancelled() {
                return Err(DomainError::Cancelled);
            }
            let ids: Vec<Uuid> = group.iter().map(|message| message.id).collect();
            self.outbox.record_attempt(&ids).await?;

            let rows: Vec<OutboxMessage> = group.into_iter().cloned().collect();
            match self.publisher.publish(&rows, cancel).await {
                Ok(published) => {
                    report.published += published.published_count();
                    report.skipped += published.skipped.len();
                }
                Err(DomainError::Cancelled) => return Err(DomainError::Cancelled),
                Err(err) => {
                    warn!(topic, count = rows.len(), error = %err, "republishing topic failed");
                    report.failed += rows.len();
                }
            }
        }
        Ok(report)
    }

    /// Sweeps every `interval` until `cancel` fires. Errors are logged and the
    /// loop carries on.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        if self.config.interval.is_zero() {
            warn!("outbox sweep interval is zero; sweep disabled");
            return;
        }
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.config.interval.as_secs(), "outbox sweep started");

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep_once(&cancel).await {
                Ok(report) if report.selected > 0 => info!(
                    selected = report.selected,
                    published = report.published,
                    skipped = report.skipped,
                    failed = report.failed,
                    "outbox sweep finished"
                ),
                Ok(_) => {}
                Err(DomainError::Cancelled) => break,
                Err(err) => warn!(error = %err, "outbox sweep failed"),
            }
        }
        info!("outbox sweep stopped");
    }
}
