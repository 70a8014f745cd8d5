//! Durable delay scheduler.
//!
//! A delayed action is never waited on in-line. The runner records a
//! `PendingDelay` row ("resume this action execution at T") and returns; a
//! timer-driven worker later claims due rows and hands them back to the runner.
//! Thousands of simultaneously delayed actions cost one row each and no tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use steward_types::config::EngineConfig;
use steward_types::error::RepositoryError;
use steward_types::execution::PendingDelay;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::delay::DelayRepository;

use super::recorder::RecorderError;

/// Handle to a scheduled resumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    pub delay_id: Uuid,
    pub execution_id: Uuid,
    pub action_execution_id: Uuid,
    pub due_at: DateTime<Utc>,
}

/// Tunables for the delay worker, usually taken from `EngineConfig`.
#[derive(Debug, Clone)]
pub struct DelaySettings {
    pub poll_interval: Duration,
    pub batch_size: u32,
    pub claim_lease: Duration,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for DelaySettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.delay_poll_interval_ms.max(1)),
            batch_size: config.delay_batch_size.max(1),
            claim_lease: Duration::from_secs(config.delay_claim_lease_secs),
        }
    }
}

/// `now + duration`, or `None` when the result is not representable.
pub fn due_after(now: DateTime<Utc>, duration: Duration) -> Option<DateTime<Utc>> {
    let delta = chrono::Duration::from_std(duration).ok()?;
    now.checked_add_signed(delta)
}

pub struct DelayScheduler<Q: DelayRepository> {
    repo: Arc<Q>,
    wake: Arc<Notify>,
    settings: DelaySettings,
}

impl<Q: DelayRepository> DelayScheduler<Q> {
    pub fn new(repo: Arc<Q>, settings: DelaySettings) -> Self {
        Self {
            repo,
            wake: Arc::new(Notify::new()),
            settings,
        }
    }

    pub fn repo(&self) -> &Q {
        &self.repo
    }

    pub fn settings(&self) -> &DelaySettings {
        &self.settings
    }

    /// Schedule a resumption of `action_execution_id` after `duration`.
    ///
    /// Returns as soon as the row is durable; wakes the worker so it can
    /// recompute its next deadline.
    pub async fn after(
        &self,
        duration: Duration,
        execution_id: Uuid,
        action_execution_id: Uuid,
        action_id: Uuid,
    ) -> Result<ResumeToken, RecorderError> {
        let due_at = due_after(Utc::now(), duration).ok_or_else(|| {
            RecorderError::Repository(format!("delay of {}s is out of range", duration.as_secs()))
        })?;
        let delay = PendingDelay {
            id: Uuid::now_v7(),
            execution_id,
            action_execution_id,
            action_id,
            due_at,
            claimed_at: None,
        };
        self.repo.schedule(&delay).await?;
        self.wake.notify_one();

        tracing::debug!(
            execution_id = %execution_id,
            delay_id = %delay.id,
            due_at = %delay.due_at,
            "scheduled delayed action"
        );

        Ok(ResumeToken {
            delay_id: delay.id,
            execution_id,
            action_execution_id,
            due_at: delay.due_at,
        })
    }

    /// Claim the next batch of rows due at `now`.
    pub async fn claim_due(&self, now: DateTime<Utc>) -> Result<Vec<PendingDelay>, RepositoryError> {
        self.repo.claim_due(now, self.settings.batch_size).await
    }

    pub async fn complete(&self, delay_id: &Uuid) -> Result<(), RepositoryError> {
        self.repo.complete(delay_id).await
    }

    /// Re-queue rows whose claim is older than the lease (worker crashed mid-resume).
    pub async fn recover_stale(&self, now: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let lease = chrono::Duration::from_std(self.settings.claim_lease)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let released = self.repo.release_stale(now - lease).await?;
        if released > 0 {
            tracing::info!(released, "re-queued stale delay claims");
        }
        Ok(released)
    }

    /// Sleep until work may be due: the earliest due time, a new schedule,
    /// or the poll interval, whichever comes first.
    ///
    /// Returns `false` once `cancel` fires.
    pub async fn wait_for_work(&self, cancel: &CancellationToken) -> bool {
        let mut sleep_for = self.settings.poll_interval;
        match self.repo.next_due().await {
            Ok(Some(due_at)) => {
                let until = (due_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                sleep_for = sleep_for.min(until);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read next delay deadline"),
        }

        if sleep_for.is_zero() {
            return !cancel.is_cancelled();
        }

        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = self.wake.notified() => true,
            _ = tokio::time::sleep(sleep_for) => true,
        }
    }
}
