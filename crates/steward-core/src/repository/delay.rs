//! Delay queue repository trait definition.
//!
//! Each pending delay is a row with a due time. Workers claim due rows,
//! resume the owning execution, then complete (delete) the row.

use chrono::{DateTime, Utc};
use steward_types::error::RepositoryError;
use steward_types::execution::PendingDelay;
use uuid::Uuid;

pub trait DelayRepository: Send + Sync {
    /// Insert a new pending delay.
    fn schedule(
        &self,
        delay: &PendingDelay,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically claim up to `limit` unclaimed rows due at or before `now`,
    /// stamping `claimed_at = now`. Returned rows are ordered by due time.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PendingDelay>, RepositoryError>> + Send;

    /// Remove a delay once its resumption has been handled.
    fn complete(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Clear claims stamped before `claimed_before` so the rows become due
    /// again. Returns the number of released rows.
    fn release_stale(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<u64, RepositoryError>> + Send;

    /// Due time of the earliest unclaimed row, if any.
    fn next_due(
        &self,
    ) -> impl std::future::Future<Output = Result<Option<DateTime<Utc>>, RepositoryError>> + Send;

    /// List pending rows (claimed or not), earliest first.
    fn list_pending(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<PendingDelay>, RepositoryError>> + Send;
}
