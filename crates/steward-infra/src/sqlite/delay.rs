//! SQLite delay queue implementation.
//!
//! Due times are stored as unix milliseconds so the claim query is a plain
//! range scan. Claims run on the single writer connection, so two workers
//! can never claim the same row.

use chrono::{DateTime, Utc};
use sqlx::Row;
use steward_core::repository::delay::DelayRepository;
use steward_types::error::RepositoryError;
use steward_types::execution::PendingDelay;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{parse_uuid, query_error};

/// SQLite-backed implementation of `DelayRepository`.
pub struct SqliteDelayRepository {
    pool: DatabasePool,
}

impl SqliteDelayRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| RepositoryError::Query(format!("timestamp out of range: {ms}")))
}

fn delay_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PendingDelay, RepositoryError> {
    let id: String = row.try_get("id").map_err(query_error)?;
    let execution_id: String = row.try_get("execution_id").map_err(query_error)?;
    let action_execution_id: String = row.try_get("action_execution_id").map_err(query_error)?;
    let action_id: String = row.try_get("action_id").map_err(query_error)?;
    let due_at_ms: i64 = row.try_get("due_at_ms").map_err(query_error)?;
    let claimed_at_ms: Option<i64> = row.try_get("claimed_at_ms").map_err(query_error)?;

    Ok(PendingDelay {
        id: parse_uuid(&id)?,
        execution_id: parse_uuid(&execution_id)?,
        action_execution_id: parse_uuid(&action_execution_id)?,
        action_id: parse_uuid(&action_id)?,
        due_at: from_millis(due_at_ms)?,
        claimed_at: claimed_at_ms.map(from_millis).transpose()?,
    })
}

impl DelayRepository for SqliteDelayRepository {
    async fn schedule(&self, delay: &PendingDelay) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO pending_delays
               (id, execution_id, action_execution_id, action_id, due_at_ms, claimed_at_ms)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(delay.id.to_string())
        .bind(delay.execution_id.to_string())
        .bind(delay.action_execution_id.to_string())
        .bind(delay.action_id.to_string())
        .bind(delay.due_at.timestamp_millis())
        .bind(delay.claimed_at.map(|t| t.timestamp_millis()))
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<PendingDelay>, RepositoryError> {
        let now_ms = now.timestamp_millis();
        let rows = sqlx::query(
            r#"UPDATE pending_delays SET claimed_at_ms = ?
               WHERE id IN (
                 SELECT id FROM pending_delays
                 WHERE claimed_at_ms IS NULL AND due_at_ms <= ?
                 ORDER BY due_at_ms ASC
                 LIMIT ?
               )
               RETURNING id, execution_id, action_execution_id, action_id, due_at_ms, claimed_at_ms"#,
        )
        .bind(now_ms)
        .bind(now_ms)
        .bind(i64::from(limit))
        .fetch_all(&self.pool.writer)
        .await
        .map_err(query_error)?;

        let mut claimed = rows.iter().map(delay_from_row).collect::<Result<Vec<_>, _>>()?;
        claimed.sort_by_key(|d| d.due_at);
        Ok(claimed)
    }

    async fn complete(&self, id: &Uuid) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM pending_delays WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn release_stale(&self, claimed_before: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "UPDATE pending_delays SET claimed_at_ms = NULL WHERE claimed_at_ms IS NOT NULL AND claimed_at_ms < ?",
        )
        .bind(claimed_before.timestamp_millis())
        .execute(&self.pool.writer)
        .await
        .map_err(query_error)?;

        Ok(result.rows_affected())
    }

    async fn next_due(&self) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(due_at_ms) FROM pending_delays WHERE claimed_at_ms IS NULL",
        )
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_error)?;

        row.0.map(from_millis).transpose()
    }

    async fn list_pending(&self, limit: u32) -> Result<Vec<PendingDelay>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM pending_delays ORDER BY due_at_ms ASC LIMIT ?")
            .bind(i64::from(limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_error)?;

        rows.iter().map(delay_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;

    fn delay_due_in(seconds: i64) -> PendingDelay {
        PendingDelay {
            id: Uuid::now_v7(),
            execution_id: Uuid::now_v7(),
            action_execution_id: Uuid::now_v7(),
            action_id: Uuid::now_v7(),
            due_at: Utc::now() + chrono::Duration::seconds(seconds),
            claimed_at: None,
        }
    }

    #[tokio::test]
    async fn test_claim_due_is_ordered_limited_and_exclusive() {
        let repo = SqliteDelayRepository::new(test_pool().await);
        let late = delay_due_in(120);
        let early = delay_due_in(60);
        let future = delay_due_in(86_400);
        for d in [&late, &early, &future] {
            repo.schedule(d).await.unwrap();
        }

        let now = Utc::now() + chrono::Duration::minutes(5);
        let first = repo.claim_due(now, 1).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id, early.id);
        assert!(first[0].claimed_at.is_some());

        let rest = repo.claim_due(now, 10).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, late.id);

        assert!(repo.claim_due(now, 10).await.unwrap().is_empty());
        assert_eq!(repo.list_pending(10).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_next_due_ignores_claimed_rows() {
        let repo = SqliteDelayRepository::new(test_pool().await);
        assert!(repo.next_due().await.unwrap().is_none());

        let soon = delay_due_in(10);
        let later = delay_due_in(600);
        repo.schedule(&soon).await.unwrap();
        repo.schedule(&later).await.unwrap();

        let next = repo.next_due().await.unwrap().unwrap();
        assert_eq!(next.timestamp_millis(), soon.due_at.timestamp_millis());

        repo.claim_due(Utc::now() + chrono::Duration::seconds(30), 10)
            .await
            .unwrap();
        let next = repo.next_due().await.unwrap().unwrap();
        assert_eq!(next.timestamp_millis(), later.due_at.timestamp_millis());
    }

    #[tokio::test]
    async fn test_complete_and_release_stale() {
        let repo = SqliteDelayRepository::new(test_pool().await);
        let a = delay_due_in(1);
        let b = delay_due_in(1);
        repo.schedule(&a).await.unwrap();
        repo.schedule(&b).await.unwrap();

        let claim_time = Utc::now() + chrono::Duration::seconds(10);
        assert_eq!(repo.claim_due(claim_time, 10).await.unwrap().len(), 2);

        repo.complete(&a.id).await.unwrap();
        assert_eq!(repo.list_pending(10).await.unwrap().len(), 1);

        assert_eq!(repo.release_stale(claim_time).await.unwrap(), 0);
        let released = repo
            .release_stale(claim_time + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(released, 1);

        let again = repo.claim_due(claim_time, 10).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, b.id);
    }

    #[tokio::test]
    async fn test_one_delay_per_action_execution() {
        let repo = SqliteDelayRepository::new(test_pool().await);
        let first = delay_due_in(5);
        let mut duplicate = delay_due_in(5);
        duplicate.action_execution_id = first.action_execution_id;

        repo.schedule(&first).await.unwrap();
        assert!(repo.schedule(&duplicate).await.is_err());
    }
}
