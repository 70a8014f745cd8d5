//! Outbound message outbox.
//!
//! Messaging handlers hand rendered messages to this sender, which persists
//! them in `outbound_messages`. A delivery gateway (SMTP, SMS provider, push
//! service) drains the table and stamps `sent_at`.

use chrono::Utc;
use futures_util::future::BoxFuture;
use sqlx::Row;
use steward_core::collaborator::{
    Channel, CollaboratorError, DeliveryReceipt, MessageSender, OutboundMessage,
};
use uuid::Uuid;

use super::format_datetime;
use super::pool::DatabasePool;

/// A message row waiting for (or already handed to) a gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: String,
    pub channel: String,
    pub recipient_id: String,
    pub address: String,
    pub subject: Option<String>,
    pub body: String,
    pub execution_id: String,
    pub sent_at: Option<String>,
}

#[derive(Clone)]
pub struct SqliteOutbox {
    pool: DatabasePool,
}

impl SqliteOutbox {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Messages not yet picked up by a gateway, oldest first.
    pub async fn pending(&self, channel: Option<Channel>, limit: u32) -> Result<Vec<OutboxEntry>, sqlx::Error> {
        let rows = match channel {
            Some(channel) => {
                sqlx::query(
                    "SELECT * FROM outbound_messages WHERE sent_at IS NULL AND channel = ? ORDER BY created_at ASC LIMIT ?",
                )
                .bind(channel.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM outbound_messages WHERE sent_at IS NULL ORDER BY created_at ASC LIMIT ?",
                )
                .bind(i64::from(limit))
                .fetch_all(&self.pool.reader)
                .await?
            }
        };

        rows.iter()
            .map(|row| {
                Ok(OutboxEntry {
                    id: row.try_get("id")?,
                    channel: row.try_get("channel")?,
                    recipient_id: row.try_get("recipient_id")?,
                    address: row.try_get("address")?,
                    subject: row.try_get("subject")?,
                    body: row.try_get("body")?,
                    execution_id: row.try_get("execution_id")?,
                    sent_at: row.try_get("sent_at")?,
                })
            })
            .collect()
    }

    /// Mark a message as handed to its gateway. Returns `false` if unknown.
    pub async fn mark_sent(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE outbound_messages SET sent_at = ? WHERE id = ? AND sent_at IS NULL",
        )
        .bind(format_datetime(&Utc::now()))
        .bind(id)
        .execute(&self.pool.writer)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl MessageSender for SqliteOutbox {
    fn send<'a>(
        &'a self,
        message: &'a OutboundMessage,
    ) -> BoxFuture<'a, Result<DeliveryReceipt, CollaboratorError>> {
        Box::pin(async move {
            let id = Uuid::now_v7().to_string();
            sqlx::query(
                r#"INSERT INTO outbound_messages
                   (id, channel, recipient_id, address, subject, body, execution_id, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(message.channel.as_str())
            .bind(&message.recipient.id)
            .bind(&message.address)
            .bind(&message.subject)
            .bind(&message.body)
            .bind(message.execution_id.to_string())
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

            tracing::debug!(
                message_id = %id,
                channel = %message.channel,
                execution_id = %message.execution_id,
                "message queued in outbox"
            );
            Ok(DeliveryReceipt { message_id: id })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;
    use steward_core::collaborator::Contact;

    fn message(channel: Channel) -> OutboundMessage {
        OutboundMessage {
            channel,
            recipient: Contact {
                id: "m1".to_string(),
                display_name: Some("Ruth".to_string()),
                email: Some("ruth@example.org".to_string()),
                phone: None,
            },
            address: "ruth@example.org".to_string(),
            subject: Some("Welcome".to_string()),
            body: "Glad you are here.".to_string(),
            execution_id: Uuid::now_v7(),
        }
    }

    #[tokio::test]
    async fn test_send_queues_message() {
        let outbox = SqliteOutbox::new(test_pool().await);
        let receipt = outbox.send(&message(Channel::Email)).await.unwrap();
        outbox.send(&message(Channel::Sms)).await.unwrap();

        let emails = outbox.pending(Some(Channel::Email), 10).await.unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].id, receipt.message_id);
        assert_eq!(emails[0].address, "ruth@example.org");
        assert_eq!(emails[0].subject.as_deref(), Some("Welcome"));
        assert_eq!(outbox.pending(None, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_sent_removes_from_pending() {
        let outbox = SqliteOutbox::new(test_pool().await);
        let receipt = outbox.send(&message(Channel::Notification)).await.unwrap();

        assert!(outbox.mark_sent(&receipt.message_id).await.unwrap());
        assert!(!outbox.mark_sent(&receipt.message_id).await.unwrap());
        assert!(outbox.pending(None, 10).await.unwrap().is_empty());
    }
}
