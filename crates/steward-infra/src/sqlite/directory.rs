//! SQLite reference directory.
//!
//! A small local stand-in for the host platform's member/user records:
//! contact lookup, custom-field updates, group memberships, and follow-up
//! tasks. Deployments embedded in a larger system replace these with
//! adapters over their own tables.

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use sqlx::Row;
use steward_core::collaborator::{
    CollaboratorError, Contact, GroupMembership, IdentityLookup, NewTask, RecordMutator,
    SubjectRef, TaskCreator,
};
use uuid::Uuid;

use super::format_datetime;
use super::pool::DatabasePool;

/// Contact columns `update_field` writes directly instead of into `fields`.
const CONTACT_COLUMNS: [&str; 3] = ["display_name", "email", "phone"];

fn unavailable(e: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Unavailable(e.to_string())
}

#[derive(Clone)]
pub struct SqliteDirectory {
    pool: DatabasePool,
}

impl SqliteDirectory {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a contact record.
    pub async fn upsert_contact(
        &self,
        subject: &SubjectRef,
        contact: &Contact,
    ) -> Result<(), CollaboratorError> {
        sqlx::query(
            r#"INSERT INTO directory_contacts (kind, id, display_name, email, phone, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(kind, id) DO UPDATE SET
                 display_name = excluded.display_name,
                 email = excluded.email,
                 phone = excluded.phone,
                 updated_at = excluded.updated_at"#,
        )
        .bind(subject.kind())
        .bind(subject.id())
        .bind(&contact.display_name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(unavailable)?;

        tracing::debug!(subject = %subject, "directory contact saved");
        Ok(())
    }

    /// Custom fields recorded for a subject.
    pub async fn fields(&self, subject: &SubjectRef) -> Result<Map<String, Value>, CollaboratorError> {
        let row = sqlx::query("SELECT fields FROM directory_contacts WHERE kind = ? AND id = ?")
            .bind(subject.kind())
            .bind(subject.id())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| CollaboratorError::NotFound(subject.to_string()))?;

        let raw: String = row.try_get("fields").map_err(unavailable)?;
        match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(e) => Err(unavailable(format!("corrupt fields JSON: {e}"))),
        }
    }

    pub async fn group_members(
        &self,
        group_id: &str,
    ) -> Result<Vec<(String, Option<String>)>, CollaboratorError> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            "SELECT member_id, role FROM group_memberships WHERE group_id = ? ORDER BY joined_at ASC",
        )
        .bind(group_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;
        Ok(rows)
    }

    pub async fn list_tasks(&self, limit: u32) -> Result<Vec<(String, NewTask)>, CollaboratorError> {
        let rows = sqlx::query(
            "SELECT * FROM follow_up_tasks ORDER BY created_at DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(unavailable)?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.try_get("id").map_err(unavailable)?;
            let due_at: Option<String> = row.try_get("due_at").map_err(unavailable)?;
            let execution_id: String = row.try_get("execution_id").map_err(unavailable)?;
            let task = NewTask {
                title: row.try_get("title").map_err(unavailable)?,
                description: row.try_get("description").map_err(unavailable)?,
                assignee_id: row.try_get("assignee_id").map_err(unavailable)?,
                member_id: row.try_get("member_id").map_err(unavailable)?,
                due_at: due_at
                    .as_deref()
                    .map(super::parse_datetime)
                    .transpose()
                    .map_err(unavailable)?,
                execution_id: super::parse_uuid(&execution_id).map_err(unavailable)?,
            };
            tasks.push((id, task));
        }
        Ok(tasks)
    }
}

impl IdentityLookup for SqliteDirectory {
    fn resolve<'a>(
        &'a self,
        subject: &'a SubjectRef,
    ) -> BoxFuture<'a, Result<Contact, CollaboratorError>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, display_name, email, phone FROM directory_contacts WHERE kind = ? AND id = ?",
            )
            .bind(subject.kind())
            .bind(subject.id())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(unavailable)?
            .ok_or_else(|| CollaboratorError::NotFound(subject.to_string()))?;

            Ok(Contact {
                id: row.try_get("id").map_err(unavailable)?,
                display_name: row.try_get("display_name").map_err(unavailable)?,
                email: row.try_get("email").map_err(unavailable)?,
                phone: row.try_get("phone").map_err(unavailable)?,
            })
        })
    }
}

impl RecordMutator for SqliteDirectory {
    fn update_field<'a>(
        &'a self,
        subject: &'a SubjectRef,
        field: &'a str,
        value: &'a Value,
    ) -> BoxFuture<'a, Result<(), CollaboratorError>> {
        Box::pin(async move {
            let now = format_datetime(&Utc::now());
            let result = if CONTACT_COLUMNS.contains(&field) {
                let text = match value {
                    Value::Null => None,
                    Value::String(s) => Some(s.clone()),
                    other => {
                        return Err(CollaboratorError::Rejected(format!(
                            "{field} must be a string, got {other}"
                        )));
                    }
                };
                // Column name comes from the fixed allow-list above.
                let sql = format!(
                    "UPDATE directory_contacts SET {field} = ?, updated_at = ? WHERE kind = ? AND id = ?"
                );
                sqlx::query(&sql)
                    .bind(text)
                    .bind(&now)
                    .bind(subject.kind())
                    .bind(subject.id())
                    .execute(&self.pool.writer)
                    .await
            } else {
                let encoded = serde_json::to_string(value).map_err(unavailable)?;
                sqlx::query(
                    "UPDATE directory_contacts SET fields = json_set(fields, ?, json(?)), updated_at = ? WHERE kind = ? AND id = ?",
                )
                .bind(format!("$.{field}"))
                .bind(encoded)
                .bind(&now)
                .bind(subject.kind())
                .bind(subject.id())
                .execute(&self.pool.writer)
                .await
            }
            .map_err(unavailable)?;

            if result.rows_affected() == 0 {
                return Err(CollaboratorError::NotFound(subject.to_string()));
            }
            tracing::debug!(subject = %subject, field, "record field updated");
            Ok(())
        })
    }
}

impl GroupMembership for SqliteDirectory {
    fn upsert_member<'a>(
        &'a self,
        group_id: &'a str,
        member_id: &'a str,
        role: Option<&'a str>,
    ) -> BoxFuture<'a, Result<bool, CollaboratorError>> {
        Box::pin(async move {
            let mut tx = self.pool.writer.begin().await.map_err(unavailable)?;

            let existing: Option<(String,)> = sqlx::query_as(
                "SELECT member_id FROM group_memberships WHERE group_id = ? AND member_id = ?",
            )
            .bind(group_id)
            .bind(member_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(unavailable)?;

            if existing.is_some() {
                sqlx::query("UPDATE group_memberships SET role = ? WHERE group_id = ? AND member_id = ?")
                    .bind(role)
                    .bind(group_id)
                    .bind(member_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(unavailable)?;
            } else {
                sqlx::query(
                    "INSERT INTO group_memberships (group_id, member_id, role, joined_at) VALUES (?, ?, ?, ?)",
                )
                .bind(group_id)
                .bind(member_id)
                .bind(role)
                .bind(format_datetime(&Utc::now()))
                .execute(&mut *tx)
                .await
                .map_err(unavailable)?;
            }

            tx.commit().await.map_err(unavailable)?;
            Ok(existing.is_none())
        })
    }
}

impl TaskCreator for SqliteDirectory {
    fn create_task<'a>(
        &'a self,
        task: &'a NewTask,
    ) -> BoxFuture<'a, Result<String, CollaboratorError>> {
        Box::pin(async move {
            let id = Uuid::now_v7().to_string();
            sqlx::query(
                r#"INSERT INTO follow_up_tasks
                   (id, title, description, assignee_id, member_id, due_at, execution_id, created_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(&id)
            .bind(&task.title)
            .bind(&task.description)
            .bind(&task.assignee_id)
            .bind(&task.member_id)
            .bind(task.due_at.as_ref().map(format_datetime))
            .bind(task.execution_id.to_string())
            .bind(format_datetime(&Utc::now()))
            .execute(&self.pool.writer)
            .await
            .map_err(unavailable)?;

            tracing::debug!(task_id = %id, "follow-up task created");
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::test_support::test_pool;
    use serde_json::json;

    fn ruth() -> (SubjectRef, Contact) {
        (
            SubjectRef::Member("m1".to_string()),
            Contact {
                id: "m1".to_string(),
                display_name: Some("Ruth".to_string()),
                email: Some("ruth@example.org".to_string()),
                phone: None,
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_contact() {
        let dir = SqliteDirectory::new(test_pool().await);
        let (subject, contact) = ruth();
        dir.upsert_contact(&subject, &contact).await.unwrap();

        assert_eq!(dir.resolve(&subject).await.unwrap(), contact);

        // Same id under a different kind is a different record.
        let user = SubjectRef::User("m1".to_string());
        assert!(matches!(
            dir.resolve(&user).await,
            Err(CollaboratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_custom_field_and_column() {
        let dir = SqliteDirectory::new(test_pool().await);
        let (subject, contact) = ruth();
        dir.upsert_contact(&subject, &contact).await.unwrap();

        dir.update_field(&subject, "status", &json!("visited")).await.unwrap();
        dir.update_field(&subject, "visits", &json!(3)).await.unwrap();
        dir.update_field(&subject, "phone", &json!("+15550100")).await.unwrap();

        let fields = dir.fields(&subject).await.unwrap();
        assert_eq!(fields["status"], "visited");
        assert_eq!(fields["visits"], 3);
        assert_eq!(dir.resolve(&subject).await.unwrap().phone.as_deref(), Some("+15550100"));

        assert!(matches!(
            dir.update_field(&subject, "email", &json!(42)).await,
            Err(CollaboratorError::Rejected(_))
        ));
        let ghost = SubjectRef::Member("ghost".to_string());
        assert!(matches!(
            dir.update_field(&ghost, "status", &json!("x")).await,
            Err(CollaboratorError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_group_upsert_is_idempotent() {
        let dir = SqliteDirectory::new(test_pool().await);
        assert!(dir.upsert_member("newcomers", "m1", None).await.unwrap());
        assert!(!dir.upsert_member("newcomers", "m1", Some("leader")).await.unwrap());

        let members = dir.group_members("newcomers").await.unwrap();
        assert_eq!(members, vec![("m1".to_string(), Some("leader".to_string()))]);
    }

    #[tokio::test]
    async fn test_create_task() {
        let dir = SqliteDirectory::new(test_pool().await);
        let task = NewTask {
            title: "Call Naomi".to_string(),
            description: None,
            assignee_id: Some("pastor-1".to_string()),
            member_id: Some("m1".to_string()),
            due_at: Some(Utc::now()),
            execution_id: Uuid::now_v7(),
        };
        let id = dir.create_task(&task).await.unwrap();

        let tasks = dir.list_tasks(10).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, id);
        assert_eq!(tasks[0].1.title, "Call Naomi");
        assert_eq!(tasks[0].1.assignee_id.as_deref(), Some("pastor-1"));
    }
}
