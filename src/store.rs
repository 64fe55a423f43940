//! SQLite subscription store.
//!
//! Holds the notification subscriptions and the chat integration credentials.
//! Every write runs inside one transaction, so a failed batch leaves the
//! previous rows untouched.

use crate::core::{CheckNotifications, Notification, NotificationType, OAuthCredential};
use crate::error::{StoreError, ValidationError};
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Embedded schema migrations, applied in order and recorded by name.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_notifications",
        include_str!("../migrations/0001_notifications.sql"),
    ),
    (
        "0002_canonical_chat_type",
        include_str!("../migrations/0002_canonical_chat_type.sql"),
    ),
];

const SELECT_NOTIFICATION: &str =
    "SELECT id, customer_id, user_id, check_id, type, value FROM notifications";

/// Thread-safe handle to the subscription database.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Opens (or creates) the database at `path` and brings its schema up to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        info!(path = %path.as_ref().display(), "Opening subscription store");
        Self::init(Connection::open(path)?)
    }

    /// A private database that lives as long as the returned store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name       TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        for (name, sql) in MIGRATIONS {
            let applied: Option<String> = conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            if applied.is_some() {
                continue;
            }

            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| StoreError::Migration(format!("{} failed: {}", name, e)))?;
            tx.execute(
                "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            debug!(migration = name, "Applied migration");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a transaction open:
        // rusqlite rolls back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- Subscriptions ---

    /// Upserts a batch by natural key and returns the stored rows with their ids.
    pub fn put(&self, notifications: &[Notification]) -> Result<Vec<Notification>, StoreError> {
        validate_all(notifications)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let stored = upsert(&tx, notifications)?;
        tx.commit()?;

        debug!(count = stored.len(), "Stored notifications");
        Ok(stored)
    }

    /// Upserts the batches of several checks as one unit. Each notification
    /// takes the check id of the batch it belongs to.
    pub fn put_multi_check(
        &self,
        batches: &[CheckNotifications],
    ) -> Result<Vec<CheckNotifications>, StoreError> {
        let normalized: Vec<(String, Vec<Notification>)> = batches
            .iter()
            .map(|batch| {
                let notifications = batch
                    .notifications
                    .iter()
                    .map(|n| Notification {
                        check_id: batch.check_id.clone(),
                        ..n.clone()
                    })
                    .collect::<Vec<_>>();
                (batch.check_id.clone(), notifications)
            })
            .collect();
        for (_, notifications) in &normalized {
            validate_all(notifications)?;
        }

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut stored = Vec::with_capacity(normalized.len());
        for (check_id, notifications) in &normalized {
            stored.push(CheckNotifications {
                check_id: check_id.clone(),
                notifications: upsert(&tx, notifications)?,
            });
        }
        tx.commit()?;

        debug!(checks = stored.len(), "Stored multi-check notifications");
        Ok(stored)
    }

    /// Replaces every subscription of `(customer_id, check_id)` with
    /// `notifications`. Readers see either the old set or the new one.
    pub fn replace_for_check(
        &self,
        customer_id: &str,
        check_id: &str,
        notifications: &[Notification],
    ) -> Result<Vec<Notification>, StoreError> {
        require_scope(customer_id, check_id)?;
        let normalized: Vec<Notification> = notifications
            .iter()
            .map(|n| Notification {
                customer_id: customer_id.to_string(),
                check_id: check_id.to_string(),
                ..n.clone()
            })
            .collect();
        validate_all(&normalized)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM notifications WHERE customer_id = ?1 AND check_id = ?2",
            params![customer_id, check_id],
        )?;
        let stored = upsert(&tx, &normalized)?;
        tx.commit()?;

        debug!(check_id, removed, added = stored.len(), "Replaced notifications for check");
        Ok(stored)
    }

    /// Updates the row addressed by `notification.id` within its customer.
    pub fn update(&self, notification: &Notification) -> Result<(), StoreError> {
        notification.validate()?;

        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE notifications SET user_id = ?1, check_id = ?2, type = ?3, value = ?4
             WHERE id = ?5 AND customer_id = ?6",
            params![
                notification.user_id,
                notification.check_id,
                notification.kind,
                notification.value,
                notification.id,
                notification.customer_id,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// All subscriptions of a customer.
    pub fn get(&self, customer_id: &str) -> Result<Vec<Notification>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE customer_id = ?1 ORDER BY id",
            SELECT_NOTIFICATION
        ))?;
        let notifications = stmt
            .query_map(params![customer_id], row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Subscriptions of a customer for a single check.
    pub fn get_by_check_id(
        &self,
        customer_id: &str,
        check_id: &str,
    ) -> Result<Vec<Notification>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "{} WHERE customer_id = ?1 AND check_id = ?2 ORDER BY id",
            SELECT_NOTIFICATION
        ))?;
        let notifications = stmt
            .query_map(params![customer_id, check_id], row_to_notification)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    /// Removes every subscription of `(customer_id, check_id)`.
    pub fn delete_by_check_id(&self, customer_id: &str, check_id: &str) -> Result<usize, StoreError> {
        require_scope(customer_id, check_id)?;

        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM notifications WHERE customer_id = ?1 AND check_id = ?2",
            params![customer_id, check_id],
        )?;
        debug!(check_id, removed, "Deleted notifications for check");
        Ok(removed)
    }

    /// Removes subscriptions by natural key. Rows that are already gone are
    /// not an error.
    pub fn delete(&self, notifications: &[Notification]) -> Result<usize, StoreError> {
        validate_all(notifications)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM notifications
                 WHERE customer_id = ?1 AND check_id = ?2 AND type = ?3 AND value = ?4",
            )?;
            for n in notifications {
                let (customer_id, check_id, kind, value) = n.natural_key();
                removed += stmt.execute(params![customer_id, check_id, kind, value])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    // --- Chat credentials ---

    /// Stores the whole credential, replacing any previous one for the customer.
    pub fn put_oauth_credential(
        &self,
        customer_id: &str,
        credential: &OAuthCredential,
    ) -> Result<(), StoreError> {
        if customer_id.trim().is_empty() {
            return Err(ValidationError("customer_id is required".into()).into());
        }
        credential.validate()?;
        let data = serde_json::to_string(credential)?;

        let conn = self.lock();
        conn.execute(
            "INSERT INTO chat_oauth_credentials (customer_id, data, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (customer_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![customer_id, data, Utc::now().to_rfc3339()],
        )?;
        info!(customer_id, team_id = %credential.team_id, "Stored chat credential");
        Ok(())
    }

    pub fn get_oauth_credential(
        &self,
        customer_id: &str,
    ) -> Result<Option<OAuthCredential>, StoreError> {
        let conn = self.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM chat_oauth_credentials WHERE customer_id = ?1",
                params![customer_id],
                |row| row.get(0),
            )
            .optional()?;
        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

fn validate_all(notifications: &[Notification]) -> Result<(), StoreError> {
    for n in notifications {
        n.validate()?;
    }
    Ok(())
}

fn require_scope(customer_id: &str, check_id: &str) -> Result<(), StoreError> {
    if customer_id.trim().is_empty() || check_id.trim().is_empty() {
        return Err(ValidationError("customer_id and check_id are required".into()).into());
    }
    Ok(())
}

fn upsert(tx: &Transaction<'_>, notifications: &[Notification]) -> Result<Vec<Notification>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO notifications (customer_id, user_id, check_id, type, value)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (customer_id, check_id, type, value) DO UPDATE SET user_id = excluded.user_id
         RETURNING id",
    )?;

    let mut stored = Vec::with_capacity(notifications.len());
    for n in notifications {
        let id: i64 = stmt.query_row(
            params![n.customer_id, n.user_id, n.check_id, n.kind, n.value],
            |row| row.get(0),
        )?;
        stored.push(Notification { id, ..n.clone() });
    }
    Ok(stored)
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        customer_id: row.get(1)?,
        user_id: row.get(2)?,
        check_id: row.get(3)?,
        kind: row.get(4)?,
        value: row.get(5)?,
    })
}

impl ToSql for NotificationType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for NotificationType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
