use sqlx::Row;

use procura_core::domain::notification::{DeliveryStatus, NotificationLog, NotificationSubject, NotificationType};
use procura_core::ports::{NotificationLogStore, StoreError};

use super::{decode, encode, insert_error, unavailable};
use crate::DbPool;

const COLLECTION: &str = "notificationLogs";

/// Append-only; logs are never rewritten.
pub struct SqlNotificationLogStore {
    pool: DbPool,
}

impl SqlNotificationLogStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn subject_columns(subject: &NotificationSubject) -> (&'static str, &str) {
    match subject {
        NotificationSubject::PurchaseRequest(id) => ("purchase_request", id.0.as_str()),
        NotificationSubject::Vendor(id) => ("vendor", id.0.as_str()),
        NotificationSubject::Digest(id) => ("digest", id.0.as_str()),
    }
}

#[async_trait::async_trait]
impl NotificationLogStore for SqlNotificationLogStore {
    async fn append(&self, log: NotificationLog) -> Result<(), StoreError> {
        let document = encode(COLLECTION, &log.id, &log)?;
        let (subject_kind, subject_id) = subject_columns(&log.subject);

        sqlx::query(
            "INSERT INTO notification_logs (id, notification_type, subject_kind, subject_id,
                                            status, timestamp, document)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&log.id)
        .bind(log.notification_type.as_str())
        .bind(subject_kind)
        .bind(subject_id)
        .bind(log.status.as_str())
        .bind(log.timestamp.to_rfc3339())
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(|error| insert_error(COLLECTION, &log.id, error))?;

        Ok(())
    }

    async fn has_sent(
        &self,
        notification_type: NotificationType,
        subject: &NotificationSubject,
    ) -> Result<bool, StoreError> {
        let (subject_kind, subject_id) = subject_columns(subject);
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                 SELECT 1 FROM notification_logs
                 WHERE notification_type = ? AND subject_kind = ? AND subject_id = ? AND status = ?
             )",
        )
        .bind(notification_type.as_str())
        .bind(subject_kind)
        .bind(subject_id)
        .bind(DeliveryStatus::Sent.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(exists != 0)
    }

    async fn list_for(&self, subject: &NotificationSubject) -> Result<Vec<NotificationLog>, StoreError> {
        let (subject_kind, subject_id) = subject_columns(subject);
        let rows = sqlx::query(
            "SELECT id, document FROM notification_logs
             WHERE subject_kind = ? AND subject_id = ?
             ORDER BY timestamp, id",
        )
        .bind(subject_kind)
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").map_err(unavailable)?;
                let document: String = row.try_get("document").map_err(unavailable)?;
                decode(COLLECTION, &id, &document)
            })
            .collect()
    }
}
