//! SQLite adapters for the core ports.
//!
//! Each table stores the serialized document next to the handful of columns
//! the sweeps filter on. Documents are decoded with the same strict serde
//! rules the core uses, so an unknown field or a broken status history
//! surfaces as `StoreError::Malformed` instead of a half-read record.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use procura_core::ports::{NotificationDispatcher, Ports, StoreError};

use crate::DbPool;

pub mod notification_log;
pub mod organization;
pub mod purchase_request;
pub mod rule;
pub mod user;
pub mod vendor;

pub use notification_log::SqlNotificationLogStore;
pub use organization::SqlOrganizationStore;
pub use purchase_request::SqlPurchaseRequestStore;
pub use rule::SqlRuleStore;
pub use user::SqlUserDirectory;
pub use vendor::SqlVendorStore;

/// Wires every store to `pool`; delivery stays with the supplied dispatcher.
pub fn sql_ports(pool: DbPool, dispatcher: Arc<dyn NotificationDispatcher>) -> Ports {
    Ports {
        purchase_requests: Arc::new(SqlPurchaseRequestStore::new(pool.clone())),
        vendors: Arc::new(SqlVendorStore::new(pool.clone())),
        organizations: Arc::new(SqlOrganizationStore::new(pool.clone())),
        rules: Arc::new(SqlRuleStore::new(pool.clone())),
        notification_logs: Arc::new(SqlNotificationLogStore::new(pool.clone())),
        users: Arc::new(SqlUserDirectory::new(pool)),
        dispatcher,
    }
}

pub(crate) fn unavailable(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

/// Maps a failed insert, turning primary-key collisions into `Duplicate`.
pub(crate) fn insert_error(collection: &'static str, id: &str, error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate { collection, id: id.to_string() }
        }
        _ => unavailable(error),
    }
}

pub(crate) fn encode<T: Serialize>(collection: &'static str, id: &str, document: &T) -> Result<String, StoreError> {
    serde_json::to_string(document).map_err(|error| StoreError::Malformed {
        collection,
        id: id.to_string(),
        reason: error.to_string(),
    })
}

pub(crate) fn decode<T: DeserializeOwned>(collection: &'static str, id: &str, raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|error| StoreError::Malformed {
        collection,
        id: id.to_string(),
        reason: error.to_string(),
    })
}

pub(crate) fn version_column(collection: &'static str, id: &str, version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Malformed {
        collection,
        id: id.to_string(),
        reason: format!("version {version} does not fit the version column"),
    })
}
