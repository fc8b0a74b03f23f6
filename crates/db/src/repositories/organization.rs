use sqlx::Row;

use procura_core::domain::organization::{Organization, OrganizationId};
use procura_core::ports::{OrganizationStore, StoreError};

use super::{decode, encode, unavailable};
use crate::DbPool;

const COLLECTION: &str = "organizations";

pub struct SqlOrganizationStore {
    pool: DbPool,
}

impl SqlOrganizationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl OrganizationStore for SqlOrganizationStore {
    async fn get(&self, id: &OrganizationId) -> Result<Option<Organization>, StoreError> {
        let row = sqlx::query("SELECT document FROM organizations WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(row) => {
                let document: String = row.try_get("document").map_err(unavailable)?;
                Ok(Some(decode(COLLECTION, &id.0, &document)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, organization: Organization) -> Result<(), StoreError> {
        let document = encode(COLLECTION, &organization.id.0, &organization)?;

        sqlx::query(
            "INSERT INTO organizations (id, active, document, updated_at)
             VALUES (?, ?, ?, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                 active = excluded.active,
                 document = excluded.document,
                 updated_at = excluded.updated_at",
        )
        .bind(&organization.id.0)
        .bind(organization.active)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }
}
