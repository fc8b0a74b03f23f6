use sqlx::Row;

use procura_core::domain::vendor::{Vendor, VendorId};
use procura_core::ports::{Listing, StoreError, VendorStore};

use super::{decode, encode, insert_error, unavailable, version_column};
use crate::DbPool;

const COLLECTION: &str = "vendors";

pub struct SqlVendorStore {
    pool: DbPool,
}

impl SqlVendorStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn raw_document(row: &sqlx::sqlite::SqliteRow) -> Result<(String, String), StoreError> {
    let id: String = row.try_get("id").map_err(unavailable)?;
    let document: String = row.try_get("document").map_err(unavailable)?;
    Ok((id, document))
}

#[async_trait::async_trait]
impl VendorStore for SqlVendorStore {
    async fn get(&self, id: &VendorId) -> Result<Option<Vendor>, StoreError> {
        let row = sqlx::query("SELECT id, document FROM vendors WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(ref r) => {
                let (id, document) = raw_document(r)?;
                Ok(Some(decode(COLLECTION, &id, &document)?))
            }
            None => Ok(None),
        }
    }

    async fn list_approved(&self) -> Result<Listing<Vendor>, StoreError> {
        let rows = sqlx::query("SELECT id, document FROM vendors WHERE is_approved = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(unavailable)?;
        let raw = rows.iter().map(raw_document).collect::<Result<Vec<_>, _>>()?;
        Ok(raw.iter().map(|(id, document)| decode::<Vendor>(COLLECTION, id, document)).collect())
    }

    async fn insert(&self, vendor: Vendor) -> Result<Vendor, StoreError> {
        let document = encode(COLLECTION, &vendor.id.0, &vendor)?;
        let version = version_column(COLLECTION, &vendor.id.0, vendor.version)?;

        sqlx::query(
            "INSERT INTO vendors (id, organization_id, is_approved, version, document, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&vendor.id.0)
        .bind(&vendor.organization_id.0)
        .bind(vendor.is_approved)
        .bind(version)
        .bind(&document)
        .bind(vendor.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| insert_error(COLLECTION, &vendor.id.0, error))?;

        Ok(vendor)
    }

    async fn update(&self, mut vendor: Vendor) -> Result<Vendor, StoreError> {
        let expected_version = vendor.version;
        let expected = version_column(COLLECTION, &vendor.id.0, expected_version)?;
        vendor.version += 1;
        let next = version_column(COLLECTION, &vendor.id.0, vendor.version)?;
        let document = encode(COLLECTION, &vendor.id.0, &vendor)?;

        let result = sqlx::query(
            "UPDATE vendors SET is_approved = ?, version = ?, document = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(vendor.is_approved)
        .bind(next)
        .bind(&document)
        .bind(vendor.updated_at.to_rfc3339())
        .bind(&vendor.id.0)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleWrite { collection: COLLECTION, id: vendor.id.0, expected_version });
        }
        Ok(vendor)
    }
}
