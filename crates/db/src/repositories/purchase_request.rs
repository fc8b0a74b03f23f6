use sqlx::Row;

use procura_core::domain::purchase_request::{PrStatus, PurchaseRequest, PurchaseRequestId};
use procura_core::ports::{Listing, PurchaseRequestStore, StoreError};

use super::{decode, encode, insert_error, unavailable, version_column};
use crate::DbPool;

const COLLECTION: &str = "purchaseRequests";

pub struct SqlPurchaseRequestStore {
    pool: DbPool,
}

impl SqlPurchaseRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_where(
        &self,
        clause: &str,
        statuses: &[PrStatus],
    ) -> Result<Listing<PurchaseRequest>, StoreError> {
        let sql = format!("SELECT id, document FROM purchase_requests WHERE {clause} ORDER BY created_at, id");
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(unavailable)?;
        let raw = rows.iter().map(raw_document).collect::<Result<Vec<_>, _>>()?;
        Ok(raw.iter().map(|(id, document)| decode_request(id, document)).collect())
    }
}

fn raw_document(row: &sqlx::sqlite::SqliteRow) -> Result<(String, String), StoreError> {
    let id: String = row.try_get("id").map_err(unavailable)?;
    let document: String = row.try_get("document").map_err(unavailable)?;
    Ok((id, document))
}

/// Decodes the stored document and re-checks the history invariants.
fn decode_request(id: &str, document: &str) -> Result<PurchaseRequest, StoreError> {
    let request: PurchaseRequest = decode(COLLECTION, id, document)?;
    request.check_invariants().map_err(|violation| StoreError::Malformed {
        collection: COLLECTION,
        id: id.to_string(),
        reason: violation.to_string(),
    })?;
    Ok(request)
}

#[async_trait::async_trait]
impl PurchaseRequestStore for SqlPurchaseRequestStore {
    async fn get(&self, id: &PurchaseRequestId) -> Result<Option<PurchaseRequest>, StoreError> {
        let row = sqlx::query("SELECT id, document FROM purchase_requests WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;

        match row {
            Some(ref r) => {
                let (id, document) = raw_document(r)?;
                Ok(Some(decode_request(&id, &document)?))
            }
            None => Ok(None),
        }
    }

    async fn list_by_status(&self, statuses: &[PrStatus]) -> Result<Listing<PurchaseRequest>, StoreError> {
        if statuses.is_empty() {
            return Ok(Listing::default());
        }
        let placeholders = vec!["?"; statuses.len()].join(", ");
        self.fetch_where(&format!("status IN ({placeholders})"), statuses).await
    }

    async fn list_quote_conflicts(&self) -> Result<Listing<PurchaseRequest>, StoreError> {
        self.fetch_where("status = ? AND quote_conflict = 1", &[PrStatus::PendingApproval]).await
    }

    async fn insert(&self, request: PurchaseRequest) -> Result<PurchaseRequest, StoreError> {
        request.check_invariants().map_err(|violation| StoreError::Malformed {
            collection: COLLECTION,
            id: request.id.0.clone(),
            reason: violation.to_string(),
        })?;
        let document = encode(COLLECTION, &request.id.0, &request)?;
        let version = version_column(COLLECTION, &request.id.0, request.version)?;

        sqlx::query(
            "INSERT INTO purchase_requests (id, organization_id, status, quote_conflict, version,
                                            document, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.organization_id.0)
        .bind(request.status.as_str())
        .bind(request.approval_workflow.quote_conflict)
        .bind(version)
        .bind(&document)
        .bind(request.created_at.to_rfc3339())
        .bind(request.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|error| insert_error(COLLECTION, &request.id.0, error))?;

        Ok(request)
    }

    async fn update(&self, mut request: PurchaseRequest) -> Result<PurchaseRequest, StoreError> {
        let expected_version = request.version;
        let expected = version_column(COLLECTION, &request.id.0, expected_version)?;
        request.version += 1;
        let next = version_column(COLLECTION, &request.id.0, request.version)?;
        let document = encode(COLLECTION, &request.id.0, &request)?;

        let result = sqlx::query(
            "UPDATE purchase_requests
             SET status = ?, quote_conflict = ?, version = ?, document = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(request.approval_workflow.quote_conflict)
        .bind(next)
        .bind(&document)
        .bind(request.updated_at.to_rfc3339())
        .bind(&request.id.0)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::StaleWrite { collection: COLLECTION, id: request.id.0, expected_version });
        }
        Ok(request)
    }
}
