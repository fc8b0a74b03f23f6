use sqlx::Row;

use procura_core::domain::organization::{OrganizationId, OrganizationRules, RuleNumber, RuleThreshold};
use procura_core::ports::{RuleStore, StoreError};

use super::{decode, encode, unavailable};
use crate::DbPool;

const COLLECTION: &str = "rules";

/// One row per `{orgId}_rule_{n}` document.
pub struct SqlRuleStore {
    pool: DbPool,
}

impl SqlRuleStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl RuleStore for SqlRuleStore {
    async fn find_rules(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<OrganizationRules>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, rule_number, document FROM organization_rules
             WHERE organization_id = ? ORDER BY rule_number",
        )
        .bind(&organization_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut rules = OrganizationRules::empty(organization_id.clone());
        for row in &rows {
            let id: String = row.try_get("id").map_err(unavailable)?;
            let number: i64 = row.try_get("rule_number").map_err(unavailable)?;
            let rule = u8::try_from(number).ok().and_then(RuleNumber::from_number).ok_or_else(|| {
                StoreError::Malformed {
                    collection: COLLECTION,
                    id: id.clone(),
                    reason: format!("unknown rule number {number}"),
                }
            })?;
            let document: String = row.try_get("document").map_err(unavailable)?;
            let threshold: RuleThreshold = decode(COLLECTION, &id, &document)?;
            rules.set(rule, threshold);
        }
        Ok(Some(rules))
    }

    async fn save_rule(
        &self,
        organization_id: &OrganizationId,
        rule: RuleNumber,
        threshold: RuleThreshold,
    ) -> Result<(), StoreError> {
        let id = rule.document_id(organization_id);
        let document = encode(COLLECTION, &id, &threshold)?;

        sqlx::query(
            "INSERT INTO organization_rules (id, organization_id, rule_number, document, updated_at)
             VALUES (?, ?, ?, ?, datetime('now'))
             ON CONFLICT(id) DO UPDATE SET
                 document = excluded.document,
                 updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(&organization_id.0)
        .bind(i64::from(rule.number()))
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }
}
