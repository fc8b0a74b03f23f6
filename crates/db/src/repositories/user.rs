use sqlx::Row;

use procura_core::domain::user::{User, UserId};
use procura_core::ports::{StoreError, UserDirectory};

use super::{decode, encode, unavailable};
use crate::DbPool;

const COLLECTION: &str = "users";

pub struct SqlUserDirectory {
    pool: DbPool,
}

impl SqlUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserDirectory for SqlUserDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT document FROM users WHERE id = ?")
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

    async fn save_user(&self, user: User) -> Result<(), StoreError> {
        let document = encode(COLLECTION, &user.id.0, &user)?;

        sqlx::query(
            "INSERT INTO users (id, organization_id, email, active, document)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 organization_id = excluded.organization_id,
                 email = excluded.email,
                 active = excluded.active,
                 document = excluded.document",
        )
        .bind(&user.id.0)
        .bind(&user.organization_id.0)
        .bind(&user.email)
        .bind(user.active)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(())
    }
}
