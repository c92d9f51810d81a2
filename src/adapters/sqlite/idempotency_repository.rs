//! SQLite implementation of the IdempotencyRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::IdempotencyRecord;
use crate::domain::ports::IdempotencyRepository;

#[derive(Clone)]
pub struct SqliteIdempotencyRepository {
    pool: SqlitePool,
}

impl SqliteIdempotencyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyRepository for SqliteIdempotencyRepository {
    async fn get(&self, key: &str) -> DomainResult<Option<IdempotencyRecord>> {
        let row: Option<IdempotencyRow> = sqlx::query_as("SELECT * FROM idempotency_records WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn insert(&self, record: &IdempotencyRecord) -> DomainResult<IdempotencyRecord> {
        let result = sqlx::query(
            "INSERT INTO idempotency_records (id, key, status_code, response_body, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.key)
        .bind(i64::from(record.status_code))
        .bind(record.response_body.to_string())
        .bind(record.created_at.to_rfc3339())
        .bind(record.expires_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(record.clone()),
            // A concurrent duplicate won the insert race; replay its record.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => self
                .get(&record.key)
                .await?
                .ok_or_else(|| DomainError::Database("idempotency record vanished after conflict".to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at < ?")
            .bind(now.to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    id: String,
    key: String,
    status_code: i64,
    response_body: String,
    created_at: String,
    expires_at: String,
}

impl TryFrom<IdempotencyRow> for IdempotencyRecord {
    type Error = DomainError;

    fn try_from(row: IdempotencyRow) -> Result<Self, Self::Error> {
        let status_code = u16::try_from(row.status_code)
            .map_err(|_| DomainError::Serialization(format!("Invalid status_code: {}", row.status_code)))?;
        let response_body = serde_json::from_str(&row.response_body)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;

        Ok(IdempotencyRecord {
            id: super::parse_uuid(&row.id)?,
            key: row.key,
            status_code,
            response_body,
            created_at: super::parse_datetime(&row.created_at)?,
            expires_at: super::parse_datetime(&row.expires_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use chrono::Duration;

    #[tokio::test]
    async fn test_insert_conflict_returns_winner() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteIdempotencyRepository::new(pool);

        let first = IdempotencyRecord::new("size:k-1", 200, serde_json::json!({"points": 5}));
        let stored = repo.insert(&first).await.unwrap();
        assert_eq!(stored.id, first.id);

        let duplicate = IdempotencyRecord::new("size:k-1", 200, serde_json::json!({"points": 9}));
        let winner = repo.insert(&duplicate).await.unwrap();
        assert_eq!(winner.id, first.id);
        assert_eq!(winner.response_body["points"], 5);
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteIdempotencyRepository::new(pool);

        let mut stale = IdempotencyRecord::new("size:old", 200, serde_json::json!({}));
        stale.expires_at = Utc::now() - Duration::hours(1);
        repo.insert(&stale).await.unwrap();
        repo.insert(&IdempotencyRecord::new("size:new", 200, serde_json::json!({})))
            .await
            .unwrap();

        let removed = repo.delete_expired(Utc::now()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get("size:old").await.unwrap().is_none());
        assert!(repo.get("size:new").await.unwrap().is_some());
    }
}
