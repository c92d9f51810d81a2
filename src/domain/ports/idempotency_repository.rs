//! Idempotency record repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::IdempotencyRecord;

/// Repository interface for captured idempotent responses.
#[async_trait]
pub trait IdempotencyRepository: Send + Sync {
    /// Look up a record by its scoped key.
    async fn get(&self, key: &str) -> DomainResult<Option<IdempotencyRecord>>;

    /// Insert a record. On a concurrent duplicate the unique key rejects
    /// the insert and the stored winner is returned instead.
    async fn insert(&self, record: &IdempotencyRecord) -> DomainResult<IdempotencyRecord>;

    /// Bulk-delete records that expired before `now`; returns the count.
    async fn delete_expired(&self, now: DateTime<Utc>) -> DomainResult<u64>;
}
