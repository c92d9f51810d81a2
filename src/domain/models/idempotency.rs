//! Idempotency record domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How long a captured response stays replayable.
pub const IDEMPOTENCY_TTL_HOURS: i64 = 24;

/// A captured response body for replaying duplicate mutating requests.
///
/// `key` is globally unique and scoped as `"<operation>:<client-key>"` so
/// the same client key cannot cross-replay between different operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub id: Uuid,
    pub key: String,
    pub status_code: u16,
    pub response_body: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    pub fn new(key: impl Into<String>, status_code: u16, response_body: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            key: key.into(),
            status_code,
            response_body,
            created_at: now,
            expires_at: now + Duration::hours(IDEMPOTENCY_TTL_HOURS),
        }
    }

    /// Build the unique lookup key for a client-supplied idempotency key.
    pub fn scoped_key(operation: &str, client_key: &str) -> String {
        format!("{operation}:{client_key}")
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
