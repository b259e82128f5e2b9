use compact_str::CompactString;
use uuid::Uuid;

use super::TransactionStatus;

/// An observed gateway transaction as persisted in `payment_transactions`.
///
/// The gateway's transaction id is the primary key and the idempotency key
/// for the whole pipeline: re-observing an id updates the row in place.
/// Rows are never deleted.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TransactionRecord {
    pub external_id: CompactString,
    pub enrollment_id: Uuid,
    pub status: TransactionStatus,
    pub amount_in_cents: i64,
    /// The gateway document verbatim, for audit.
    pub raw_snapshot: serde_json::Value,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

/// Data for upserting an observed transaction.
#[derive(Debug, Clone)]
pub struct TransactionUpsert {
    pub external_id: CompactString,
    pub enrollment_id: Uuid,
    pub status: TransactionStatus,
    pub amount_in_cents: i64,
    pub raw_snapshot: serde_json::Value,
}
