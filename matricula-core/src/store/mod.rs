//! Persistence port for the reconciliation pipeline.
//!
//! [`ReconcileStore`] is the seam between the reconciler and storage. The
//! production implementation is [`PgStore`]; [`MemoryStore`] backs tests.
//! Every mutation that guards an invariant (one identity per enrollment,
//! `Paid` never downgraded) is expressed as a single conditional write so
//! the guard holds across processes, not just tasks.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use compact_str::CompactString;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::enrollment::{EnrollmentRecord, PaymentCompletion};
use crate::entities::transaction::{TransactionRecord, TransactionUpsert};

/// Errors from the reconciliation store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness guard rejected a claim. The caller is expected to
    /// re-derive its candidate and retry.
    #[error("uniqueness conflict on {constraint}")]
    Conflict { constraint: String },

    /// The enrollment id does not exist.
    #[error("enrollment not found: {0}")]
    EnrollmentMissing(Uuid),
}

/// Which pending transactions a sweep should load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepScope {
    /// Every transaction still persisted as pending.
    Global,
    /// Only pending transactions tied to one enrollment.
    Enrollment(Uuid),
}

/// Storage operations the reconciliation pipeline needs.
#[async_trait]
pub trait ReconcileStore: Send + Sync {
    /// Insert or update an observed transaction in one atomic statement,
    /// keyed by the gateway's transaction id. Re-observing an id overwrites
    /// `status` and `raw_snapshot` in place; rows are never deleted.
    async fn upsert_transaction(
        &self,
        upsert: TransactionUpsert,
    ) -> Result<TransactionRecord, StoreError>;

    async fn find_transaction(
        &self,
        external_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    /// Pending transactions in `scope`, oldest first.
    async fn pending_transactions(
        &self,
        scope: SweepScope,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    async fn enrollment_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError>;

    /// Resolve the enrollment a gateway payment link belongs to.
    async fn enrollment_by_payment_link(
        &self,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError>;

    /// Commit the transition into `Paid`: payer fields, `paid_at`, and the
    /// identity pair (when provided) in one guarded write.
    ///
    /// Returns `Ok(None)` when the enrollment was already `Paid` (nothing
    /// written), `Err(StoreError::Conflict)` when a uniqueness guard
    /// rejected the identity claim.
    async fn record_payment(
        &self,
        id: Uuid,
        completion: PaymentCompletion,
    ) -> Result<Option<EnrollmentRecord>, StoreError>;

    /// Move the enrollment to `Declined` unless it is `Paid`.
    ///
    /// Returns `Ok(None)` when the enrollment was `Paid` and left untouched.
    async fn record_decline(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError>;

    /// Attach a freshly created payment link and move the enrollment to
    /// `LinkGenerated`, unless it is `Paid`.
    async fn attach_payment_link(
        &self,
        id: Uuid,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError>;

    /// Every student code currently on the roster. The issuer reconstructs
    /// its counter from this scan on each allocation.
    async fn issued_codes(&self) -> Result<Vec<CompactString>, StoreError>;

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;
}
