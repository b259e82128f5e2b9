//! In-memory implementation of [`ReconcileStore`].
//!
//! Backs tests and local runs without Postgres. One `RwLock` guards both
//! maps so every trait method is as atomic as its single-statement
//! counterpart in [`super::PgStore`], including the uniqueness checks the
//! database would enforce through its partial unique indexes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use compact_str::CompactString;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ReconcileStore, StoreError, SweepScope};
use crate::entities::PaymentState;
use crate::entities::enrollment::{EnrollmentRecord, PaymentCompletion};
use crate::entities::transaction::{TransactionRecord, TransactionUpsert};
use crate::utils::clock::now_utc;

#[derive(Default)]
struct Inner {
    enrollments: HashMap<Uuid, EnrollmentRecord>,
    transactions: HashMap<CompactString, TransactionRecord>,
}

/// A thread-safe in-memory reconciliation store.
#[derive(Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an enrollment row. This is the seam the admissions
    /// side uses; tests seed fixtures through it.
    pub async fn put_enrollment(&self, record: EnrollmentRecord) {
        let mut inner = self.inner.write().await;
        inner.enrollments.insert(record.id, record);
    }
}

#[async_trait]
impl ReconcileStore for MemoryStore {
    async fn upsert_transaction(
        &self,
        upsert: TransactionUpsert,
    ) -> Result<TransactionRecord, StoreError> {
        let mut inner = self.inner.write().await;
        let now = now_utc();
        let record = inner
            .transactions
            .entry(upsert.external_id.clone())
            .and_modify(|existing| {
                existing.status = upsert.status;
                existing.amount_in_cents = upsert.amount_in_cents;
                existing.raw_snapshot = upsert.raw_snapshot.clone();
                existing.updated_at = now;
            })
            .or_insert_with(|| TransactionRecord {
                external_id: upsert.external_id.clone(),
                enrollment_id: upsert.enrollment_id,
                status: upsert.status,
                amount_in_cents: upsert.amount_in_cents,
                raw_snapshot: upsert.raw_snapshot.clone(),
                created_at: now,
                updated_at: now,
            })
            .clone();
        Ok(record)
    }

    async fn find_transaction(
        &self,
        external_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.transactions.get(external_id).cloned())
    }

    async fn pending_transactions(
        &self,
        scope: SweepScope,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<TransactionRecord> = inner
            .transactions
            .values()
            .filter(|t| t.status == crate::entities::TransactionStatus::Pending)
            .filter(|t| match scope {
                SweepScope::Global => true,
                SweepScope::Enrollment(id) => t.enrollment_id == id,
            })
            .cloned()
            .collect();
        records.sort_by_key(|t| t.created_at);
        Ok(records)
    }

    async fn enrollment_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.enrollments.get(&id).cloned())
    }

    async fn enrollment_by_payment_link(
        &self,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .find(|e| e.payment_link_id.as_deref() == Some(link_id))
            .cloned())
    }

    async fn record_payment(
        &self,
        id: Uuid,
        completion: PaymentCompletion,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let mut inner = self.inner.write().await;

        let current = inner
            .enrollments
            .get(&id)
            .ok_or(StoreError::EnrollmentMissing(id))?;
        if current.payment_state == PaymentState::Paid {
            return Ok(None);
        }

        // Mirror COALESCE: an existing identity is never overwritten, and
        // only values that would actually be written hit the unique check.
        let new_code = match (&current.student_code, &completion.identity) {
            (None, Some(identity)) => Some(identity.student_code.clone()),
            _ => None,
        };
        let new_email = match (&current.institutional_email, &completion.identity) {
            (None, Some(identity)) => Some(identity.institutional_email.clone()),
            _ => None,
        };

        if let Some(code) = &new_code {
            if inner
                .enrollments
                .values()
                .any(|e| e.id != id && e.student_code.as_ref() == Some(code))
            {
                return Err(StoreError::Conflict {
                    constraint: "enrollments_student_code_key".to_string(),
                });
            }
        }
        if let Some(email) = &new_email {
            if inner
                .enrollments
                .values()
                .any(|e| e.id != id && e.institutional_email.as_ref() == Some(email))
            {
                return Err(StoreError::Conflict {
                    constraint: "enrollments_institutional_email_key".to_string(),
                });
            }
        }

        let record = inner
            .enrollments
            .get_mut(&id)
            .ok_or(StoreError::EnrollmentMissing(id))?;
        record.payment_state = PaymentState::Paid;
        record.payer_name = completion.payer.name;
        record.payer_email = completion.payer.email;
        record.payer_phone = completion.payer.phone;
        record.payer_document = completion.payer.document;
        record.paid_at = Some(completion.paid_at);
        if let Some(code) = new_code {
            record.student_code = Some(code);
        }
        if let Some(email) = new_email {
            record.institutional_email = Some(email);
        }
        record.updated_at = now_utc();
        Ok(Some(record.clone()))
    }

    async fn record_decline(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .enrollments
            .get_mut(&id)
            .ok_or(StoreError::EnrollmentMissing(id))?;
        if record.payment_state == PaymentState::Paid {
            return Ok(None);
        }
        record.payment_state = PaymentState::Declined;
        record.updated_at = now_utc();
        Ok(Some(record.clone()))
    }

    async fn attach_payment_link(
        &self,
        id: Uuid,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner
            .enrollments
            .get_mut(&id)
            .ok_or(StoreError::EnrollmentMissing(id))?;
        if record.payment_state == PaymentState::Paid {
            return Ok(None);
        }
        record.payment_link_id = Some(CompactString::from(link_id));
        record.payment_state = PaymentState::LinkGenerated;
        record.updated_at = now_utc();
        Ok(Some(record.clone()))
    }

    async fn issued_codes(&self) -> Result<Vec<CompactString>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .filter_map(|e| e.student_code.clone())
            .collect())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .any(|e| e.student_code.as_deref() == Some(code)))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .enrollments
            .values()
            .any(|e| e.institutional_email.as_deref() == Some(email)))
    }
}
