//! Postgres implementation of [`ReconcileStore`].
//!
//! All guarded transitions are single statements: the `Paid` gate is a
//! `WHERE payment_state <> 'paid'` predicate and the identity claim rides on
//! the partial unique indexes, so concurrent reconcilers in separate
//! processes serialize at the database rather than in application locks.

use async_trait::async_trait;
use compact_str::CompactString;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ReconcileStore, StoreError, SweepScope};
use crate::entities::enrollment::{EnrollmentRecord, PaymentCompletion};
use crate::entities::transaction::{TransactionRecord, TransactionUpsert};

/// [`ReconcileStore`] backed by the `enrollments` and `payment_transactions`
/// tables.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Translate a unique-index rejection into [`StoreError::Conflict`] so the
/// caller can re-derive its claim; everything else stays a database error.
fn map_claim_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) {
            return StoreError::Conflict {
                constraint: db.constraint().unwrap_or("unique").to_string(),
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl ReconcileStore for PgStore {
    #[tracing::instrument(skip_all, err, name = "SQL:UpsertTransaction")]
    async fn upsert_transaction(
        &self,
        upsert: TransactionUpsert,
    ) -> Result<TransactionRecord, StoreError> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO payment_transactions
                (external_id, enrollment_id, status, amount_in_cents, raw_snapshot)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (external_id) DO UPDATE
            SET status = EXCLUDED.status,
                amount_in_cents = EXCLUDED.amount_in_cents,
                raw_snapshot = EXCLUDED.raw_snapshot,
                updated_at = now()
            RETURNING external_id, enrollment_id, status, amount_in_cents, raw_snapshot,
                      created_at, updated_at
            "#,
        )
        .bind(upsert.external_id)
        .bind(upsert.enrollment_id)
        .bind(upsert.status)
        .bind(upsert.amount_in_cents)
        .bind(upsert.raw_snapshot)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:FindTransaction")]
    async fn find_transaction(
        &self,
        external_id: &str,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let record = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT external_id, enrollment_id, status, amount_in_cents, raw_snapshot,
                   created_at, updated_at
            FROM payment_transactions
            WHERE external_id = $1
            "#,
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:PendingTransactions")]
    async fn pending_transactions(
        &self,
        scope: SweepScope,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let records = match scope {
            SweepScope::Global => {
                sqlx::query_as::<_, TransactionRecord>(
                    r#"
                    SELECT external_id, enrollment_id, status, amount_in_cents, raw_snapshot,
                           created_at, updated_at
                    FROM payment_transactions
                    WHERE status = 'pending'
                    ORDER BY created_at ASC
                    "#,
                )
                .fetch_all(&self.pool)
                .await?
            }
            SweepScope::Enrollment(enrollment_id) => {
                sqlx::query_as::<_, TransactionRecord>(
                    r#"
                    SELECT external_id, enrollment_id, status, amount_in_cents, raw_snapshot,
                           created_at, updated_at
                    FROM payment_transactions
                    WHERE status = 'pending' AND enrollment_id = $1
                    ORDER BY created_at ASC
                    "#,
                )
                .bind(enrollment_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(records)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:EnrollmentById")]
    async fn enrollment_by_id(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(
            r#"
            SELECT id, given_names, first_surname, second_surname, payment_link_id,
                   payment_state, student_code, institutional_email, payer_name, payer_email,
                   payer_phone, payer_document, paid_at, created_at, updated_at
            FROM enrollments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:EnrollmentByPaymentLink")]
    async fn enrollment_by_payment_link(
        &self,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let record = sqlx::query_as::<_, EnrollmentRecord>(
            r#"
            SELECT id, given_names, first_surname, second_surname, payment_link_id,
                   payment_state, student_code, institutional_email, payer_name, payer_email,
                   payer_phone, payer_document, paid_at, created_at, updated_at
            FROM enrollments
            WHERE payment_link_id = $1
            "#,
        )
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:RecordPayment")]
    async fn record_payment(
        &self,
        id: Uuid,
        completion: PaymentCompletion,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let PaymentCompletion {
            payer,
            paid_at,
            identity,
        } = completion;
        let (student_code, institutional_email) = match identity {
            Some(identity) => (
                Some(identity.student_code),
                Some(identity.institutional_email),
            ),
            None => (None, None),
        };

        let updated = sqlx::query_as::<_, EnrollmentRecord>(
            r#"
            UPDATE enrollments
            SET payment_state = 'paid',
                payer_name = $2,
                payer_email = $3,
                payer_phone = $4,
                payer_document = $5,
                paid_at = $6,
                student_code = COALESCE(student_code, $7),
                institutional_email = COALESCE(institutional_email, $8),
                updated_at = now()
            WHERE id = $1 AND payment_state <> 'paid'
            RETURNING id, given_names, first_surname, second_surname, payment_link_id,
                      payment_state, student_code, institutional_email, payer_name, payer_email,
                      payer_phone, payer_document, paid_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(payer.name)
        .bind(payer.email)
        .bind(payer.phone)
        .bind(payer.document)
        .bind(paid_at)
        .bind(student_code)
        .bind(institutional_email)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_claim_error)?;

        match updated {
            Some(record) => Ok(Some(record)),
            // Zero rows: the enrollment is either already paid or missing.
            None => match self.enrollment_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(StoreError::EnrollmentMissing(id)),
            },
        }
    }

    #[tracing::instrument(skip_all, err, name = "SQL:RecordDecline")]
    async fn record_decline(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError> {
        let updated = sqlx::query_as::<_, EnrollmentRecord>(
            r#"
            UPDATE enrollments
            SET payment_state = 'declined',
                updated_at = now()
            WHERE id = $1 AND payment_state <> 'paid'
            RETURNING id, given_names, first_surname, second_surname, payment_link_id,
                      payment_state, student_code, institutional_email, payer_name, payer_email,
                      payer_phone, payer_document, paid_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(Some(record)),
            None => match self.enrollment_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(StoreError::EnrollmentMissing(id)),
            },
        }
    }

    #[tracing::instrument(skip_all, err, name = "SQL:AttachPaymentLink")]
    async fn attach_payment_link(
        &self,
        id: Uuid,
        link_id: &str,
    ) -> Result<Option<EnrollmentRecord>, StoreError> {
        let updated = sqlx::query_as::<_, EnrollmentRecord>(
            r#"
            UPDATE enrollments
            SET payment_link_id = $2,
                payment_state = 'link_generated',
                updated_at = now()
            WHERE id = $1 AND payment_state <> 'paid'
            RETURNING id, given_names, first_surname, second_surname, payment_link_id,
                      payment_state, student_code, institutional_email, payer_name, payer_email,
                      payer_phone, payer_document, paid_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(link_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(record) => Ok(Some(record)),
            None => match self.enrollment_by_id(id).await? {
                Some(_) => Ok(None),
                None => Err(StoreError::EnrollmentMissing(id)),
            },
        }
    }

    #[tracing::instrument(skip_all, err, name = "SQL:IssuedCodes")]
    async fn issued_codes(&self) -> Result<Vec<CompactString>, StoreError> {
        let codes = sqlx::query_scalar::<_, CompactString>(
            r#"
            SELECT student_code
            FROM enrollments
            WHERE student_code IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:CodeExists")]
    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM enrollments WHERE student_code = $1)
            "#,
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip_all, err, name = "SQL:EmailExists")]
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(SELECT 1 FROM enrollments WHERE institutional_email = $1)
            "#,
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
