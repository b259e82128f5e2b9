//! The reconciler: one gateway snapshot in, at most one state transition out.
//!
//! Every path into the system converges here, whether a webhook delivery, an
//! operator request, or the periodic sweep. The algorithm is built so that
//! replaying it for the same transaction is always safe: a snapshot whose
//! status matches the stored row short-circuits, and every enrollment
//! mutation is a conditional write that refuses to fire twice.

use std::sync::Arc;

use compact_str::CompactString;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::enrollment::{PayerDetails, PaymentCompletion};
use crate::entities::transaction::TransactionUpsert;
use crate::entities::{PaymentState, TransactionStatus};
use crate::events::{NoticeSender, PaymentNotice};
use crate::gateway::{GatewayError, PaymentGateway, TransactionSnapshot};
use crate::identity::{IdentityIssuer, IssueError};
use crate::notify::NoticeDeduper;
use crate::store::{ReconcileStore, StoreError};
use crate::utils::clock;
use crate::utils::phone::normalize_phone;

/// In-process retries of the identity claim before giving up.
pub const MAX_CLAIM_ATTEMPTS: u32 = 3;

/// Errors from a single `reconcile` call.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The gateway lookup failed. Nothing was written; retrying later is
    /// always safe.
    #[error("gateway lookup for transaction {external_id} failed")]
    Gateway {
        external_id: CompactString,
        #[source]
        source: GatewayError,
    },

    /// Database error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Identity allocation failed before the paid transition committed, so
    /// the enrollment was left untouched.
    #[error("identity issuance for enrollment {enrollment_id} failed")]
    Identity {
        enrollment_id: Uuid,
        #[source]
        source: IssueError,
    },

    /// Every claim attempt lost the uniqueness race.
    #[error("identity claim for enrollment {enrollment_id} conflicted {attempts} times")]
    ClaimContention { enrollment_id: Uuid, attempts: u32 },
}

impl ReconcileError {
    /// Whether the caller may usefully retry later.
    pub fn retryable(&self) -> bool {
        match self {
            Self::Gateway { source, .. } => source.retryable(),
            Self::Store(_) | Self::ClaimContention { .. } => true,
            Self::Identity { .. } => false,
        }
    }
}

/// What a `reconcile` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The snapshot matched the stored status; nothing re-fired.
    Unchanged,
    /// The enrollment transitioned to `Paid`. `identity_issued` is false
    /// when the enrollment already carried a student code.
    EnrollmentPaid { identity_issued: bool },
    /// Another observation settled the enrollment as `Paid` first.
    AlreadyPaid,
    DeclineRecorded,
    /// A decline arrived for an enrollment that is already `Paid`; the paid
    /// state wins.
    DeclineIgnored,
    StillPending,
    /// No enrollment carries this payment link. Nothing was persisted.
    UnknownPaymentLink,
}

impl ReconcileOutcome {
    /// Whether the call mutated enrollment state.
    pub fn changed(&self) -> bool {
        matches!(self, Self::EnrollmentPaid { .. } | Self::DeclineRecorded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::EnrollmentPaid { .. } => "enrollment_paid",
            Self::AlreadyPaid => "already_paid",
            Self::DeclineRecorded => "decline_recorded",
            Self::DeclineIgnored => "decline_ignored",
            Self::StillPending => "still_pending",
            Self::UnknownPaymentLink => "unknown_payment_link",
        }
    }
}

/// Drives one transaction id from gateway snapshot to persisted state.
pub struct Reconciler<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    issuer: IdentityIssuer<S>,
    notices: NoticeSender,
    deduper: Arc<NoticeDeduper>,
}

impl<S, G> Clone for Reconciler<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
            issuer: self.issuer.clone(),
            notices: self.notices.clone(),
            deduper: Arc::clone(&self.deduper),
        }
    }
}

impl<S, G> Reconciler<S, G>
where
    S: ReconcileStore,
    G: PaymentGateway,
{
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        issuer: IdentityIssuer<S>,
        notices: NoticeSender,
        deduper: Arc<NoticeDeduper>,
    ) -> Self {
        Self {
            store,
            gateway,
            issuer,
            notices,
            deduper,
        }
    }

    /// Reconcile one transaction against a fresh gateway snapshot.
    #[tracing::instrument(skip_all, err, fields(external_id = %external_id))]
    pub async fn reconcile(&self, external_id: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let prior = self.store.find_transaction(external_id).await?;
        let prior_status = prior.as_ref().map(|record| record.status);

        let snapshot = self
            .gateway
            .fetch_transaction(external_id)
            .await
            .map_err(|source| ReconcileError::Gateway {
                external_id: CompactString::from(external_id),
                source,
            })?;

        // Once a transaction row exists its enrollment mapping is fixed;
        // later snapshots may omit the payment link.
        let enrollment_id = match &prior {
            Some(record) => record.enrollment_id,
            None => match self.resolve_enrollment(&snapshot).await? {
                Some(id) => id,
                None => return Ok(ReconcileOutcome::UnknownPaymentLink),
            },
        };

        self.store
            .upsert_transaction(TransactionUpsert {
                external_id: snapshot.external_id.clone(),
                enrollment_id,
                status: snapshot.status,
                amount_in_cents: snapshot.amount_in_cents,
                raw_snapshot: snapshot.raw.clone(),
            })
            .await?;

        if prior_status == Some(snapshot.status) {
            tracing::debug!(status = %snapshot.status.label(), "status unchanged, nothing re-fires");
            return Ok(ReconcileOutcome::Unchanged);
        }

        match snapshot.status {
            TransactionStatus::Approved => self.apply_approval(enrollment_id, &snapshot).await,
            TransactionStatus::Declined => self.apply_decline(enrollment_id, &snapshot).await,
            TransactionStatus::Pending => {
                self.emit(PaymentNotice::Pending {
                    enrollment_id,
                    external_id: snapshot.external_id.clone(),
                })
                .await;
                Ok(ReconcileOutcome::StillPending)
            }
        }
    }

    async fn resolve_enrollment(
        &self,
        snapshot: &TransactionSnapshot,
    ) -> Result<Option<Uuid>, ReconcileError> {
        let Some(link_id) = snapshot.payment_link_id.as_deref() else {
            tracing::warn!(
                external_id = %snapshot.external_id,
                "transaction carries no payment link, skipping"
            );
            return Ok(None);
        };
        match self.store.enrollment_by_payment_link(link_id).await? {
            Some(enrollment) => Ok(Some(enrollment.id)),
            None => {
                tracing::warn!(
                    external_id = %snapshot.external_id,
                    payment_link_id = %link_id,
                    "no enrollment for payment link, skipping"
                );
                Ok(None)
            }
        }
    }

    /// Transition the enrollment to `Paid`, issuing an identity when it does
    /// not have one yet. The issuance call here is the only call site.
    async fn apply_approval(
        &self,
        enrollment_id: Uuid,
        snapshot: &TransactionSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let payer = normalized_payer(snapshot);
        let paid_at = snapshot
            .finalized_at
            .map(clock::to_primitive_utc)
            .unwrap_or_else(clock::now_utc);

        let mut attempts = 0;
        loop {
            attempts += 1;

            // Re-read per attempt: a lost claim race means another process
            // has moved the roster (or this very enrollment) since we looked.
            let enrollment = self
                .store
                .enrollment_by_id(enrollment_id)
                .await?
                .ok_or(StoreError::EnrollmentMissing(enrollment_id))?;
            if enrollment.payment_state == PaymentState::Paid {
                return Ok(ReconcileOutcome::AlreadyPaid);
            }

            let identity = if enrollment.student_code.is_none() {
                let assignment = self.issuer.allocate(&enrollment).await.map_err(|source| {
                    ReconcileError::Identity {
                        enrollment_id,
                        source,
                    }
                })?;
                Some(assignment)
            } else {
                None
            };
            let identity_issued = identity.is_some();

            let completion = PaymentCompletion {
                payer: payer.clone(),
                paid_at,
                identity,
            };
            match self.store.record_payment(enrollment_id, completion).await {
                Ok(Some(updated)) => {
                    tracing::info!(
                        enrollment_id = %enrollment_id,
                        student_code = updated.student_code.as_deref().unwrap_or("-"),
                        "enrollment paid"
                    );
                    self.emit(PaymentNotice::Approved {
                        enrollment_id,
                        external_id: snapshot.external_id.clone(),
                        student_code: updated.student_code.clone(),
                        institutional_email: updated.institutional_email.clone(),
                    })
                    .await;
                    return Ok(ReconcileOutcome::EnrollmentPaid { identity_issued });
                }
                Ok(None) => return Ok(ReconcileOutcome::AlreadyPaid),
                Err(StoreError::Conflict { constraint }) if attempts < MAX_CLAIM_ATTEMPTS => {
                    tracing::warn!(
                        enrollment_id = %enrollment_id,
                        constraint = %constraint,
                        attempt = attempts,
                        "identity claim lost the race, re-allocating"
                    );
                }
                Err(StoreError::Conflict { .. }) => {
                    return Err(ReconcileError::ClaimContention {
                        enrollment_id,
                        attempts,
                    });
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    async fn apply_decline(
        &self,
        enrollment_id: Uuid,
        snapshot: &TransactionSnapshot,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.store.record_decline(enrollment_id).await? {
            Some(_) => {
                tracing::info!(enrollment_id = %enrollment_id, "enrollment declined");
                self.emit(PaymentNotice::Declined {
                    enrollment_id,
                    external_id: snapshot.external_id.clone(),
                })
                .await;
                Ok(ReconcileOutcome::DeclineRecorded)
            }
            None => {
                tracing::debug!(
                    enrollment_id = %enrollment_id,
                    "decline observed for a paid enrollment, keeping paid state"
                );
                Ok(ReconcileOutcome::DeclineIgnored)
            }
        }
    }

    async fn emit(&self, notice: PaymentNotice) {
        let key = notice.dedup_key();
        if !self.deduper.should_emit(&key) {
            tracing::debug!(key = %key, "notice suppressed inside the dedup window");
            return;
        }
        if let Err(err) = self.notices.send(notice).await {
            tracing::warn!(error = %err, "notice channel closed, dropping notice");
        }
    }
}

fn normalized_payer(snapshot: &TransactionSnapshot) -> PayerDetails {
    let mut payer = snapshot.payer.clone();
    payer.phone = payer
        .phone
        .map(|raw| normalize_phone(&raw))
        .filter(|phone| !phone.is_empty());
    payer
}

// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::entities::enrollment::EnrollmentRecord;
    use crate::entities::transaction::TransactionRecord;
    use crate::events::{NoticeReceiver, notice_channel};
    use crate::identity::IssuerConfig;
    use crate::store::{MemoryStore, SweepScope};
    use crate::testutil::{FakeGateway, drain, seed_enrollment, snapshot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store that fails `record_payment` with a uniqueness conflict a fixed
    /// number of times before delegating.
    struct ConflictingStore {
        inner: MemoryStore,
        remaining: AtomicUsize,
    }

    impl ConflictingStore {
        fn new(inner: MemoryStore, conflicts: usize) -> Self {
            Self {
                inner,
                remaining: AtomicUsize::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl ReconcileStore for ConflictingStore {
        async fn upsert_transaction(
            &self,
            upsert: TransactionUpsert,
        ) -> Result<TransactionRecord, StoreError> {
            self.inner.upsert_transaction(upsert).await
        }
        async fn find_transaction(
            &self,
            external_id: &str,
        ) -> Result<Option<TransactionRecord>, StoreError> {
            self.inner.find_transaction(external_id).await
        }
        async fn pending_transactions(
            &self,
            scope: SweepScope,
        ) -> Result<Vec<TransactionRecord>, StoreError> {
            self.inner.pending_transactions(scope).await
        }
        async fn enrollment_by_id(
            &self,
            id: Uuid,
        ) -> Result<Option<EnrollmentRecord>, StoreError> {
            self.inner.enrollment_by_id(id).await
        }
        async fn enrollment_by_payment_link(
            &self,
            link_id: &str,
        ) -> Result<Option<EnrollmentRecord>, StoreError> {
            self.inner.enrollment_by_payment_link(link_id).await
        }
        async fn record_payment(
            &self,
            id: Uuid,
            completion: PaymentCompletion,
        ) -> Result<Option<EnrollmentRecord>, StoreError> {
            if self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Conflict {
                    constraint: "enrollments_student_code_key".to_owned(),
                });
            }
            self.inner.record_payment(id, completion).await
        }
        async fn record_decline(&self, id: Uuid) -> Result<Option<EnrollmentRecord>, StoreError> {
            self.inner.record_decline(id).await
        }
        async fn attach_payment_link(
            &self,
            id: Uuid,
            link_id: &str,
        ) -> Result<Option<EnrollmentRecord>, StoreError> {
            self.inner.attach_payment_link(id, link_id).await
        }
        async fn issued_codes(&self) -> Result<Vec<CompactString>, StoreError> {
            self.inner.issued_codes().await
        }
        async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
            self.inner.code_exists(code).await
        }
        async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
            self.inner.email_exists(email).await
        }
    }

    // -- fixtures -----------------------------------------------------------

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        reconciler: Reconciler<MemoryStore, FakeGateway>,
        notices: NoticeReceiver,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let issuer = IdentityIssuer::new(Arc::clone(&store), IssuerConfig::default());
        let deduper = Arc::new(NoticeDeduper::default());
        let (tx, rx) = notice_channel();
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            issuer,
            tx,
            deduper,
        );
        Harness {
            store,
            gateway,
            reconciler,
            notices: rx,
        }
    }

    // -- tests --------------------------------------------------------------

    #[tokio::test]
    async fn approval_pays_the_enrollment_and_issues_identity() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, Some("link-1"))),
        );

        let outcome = h.reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::EnrollmentPaid {
                identity_issued: true
            }
        );

        let enrollment = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.payment_state, PaymentState::Paid);
        assert_eq!(enrollment.student_code.as_deref(), Some("5320"));
        assert_eq!(
            enrollment.institutional_email.as_deref(),
            Some("ana.gomez@colegio.edu.co")
        );
        assert_eq!(enrollment.payer_phone.as_deref(), Some("3001234567"));
        assert!(enrollment.paid_at.is_some());

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(
            &notices[0],
            PaymentNotice::Approved { student_code: Some(code), .. } if code == "5320"
        ));
    }

    #[tokio::test]
    async fn replay_with_the_same_status_changes_nothing() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        for _ in 0..2 {
            h.gateway.script(
                "tx-1",
                Ok(snapshot("tx-1", TransactionStatus::Approved, Some("link-1"))),
            );
        }

        let first = h.reconciler.reconcile("tx-1").await.unwrap();
        let paid = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();

        let second = h.reconciler.reconcile("tx-1").await.unwrap();
        let replayed = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();

        assert!(first.changed());
        assert_eq!(second, ReconcileOutcome::Unchanged);
        assert_eq!(paid, replayed);
        assert_eq!(h.gateway.calls(), 2);
        assert_eq!(drain(&mut h.notices).len(), 1);
    }

    #[tokio::test]
    async fn gateway_failure_aborts_before_any_write() {
        let mut h = harness();
        seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-1",
            Err(GatewayError::Upstream {
                status: 503,
                body: "unavailable".to_owned(),
            }),
        );

        let err = h.reconciler.reconcile("tx-1").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Gateway { .. }));
        assert!(err.retryable());
        assert!(h.store.find_transaction("tx-1").await.unwrap().is_none());
        assert!(drain(&mut h.notices).is_empty());
    }

    #[tokio::test]
    async fn unknown_payment_link_persists_nothing() {
        let mut h = harness();
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, Some("ghost"))),
        );

        let outcome = h.reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownPaymentLink);
        assert!(h.store.find_transaction("tx-1").await.unwrap().is_none());
        assert!(drain(&mut h.notices).is_empty());
    }

    #[tokio::test]
    async fn missing_payment_link_persists_nothing() {
        let mut h = harness();
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, None)),
        );

        let outcome = h.reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::UnknownPaymentLink);
        assert!(h.store.find_transaction("tx-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_snapshots_may_omit_the_payment_link() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Pending, Some("link-1"))),
        );
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, None)),
        );

        assert_eq!(
            h.reconciler.reconcile("tx-1").await.unwrap(),
            ReconcileOutcome::StillPending
        );
        assert_eq!(
            h.reconciler.reconcile("tx-1").await.unwrap(),
            ReconcileOutcome::EnrollmentPaid {
                identity_issued: true
            }
        );

        let enrollment = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.payment_state, PaymentState::Paid);
        let _ = drain(&mut h.notices);
    }

    #[tokio::test]
    async fn decline_records_and_notifies() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Declined, Some("link-1"))),
        );

        let outcome = h.reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::DeclineRecorded);

        let enrollment = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.payment_state, PaymentState::Declined);

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], PaymentNotice::Declined { .. }));
    }

    #[tokio::test]
    async fn decline_never_downgrades_a_paid_enrollment() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, Some("link-1"))),
        );
        h.gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Declined, Some("link-1"))),
        );

        assert!(h.reconciler.reconcile("tx-1").await.unwrap().changed());
        let outcome = h.reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::DeclineIgnored);

        let enrollment = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.payment_state, PaymentState::Paid);
        assert_eq!(enrollment.student_code.as_deref(), Some("5320"));

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], PaymentNotice::Approved { .. }));
    }

    #[tokio::test]
    async fn identity_is_issued_once_across_transactions() {
        let mut h = harness();
        let enrollment_id = seed_enrollment(&h.store, "link-1").await;
        h.gateway.script(
            "tx-a",
            Ok(snapshot("tx-a", TransactionStatus::Approved, Some("link-1"))),
        );
        h.gateway.script(
            "tx-b",
            Ok(snapshot("tx-b", TransactionStatus::Approved, Some("link-1"))),
        );

        assert_eq!(
            h.reconciler.reconcile("tx-a").await.unwrap(),
            ReconcileOutcome::EnrollmentPaid {
                identity_issued: true
            }
        );
        assert_eq!(
            h.reconciler.reconcile("tx-b").await.unwrap(),
            ReconcileOutcome::AlreadyPaid
        );

        let enrollment = h
            .store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.student_code.as_deref(), Some("5320"));
        assert_eq!(
            enrollment.institutional_email.as_deref(),
            Some("ana.gomez@colegio.edu.co")
        );
        assert_eq!(drain(&mut h.notices).len(), 1);
    }

    #[tokio::test]
    async fn lost_claim_race_retries_with_a_fresh_allocation() {
        let memory = MemoryStore::new();
        let mut record = EnrollmentRecord::new_applicant(Uuid::new_v4(), "Ana", "Gomez", None);
        record.payment_link_id = Some(CompactString::const_new("link-1"));
        record.payment_state = PaymentState::LinkGenerated;
        let enrollment_id = record.id;
        memory.put_enrollment(record).await;

        let store = Arc::new(ConflictingStore::new(memory, 1));
        let gateway = Arc::new(FakeGateway::new());
        gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, Some("link-1"))),
        );
        let issuer = IdentityIssuer::new(Arc::clone(&store), IssuerConfig::default());
        let (tx, mut rx) = notice_channel();
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            gateway,
            issuer,
            tx,
            Arc::new(NoticeDeduper::default()),
        );

        let outcome = reconciler.reconcile("tx-1").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::EnrollmentPaid {
                identity_issued: true
            }
        );
        let enrollment = store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(enrollment.payment_state, PaymentState::Paid);
        assert!(enrollment.student_code.is_some());
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn persistent_claim_contention_escalates() {
        let memory = MemoryStore::new();
        let mut record = EnrollmentRecord::new_applicant(Uuid::new_v4(), "Ana", "Gomez", None);
        record.payment_link_id = Some(CompactString::const_new("link-1"));
        record.payment_state = PaymentState::LinkGenerated;
        let enrollment_id = record.id;
        memory.put_enrollment(record).await;

        let store = Arc::new(ConflictingStore::new(memory, usize::MAX));
        let gateway = Arc::new(FakeGateway::new());
        gateway.script(
            "tx-1",
            Ok(snapshot("tx-1", TransactionStatus::Approved, Some("link-1"))),
        );
        let issuer = IdentityIssuer::new(Arc::clone(&store), IssuerConfig::default());
        let (tx, _rx) = notice_channel();
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            gateway,
            issuer,
            tx,
            Arc::new(NoticeDeduper::default()),
        );

        let err = reconciler.reconcile("tx-1").await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::ClaimContention {
                attempts: MAX_CLAIM_ATTEMPTS,
                ..
            }
        ));
        let enrollment = store
            .enrollment_by_id(enrollment_id)
            .await
            .unwrap()
            .unwrap();
        assert_ne!(enrollment.payment_state, PaymentState::Paid);
    }

    #[tokio::test]
    async fn concurrent_approvals_receive_distinct_codes() {
        let mut h = harness();
        let mut enrollment_ids = Vec::new();
        for n in 0..8 {
            let link = format!("link-{n}");
            enrollment_ids.push(seed_enrollment(&h.store, &link).await);
            let tx_id = format!("tx-{n}");
            h.gateway.script(
                &tx_id,
                Ok(snapshot(&tx_id, TransactionStatus::Approved, Some(&link))),
            );
        }

        let mut tasks = tokio::task::JoinSet::new();
        for n in 0..8 {
            let reconciler = h.reconciler.clone();
            tasks.spawn(async move {
                reconciler.reconcile(&format!("tx-{n}")).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(joined.unwrap().unwrap().changed());
        }

        let mut codes = std::collections::HashSet::new();
        for enrollment_id in enrollment_ids {
            let enrollment = h
                .store
                .enrollment_by_id(enrollment_id)
                .await
                .unwrap()
                .unwrap();
            let code = enrollment.student_code.expect("code issued");
            assert_eq!(code.len(), 4);
            let numeric: u32 = code.parse().unwrap();
            assert!((5320..=7000).contains(&numeric));
            assert!(codes.insert(code), "duplicate student code issued");
        }
        assert_eq!(codes.len(), 8);
    }

    #[tokio::test]
    async fn concurrent_same_transaction_emits_one_notice() {
        let mut h = harness();
        seed_enrollment(&h.store, "link-1").await;
        for _ in 0..2 {
            h.gateway.script(
                "tx-1",
                Ok(snapshot("tx-1", TransactionStatus::Pending, Some("link-1"))),
            );
        }

        let a = h.reconciler.clone();
        let b = h.reconciler.clone();
        let (ra, rb) = tokio::join!(a.reconcile("tx-1"), b.reconcile("tx-1"));
        ra.unwrap();
        rb.unwrap();

        let notices = drain(&mut h.notices);
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], PaymentNotice::Pending { .. }));
    }
}
