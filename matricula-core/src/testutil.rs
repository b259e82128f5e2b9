//! Shared test doubles and fixtures.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use compact_str::CompactString;
use uuid::Uuid;

use crate::entities::enrollment::{EnrollmentRecord, PayerDetails};
use crate::entities::{PaymentState, TransactionStatus};
use crate::events::{NoticeReceiver, PaymentNotice};
use crate::gateway::{GatewayError, PaymentGateway, TransactionSnapshot};
use crate::store::MemoryStore;

/// Gateway returning scripted responses per transaction id, in order.
#[derive(Default)]
pub(crate) struct FakeGateway {
    responses: Mutex<HashMap<CompactString, VecDeque<Result<TransactionSnapshot, GatewayError>>>>,
    calls: AtomicUsize,
}

impl FakeGateway {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn script(
        &self,
        external_id: &str,
        response: Result<TransactionSnapshot, GatewayError>,
    ) {
        self.responses
            .lock()
            .unwrap()
            .entry(CompactString::from(external_id))
            .or_default()
            .push_back(response);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn fetch_transaction(
        &self,
        external_id: &str,
    ) -> Result<TransactionSnapshot, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .get_mut(external_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| panic!("no scripted response left for {external_id}"))
    }
}

pub(crate) fn snapshot(
    external_id: &str,
    status: TransactionStatus,
    link: Option<&str>,
) -> TransactionSnapshot {
    TransactionSnapshot {
        external_id: CompactString::from(external_id),
        status,
        amount_in_cents: 45_000_000,
        payment_link_id: link.map(CompactString::from),
        payer: PayerDetails {
            name: Some("Carlos Pérez".to_owned()),
            email: Some("carlos@example.com".to_owned()),
            phone: Some("+57 300 123 4567".to_owned()),
            document: Some("1000012345".to_owned()),
        },
        finalized_at: None,
        raw: serde_json::json!({ "id": external_id }),
    }
}

/// Store an enrollment that already has its payment link attached.
pub(crate) async fn seed_enrollment(store: &MemoryStore, link: &str) -> Uuid {
    let mut record = EnrollmentRecord::new_applicant(Uuid::new_v4(), "Ana", "Gomez", None);
    record.payment_link_id = Some(CompactString::from(link));
    record.payment_state = PaymentState::LinkGenerated;
    let id = record.id;
    store.put_enrollment(record).await;
    id
}

pub(crate) fn drain(rx: &mut NoticeReceiver) -> Vec<PaymentNotice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        out.push(notice);
    }
    out
}
