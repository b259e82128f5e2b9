//! Payment gateway seam.
//!
//! The reconciler never trusts a webhook body; it re-reads the transaction
//! from the gateway through this trait. Production wires in
//! [`matricula_wompi::WompiClient`]; tests script a fake.

use async_trait::async_trait;
use compact_str::CompactString;
use matricula_wompi::client::FetchedTransaction;
use matricula_wompi::{WompiClient, WompiError};
use thiserror::Error;
use time::OffsetDateTime;

use crate::entities::TransactionStatus;
use crate::entities::enrollment::PayerDetails;

/// Errors from a gateway read.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The gateway answered with a non-2xx status.
    #[error("gateway returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The gateway answered 2xx but the payload was unusable.
    #[error("malformed gateway payload: {0}")]
    Malformed(String),
}

impl GatewayError {
    /// Whether a caller may retry the same read later.
    ///
    /// Transport failures and 5xx / 429 answers are transient; anything the
    /// gateway deliberately rejected or garbled is not.
    pub fn retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) => true,
            GatewayError::Upstream { status, .. } => *status >= 500 || *status == 429,
            GatewayError::Malformed(_) => false,
        }
    }
}

impl From<WompiError> for GatewayError {
    fn from(value: WompiError) -> Self {
        match value {
            WompiError::Http(e) => GatewayError::Transport(e),
            WompiError::Api { status, body } => GatewayError::Upstream {
                status: status.as_u16(),
                body,
            },
            WompiError::Json(e) => GatewayError::Malformed(e.to_string()),
            WompiError::Url(e) => GatewayError::Malformed(e.to_string()),
            WompiError::MissingData => {
                GatewayError::Malformed("response is missing the data envelope".to_string())
            }
        }
    }
}

/// A gateway transaction normalized into local vocabulary.
#[derive(Debug, Clone)]
pub struct TransactionSnapshot {
    pub external_id: CompactString,
    pub status: TransactionStatus,
    pub amount_in_cents: i64,
    /// Correlates the transaction back to an enrollment.
    pub payment_link_id: Option<CompactString>,
    pub payer: PayerDetails,
    pub finalized_at: Option<OffsetDateTime>,
    /// The gateway document verbatim; persisted as the snapshot.
    pub raw: serde_json::Value,
}

impl From<FetchedTransaction> for TransactionSnapshot {
    fn from(fetched: FetchedTransaction) -> Self {
        let FetchedTransaction { data, raw } = fetched;
        let payer = PayerDetails {
            name: data.customer_data.as_ref().and_then(|c| c.full_name.clone()),
            email: data.customer_email.clone(),
            phone: data
                .customer_data
                .as_ref()
                .and_then(|c| c.phone_number.clone()),
            document: data.payer_document().map(str::to_owned),
        };
        Self {
            external_id: data.id.clone(),
            status: TransactionStatus::from(data.status),
            amount_in_cents: data.amount_in_cents,
            payment_link_id: data.payment_link_id.clone(),
            payer,
            finalized_at: data.finalized_at,
            raw,
        }
    }
}

/// Read access to the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch the current state of a transaction by its gateway id.
    async fn fetch_transaction(
        &self,
        external_id: &str,
    ) -> Result<TransactionSnapshot, GatewayError>;
}

#[async_trait]
impl PaymentGateway for WompiClient {
    async fn fetch_transaction(
        &self,
        external_id: &str,
    ) -> Result<TransactionSnapshot, GatewayError> {
        let fetched = self.get_transaction(external_id).await?;
        Ok(TransactionSnapshot::from(fetched))
    }
}
