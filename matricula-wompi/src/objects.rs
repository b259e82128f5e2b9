//! Wire types for the Wompi REST API.
//!
//! Field names follow Wompi's JSON exactly; everything Wompi documents as
//! optional (or has been observed to omit) is an `Option` with a serde
//! default so a partial payload never fails deserialization.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Transaction status as reported by Wompi.
///
/// This is the gateway's vocabulary. `matricula-core` collapses it into its
/// own three-state status for persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WompiStatus {
    Pending,
    Approved,
    Declined,
    Voided,
    Error,
}

impl std::fmt::Display for WompiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WompiStatus::Pending => write!(f, "PENDING"),
            WompiStatus::Approved => write!(f, "APPROVED"),
            WompiStatus::Declined => write!(f, "DECLINED"),
            WompiStatus::Voided => write!(f, "VOIDED"),
            WompiStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Customer details attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerData {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub legal_id: Option<String>,
    #[serde(default)]
    pub legal_id_type: Option<String>,
}

/// Billing details attached to a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingData {
    #[serde(default)]
    pub legal_id: Option<String>,
    #[serde(default)]
    pub legal_id_type: Option<String>,
}

/// A Wompi transaction as returned by `GET /transactions/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Wompi's transaction identifier, e.g. `"115813-1702339241-52186"`.
    pub id: CompactString,
    pub status: WompiStatus,
    #[serde(default)]
    pub status_message: Option<String>,
    pub amount_in_cents: i64,
    #[serde(default)]
    pub currency: Option<CompactString>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub payment_method_type: Option<String>,
    /// Set when the transaction was paid through a hosted payment link.
    #[serde(default)]
    pub payment_link_id: Option<CompactString>,
    #[serde(default)]
    pub customer_data: Option<CustomerData>,
    #[serde(default)]
    pub billing_data: Option<BillingData>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub created_at: Option<OffsetDateTime>,
    /// Present once the transaction reached a final status.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub finalized_at: Option<OffsetDateTime>,
}

impl Transaction {
    /// The payer's document number, preferring `customer_data` over
    /// `billing_data` (card payments fill the latter, PSE the former).
    pub fn payer_document(&self) -> Option<&str> {
        self.customer_data
            .as_ref()
            .and_then(|c| c.legal_id.as_deref())
            .or_else(|| self.billing_data.as_ref().and_then(|b| b.legal_id.as_deref()))
    }
}

/// Request body for `POST /payment_links`.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentLinkRequest {
    pub name: String,
    pub description: String,
    /// A single-use link stops accepting attempts after one approved payment.
    pub single_use: bool,
    pub collect_shipping: bool,
    pub currency: CompactString,
    pub amount_in_cents: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// A hosted payment link as returned by `POST /payment_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentLink {
    /// Link identifier, e.g. `"VPOS_atX5nw"`. Transactions paid through the
    /// link carry it back as `payment_link_id`.
    pub id: CompactString,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub amount_in_cents: Option<i64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl PaymentLink {
    /// The hosted checkout URL customers open to pay this link.
    pub fn checkout_url(&self) -> String {
        format!("https://checkout.wompi.co/l/{}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_deserializes_from_api_payload() {
        let body = r#"{
            "id": "115813-1702339241-52186",
            "created_at": "2023-12-11T23:20:41.439Z",
            "finalized_at": "2023-12-11T23:20:47.000Z",
            "amount_in_cents": 480500000,
            "reference": "matricula-2024-00113",
            "currency": "COP",
            "payment_method_type": "CARD",
            "status": "APPROVED",
            "status_message": null,
            "payment_link_id": "VPOS_atX5nw",
            "customer_email": "acudiente@example.com",
            "customer_data": {
                "full_name": "Carlos Pérez",
                "phone_number": "573001234567",
                "legal_id": "1098765432",
                "legal_id_type": "CC"
            },
            "billing_data": {
                "legal_id": "1098765432",
                "legal_id_type": "CC"
            }
        }"#;

        let txn: Transaction = serde_json::from_str(body).unwrap();
        assert_eq!(txn.id, "115813-1702339241-52186");
        assert_eq!(txn.status, WompiStatus::Approved);
        assert_eq!(txn.amount_in_cents, 480_500_000);
        assert_eq!(txn.payment_link_id.as_deref(), Some("VPOS_atX5nw"));
        assert_eq!(txn.payer_document(), Some("1098765432"));
        assert!(txn.finalized_at.is_some());
    }

    #[test]
    fn transaction_tolerates_missing_optional_fields() {
        let body = r#"{
            "id": "115813-1702339241-52187",
            "amount_in_cents": 100,
            "status": "PENDING"
        }"#;

        let txn: Transaction = serde_json::from_str(body).unwrap();
        assert_eq!(txn.status, WompiStatus::Pending);
        assert!(txn.payment_link_id.is_none());
        assert!(txn.customer_data.is_none());
        assert!(txn.payer_document().is_none());
        assert!(txn.created_at.is_none());
    }

    #[test]
    fn payer_document_falls_back_to_billing_data() {
        let body = r#"{
            "id": "x",
            "amount_in_cents": 100,
            "status": "APPROVED",
            "customer_data": {"full_name": "Ana Gómez"},
            "billing_data": {"legal_id": "52186000", "legal_id_type": "CC"}
        }"#;

        let txn: Transaction = serde_json::from_str(body).unwrap();
        assert_eq!(txn.payer_document(), Some("52186000"));
    }

    #[test]
    fn status_uses_wompi_spelling() {
        assert_eq!(
            serde_json::to_string(&WompiStatus::Voided).unwrap(),
            r#""VOIDED""#
        );
        let status: WompiStatus = serde_json::from_str(r#""ERROR""#).unwrap();
        assert_eq!(status, WompiStatus::Error);
    }

    #[test]
    fn payment_link_request_omits_empty_optionals() {
        let req = PaymentLinkRequest {
            name: "Matrícula 2024".to_string(),
            description: "Pago de matrícula".to_string(),
            single_use: true,
            collect_shipping: false,
            currency: "COP".into(),
            amount_in_cents: 480_500_000,
            redirect_url: None,
            expires_at: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("redirect_url").is_none());
        assert!(json.get("expires_at").is_none());
        assert_eq!(json["single_use"], serde_json::json!(true));
    }

    #[test]
    fn payment_link_checkout_url() {
        let link: PaymentLink = serde_json::from_str(r#"{"id": "VPOS_atX5nw"}"#).unwrap();
        assert_eq!(link.checkout_url(), "https://checkout.wompi.co/l/VPOS_atX5nw");
    }
}
