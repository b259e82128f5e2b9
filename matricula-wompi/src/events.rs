//! Wompi webhook events and checksum verification.
//!
//! Wompi signs every event by hashing selected payload properties:
//!
//! ```text
//! checksum = SHA256(concat(values of signature.properties) + timestamp + events_secret)
//! ```
//!
//! where property values are concatenated in the order listed, numbers and
//! booleans in their plain JSON spelling, and the result is hex-encoded
//! (Wompi sends uppercase). Verification must happen before the event body
//! is trusted for anything, including reading the transaction id.

use serde::{Deserialize, Serialize};

/// Errors produced when verifying a webhook event.
#[derive(Debug, thiserror::Error)]
pub enum EventVerifyError {
    /// A property listed in `signature.properties` is absent from `data`.
    #[error("event property not found: {0}")]
    MissingProperty(String),

    /// The computed checksum does not match the one Wompi sent.
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// The `signature` object of a webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSignature {
    /// Dot-separated paths into `data`, e.g. `"transaction.id"`.
    pub properties: Vec<String>,
    pub checksum: String,
}

/// A webhook event as POSTed by Wompi.
///
/// `data` stays an untyped document: the reconciler only needs the
/// transaction id from it and re-reads the transaction from the API, so the
/// event body is a hint rather than a source of truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventNotification {
    /// Event name, e.g. `"transaction.updated"`.
    pub event: String,
    pub data: serde_json::Value,
    #[serde(default)]
    pub environment: Option<String>,
    /// Unix timestamp included in the checksum input.
    pub timestamp: i64,
    pub signature: EventSignature,
    #[serde(default)]
    pub sent_at: Option<String>,
}

impl EventNotification {
    /// The transaction id carried in `data.transaction.id`, if any.
    pub fn transaction_id(&self) -> Option<&str> {
        self.data.get("transaction")?.get("id")?.as_str()
    }

    /// Look up a dot-separated property path inside `data`.
    fn property_value(&self, path: &str) -> Option<&serde_json::Value> {
        path.split('.').try_fold(&self.data, |value, segment| value.get(segment))
    }

    /// Compute the checksum this event should carry for `events_secret`.
    pub fn expected_checksum(&self, events_secret: &str) -> Result<String, EventVerifyError> {
        let mut input = String::new();
        for property in &self.signature.properties {
            let value = self
                .property_value(property)
                .ok_or_else(|| EventVerifyError::MissingProperty(property.clone()))?;
            match value {
                serde_json::Value::String(s) => input.push_str(s),
                other => input.push_str(&other.to_string()),
            }
        }
        input.push_str(&self.timestamp.to_string());
        input.push_str(events_secret);

        let digest = ring::digest::digest(&ring::digest::SHA256, input.as_bytes());
        Ok(hex_upper(digest.as_ref()))
    }

    /// Verify the event checksum against `events_secret`.
    ///
    /// The comparison is constant-time and case-insensitive on the hex
    /// encoding.
    pub fn verify_checksum(&self, events_secret: &str) -> Result<(), EventVerifyError> {
        let expected = self.expected_checksum(events_secret)?;
        let provided = self.signature.checksum.to_ascii_uppercase();
        ring::constant_time::verify_slices_are_equal(expected.as_bytes(), provided.as_bytes())
            .map_err(|_| EventVerifyError::ChecksumMismatch)
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02X}");
    }
    out
}
