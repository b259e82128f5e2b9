use compact_str::{CompactString, format_compact};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reconcile outcome worth telling the administration system about.
///
/// Emitted only when reconciliation changes something (or confirms a
/// transaction is still pending); replays that change nothing stay silent.
/// The serialized form is the relay's webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaymentNotice {
    /// The enrollment transitioned to `Paid`.
    Approved {
        enrollment_id: Uuid,
        external_id: CompactString,
        student_code: Option<CompactString>,
        institutional_email: Option<CompactString>,
    },
    /// The enrollment was marked `Declined`.
    Declined {
        enrollment_id: Uuid,
        external_id: CompactString,
    },
    /// The gateway still reports the transaction as undecided.
    Pending {
        enrollment_id: Uuid,
        external_id: CompactString,
    },
}

impl PaymentNotice {
    pub fn external_id(&self) -> &str {
        match self {
            Self::Approved { external_id, .. }
            | Self::Declined { external_id, .. }
            | Self::Pending { external_id, .. } => external_id,
        }
    }

    pub fn enrollment_id(&self) -> Uuid {
        match self {
            Self::Approved { enrollment_id, .. }
            | Self::Declined { enrollment_id, .. }
            | Self::Pending { enrollment_id, .. } => *enrollment_id,
        }
    }

    /// Key for duplicate suppression: outcome kind plus transaction id.
    pub fn dedup_key(&self) -> CompactString {
        match self {
            Self::Approved { external_id, .. } => format_compact!("approved:{external_id}"),
            Self::Declined { external_id, .. } => format_compact!("declined:{external_id}"),
            Self::Pending { external_id, .. } => format_compact!("pending:{external_id}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn dedup_key_distinguishes_outcome_kinds() {
        let id = Uuid::new_v4();
        let approved = PaymentNotice::Approved {
            enrollment_id: id,
            external_id: CompactString::const_new("tx-1"),
            student_code: None,
            institutional_email: None,
        };
        let pending = PaymentNotice::Pending {
            enrollment_id: id,
            external_id: CompactString::const_new("tx-1"),
        };
        assert_eq!(approved.dedup_key(), "approved:tx-1");
        assert_eq!(pending.dedup_key(), "pending:tx-1");
        assert_ne!(approved.dedup_key(), pending.dedup_key());
    }

    #[test]
    fn relay_payload_is_tagged_by_kind() {
        let notice = PaymentNotice::Declined {
            enrollment_id: Uuid::nil(),
            external_id: CompactString::const_new("tx-9"),
        };
        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "declined");
        assert_eq!(json["external_id"], "tx-9");
    }
}
