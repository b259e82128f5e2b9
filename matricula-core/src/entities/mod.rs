pub mod enrollment;
pub mod transaction;

use matricula_wompi::objects::WompiStatus;

/// Payment lifecycle state of an enrollment.
///
/// `Paid` is absorbing: nothing in this crate ever moves an enrollment out
/// of it. All other states can still reach `Paid` through a later approved
/// transaction on the same payment link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "payment_state")]
pub enum PaymentState {
    PendingLink,
    LinkGenerated,
    Paid,
    Declined,
    Expired,
}

impl PaymentState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PendingLink => "pending_link",
            Self::LinkGenerated => "link_generated",
            Self::Paid => "paid",
            Self::Declined => "declined",
            Self::Expired => "expired",
        }
    }
}

/// Persisted status of an observed gateway transaction.
///
/// This is the local three-state vocabulary. The gateway reports more
/// granular statuses; `VOIDED` and `ERROR` collapse into `Declined` here
/// while the raw snapshot keeps the original spelling for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "transaction_status")]
pub enum TransactionStatus {
    Pending,
    Approved,
    Declined,
}

impl TransactionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Declined => "declined",
        }
    }
}

impl From<WompiStatus> for TransactionStatus {
    fn from(value: WompiStatus) -> Self {
        match value {
            WompiStatus::Pending => TransactionStatus::Pending,
            WompiStatus::Approved => TransactionStatus::Approved,
            WompiStatus::Declined | WompiStatus::Voided | WompiStatus::Error => {
                TransactionStatus::Declined
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn voided_and_error_collapse_into_declined() {
        assert_eq!(
            TransactionStatus::from(WompiStatus::Voided),
            TransactionStatus::Declined
        );
        assert_eq!(
            TransactionStatus::from(WompiStatus::Error),
            TransactionStatus::Declined
        );
        assert_eq!(
            TransactionStatus::from(WompiStatus::Approved),
            TransactionStatus::Approved
        );
        assert_eq!(
            TransactionStatus::from(WompiStatus::Pending),
            TransactionStatus::Pending
        );
    }
}
