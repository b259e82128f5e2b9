use compact_str::CompactString;
use uuid::Uuid;

use super::PaymentState;
use crate::identity::IdentityAssignment;

/// An enrollment as persisted in the `enrollments` table.
///
/// Rows are created by the admissions front end. This subsystem only
/// transitions `payment_state`, fills the payer fields, and issues the
/// identity pair. The name parts feed the institutional email allocator.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct EnrollmentRecord {
    pub id: Uuid,
    pub given_names: String,
    pub first_surname: String,
    pub second_surname: Option<String>,
    /// Gateway payment-link id this enrollment was invoiced under.
    pub payment_link_id: Option<CompactString>,
    pub payment_state: PaymentState,
    /// Issued together with `institutional_email`, exactly once.
    pub student_code: Option<CompactString>,
    pub institutional_email: Option<CompactString>,
    pub payer_name: Option<String>,
    pub payer_email: Option<String>,
    pub payer_phone: Option<String>,
    pub payer_document: Option<String>,
    pub paid_at: Option<time::PrimitiveDateTime>,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

impl EnrollmentRecord {
    /// A fresh record as the admissions form creates it: no payment link,
    /// no payer, no identity.
    pub fn new_applicant(
        id: Uuid,
        given_names: impl Into<String>,
        first_surname: impl Into<String>,
        second_surname: Option<String>,
    ) -> Self {
        let now = crate::utils::clock::now_utc();
        Self {
            id,
            given_names: given_names.into(),
            first_surname: first_surname.into(),
            second_surname,
            payment_link_id: None,
            payment_state: PaymentState::PendingLink,
            student_code: None,
            institutional_email: None,
            payer_name: None,
            payer_email: None,
            payer_phone: None,
            payer_document: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the identity pair has already been issued.
    pub fn has_identity(&self) -> bool {
        self.student_code.is_some()
    }

    /// Display name, second surname included when present.
    pub fn full_name(&self) -> String {
        match &self.second_surname {
            Some(second) => format!(
                "{} {} {}",
                self.given_names, self.first_surname, second
            ),
            None => format!("{} {}", self.given_names, self.first_surname),
        }
    }
}

/// Payer contact details captured from an approved transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayerDetails {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub document: Option<String>,
}

/// Data for committing the transition into `Paid`.
///
/// Carries the payer fields and, when the enrollment had no identity yet,
/// the freshly allocated pair. The store applies all of it in one guarded
/// write so a payment is never recorded half-done.
#[derive(Debug, Clone)]
pub struct PaymentCompletion {
    pub payer: PayerDetails,
    pub paid_at: time::PrimitiveDateTime,
    pub identity: Option<IdentityAssignment>,
}
