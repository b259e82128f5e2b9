//! Student identity issuance.
//!
//! The school reserves one numeric range per campus for student codes and
//! derives institutional email addresses from the student's name. Neither
//! counter is stored anywhere: the next code is reconstructed by scanning
//! the roster on every allocation, which keeps the allocator correct across
//! redeploys and manual roster edits.
//!
//! Allocation is only a *candidate*. The authoritative claim is the store's
//! uniqueness-guarded write; on a conflict the caller re-allocates from a
//! fresh scan. Gaps from aborted claims are acceptable, duplicates are not.

use std::sync::Arc;

use compact_str::{CompactString, format_compact};
use thiserror::Error;

use crate::entities::enrollment::EnrollmentRecord;
use crate::store::{ReconcileStore, StoreError};

/// First student code of the campus range.
pub const DEFAULT_CODE_LOW: u32 = 5320;
/// Last student code of the campus range, inclusive.
pub const DEFAULT_CODE_HIGH: u32 = 7000;

/// Upper bound on numeric email suffix probing.
const MAX_EMAIL_ATTEMPTS: u32 = 500;

/// Errors from identity allocation.
#[derive(Debug, Error)]
pub enum IssueError {
    /// The code range is fully issued. Needs operator intervention; there
    /// is no automatic recovery.
    #[error("student code range exhausted at {high}")]
    CodesExhausted { high: u32 },

    /// No free email was found within the probing bound.
    #[error("no free institutional email for {base} after {attempts} attempts")]
    EmailAttemptsExhausted { base: String, attempts: u32 },

    /// Store error
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The identity pair issued on the transition into `Paid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityAssignment {
    /// Zero-padded 4-character code, e.g. `"5321"`.
    pub student_code: CompactString,
    pub institutional_email: CompactString,
}

/// Issuer configuration.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub code_low: u32,
    pub code_high: u32,
    /// Domain appended to derived email local parts.
    pub email_domain: CompactString,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            code_low: DEFAULT_CODE_LOW,
            code_high: DEFAULT_CODE_HIGH,
            email_domain: CompactString::const_new("colegio.edu.co"),
        }
    }
}

/// Allocates student codes and institutional emails against a store.
pub struct IdentityIssuer<S> {
    store: Arc<S>,
    config: IssuerConfig,
}

impl<S> Clone for IdentityIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: ReconcileStore> IdentityIssuer<S> {
    pub fn new(store: Arc<S>, config: IssuerConfig) -> Self {
        Self { store, config }
    }

    /// Allocate both halves of the identity for an enrollment.
    pub async fn allocate(
        &self,
        enrollment: &EnrollmentRecord,
    ) -> Result<IdentityAssignment, IssueError> {
        let student_code = self.allocate_student_code().await?;
        let institutional_email = self
            .allocate_institutional_email(
                &enrollment.given_names,
                &enrollment.first_surname,
                enrollment.second_surname.as_deref(),
            )
            .await?;
        Ok(IdentityAssignment {
            student_code,
            institutional_email,
        })
    }

    /// Allocate the next free student code.
    ///
    /// Scans the roster, takes max + 1 over the codes that parse into the
    /// campus range (legacy entries that do not are skipped), then probes
    /// forward past anything claimed since the scan. Codes are never reused
    /// and never wrap.
    pub async fn allocate_student_code(&self) -> Result<CompactString, IssueError> {
        let codes = self.store.issued_codes().await?;
        let ceiling = codes
            .iter()
            .filter_map(|code| parse_in_range(code, self.config.code_low, self.config.code_high))
            .max();

        let mut candidate = match ceiling {
            Some(n) => n + 1,
            None => self.config.code_low,
        };

        loop {
            if candidate > self.config.code_high {
                return Err(IssueError::CodesExhausted {
                    high: self.config.code_high,
                });
            }
            let formatted = format_code(candidate);
            if !self.store.code_exists(&formatted).await? {
                return Ok(formatted);
            }
            candidate += 1;
        }
    }

    /// Derive a free institutional email from the student's name parts.
    ///
    /// Candidates in order: `given.surname1`, then `given.surname1.surname2`
    /// when a second surname exists, then `given.surname1{n}` for n = 1, 2, …
    /// up to a fixed bound. Name parts are diacritic-folded, lower-cased,
    /// and stripped to ASCII alphanumerics; compound parts concatenate.
    pub async fn allocate_institutional_email(
        &self,
        given_names: &str,
        first_surname: &str,
        second_surname: Option<&str>,
    ) -> Result<CompactString, IssueError> {
        let given = ascii_fold(given_names);
        let surname = ascii_fold(first_surname);
        let base = format!("{given}.{surname}");

        let candidate = self.compose(&base);
        if !self.store.email_exists(&candidate).await? {
            return Ok(candidate);
        }

        if let Some(second) = second_surname {
            let second = ascii_fold(second);
            if !second.is_empty() {
                let candidate = self.compose(&format!("{base}.{second}"));
                if !self.store.email_exists(&candidate).await? {
                    return Ok(candidate);
                }
            }
        }

        for n in 1..=MAX_EMAIL_ATTEMPTS {
            let candidate = self.compose(&format!("{base}{n}"));
            if !self.store.email_exists(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(IssueError::EmailAttemptsExhausted {
            base,
            attempts: MAX_EMAIL_ATTEMPTS,
        })
    }

    fn compose(&self, local: &str) -> CompactString {
        format_compact!("{local}@{}", self.config.email_domain)
    }
}

/// Parse a roster code, keeping only well-formed entries inside the range.
fn parse_in_range(code: &str, low: u32, high: u32) -> Option<u32> {
    let parsed: u32 = code.trim().parse().ok()?;
    (low..=high).contains(&parsed).then_some(parsed)
}

fn format_code(n: u32) -> CompactString {
    format_compact!("{n:04}")
}

/// Fold a name part to lowercase ASCII alphanumerics.
fn ascii_fold(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        for lower in c.to_lowercase() {
            let folded = match lower {
                'á' | 'à' | 'ä' | 'â' => 'a',
                'é' | 'è' | 'ë' | 'ê' => 'e',
                'í' | 'ì' | 'ï' | 'î' => 'i',
                'ó' | 'ò' | 'ö' | 'ô' => 'o',
                'ú' | 'ù' | 'ü' | 'û' => 'u',
                'ñ' => 'n',
                'ç' => 'c',
                other => other,
            };
            if folded.is_ascii_alphanumeric() {
                out.push(folded);
            }
        }
    }
    out
}
