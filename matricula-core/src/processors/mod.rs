//! The workers that drive reconciliation.

pub mod reconciler;
pub mod sweep;

pub use reconciler::{MAX_CLAIM_ATTEMPTS, ReconcileError, ReconcileOutcome, Reconciler};
pub use sweep::{SweepConfig, SweepFailure, SweepReport, Sweeper};
