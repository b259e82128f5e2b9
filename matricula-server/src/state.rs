//! Application state shared across all request handlers.

use matricula_core::processors::{Reconciler, Sweeper};
use matricula_core::store::PgStore;
use matricula_wompi::WompiClient;
use std::sync::Arc;

use crate::config::file::FileConfig;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Drives one transaction from snapshot to persisted state.
    pub reconciler: Reconciler<PgStore, WompiClient>,
    /// On-demand sweeps for the ops endpoint.
    pub sweeper: Sweeper<PgStore, WompiClient>,
    /// Gateway client, used directly for payment-link provisioning.
    pub wompi: Arc<WompiClient>,
    /// Persistence, used directly by handlers that read enrollments.
    pub store: Arc<PgStore>,
    /// Loaded configuration.
    pub config: Arc<FileConfig>,
}

impl AppState {
    pub fn new(
        reconciler: Reconciler<PgStore, WompiClient>,
        sweeper: Sweeper<PgStore, WompiClient>,
        wompi: Arc<WompiClient>,
        store: Arc<PgStore>,
        config: Arc<FileConfig>,
    ) -> Self {
        Self {
            reconciler,
            sweeper,
            wompi,
            store,
            config,
        }
    }
}
