//! Batch sweep over pending transactions.
//!
//! Webhook delivery is best-effort, so the sweep is what guarantees every
//! pending transaction is eventually re-checked against the gateway. Fan-out
//! is bounded to stay inside gateway rate limits, each call gets a short
//! timeout, and one bad transaction never takes the batch down with it.

use std::sync::Arc;
use std::time::Duration;

use compact_str::CompactString;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::gateway::PaymentGateway;
use crate::processors::reconciler::Reconciler;
use crate::store::{ReconcileStore, StoreError, SweepScope};

/// Sweep tuning.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Reconcile calls in flight at once.
    pub concurrency: usize,
    /// Time limit for one reconcile call, gateway round-trip included.
    pub call_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            call_timeout: Duration::from_secs(10),
        }
    }
}

/// Tally of one sweep run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items attempted, successes and failures both.
    pub processed: usize,
    /// Items whose reconcile mutated enrollment state.
    pub changed: usize,
    pub failed: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub external_id: CompactString,
    pub error: String,
}

/// Re-checks pending transactions in bounded batches.
pub struct Sweeper<S, G> {
    store: Arc<S>,
    reconciler: Reconciler<S, G>,
    config: SweepConfig,
    shutdown: watch::Receiver<bool>,
}

impl<S, G> Clone for Sweeper<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            reconciler: self.reconciler.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S, G> Sweeper<S, G>
where
    S: ReconcileStore + 'static,
    G: PaymentGateway + 'static,
{
    pub fn new(
        store: Arc<S>,
        reconciler: Reconciler<S, G>,
        config: SweepConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            reconciler,
            config,
            shutdown,
        }
    }

    /// Sweep every pending transaction in `scope` once.
    ///
    /// Shutdown observed between dispatches stops scheduling the remainder;
    /// calls already in flight drain to completion rather than being torn
    /// down mid-write.
    #[tracing::instrument(skip_all, fields(scope = ?scope))]
    pub async fn sweep_pending(&self, scope: SweepScope) -> Result<SweepReport, StoreError> {
        let pending = self.store.pending_transactions(scope).await?;
        tracing::info!(total = pending.len(), "sweep started");

        let mut report = SweepReport::default();
        let mut queue = pending.into_iter();
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < self.config.concurrency && !*self.shutdown.borrow() {
                let Some(record) = queue.next() else { break };
                let reconciler = self.reconciler.clone();
                let call_timeout = self.config.call_timeout;
                let external_id = record.external_id.clone();
                tasks.spawn(async move {
                    let result =
                        tokio::time::timeout(call_timeout, reconciler.reconcile(&external_id))
                            .await;
                    (external_id, result)
                });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(Ok(outcome)))) => {
                    report.processed += 1;
                    if outcome.changed() {
                        report.changed += 1;
                    }
                }
                Ok((external_id, Ok(Err(err)))) => {
                    report.processed += 1;
                    report.failed += 1;
                    tracing::warn!(external_id = %external_id, error = %err, "sweep item failed");
                    report.failures.push(SweepFailure {
                        external_id,
                        error: err.to_string(),
                    });
                }
                Ok((external_id, Err(_))) => {
                    report.processed += 1;
                    report.failed += 1;
                    tracing::warn!(external_id = %external_id, "sweep item timed out");
                    report.failures.push(SweepFailure {
                        external_id,
                        error: format!("timed out after {:?}", self.config.call_timeout),
                    });
                }
                Err(join_error) => {
                    report.failed += 1;
                    tracing::error!(error = %join_error, "sweep task aborted");
                }
            }
        }

        let remaining = queue.len();
        if remaining > 0 {
            tracing::info!(remaining, "sweep cancelled before dispatching every item");
        }
        tracing::info!(
            processed = report.processed,
            changed = report.changed,
            failed = report.failed,
            "sweep finished"
        );
        Ok(report)
    }

    /// Sweep globally on a fixed interval until shutdown flips.
    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_pending(SweepScope::Global).await {
                        tracing::error!(error = %err, "scheduled sweep could not load pending transactions");
                    }
                }
            }
        }
        tracing::info!("sweep scheduler stopped");
    }
}

// ---------------------------------------------------------------------------
