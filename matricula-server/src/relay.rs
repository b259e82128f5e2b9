//! Forwards payment notices to the school administration system.
//!
//! Best-effort delivery: the reconciler's persisted state is the source of
//! truth, so a missed notice is recoverable by looking at the enrollment.
//! Failures are logged and the notice is dropped.

use matricula_core::events::{NoticeReceiver, PaymentNotice};
use tokio::sync::watch;
use url::Url;

/// Posts each notice as JSON to the configured callback, or logs it when no
/// callback is configured.
pub struct NoticeRelay {
    http: reqwest::Client,
    callback_url: Option<Url>,
    shutdown: watch::Receiver<bool>,
}

impl NoticeRelay {
    pub fn new(callback_url: Option<Url>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            http: reqwest::Client::new(),
            callback_url,
            shutdown,
        }
    }

    /// Consume notices until shutdown flips or the channel closes.
    pub async fn run(mut self, mut notices: NoticeReceiver) {
        loop {
            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                notice = notices.recv() => {
                    match notice {
                        Some(notice) => self.deliver(&notice).await,
                        None => break,
                    }
                }
            }
        }
        tracing::info!("Notice relay stopped");
    }

    async fn deliver(&self, notice: &PaymentNotice) {
        let Some(url) = &self.callback_url else {
            tracing::info!(
                key = %notice.dedup_key(),
                enrollment_id = %notice.enrollment_id(),
                "payment notice (no callback configured)"
            );
            return;
        };

        match self.http.post(url.clone()).json(notice).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(key = %notice.dedup_key(), "notice delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    key = %notice.dedup_key(),
                    status = %response.status(),
                    "notice delivery rejected"
                );
            }
            Err(err) => {
                tracing::warn!(key = %notice.dedup_key(), error = %err, "notice delivery failed");
            }
        }
    }
}
