//! Periodic maintenance: presence sweep and reset-token purge.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auth::credential_store::CredentialStore;
use crate::errors::Result;
use crate::storage::repositories::ResetTokenRepository;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub marked_offline: u64,
    pub purged_reset_tokens: u64,
}

#[derive(Clone)]
pub struct CleanupService {
    store: CredentialStore,
    reset_tokens: Arc<dyn ResetTokenRepository>,
    idle_threshold: Duration,
    used_token_retention: Duration,
}

impl CleanupService {
    pub fn new(
        store: CredentialStore,
        reset_tokens: Arc<dyn ResetTokenRepository>,
        idle_threshold: Duration,
        used_token_retention: Duration,
    ) -> Self {
        Self { store, reset_tokens, idle_threshold, used_token_retention }
    }

    /// Mark idle principals offline and purge stale reset tokens.
    ///
    /// The two steps are independent; a failure in one is logged and does not skip
    /// the other. The first error is returned.
    pub async fn run_once(&self) -> Result<SweepReport> {
        let now = Utc::now();
        let mut report = SweepReport::default();
        let mut first_error = None;

        match self.store.sweep_idle(now - self.idle_threshold).await {
            Ok(count) => report.marked_offline = count,
            Err(e) => {
                warn!(error = %e, "presence sweep failed");
                first_error.get_or_insert(e);
            }
        }

        match self.reset_tokens.purge(now - self.used_token_retention).await {
            Ok(count) => report.purged_reset_tokens = count,
            Err(e) => {
                warn!(error = %e, "reset token purge failed");
                first_error.get_or_insert(e);
            }
        }

        if report != SweepReport::default() {
            info!(
                marked_offline = report.marked_offline,
                purged_reset_tokens = report.purged_reset_tokens,
                "maintenance sweep complete"
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }

    /// Run [`Self::run_once`] on a fixed interval until cancelled.
    pub fn spawn(self, interval: StdDuration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(interval_secs = interval.as_secs(), "maintenance sweep started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            debug!(error = %e, "maintenance sweep finished with errors");
                        }
                    }
                }
            }
            info!("maintenance sweep stopped");
        })
    }
}
