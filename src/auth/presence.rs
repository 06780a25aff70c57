//! Presence refresh queue.
//!
//! The Session Guard records activity through [`PresenceTracker::touch`], which never
//! waits: events go onto a bounded channel and are dropped when it is full. A single
//! worker drains the channel into the principal repository.

use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::PrincipalId;
use crate::observability::metrics;
use crate::storage::repositories::PrincipalRepository;

/// Producer half of the presence queue.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    tx: mpsc::Sender<PrincipalId>,
}

impl PresenceTracker {
    /// Create a tracker and the receiver its worker drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PrincipalId>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Record activity for `id` without blocking. Returns whether the event was queued.
    pub fn touch(&self, id: PrincipalId) -> bool {
        match self.tx.try_send(id) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!(principal_id = %id, "presence queue full, dropping event");
                metrics::record_presence_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Drain presence events until cancelled or every tracker is dropped.
pub fn spawn_presence_worker(
    mut rx: mpsc::Receiver<PrincipalId>,
    principals: Arc<dyn PrincipalRepository>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("presence worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(id) => {
                        if let Err(e) = principals.mark_active(id).await {
                            warn!(principal_id = %id, error = %e, "failed to refresh presence");
                        }
                    }
                    None => break,
                },
            }
        }
        info!("presence worker stopped");
    })
}
