//! Single-flight token refresh
//!
//! The first caller to report an authorization failure starts a refresh; any
//! caller arriving while it is in flight is queued. When the refresh settles
//! the `refreshing` flag is cleared and the queue is taken in one step under
//! the lock, then every queued caller is settled in arrival order with the
//! same outcome. A queued record never outlives the refresh it waited on.
//!
//! The lock is a std Mutex held only for flag/queue bookkeeping, never across
//! an await, so the leader can also settle from `Drop` if its future is
//! cancelled mid-refresh.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

use session_auth::CredentialStore;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

use crate::error::RefreshError;

/// Result delivered to every caller of one refresh cycle.
pub type RefreshOutcome = Result<String, RefreshError>;

/// The credential operations the coordinator drives.
///
/// Implemented for `CredentialStore`; tests substitute scripted refreshers.
pub trait TokenRefresher: Send + Sync {
    /// Perform one remote refresh and return the new access token.
    fn refresh(&self) -> Pin<Box<dyn Future<Output = session_auth::Result<String>> + Send + '_>>;

    /// Clear the session after an unrecoverable refresh failure.
    fn logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

impl TokenRefresher for CredentialStore {
    fn refresh(&self) -> Pin<Box<dyn Future<Output = session_auth::Result<String>> + Send + '_>> {
        Box::pin(self.refresh_token())
    }

    fn logout(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(CredentialStore::logout(self))
    }
}

/// A caller waiting for the in-flight refresh.
struct PendingRequest {
    request_id: String,
    settle: oneshot::Sender<RefreshOutcome>,
}

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    queue: VecDeque<PendingRequest>,
}

/// Owns the refresh-in-progress flag and the wait queue.
///
/// One coordinator per session; share it with `Arc`.
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Whether a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.lock_state().refreshing
    }

    /// Number of callers queued behind the outstanding refresh.
    pub fn queued(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Get a new access token after an authorization failure.
    ///
    /// Starts a refresh if none is running, otherwise waits for the running
    /// one. On failure every caller of this cycle receives the same error and
    /// the session is logged out.
    #[instrument(skip(self))]
    pub async fn obtain_fresh_token(&self, request_id: &str) -> RefreshOutcome {
        let waiter = {
            let mut state = self.lock_state();
            if state.refreshing {
                let (settle, rx) = oneshot::channel();
                state.queue.push_back(PendingRequest {
                    request_id: request_id.to_string(),
                    settle,
                });
                debug!(position = state.queue.len(), "refresh in flight, queued");
                Some(rx)
            } else {
                state.refreshing = true;
                None
            }
        };

        if let Some(rx) = waiter {
            crate::metrics::record_queued();
            // A dropped sender means the coordinator itself was torn down
            return rx.await.unwrap_or(Err(RefreshError::Abandoned));
        }

        let in_flight = InFlight {
            coordinator: self,
            settled: false,
        };

        info!("starting token refresh");
        let outcome = self.refresher.refresh().await.map_err(RefreshError::from);
        in_flight.settle(&outcome);

        match &outcome {
            Ok(_) => {
                crate::metrics::record_refresh("success");
                info!("token refresh succeeded");
            }
            Err(e) => {
                crate::metrics::record_refresh("failure");
                let network = matches!(e, RefreshError::Failed(inner) if inner.is_network());
                warn!(error = %e, network, "token refresh failed, logging out");
                self.refresher.logout().await;
            }
        }

        outcome
    }

    /// Clear the flag, take the whole queue, then settle it in FIFO order.
    fn drain(&self, outcome: &RefreshOutcome) {
        let queue = {
            let mut state = self.lock_state();
            state.refreshing = false;
            std::mem::take(&mut state.queue)
        };

        if !queue.is_empty() {
            debug!(waiters = queue.len(), ok = outcome.is_ok(), "settling queued callers");
        }
        for pending in queue {
            if pending.settle.send(outcome.clone()).is_err() {
                debug!(request_id = %pending.request_id, "queued caller went away before settling");
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("refresh state mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Guard held by the caller driving the refresh.
///
/// If that future is dropped before `settle`, queued callers are rejected
/// with `Abandoned` and the flag is cleared so the next failure can refresh.
struct InFlight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.coordinator.drain(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!("refresh dropped before settling, rejecting queued callers");
            crate::metrics::record_refresh("abandoned");
            self.coordinator.drain(&Err(RefreshError::Abandoned));
        }
    }
}
