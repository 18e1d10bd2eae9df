//! Graceful shutdown: stop accepting, then let every session leave its room.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TrackedFuture;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before giving up on stragglers.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Coordinates shutdown of the listener and every WebSocket session.
///
/// Sessions are wrapped with [`track_session`](Self::track_session) and watch
/// [`token`](Self::token). On cancellation each one leaves its room, so the
/// remaining members see `room.userLeft`, and [`graceful_shutdown`](Self::graceful_shutdown)
/// waits for that cleanup before returning.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    sessions: TaskTracker,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            sessions: TaskTracker::new(),
        }
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wrap a session future so shutdown waits for it to finish.
    pub fn track_session<F: Future>(&self, session: F) -> TrackedFuture<F> {
        self.sessions.track_future(session)
    }

    /// Sessions started and not yet finished.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, then wait up to `timeout` for `handles` and every
    /// tracked session to finish.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();
        let _ = self.sessions.close();
        info!(
            task_count = handles.len(),
            sessions = self.sessions.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks and sessions to complete"
        );

        let drain = async {
            let _ = futures::future::join_all(handles).await;
            self.sessions.wait().await;
        };

        if tokio::time::timeout(timeout, drain).await.is_err() {
            warn!(
                sessions = self.sessions.len(),
                "shutdown timed out after {timeout:?}, some sessions may not have left their rooms"
            );
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn initial_state_not_shutting_down() {
        let coord = ShutdownCoordinator::new();
        assert!(!coord.is_shutting_down());
    }

    #[test]
    fn shutdown_cancels_every_token() {
        let coord = ShutdownCoordinator::new();
        let t1 = coord.token();
        let t2 = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }

    #[tokio::test]
    async fn graceful_shutdown_awaits_all_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();

        let handle = tokio::spawn(async move {
            token.cancelled().await;
        });

        coord.graceful_shutdown(vec![handle], None).await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_session_cleanup() {
        let coord = ShutdownCoordinator::new();
        let token = coord.token();
        let cleaned_up = Arc::new(AtomicBool::new(false));

        let session = coord.track_session({
            let cleaned_up = cleaned_up.clone();
            async move {
                token.cancelled().await;
                tokio::time::sleep(Duration::from_millis(50)).await;
                cleaned_up.store(true, Ordering::SeqCst);
            }
        });
        let _ = tokio::spawn(session);
        assert_eq!(coord.active_sessions(), 1);

        coord.graceful_shutdown(Vec::new(), None).await;
        assert!(cleaned_up.load(Ordering::SeqCst));
        assert_eq!(coord.active_sessions(), 0);
    }

    #[tokio::test]
    async fn graceful_shutdown_gives_up_on_stuck_session() {
        let coord = ShutdownCoordinator::new();
        let _ = tokio::spawn(coord.track_session(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        }));

        coord
            .graceful_shutdown(Vec::new(), Some(Duration::from_millis(100)))
            .await;
        assert_eq!(coord.active_sessions(), 1);
    }

    #[tokio::test]
    async fn graceful_shutdown_times_out() {
        let coord = ShutdownCoordinator::new();

        // Ignores cancellation
        let handle = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(300)).await;
        });

        coord
            .graceful_shutdown(vec![handle], Some(Duration::from_millis(100)))
            .await;
        assert!(coord.is_shutting_down());
    }
}
