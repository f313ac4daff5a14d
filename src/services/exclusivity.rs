//! Single-build exclusivity.
//!
//! The [`ExclusivitySlot`] holds at most one [`ExclusivityToken`]. Acquiring it is a
//! try-acquire: a second build is refused while the slot is occupied. The returned
//! [`SlotGuard`] empties the slot when dropped, so every exit path of a build
//! (including panics and early returns) releases it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{BuildRun, LogId};

/// Acknowledgement sent back to a stop requester once the build has been torn down.
pub type StopAck = oneshot::Sender<()>;

/// Marker of the build in flight, holding what is needed to observe and stop it.
#[derive(Debug)]
pub struct ExclusivityToken {
    log_id: LogId,
    progress: watch::Receiver<BuildRun>,
    stop_tx: mpsc::Sender<StopAck>,
}

impl ExclusivityToken {
    pub fn new(
        log_id: LogId,
        progress: watch::Receiver<BuildRun>,
        stop_tx: mpsc::Sender<StopAck>,
    ) -> Self {
        Self {
            log_id,
            progress,
            stop_tx,
        }
    }
}

/// Process-wide holder of the current [`ExclusivityToken`].
#[derive(Debug, Default)]
pub struct ExclusivitySlot {
    current: Mutex<Option<ExclusivityToken>>,
}

impl ExclusivitySlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExclusivityToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `token`, or report the build already holding it.
    pub fn try_acquire(self: &Arc<Self>, token: ExclusivityToken) -> BuildResult<SlotGuard> {
        let mut current = self.lock();
        if let Some(active) = current.as_ref() {
            return Err(BuildError::AlreadyRunning(active.log_id.to_string()));
        }

        let log_id = token.log_id.clone();
        *current = Some(token);
        debug!(log_id = %log_id, "exclusivity acquired");

        Ok(SlotGuard {
            slot: Arc::clone(self),
            log_id,
        })
    }

    pub fn is_held(&self) -> bool {
        self.lock().is_some()
    }

    /// Log id of the build in flight.
    pub fn active_log_id(&self) -> Option<LogId> {
        self.lock().as_ref().map(|t| t.log_id.clone())
    }

    /// Live view of the build in flight.
    pub fn snapshot(&self) -> Option<BuildRun> {
        self.lock().as_ref().map(|t| t.progress.borrow().clone())
    }

    /// Handle for asking the build in flight to stop.
    pub fn stop_handle(&self) -> Option<(LogId, mpsc::Sender<StopAck>)> {
        self.lock()
            .as_ref()
            .map(|t| (t.log_id.clone(), t.stop_tx.clone()))
    }

    fn release(&self, log_id: &LogId) {
        let mut current = self.lock();
        if current.as_ref().is_some_and(|t| &t.log_id == log_id) {
            *current = None;
            debug!(log_id = %log_id, "exclusivity released");
        }
    }
}

/// Keeps the slot claimed until dropped.
#[derive(Debug)]
pub struct SlotGuard {
    slot: Arc<ExclusivitySlot>,
    log_id: LogId,
}

impl SlotGuard {
    pub fn log_id(&self) -> &LogId {
        &self.log_id
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slot.release(&self.log_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::VcsSnapshot;
    use chrono::{Local, TimeZone};

    fn token(second: u32) -> (ExclusivityToken, watch::Sender<BuildRun>, mpsc::Receiver<StopAck>) {
        let at = Local.with_ymd_and_hms(2025, 1, 1, 0, 0, second).unwrap();
        let run = BuildRun::new(LogId::at(at), "tester", VcsSnapshot::unknown(), at);
        let (progress_tx, progress_rx) = watch::channel(run.clone());
        let (stop_tx, stop_rx) = mpsc::channel(1);
        (
            ExclusivityToken::new(run.log_id, progress_rx, stop_tx),
            progress_tx,
            stop_rx,
        )
    }

    #[test]
    fn test_second_acquire_is_rejected() {
        let slot = ExclusivitySlot::new();
        let (first, _p1, _s1) = token(1);
        let (second, _p2, _s2) = token(2);

        let guard = slot.try_acquire(first).unwrap();
        match slot.try_acquire(second) {
            Err(BuildError::AlreadyRunning(id)) => assert_eq!(id, guard.log_id().as_str()),
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }
        assert_eq!(slot.active_log_id().as_ref(), Some(guard.log_id()));
    }

    #[test]
    fn test_drop_releases_slot() {
        let slot = ExclusivitySlot::new();
        let (first, _p1, _s1) = token(1);
        let (second, _p2, _s2) = token(2);

        let guard = slot.try_acquire(first).unwrap();
        assert!(slot.is_held());
        drop(guard);
        assert!(!slot.is_held());
        assert!(slot.stop_handle().is_none());

        let _guard = slot.try_acquire(second).unwrap();
        assert!(slot.is_held());
    }

    #[test]
    fn test_snapshot_follows_progress() {
        let slot = ExclusivitySlot::new();
        let (first, progress, _stop) = token(1);
        let _guard = slot.try_acquire(first).unwrap();

        progress.send_modify(|run| run.kernel_name = Some("sdm845".to_string()));
        let snapshot = slot.snapshot().unwrap();
        assert_eq!(snapshot.kernel_name.as_deref(), Some("sdm845"));
    }

    #[tokio::test]
    async fn test_stop_handle_reaches_holder() {
        let slot = ExclusivitySlot::new();
        let (first, _progress, mut stop_rx) = token(1);
        let _guard = slot.try_acquire(first).unwrap();

        let (_, stop_tx) = slot.stop_handle().unwrap();
        let (ack_tx, ack_rx) = oneshot::channel();
        stop_tx.send(ack_tx).await.unwrap();

        let ack = stop_rx.recv().await.unwrap();
        ack.send(()).unwrap();
        ack_rx.await.unwrap();
    }
}
