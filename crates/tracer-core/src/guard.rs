//! Listener bundle guard.
//!
//! Attaching the coordinator to a [`DiscoveryEvents`](crate::events::DiscoveryEvents)
//! dispatcher spawns one processing task per event kind. All three tasks are
//! owned by a single [`Attachment`], so they are always released together:
//! either explicitly through [`Attachment::detach`] or when the guard is
//! dropped.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Guard over the three event-processing tasks.
///
/// # Example
///
/// ```ignore
/// use tracer_core::{DiscoveryEvents, TracerCoordinator};
///
/// async fn run(coordinator: std::sync::Arc<TracerCoordinator>) {
///     let events = DiscoveryEvents::default();
///     let attachment = coordinator.attach_with(&events, true).await;
///
///     // ... events are processed while the guard is alive ...
///
///     attachment.detach().await;
/// }
/// ```
#[derive(Debug)]
pub struct Attachment {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Attachment {
    pub(crate) fn new(cancel: CancellationToken, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, tasks }
    }

    /// Whether every listener task is still running.
    pub fn is_attached(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().all(|t| !t.is_finished())
    }

    /// Number of listener tasks in the bundle.
    pub fn listener_count(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for the listeners to end on their own.
    ///
    /// Listeners end once every sender of the event source is dropped and
    /// the events still queued have been processed.
    pub async fn wait_closed(mut self) {
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Event listener ended abnormally: {}", e);
            }
        }
        debug!("Event listeners finished");
    }

    /// Stop all listeners and wait for them to finish.
    ///
    /// Events already taken off a channel are processed to completion
    /// before the listener exits.
    pub async fn detach(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                warn!("Event listener ended abnormally: {}", e);
            }
        }
        debug!("Detached event listeners");
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            debug!("Attachment dropped, cancelling {} listener(s)", self.tasks.len());
        }
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_task(cancel: &CancellationToken) -> JoinHandle<()> {
        let cancel = cancel.clone();
        tokio::spawn(async move { cancel.cancelled().await })
    }

    #[tokio::test]
    async fn test_detach_stops_all_tasks() {
        let cancel = CancellationToken::new();
        let tasks = (0..3).map(|_| idle_task(&cancel)).collect();
        let attachment = Attachment::new(cancel.clone(), tasks);

        assert!(attachment.is_attached());
        assert_eq!(attachment.listener_count(), 3);

        attachment.detach().await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let cancel = CancellationToken::new();
        let handle = idle_task(&cancel);
        {
            let _attachment = Attachment::new(cancel.clone(), Vec::new());
        }
        assert!(cancel.is_cancelled());
        handle.await.unwrap();
    }
}
