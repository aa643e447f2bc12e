//! Connectivity status of the remote link.
//!
//! The status is observed, never consulted: sync workers report into it and
//! UI code watches it. Capture, validation and matching work the same whether
//! the link is up or not.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Last known state of the link to the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    /// Nothing has talked to the remote yet.
    #[default]
    Unknown,
    Online,
    Offline,
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkStatus::Unknown => "unknown",
            LinkStatus::Online => "online",
            LinkStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Shared, cloneable publisher of [`LinkStatus`].
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    tx: Arc<watch::Sender<LinkStatus>>,
}

impl LinkMonitor {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(LinkStatus::Unknown);
        Self { tx: Arc::new(tx) }
    }

    /// Current status.
    pub fn status(&self) -> LinkStatus {
        *self.tx.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch(&self) -> watch::Receiver<LinkStatus> {
        self.tx.subscribe()
    }

    /// Record the result of a remote call. Only actual changes wake watchers.
    pub fn report(&self, status: LinkStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
        if changed {
            tracing::info!(status = %status, "link_status_changed");
        }
    }
}

impl Default for LinkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_unknown() {
        assert_eq!(LinkMonitor::new().status(), LinkStatus::Unknown);
    }

    #[tokio::test]
    async fn test_watchers_see_changes_only() {
        let monitor = LinkMonitor::new();
        let mut rx = monitor.watch();

        monitor.report(LinkStatus::Offline);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), LinkStatus::Offline);

        monitor.report(LinkStatus::Offline);
        assert!(!rx.has_changed().unwrap());

        let clone = monitor.clone();
        clone.report(LinkStatus::Online);
        assert_eq!(monitor.status(), LinkStatus::Online);
        assert!(rx.has_changed().unwrap());
    }
}
