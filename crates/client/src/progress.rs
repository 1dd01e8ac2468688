//! Progress events emitted to an external observer (a UI bridge, a terminal)

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Status strings as seen by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Checking,
    Downloading,
    AlreadyReady,
    Ready,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Downloading => "downloading",
            Self::AlreadyReady => "alreadyReady",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The file a download worker most recently started on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentFile {
    pub path: String,
    pub size: u64,
}

/// One observable progress update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum ProgressEvent {
    #[serde(rename = "downloadStatus")]
    Status(SyncStatus),
    /// Fraction of the remote total accounted for, in `0.0..=1.0`
    #[serde(rename = "downloadProgress")]
    Progress(f64),
    #[serde(rename = "currentFileData")]
    CurrentFile(CurrentFile),
}

impl ProgressEvent {
    /// Event name on the UI bridge
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "downloadStatus",
            Self::Progress(_) => "downloadProgress",
            Self::CurrentFile(_) => "currentFileData",
        }
    }
}

/// Receives progress events; called from the orchestrator and its reporter task
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Forwards events into a channel, e.g. towards a UI event loop
impl ProgressObserver for UnboundedSender<ProgressEvent> {
    fn on_event(&self, event: ProgressEvent) {
        // A closed receiver just means nobody is listening anymore
        let _ = self.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings() {
        let all = [
            SyncStatus::Checking,
            SyncStatus::Downloading,
            SyncStatus::AlreadyReady,
            SyncStatus::Ready,
            SyncStatus::Error,
        ];
        let names: Vec<_> = all.iter().map(SyncStatus::as_str).collect();
        assert_eq!(
            names,
            ["checking", "downloading", "alreadyReady", "ready", "error"]
        );
        for status in all {
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::Value::String(status.to_string())
            );
        }
    }

    #[test]
    fn test_bridge_event_shape() {
        let event = ProgressEvent::CurrentFile(CurrentFile {
            path: "bin/game".into(),
            size: 42,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(json["data"]["path"], "bin/game");
        assert_eq!(json["data"]["size"], 42);

        let json = serde_json::to_value(ProgressEvent::Status(SyncStatus::AlreadyReady)).unwrap();
        assert_eq!(json["event"], "downloadStatus");
        assert_eq!(json["data"], "alreadyReady");
    }

    #[tokio::test]
    async fn test_channel_observer() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        tx.on_event(ProgressEvent::Progress(0.5));
        assert_eq!(rx.recv().await, Some(ProgressEvent::Progress(0.5)));

        drop(rx);
        // Sending after the receiver is gone is not an error
        tx.on_event(ProgressEvent::Progress(1.0));
    }
}
