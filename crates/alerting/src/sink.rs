//! Alert sinks

use crate::AlertKind;
use std::sync::Mutex;
use tracing::warn;

/// Side-effect hook invoked once per emitted alert
pub trait AlertSink: Send + Sync {
    fn notify(&self, kind: AlertKind);
}

/// Sink that only logs
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, kind: AlertKind) {
        warn!(alert = %kind, "Driver alert");
    }
}

/// Sink that keeps every alert it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<AlertKind>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far, oldest first
    pub fn received(&self) -> Vec<AlertKind> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl AlertSink for RecordingSink {
    fn notify(&self, kind: AlertKind) {
        match self.received.lock() {
            Ok(mut r) => r.push(kind),
            Err(poisoned) => poisoned.into_inner().push(kind),
        }
    }
}

impl<S: AlertSink + ?Sized> AlertSink for std::sync::Arc<S> {
    fn notify(&self, kind: AlertKind) {
        (**self).notify(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recording_sink_through_arc() {
        let sink = Arc::new(RecordingSink::new());
        let shared: Box<dyn AlertSink> = Box::new(Arc::clone(&sink));

        shared.notify(AlertKind::Yawn);
        shared.notify(AlertKind::HeadDown);

        assert_eq!(sink.received(), vec![AlertKind::Yawn, AlertKind::HeadDown]);
    }
}
