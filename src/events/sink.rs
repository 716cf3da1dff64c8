use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::ProgressEvent;

/// Destination of progress events. `emit` never blocks and never fails.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Channel-backed sink with a single subscriber.
pub struct ProgressStreamer {
    tx: mpsc::UnboundedSender<ProgressEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<ProgressEvent>>>,
}

impl ProgressStreamer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
        }
    }

    /// Take the event stream. Only the first call gets it.
    pub fn subscribe(&self) -> Option<UnboundedReceiverStream<ProgressEvent>> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(UnboundedReceiverStream::new)
    }
}

impl Default for ProgressStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ProgressStreamer {
    fn emit(&self, event: ProgressEvent) {
        let kind = event.event_type();
        if self.tx.send(event).is_err() {
            tracing::debug!(event = kind, "Progress subscriber dropped, event discarded");
        }
    }
}

impl std::fmt::Debug for ProgressStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressStreamer")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Sink that hands every event to a closure.
pub struct CallbackSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        (self.callback)(event);
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}
