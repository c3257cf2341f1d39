use std::sync::mpsc;

use telelink_frame::Message;
use tracing::trace;

/// Notification from the link worker to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The transport could not be opened or failed beyond recovery.
    ConnectionError(String),
    /// A write did not complete within the write timeout. The link is closed.
    WriteTimeout(String),
    /// A control or telemetry reply, payload copied verbatim.
    DecodedMessage(Message),
    /// A full buffer of downsampled values.
    SampleBufferReady(Vec<i16>),
}

impl LinkEvent {
    /// True for events after which the worker has stopped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConnectionError(_) | Self::WriteTimeout(_))
    }
}

/// Worker-side end of the event channel.
///
/// Sends never block; events for a consumer that has gone away are dropped.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<LinkEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<LinkEvent>) -> Self {
        Self { tx }
    }

    /// Create a sender together with its receiving end.
    pub fn channel() -> (Self, mpsc::Receiver<LinkEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: LinkEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver gone; event dropped");
        }
    }
}
