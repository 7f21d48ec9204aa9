//! Channel-backed event source for hosts that push runtime events.

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{BridgeError, Result};
use crate::types::RuntimeEvent;

/// Sending half of an event channel.
#[derive(Debug, Clone)]
pub struct EventFeed {
    tx: mpsc::UnboundedSender<Result<RuntimeEvent>>,
}

impl EventFeed {
    /// Returns false once the consumer has gone away.
    pub fn push(&self, event: RuntimeEvent) -> bool {
        self.tx.send(Ok(event)).is_ok()
    }

    /// Parse and push one JSON line from the runtime.
    pub fn push_json(&self, raw: &str) -> Result<bool> {
        let event = RuntimeEvent::from_json(raw)?;
        Ok(self.push(event))
    }

    /// Terminate the stream with a fault.
    pub fn fail(&self, error: BridgeError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create a feed and the stream that
/// [`TurnEngine::consume_query`](super::TurnEngine::consume_query) reads.
///
/// The stream ends when every `EventFeed` clone is dropped.
pub fn event_channel() -> (EventFeed, UnboundedReceiverStream<Result<RuntimeEvent>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventFeed { tx }, UnboundedReceiverStream::new(rx))
}
