//! `EventSink` backed by a `tokio::sync::broadcast` channel, so every
//! handler-emitted event reaches every `GET /api/events` subscriber
//! (§6 event taxonomy) without the engine knowing transports exist.

use tokio::sync::broadcast;

use nerve_protocol::{Event, EventSink};

pub struct BroadcastSink {
    tx: broadcast::Sender<Event>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: Event) {
        // No subscribers is the common case between client connections;
        // dropping the event rather than buffering it is correct for a
        // live event stream.
        let _ = self.tx.send(event);
    }
}
