//! A [`ConnectionHandler`] that records every callback.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use gatewire::{
    Connection,
    ConnectionHandler,
    ConnectionId,
    MessageKind,
    hooks::ReceiveResult,
};

/// One observed callback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookEvent {
    /// `on_connect` ran.
    Connected(ConnectionId),
    /// `on_receive` ran with this payload.
    Received(ConnectionId, Bytes),
    /// `on_disconnect` ran.
    Disconnected(ConnectionId),
}

/// Records hook invocations in order. Optionally echoes every payload.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    echo: bool,
    events: Mutex<Vec<HookEvent>>,
}

impl RecordingHandler {
    /// A handler that only records.
    #[must_use]
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// A handler that records and replies with each received payload.
    #[must_use]
    pub fn echoing() -> Arc<Self> {
        Arc::new(Self {
            echo: true,
            events: Mutex::default(),
        })
    }

    fn record(&self, event: HookEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Copy of every event so far.
    #[must_use]
    pub fn events(&self) -> Vec<HookEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads received, in order.
    #[must_use]
    pub fn received(&self) -> Vec<Bytes> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HookEvent::Received(_, payload) => Some(payload),
                _ => None,
            })
            .collect()
    }

    /// How many times `on_disconnect` ran for `id`.
    #[must_use]
    pub fn disconnects(&self, id: ConnectionId) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == HookEvent::Disconnected(id))
            .count()
    }
}

impl ConnectionHandler for RecordingHandler {
    fn on_connect(&self, conn: &Connection) { self.record(HookEvent::Connected(conn.id())); }

    fn on_receive(&self, conn: &Connection, payload: Bytes, _kind: MessageKind) -> ReceiveResult {
        self.record(HookEvent::Received(conn.id(), payload.clone()));
        Ok(self.echo.then_some(payload))
    }

    fn on_disconnect(&self, conn: &Connection) { self.record(HookEvent::Disconnected(conn.id())); }
}
