//! Inbound events delivered to the application.

use axis_core::{Endpoint, Payload};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::error::NodeError;

/// Something that arrived on the node's socket.
#[derive(Debug)]
pub enum NodeEvent {
    /// Application payload from `from` (the datagram's source address).
    Message { payload: Payload, from: Endpoint },
    /// A CONNECT added a new peer.
    PeerJoined(Endpoint),
    /// A DISCONNECT removed a peer.
    PeerLeft(Endpoint),
    /// A datagram that could not be decoded. The node keeps running.
    Malformed { from: Endpoint, error: NodeError },
}

/// Sending half, held by the receive loop.
#[derive(Debug)]
pub(crate) enum EventSender {
    Unbounded(mpsc::UnboundedSender<NodeEvent>),
    /// Drops the event when the queue is full.
    Bounded(mpsc::Sender<NodeEvent>),
}

impl EventSender {
    /// Deliver without blocking. No listener is fine: the registry is already updated.
    pub(crate) fn deliver(&self, event: NodeEvent) {
        match self {
            EventSender::Unbounded(tx) => {
                let _ = tx.send(event);
            }
            EventSender::Bounded(tx) => {
                if let Err(TrySendError::Full(event)) = tx.try_send(event) {
                    debug!(?event, "event queue full, dropping");
                }
            }
        }
    }
}

#[derive(Debug)]
enum EventReceiver {
    Unbounded(mpsc::UnboundedReceiver<NodeEvent>),
    Bounded(mpsc::Receiver<NodeEvent>),
}

/// Receiving half of a node's event stream. Ends once the node is closed.
#[derive(Debug)]
pub struct Events {
    rx: EventReceiver,
}

impl Events {
    pub(crate) fn unbounded() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSender::Unbounded(tx),
            Self {
                rx: EventReceiver::Unbounded(rx),
            },
        )
    }

    /// At most `capacity` queued events (minimum 1).
    pub(crate) fn bounded(capacity: usize) -> (EventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            EventSender::Bounded(tx),
            Self {
                rx: EventReceiver::Bounded(rx),
            },
        )
    }

    pub async fn recv(&mut self) -> Option<NodeEvent> {
        match &mut self.rx {
            EventReceiver::Unbounded(rx) => rx.recv().await,
            EventReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<NodeEvent> {
        match &mut self.rx {
            EventReceiver::Unbounded(rx) => rx.try_recv().ok(),
            EventReceiver::Bounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Skip membership and error events up to the next application message.
    pub async fn next_message(&mut self) -> Option<(Payload, Endpoint)> {
        while let Some(event) = self.recv().await {
            if let NodeEvent::Message { payload, from } = event {
                return Some((payload, from));
            }
        }
        None
    }
}
