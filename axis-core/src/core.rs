//! Host-driven API: AxisCore receives calls and datagrams from the host, returns actions.

use crate::endpoint::{Endpoint, Peer};
use crate::protocol::{Control, Payload};
use crate::registry::{Change, PeerRegistry};
use crate::wire::{self, Frame, FrameDecodeError, FrameEncodeError};

/// Datagram the host should transmit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    SendDatagram(Endpoint, Vec<u8>),
}

/// What an inbound datagram meant, when it meant anything to the application.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A CONNECT added the sender to the registry.
    PeerJoined(Peer),
    /// A DISCONNECT removed the sender from the registry.
    PeerLeft(Peer),
    Message(Payload),
}

/// Membership and framing state for one node.
pub struct AxisCore {
    local: Endpoint,
    registry: PeerRegistry,
}

impl AxisCore {
    pub fn new(local: Endpoint) -> Self {
        Self {
            local,
            registry: PeerRegistry::new(),
        }
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Announce ourselves to each endpoint and register it without waiting for a reply.
    pub fn connect(&mut self, endpoints: &[Endpoint]) -> Vec<OutboundAction> {
        self.apply_local(Control::Connect, endpoints)
    }

    /// Tell each endpoint we are leaving and drop it from the registry.
    pub fn disconnect(&mut self, endpoints: &[Endpoint]) -> Vec<OutboundAction> {
        self.apply_local(Control::Disconnect, endpoints)
    }

    fn apply_local(&mut self, control: Control, endpoints: &[Endpoint]) -> Vec<OutboundAction> {
        let frame = wire::encode_control(control);
        endpoints
            .iter()
            .map(|&ep| {
                self.registry.apply(control, ep);
                OutboundAction::SendDatagram(ep, frame.to_vec())
            })
            .collect()
    }

    /// Frame `payload` for `target`, or for every registered peer in registry order.
    /// Unicast leaves the registry untouched.
    pub fn send(
        &self,
        payload: &Payload,
        target: Option<Endpoint>,
    ) -> Result<Vec<OutboundAction>, FrameEncodeError> {
        let frame = wire::encode_frame(payload)?;
        let actions = match target {
            Some(ep) => vec![OutboundAction::SendDatagram(ep, frame)],
            None => self
                .registry
                .peers()
                .iter()
                .map(|&ep| OutboundAction::SendDatagram(ep, frame.clone()))
                .collect(),
        };
        Ok(actions)
    }

    /// DISCONNECT every registered peer and clear the registry.
    pub fn close(&mut self) -> Vec<OutboundAction> {
        let frame = wire::encode_control(Control::Disconnect);
        self.registry
            .take_all()
            .into_iter()
            .map(|ep| OutboundAction::SendDatagram(ep, frame.to_vec()))
            .collect()
    }

    /// Process a datagram received from `from` (the transport's source address).
    /// Control frames update the registry; `None` when they changed nothing.
    pub fn on_datagram(
        &mut self,
        from: Endpoint,
        bytes: &[u8],
    ) -> Result<Option<Inbound>, FrameDecodeError> {
        let inbound = match wire::decode_frame(bytes)? {
            Frame::Control(control) => match self.registry.apply(control, from) {
                Change::Added => Some(Inbound::PeerJoined(from)),
                Change::Removed => Some(Inbound::PeerLeft(from)),
                Change::Unchanged => None,
            },
            Frame::Payload(payload) => Some(Inbound::Message(payload)),
        };
        Ok(inbound)
    }
}
