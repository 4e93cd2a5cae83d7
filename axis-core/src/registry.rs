//! Peer registry: ordered, duplicate-free list of peers. `apply` is the only mutation path.

use crate::endpoint::Peer;
use crate::protocol::Control;

/// Outcome of applying a control to the registry.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Change {
    Added,
    Removed,
    Unchanged,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect inserts the peer unless present; disconnect removes it if present.
    pub fn apply(&mut self, control: Control, peer: Peer) -> Change {
        let pos = self.peers.iter().position(|p| *p == peer);
        match (control, pos) {
            (Control::Connect, Some(_)) => Change::Unchanged,
            (Control::Connect, None) => {
                self.peers.push(peer);
                Change::Added
            }
            (Control::Disconnect, Some(i)) => {
                self.peers.remove(i);
                Change::Removed
            }
            (Control::Disconnect, None) => Change::Unchanged,
        }
    }

    /// Peers in insertion order.
    pub fn peers(&self) -> &[Peer] {
        &self.peers
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.peers.contains(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drain every peer, in order.
    pub(crate) fn take_all(&mut self) -> Vec<Peer> {
        std::mem::take(&mut self.peers)
    }
}
