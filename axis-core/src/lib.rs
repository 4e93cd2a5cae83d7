//! Axis datagram mesh core.
//! Host-driven: no I/O; host passes calls and datagrams and receives actions.

pub mod core;
pub mod endpoint;
pub mod protocol;
pub mod registry;
pub mod wire;

pub use crate::core::{AxisCore, Inbound, OutboundAction};
pub use endpoint::{parse, Descriptor, Endpoint, EndpointError, Peer, ToDescriptor};
pub use protocol::{Control, Payload, Tag};
pub use registry::{Change, PeerRegistry};
pub use wire::{decode_frame, encode_control, encode_frame, Frame, FrameDecodeError, FrameEncodeError};
