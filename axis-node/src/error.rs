//! Node error types.

use axis_core::{Endpoint, EndpointError, FrameDecodeError, FrameEncodeError};

/// Errors surfaced by [`Node`](crate::Node) operations and events.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// The descriptor could not be resolved to an endpoint.
    #[error("malformed endpoint: {0}")]
    MalformedEndpoint(#[from] EndpointError),

    /// The local socket could not be bound.
    #[error("cannot bind {endpoint}: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// An inbound datagram could not be decoded.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] FrameDecodeError),

    /// An outbound payload could not be framed.
    #[error("cannot encode payload: {0}")]
    Encode(#[from] FrameEncodeError),

    /// The node was closed.
    #[error("node closed")]
    NodeClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
