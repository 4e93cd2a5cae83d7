//! Axis node: a UDP host for the axis-core mesh.
//!
//! ```rust,no_run
//! use axis_node::{Node, NodeError};
//!
//! # async fn example() -> Result<(), NodeError> {
//! let (node, mut events) = Node::bind("127.0.0.1:4000").await?;
//! node.connect(["127.0.0.1:4001", "127.0.0.1:4002"]).await?;
//! node.send("Darth is my father.").await?;
//! while let Some((payload, from)) = events.next_message().await {
//!     println!("{from}: {payload:?}");
//! }
//! node.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod event;
pub mod node;
pub mod resolve;

pub use axis_core::{Descriptor, Endpoint, Payload, Peer, ToDescriptor};
pub use error::NodeError;
pub use event::{Events, NodeEvent};
pub use node::Node;
