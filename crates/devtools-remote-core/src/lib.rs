//! # devtools-remote-core
//!
//! Session brokering for the DevTools remote relay.
//!
//! - Branded ids for sessions, targets, connections and bindings
//! - Target descriptors in the `/json` listing shape
//! - Data-channel address building and parsing
//! - [`SessionRegistry`]: sharded store of live sessions
//! - [`Relay`]: verbatim frame forwarding between bound channel pairs
//!
//! Transports plug in through the [`FrameSink`] capability; this crate has
//! no I/O of its own.

#![deny(unsafe_code)]

pub mod address;
pub mod channel;
pub mod errors;
pub mod ids;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod target;

pub use address::{Addressing, data_channel_path, parse_data_channel_path};
pub use channel::{CloseReason, FrameSink};
pub use errors::{ProtocolError, RegistryError};
pub use ids::{BindingId, ConnectionId, SessionId, TargetId};
pub use protocol::ControlMessage;
pub use registry::{BindOutcome, EndedSession, RegistryStats, SessionRegistry};
pub use relay::{Attachment, Delivery, Relay};
pub use target::{Announcement, Target};
