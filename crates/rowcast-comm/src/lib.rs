//! # Rowcast Comm
//!
//! Process-group abstraction for the Rowcast solver. This crate provides a
//! [`ProcessGroup`](group::ProcessGroup) trait that isolates the elimination
//! protocol from the transport that moves broadcast payloads between
//! participants.
//!
//! ## Available transports
//!
//! | Transport | Feature flag | Status |
//! |-----------|-------------|--------|
//! | In-process (crossbeam channels) | `local` (default) | Implemented |
//! | TCP full mesh | `distributed` | Implemented |
//!
//! Every transport runs the same rendezvous protocol ([`protocol`]), so a
//! solver written against [`ProcessGroup`] behaves identically whether its
//! participants are threads in one process or processes on separate hosts.

pub mod group;
pub mod protocol;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "distributed")]
pub mod tcp;

pub use group::{CommError, GroupInfo, ProcessGroup, TransportType};
pub use protocol::{Endpoint, Frame, Link, Payload, Shape};

#[cfg(feature = "local")]
pub use local::{run_local, LocalGroup};

#[cfg(feature = "distributed")]
pub use tcp::{TcpGroup, TcpOptions};
