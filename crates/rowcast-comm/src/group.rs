//! Process-group trait and error types.
//!
//! The [`ProcessGroup`] trait abstracts over the transports that connect the
//! participants of a solve, so that the elimination code in `rowcast-core`
//! never sees channels or sockets.

use thiserror::Error;

use crate::protocol::Shape;

/// Errors originating from a process group.
///
/// None of these are recoverable: once a collective call fails the group's
/// view of the computation is no longer consistent.
#[derive(Debug, Error)]
pub enum CommError {
    #[error("Invalid group: {0}")]
    InvalidGroup(String),

    #[error("Broadcast root {root} is outside the group (size {size})")]
    InvalidRoot { root: usize, size: usize },

    #[error("Lost connection to rank {peer}")]
    PeerLost { peer: usize },

    #[error("Collective #{seq} desynchronised with rank {peer}: received {found}")]
    Desynchronized { peer: usize, seq: u64, found: String },

    #[error("Broadcast shape mismatch with root {peer}: expected {expected}, received {found}")]
    ShapeMismatch {
        peer: usize,
        expected: Shape,
        found: Shape,
    },

    #[error("Malformed frame from rank {peer}: {reason}")]
    Malformed { peer: usize, reason: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("I/O error talking to rank {peer}: {source}")]
    Io {
        peer: usize,
        #[source]
        source: std::io::Error,
    },
}

/// Describes a member of a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupInfo {
    pub rank: usize,
    pub size: usize,
    pub transport: TransportType,
}

/// The transport connecting the members of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    Local,
    Tcp,
}

/// A fixed-size group of cooperating participants.
///
/// Every member must issue the same sequence of collective calls, each with
/// the same root and payload shape. All collectives are blocking
/// rendezvous: a call returns on no member until every member has issued
/// the matching call. There is no timeout and no retry.
pub trait ProcessGroup: Send + Sync {
    /// Rank of this member, in `[0, size)`.
    fn rank(&self) -> usize;

    /// Number of members. Fixed for the lifetime of the group.
    fn size(&self) -> usize;

    /// The transport this member communicates over.
    fn transport(&self) -> TransportType;

    /// Broadcast `buffer` from `root` to every member.
    ///
    /// On the root the buffer is the value sent; on every other member it is
    /// overwritten with the root's contents. All members must pass buffers
    /// of the same length.
    fn broadcast_vector(&self, buffer: &mut [f64], root: usize) -> Result<(), CommError>;

    /// Broadcast a single value from `root`, returning the root's value on
    /// every member. Non-root members' `value` is ignored.
    fn broadcast_scalar(&self, value: f64, root: usize) -> Result<f64, CommError>;

    /// Block until every member has reached the barrier.
    fn barrier(&self) -> Result<(), CommError> {
        self.broadcast_scalar(0.0, 0).map(|_| ())
    }

    /// Return identity information about this member.
    fn info(&self) -> GroupInfo {
        GroupInfo {
            rank: self.rank(),
            size: self.size(),
            transport: self.transport(),
        }
    }
}
