//! Rendezvous broadcast protocol shared by every transport.
//!
//! A transport only has to move [`Frame`]s between pairs of members
//! (the [`Link`] trait); [`Endpoint`] runs the collective protocol on top.
//!
//! For a broadcast with sequence number `s` from root `r`:
//!
//! 1. `r` sends `Data { seq: s, root: r, payload }` to every other member.
//! 2. Each non-root receives from `r`, checks the sequence number, the
//!    root and the payload shape against its own call, and replies
//!    `Ack { seq: s }`.
//! 3. Once `r` holds an acknowledgement from every member it sends
//!    `Release { seq: s }`; non-roots return only after the release.
//!
//! Sequence numbers advance identically on every member, one per
//! collective call, so a member that skips or reorders a call is caught
//! at the next exchange with the root instead of silently reading the
//! wrong payload.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use log::trace;

use crate::group::{CommError, ProcessGroup, TransportType};

/// The value carried by a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Vector(Vec<f64>),
    Scalar(f64),
}

impl Payload {
    pub fn shape(&self) -> Shape {
        match self {
            Payload::Vector(values) => Shape::Vector(values.len()),
            Payload::Scalar(_) => Shape::Scalar,
        }
    }
}

/// Shape of a broadcast payload. Members must agree on it for every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Vector(usize),
    Scalar,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Vector(len) => write!(f, "vector of length {}", len),
            Shape::Scalar => write!(f, "scalar"),
        }
    }
}

/// A message exchanged between two members.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data { seq: u64, root: usize, payload: Payload },
    Ack { seq: u64 },
    Release { seq: u64 },
}

impl Frame {
    /// Short description used in desynchronisation errors.
    pub fn describe(&self) -> String {
        match self {
            Frame::Data { seq, root, payload } => {
                format!("data #{} from root {} ({})", seq, root, payload.shape())
            }
            Frame::Ack { seq } => format!("ack #{}", seq),
            Frame::Release { seq } => format!("release #{}", seq),
        }
    }
}

/// A bidirectional, ordered connection to one peer.
pub trait Link: Send + Sync {
    /// Rank of the member at the other end.
    fn peer(&self) -> usize;

    fn send(&self, frame: Frame) -> Result<(), CommError>;

    /// Block until the next frame from the peer arrives.
    fn recv(&self) -> Result<Frame, CommError>;
}

/// One member of a group, running the rendezvous protocol over its links.
pub struct Endpoint<L: Link> {
    rank: usize,
    size: usize,
    /// Links to every other member, ordered by peer rank (self excluded).
    links: Vec<L>,
    seq: AtomicU64,
    transport: TransportType,
}

impl<L: Link> Endpoint<L> {
    /// Assemble a member from its links.
    ///
    /// `links` must hold exactly one link per other member, ordered by peer
    /// rank.
    pub fn new(
        rank: usize,
        size: usize,
        links: Vec<L>,
        transport: TransportType,
    ) -> Result<Self, CommError> {
        if size == 0 {
            return Err(CommError::InvalidGroup("group size must be at least 1".into()));
        }
        if rank >= size {
            return Err(CommError::InvalidGroup(format!(
                "rank {} is outside a group of size {}",
                rank, size
            )));
        }
        if links.len() != size - 1 {
            return Err(CommError::InvalidGroup(format!(
                "rank {} has {} links, expected {}",
                rank,
                links.len(),
                size - 1
            )));
        }
        let peers_in_order = links
            .iter()
            .map(|link| link.peer())
            .eq((0..size).filter(|&p| p != rank));
        if !peers_in_order {
            return Err(CommError::InvalidGroup(format!(
                "rank {}: links are not ordered by peer rank",
                rank
            )));
        }

        Ok(Self {
            rank,
            size,
            links,
            seq: AtomicU64::new(0),
            transport,
        })
    }

    fn link(&self, peer: usize) -> &L {
        // Self is skipped in `links`, so ranks above ours shift down by one.
        if peer < self.rank {
            &self.links[peer]
        } else {
            &self.links[peer - 1]
        }
    }

    /// Run one collective call. `outgoing` is the payload on the root and
    /// ignored elsewhere; `expected` is the shape every member agreed on.
    fn collective(
        &self,
        root: usize,
        outgoing: Payload,
        expected: Shape,
    ) -> Result<Payload, CommError> {
        if root >= self.size {
            return Err(CommError::InvalidRoot {
                root,
                size: self.size,
            });
        }
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        trace!(
            "rank {}: collective #{} from root {} ({})",
            self.rank,
            seq,
            root,
            expected
        );

        if self.rank == root {
            for link in &self.links {
                link.send(Frame::Data {
                    seq,
                    root,
                    payload: outgoing.clone(),
                })?;
            }
            for link in &self.links {
                match link.recv()? {
                    Frame::Ack { seq: s } if s == seq => {}
                    other => return Err(desync(link.peer(), seq, &other)),
                }
            }
            for link in &self.links {
                link.send(Frame::Release { seq })?;
            }
            Ok(outgoing)
        } else {
            let link = self.link(root);
            let payload = match link.recv()? {
                Frame::Data {
                    seq: s,
                    root: r,
                    payload,
                } if s == seq && r == root => payload,
                other => return Err(desync(root, seq, &other)),
            };
            if payload.shape() != expected {
                return Err(CommError::ShapeMismatch {
                    peer: root,
                    expected,
                    found: payload.shape(),
                });
            }
            link.send(Frame::Ack { seq })?;
            match link.recv()? {
                Frame::Release { seq: s } if s == seq => Ok(payload),
                other => Err(desync(root, seq, &other)),
            }
        }
    }
}

fn desync(peer: usize, seq: u64, found: &Frame) -> CommError {
    CommError::Desynchronized {
        peer,
        seq,
        found: found.describe(),
    }
}

impl<L: Link> ProcessGroup for Endpoint<L> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn transport(&self) -> TransportType {
        self.transport
    }

    fn broadcast_vector(&self, buffer: &mut [f64], root: usize) -> Result<(), CommError> {
        let expected = Shape::Vector(buffer.len());
        let outgoing = if self.rank == root {
            Payload::Vector(buffer.to_vec())
        } else {
            Payload::Vector(Vec::new())
        };
        match self.collective(root, outgoing, expected)? {
            Payload::Vector(values) => {
                if self.rank != root {
                    buffer.copy_from_slice(&values);
                }
                Ok(())
            }
            other => Err(CommError::ShapeMismatch {
                peer: root,
                expected,
                found: other.shape(),
            }),
        }
    }

    fn broadcast_scalar(&self, value: f64, root: usize) -> Result<f64, CommError> {
        match self.collective(root, Payload::Scalar(value), Shape::Scalar)? {
            Payload::Scalar(v) => Ok(v),
            other => Err(CommError::ShapeMismatch {
                peer: root,
                expected: Shape::Scalar,
                found: other.shape(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_display() {
        assert_eq!(Shape::Vector(3).to_string(), "vector of length 3");
        assert_eq!(Shape::Scalar.to_string(), "scalar");
    }

    #[test]
    fn test_frame_describe_names_sequence_and_root() {
        let frame = Frame::Data {
            seq: 7,
            root: 2,
            payload: Payload::Scalar(1.0),
        };
        assert_eq!(frame.describe(), "data #7 from root 2 (scalar)");
        assert_eq!(Frame::Ack { seq: 3 }.describe(), "ack #3");
    }
}
