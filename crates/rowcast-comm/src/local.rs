//! In-process transport using crossbeam channels.
//!
//! Members of a [`LocalGroup`] are meant to run on separate threads. They
//! share no memory: every pair of members is wired with two unbounded
//! channels, and payloads move through them by value.

use crossbeam::channel::{unbounded, Receiver, Sender};
use log::debug;

use crate::group::{CommError, TransportType};
use crate::protocol::{Endpoint, Frame, Link};

/// Channel pair connecting a member to one peer.
pub struct ChannelLink {
    peer: usize,
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl Link for ChannelLink {
    fn peer(&self) -> usize {
        self.peer
    }

    fn send(&self, frame: Frame) -> Result<(), CommError> {
        self.tx
            .send(frame)
            .map_err(|_| CommError::PeerLost { peer: self.peer })
    }

    fn recv(&self) -> Result<Frame, CommError> {
        self.rx
            .recv()
            .map_err(|_| CommError::PeerLost { peer: self.peer })
    }
}

/// A member of an in-process group.
pub type LocalGroup = Endpoint<ChannelLink>;

impl LocalGroup {
    /// Create every member of a group of `size`, indexed by rank.
    ///
    /// Dropping a member closes its channels; peers blocked on it then fail
    /// with [`CommError::PeerLost`] instead of waiting forever.
    pub fn create(size: usize) -> Result<Vec<LocalGroup>, CommError> {
        if size == 0 {
            return Err(CommError::InvalidGroup("group size must be at least 1".into()));
        }

        // outgoing[src][dst] sends src -> dst; incoming[dst][src] receives it.
        let mut outgoing: Vec<Vec<Option<Sender<Frame>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut incoming: Vec<Vec<Option<Receiver<Frame>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in 0..size {
                if src != dst {
                    let (tx, rx) = unbounded();
                    outgoing[src][dst] = Some(tx);
                    incoming[dst][src] = Some(rx);
                }
            }
        }

        let members = outgoing
            .into_iter()
            .zip(incoming)
            .enumerate()
            .map(|(rank, (txs, rxs))| {
                let links = txs
                    .into_iter()
                    .zip(rxs)
                    .enumerate()
                    .filter_map(|(peer, (tx, rx))| {
                        Some(ChannelLink {
                            peer,
                            tx: tx?,
                            rx: rx?,
                        })
                    })
                    .collect();
                Endpoint::new(rank, size, links, TransportType::Local)
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Created local group of {} members", size);
        Ok(members)
    }

    /// A group with a single member. Every collective returns immediately.
    pub fn solo() -> Result<LocalGroup, CommError> {
        Endpoint::new(0, 1, Vec::new(), TransportType::Local)
    }
}

/// Run `job` on every member of a fresh local group of `size`, one thread
/// per member, and return the results ordered by rank.
///
/// Each member is moved into its thread and dropped when `job` returns, so
/// a member that bails out early disconnects from the rest of the group.
/// A panic in any member is propagated to the caller.
pub fn run_local<T, F>(size: usize, job: F) -> Result<Vec<T>, CommError>
where
    T: Send,
    F: Fn(LocalGroup) -> T + Sync,
{
    let members = LocalGroup::create(size)?;
    let job = &job;

    let results: Vec<T> = std::thread::scope(|scope| {
        let handles: Vec<_> = members
            .into_iter()
            .map(|member| scope.spawn(move || job(member)))
            .collect();

        handles
            .into_iter()
            .map(|handle| match handle.join() {
                Ok(value) => value,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    Ok(results)
}
