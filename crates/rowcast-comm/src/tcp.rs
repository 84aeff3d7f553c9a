//! TCP transport for groups spread over several processes or hosts.
//!
//! Members form a full mesh: rank `r` listens on `peers[r]`, dials every
//! lower rank and accepts a connection from every higher rank. Each new
//! connection starts with a hello frame in both directions so that both
//! ends agree on who they are talking to and on the group size.
//!
//! # Wire format
//!
//! Every frame is a 17-byte little-endian header followed by an optional
//! body of `len` f64 values (also little-endian, IEEE-754 bit patterns, so
//! infinities and NaNs travel unchanged):
//!
//! ```text
//! kind: u8 | seq: u64 | root: u32 | len: u32 | body: [f64; len]
//! ```
//!
//! | kind | frame | fields |
//! |------|-------|--------|
//! | 0 | hello | `root` = sender rank, `len` = group size, no body |
//! | 1 | vector data | `len` values |
//! | 2 | scalar data | `len` = 1 |
//! | 3 | ack | no body |
//! | 4 | release | no body |

use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::group::{CommError, TransportType};
use crate::protocol::{Endpoint, Frame, Link, Payload};

const KIND_HELLO: u8 = 0;
const KIND_VECTOR: u8 = 1;
const KIND_SCALAR: u8 = 2;
const KIND_ACK: u8 = 3;
const KIND_RELEASE: u8 = 4;

const HEADER_LEN: usize = 17;

/// Upper bound on the body of a single frame (2 GiB of f64).
const MAX_FRAME_VALUES: usize = 1 << 28;

/// Bootstrap settings for [`TcpGroup::connect`].
#[derive(Debug, Clone)]
pub struct TcpOptions {
    /// How many times to dial a lower rank before giving up.
    pub connect_attempts: usize,
    /// Pause between dial attempts.
    pub retry_interval: Duration,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            connect_attempts: 100,
            retry_interval: Duration::from_millis(100),
        }
    }
}

/// Raw frame as it appears on the wire, before protocol interpretation.
#[derive(Debug, Clone, PartialEq)]
enum WireFrame {
    Hello { rank: usize, size: usize },
    Frame(Frame),
}

/// Socket connection to one peer.
pub struct TcpLink {
    peer: usize,
    reader: Mutex<BufReader<TcpStream>>,
    writer: Mutex<BufWriter<TcpStream>>,
}

impl TcpLink {
    fn new(peer: usize, stream: TcpStream) -> Result<Self, CommError> {
        let io_err = |source| CommError::Io { peer, source };
        stream.set_nodelay(true).map_err(io_err)?;
        let read_half = stream.try_clone().map_err(io_err)?;
        Ok(Self {
            peer,
            reader: Mutex::new(BufReader::new(read_half)),
            writer: Mutex::new(BufWriter::new(stream)),
        })
    }

    fn send_wire(&self, frame: &WireFrame) -> Result<(), CommError> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        encode(&mut *writer, frame)
            .and_then(|_| writer.flush())
            .map_err(|e| map_io(self.peer, e))
    }

    fn recv_wire(&self) -> Result<WireFrame, CommError> {
        let mut reader = self.reader.lock().unwrap_or_else(|e| e.into_inner());
        decode(&mut *reader, self.peer)
    }
}

impl Link for TcpLink {
    fn peer(&self) -> usize {
        self.peer
    }

    fn send(&self, frame: Frame) -> Result<(), CommError> {
        self.send_wire(&WireFrame::Frame(frame))
    }

    fn recv(&self) -> Result<Frame, CommError> {
        match self.recv_wire()? {
            WireFrame::Frame(frame) => Ok(frame),
            WireFrame::Hello { .. } => Err(CommError::Malformed {
                peer: self.peer,
                reason: "unexpected hello after handshake".into(),
            }),
        }
    }
}

/// A member of a group connected over TCP.
pub type TcpGroup = Endpoint<TcpLink>;

impl TcpGroup {
    /// Bind `peers[rank]` and join the group.
    ///
    /// Blocks until connections to every other member are established.
    pub fn connect(
        rank: usize,
        peers: &[SocketAddr],
        options: &TcpOptions,
    ) -> Result<TcpGroup, CommError> {
        let addr = peers.get(rank).ok_or_else(|| {
            CommError::InvalidGroup(format!(
                "rank {} has no address in a peer list of {}",
                rank,
                peers.len()
            ))
        })?;
        let listener = TcpListener::bind(addr).map_err(|source| CommError::Io {
            peer: rank,
            source,
        })?;
        Self::from_listener(rank, listener, peers, options)
    }

    /// Join the group using an already bound listener for this rank.
    pub fn from_listener(
        rank: usize,
        listener: TcpListener,
        peers: &[SocketAddr],
        options: &TcpOptions,
    ) -> Result<TcpGroup, CommError> {
        let size = peers.len();
        if rank >= size {
            return Err(CommError::InvalidGroup(format!(
                "rank {} is outside a group of size {}",
                rank, size
            )));
        }

        let mut slots: Vec<Option<TcpLink>> = (0..size).map(|_| None).collect();

        for (peer, addr) in peers.iter().enumerate().take(rank) {
            let stream = dial(peer, addr, options)?;
            let link = TcpLink::new(peer, stream)?;
            link.send_wire(&WireFrame::Hello { rank, size })?;
            check_hello(link.recv_wire()?, Some(peer), size)?;
            debug!("rank {}: connected to rank {} at {}", rank, peer, addr);
            slots[peer] = Some(link);
        }

        for _ in rank + 1..size {
            let (stream, remote) = listener.accept().map_err(|source| CommError::Io {
                peer: rank,
                source,
            })?;
            // The peer's rank is unknown until its hello arrives; read it
            // unbuffered so nothing past the hello is consumed.
            let peer = check_hello(decode(&mut &stream, rank)?, None, size)?;
            if peer <= rank || slots[peer].is_some() {
                return Err(CommError::Handshake(format!(
                    "rank {}: unexpected connection from rank {} ({})",
                    rank, peer, remote
                )));
            }
            let link = TcpLink::new(peer, stream)?;
            link.send_wire(&WireFrame::Hello { rank, size })?;
            debug!("rank {}: accepted rank {} from {}", rank, peer, remote);
            slots[peer] = Some(link);
        }

        let links: Vec<TcpLink> = slots.into_iter().flatten().collect();
        let group = Endpoint::new(rank, size, links, TransportType::Tcp)?;
        info!("rank {}: joined TCP group of {} members", rank, size);
        Ok(group)
    }
}

fn dial(peer: usize, addr: &SocketAddr, options: &TcpOptions) -> Result<TcpStream, CommError> {
    let mut last_err = None;
    for _ in 0..options.connect_attempts.max(1) {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_err = Some(e);
                thread::sleep(options.retry_interval);
            }
        }
    }
    Err(CommError::Io {
        peer,
        source: last_err.unwrap_or_else(|| io::Error::other("no connection attempts made")),
    })
}

/// Check a hello frame against what this end expects. Returns the
/// sender's rank.
fn check_hello(frame: WireFrame, from: Option<usize>, size: usize) -> Result<usize, CommError> {
    match frame {
        WireFrame::Hello {
            rank: peer,
            size: peer_size,
        } => {
            if peer_size != size {
                return Err(CommError::Handshake(format!(
                    "rank {} reports group size {}, expected {}",
                    peer, peer_size, size
                )));
            }
            if peer >= size || from.is_some_and(|expected| expected != peer) {
                return Err(CommError::Handshake(format!(
                    "expected hello from rank {:?}, got rank {}",
                    from, peer
                )));
            }
            Ok(peer)
        }
        WireFrame::Frame(frame) => Err(CommError::Handshake(format!(
            "expected hello, received {}",
            frame.describe()
        ))),
    }
}

fn map_io(peer: usize, err: io::Error) -> CommError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe => CommError::PeerLost { peer },
        _ => CommError::Io { peer, source: err },
    }
}

fn write_header<W: Write>(out: &mut W, kind: u8, seq: u64, root: u32, len: u32) -> io::Result<()> {
    let mut header = [0u8; HEADER_LEN];
    header[0] = kind;
    header[1..9].copy_from_slice(&seq.to_le_bytes());
    header[9..13].copy_from_slice(&root.to_le_bytes());
    header[13..17].copy_from_slice(&len.to_le_bytes());
    out.write_all(&header)
}

fn write_values<W: Write>(out: &mut W, values: &[f64]) -> io::Result<()> {
    let wire: Vec<u64> = values.iter().map(|v| v.to_bits().to_le()).collect();
    out.write_all(bytemuck::cast_slice(&wire))
}

fn narrow(value: usize, what: &str) -> io::Result<u32> {
    u32::try_from(value).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} does not fit in a frame", what, value),
        )
    })
}

fn encode<W: Write>(out: &mut W, frame: &WireFrame) -> io::Result<()> {
    match frame {
        WireFrame::Hello { rank, size } => {
            write_header(out, KIND_HELLO, 0, narrow(*rank, "rank")?, narrow(*size, "size")?)
        }
        WireFrame::Frame(Frame::Data { seq, root, payload }) => {
            let root = narrow(*root, "root")?;
            match payload {
                Payload::Vector(values) => {
                    write_header(out, KIND_VECTOR, *seq, root, narrow(values.len(), "length")?)?;
                    write_values(out, values)
                }
                Payload::Scalar(value) => {
                    write_header(out, KIND_SCALAR, *seq, root, 1)?;
                    write_values(out, &[*value])
                }
            }
        }
        WireFrame::Frame(Frame::Ack { seq }) => write_header(out, KIND_ACK, *seq, 0, 0),
        WireFrame::Frame(Frame::Release { seq }) => write_header(out, KIND_RELEASE, *seq, 0, 0),
    }
}

fn decode<R: Read>(input: &mut R, peer: usize) -> Result<WireFrame, CommError> {
    let mut header = [0u8; HEADER_LEN];
    input.read_exact(&mut header).map_err(|e| map_io(peer, e))?;

    let kind = header[0];
    let mut seq_bytes = [0u8; 8];
    seq_bytes.copy_from_slice(&header[1..9]);
    let mut root_bytes = [0u8; 4];
    root_bytes.copy_from_slice(&header[9..13]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&header[13..17]);

    let seq = u64::from_le_bytes(seq_bytes);
    let root = u32::from_le_bytes(root_bytes) as usize;
    let len = u32::from_le_bytes(len_bytes) as usize;

    let malformed = |reason: String| CommError::Malformed { peer, reason };

    match kind {
        KIND_HELLO => Ok(WireFrame::Hello {
            rank: root,
            size: len,
        }),
        KIND_VECTOR | KIND_SCALAR => {
            if len > MAX_FRAME_VALUES {
                return Err(malformed(format!("frame body of {} values is too large", len)));
            }
            if kind == KIND_SCALAR && len != 1 {
                return Err(malformed(format!("scalar frame with {} values", len)));
            }
            let mut wire = vec![0u64; len];
            input
                .read_exact(bytemuck::cast_slice_mut(&mut wire))
                .map_err(|e| map_io(peer, e))?;
            let values: Vec<f64> = wire
                .into_iter()
                .map(|w| f64::from_bits(u64::from_le(w)))
                .collect();
            let payload = if kind == KIND_SCALAR {
                Payload::Scalar(values[0])
            } else {
                Payload::Vector(values)
            };
            Ok(WireFrame::Frame(Frame::Data { seq, root, payload }))
        }
        KIND_ACK => Ok(WireFrame::Frame(Frame::Ack { seq })),
        KIND_RELEASE => Ok(WireFrame::Frame(Frame::Release { seq })),
        other => Err(malformed(format!("unknown frame kind {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ProcessGroup;
    use std::io::Cursor;

    fn decode_bytes(bytes: Vec<u8>) -> Result<WireFrame, CommError> {
        decode(&mut Cursor::new(bytes), 1)
    }

    #[test]
    fn test_vector_frame_layout() {
        let frame = WireFrame::Frame(Frame::Data {
            seq: 5,
            root: 2,
            payload: Payload::Vector(vec![1.5, -0.25]),
        });
        let mut bytes = Vec::new();
        encode(&mut bytes, &frame).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + 16);
        assert_eq!(bytes[0], KIND_VECTOR);
        assert_eq!(&bytes[1..9], &5u64.to_le_bytes());
        assert_eq!(&bytes[9..13], &2u32.to_le_bytes());
        assert_eq!(&bytes[13..17], &2u32.to_le_bytes());
        assert_eq!(&bytes[17..25], &1.5f64.to_le_bytes());
        assert_eq!(decode_bytes(bytes).unwrap(), frame);
    }

    #[test]
    fn test_nan_scalar_survives_codec() {
        let mut bytes = Vec::new();
        let frame = WireFrame::Frame(Frame::Data {
            seq: 0,
            root: 0,
            payload: Payload::Scalar(f64::NAN),
        });
        encode(&mut bytes, &frame).unwrap();
        match decode_bytes(bytes).unwrap() {
            WireFrame::Frame(Frame::Data {
                payload: Payload::Scalar(v),
                ..
            }) => assert!(v.is_nan()),
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_truncated_frame_reports_lost_peer() {
        let mut bytes = Vec::new();
        encode(
            &mut bytes,
            &WireFrame::Frame(Frame::Data {
                seq: 1,
                root: 0,
                payload: Payload::Vector(vec![1.0, 2.0, 3.0]),
            }),
        )
        .unwrap();
        bytes.truncate(HEADER_LEN + 8);
        assert!(matches!(decode_bytes(bytes), Err(CommError::PeerLost { peer: 1 })));
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0] = 42;
        assert!(matches!(decode_bytes(bytes), Err(CommError::Malformed { .. })));
    }

    #[test]
    fn test_scalar_frame_with_wrong_length_is_malformed() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, KIND_SCALAR, 0, 0, 2).unwrap();
        write_values(&mut bytes, &[1.0, 2.0]).unwrap();
        assert!(matches!(decode_bytes(bytes), Err(CommError::Malformed { .. })));
    }

    #[test]
    fn test_tcp_group_broadcasts_over_loopback() {
        let size = 3;
        let listeners: Vec<TcpListener> = (0..size)
            .map(|_| TcpListener::bind("127.0.0.1:0").unwrap())
            .collect();
        let peers: Vec<SocketAddr> = listeners
            .iter()
            .map(|l| l.local_addr().unwrap())
            .collect();

        let handles: Vec<_> = listeners
            .into_iter()
            .enumerate()
            .map(|(rank, listener)| {
                let peers = peers.clone();
                thread::spawn(move || {
                    let group =
                        TcpGroup::from_listener(rank, listener, &peers, &TcpOptions::default())
                            .unwrap();
                    assert_eq!(group.transport(), TransportType::Tcp);

                    let mut row = if rank == 1 {
                        vec![2.0, f64::INFINITY, -1.0]
                    } else {
                        vec![0.0; 3]
                    };
                    group.broadcast_vector(&mut row, 1).unwrap();
                    let value = group.broadcast_scalar(rank as f64 + 0.5, 2).unwrap();
                    group.barrier().unwrap();
                    (row, value)
                })
            })
            .collect();

        for handle in handles {
            let (row, value) = handle.join().unwrap();
            assert_eq!(row[0], 2.0);
            assert!(row[1].is_infinite());
            assert_eq!(row[2], -1.0);
            assert_eq!(value, 2.5);
        }
    }
}
