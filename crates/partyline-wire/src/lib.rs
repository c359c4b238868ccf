//! # partyline-wire: the partyline binary protocol
//!
//! Defines the packet framing contract: every packet is a
//! fixed header `{ type: uint16, length: uint32 }` (big-endian) followed by
//! exactly `length` bytes of payload, bounded by [`PACKET_MAX`]. A short
//! read or short write anywhere in a frame fails the whole connection — no
//! partial packet is ever handed to a caller.
//!
//! Packet types partition into three planes:
//! - client↔coordinator: [`Packet::Login`], [`Packet::Logout`],
//!   [`Packet::Message`], [`Packet::ServerBroadcast`], [`Packet::KeepAlive`],
//!   [`Packet::Disconnect`]
//! - replica↔replica: [`Packet::ReplEvent`], [`Packet::ReplAck`],
//!   [`Packet::Election`], [`Packet::Answer`], [`Packet::Coordinator`],
//!   [`Packet::StateSnapshot`]
//! - client reconnect: [`Packet::CoordinatorAnnounce`]

mod frame;
mod packet;

pub use frame::{read_packet, write_packet};
pub use packet::{
    AnswerPayload, CoordinatorAnnouncePayload, CoordinatorPayload, DisconnectPayload,
    ElectionPayload, LoginPayload, MessagePayload, Packet, PacketType, ReplAckPayload,
    ReplEventPayload, StateSnapshotPayload,
};

use partyline_types::limits::PACKET_MAX as _PACKET_MAX_TYPES;
use thiserror::Error;

/// Size of the fixed packet header: `type: uint16` + `length: uint32`.
pub const FRAME_HEADER_SIZE: usize = 2 + 4;

/// Maximum total frame size (header + payload), in bytes.
///
/// Re-exported from `partyline-types` so the bound used for framing always
/// matches the bound used for validating message bodies elsewhere.
pub const PACKET_MAX: usize = _PACKET_MAX_TYPES;

/// Errors that can occur while framing or decoding a packet.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer closed its write half (clean EOF) mid-frame or before a
    /// frame even started.
    #[error("peer closed the connection")]
    PeerClosed,

    /// The peer reset the connection (RST), as opposed to a clean close.
    #[error("peer reset the connection")]
    PeerReset,

    /// The header or payload could not be decoded into a known packet.
    #[error("failed to decode packet: {0}")]
    DecodeError(String),

    /// The read or write did not complete within the configured deadline.
    #[error("operation timed out")]
    Timeout,

    /// The declared frame length exceeds [`PACKET_MAX`].
    #[error("frame of {0} bytes exceeds PACKET_MAX ({PACKET_MAX})")]
    FrameTooLarge(usize),

    /// Any other I/O error not covered above.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Classifies a raw I/O error the way `read_packet`/`write_packet` do,
    /// so callers that get an error on their own `TcpStream` can report it
    /// consistently.
    pub fn from_io(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe => WireError::PeerClosed,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => WireError::PeerReset,
            ErrorKind::TimedOut | ErrorKind::WouldBlock => WireError::Timeout,
            _ => WireError::Io(err),
        }
    }
}
