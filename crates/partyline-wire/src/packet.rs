use std::net::SocketAddr;

use partyline_types::{ReplicaId, SeqNumber, Timestamp, ViewNumber};
use serde::{Deserialize, Serialize};

/// The `type` field of the frame header. Discriminants are part of the wire
/// contract and must never be renumbered once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PacketType {
    Login = 1,
    Logout = 2,
    Message = 3,
    ServerBroadcast = 4,
    KeepAlive = 5,
    Disconnect = 6,
    ReplEvent = 7,
    ReplAck = 8,
    Election = 9,
    Answer = 10,
    Coordinator = 11,
    StateSnapshot = 12,
    CoordinatorAnnounce = 13,
}

impl PacketType {
    pub(crate) fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            1 => PacketType::Login,
            2 => PacketType::Logout,
            3 => PacketType::Message,
            4 => PacketType::ServerBroadcast,
            5 => PacketType::KeepAlive,
            6 => PacketType::Disconnect,
            7 => PacketType::ReplEvent,
            8 => PacketType::ReplAck,
            9 => PacketType::Election,
            10 => PacketType::Answer,
            11 => PacketType::Coordinator,
            12 => PacketType::StateSnapshot,
            13 => PacketType::CoordinatorAnnounce,
            _ => return None,
        })
    }

    pub(crate) fn as_u16(self) -> u16 {
        self as u16
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketType::Login => "LOGIN",
            PacketType::Logout => "LOGOUT",
            PacketType::Message => "MESSAGE",
            PacketType::ServerBroadcast => "SERVER_BROADCAST",
            PacketType::KeepAlive => "KEEP_ALIVE",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::ReplEvent => "REPL_EVENT",
            PacketType::ReplAck => "REPL_ACK",
            PacketType::Election => "ELECTION",
            PacketType::Answer => "ANSWER",
            PacketType::Coordinator => "COORDINATOR",
            PacketType::StateSnapshot => "STATE_SNAPSHOT",
            PacketType::CoordinatorAnnounce => "COORDINATOR_ANNOUNCE",
        };
        f.write_str(name)
    }
}

/// `LOGIN`: a client identifying itself and the group it wants to join.
///
/// `username`/`groupname` travel as raw strings on the wire — charset and
/// length validation (producing [`Username`]/[`Groupname`]) happens at the
/// server boundary, not in the framing layer, so a malformed name is
/// rejected with a clean `DISCONNECT` rather than a decode panic.
///
/// `listen_port` is the client's own ephemeral listen socket, used by
/// the cluster to reach the client directly for `COORDINATOR_ANNOUNCE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub groupname: String,
    pub listen_port: u16,
}

/// `MESSAGE`: carried both client→coordinator (as a post) and
/// coordinator→client (as a fan-out delivery). On the way in, `sender` and
/// `timestamp` are advisory; the coordinator always overwrites them with the
/// authoritative session identity and commit time before re-broadcasting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub timestamp: Timestamp,
    pub sender: String,
    pub kind: u8,
    pub body: String,
}

/// `DISCONNECT`: server-initiated notice that a session is being torn down
/// (session cap eviction, group shutdown, or administrative kick).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectPayload {
    pub reason: String,
}

/// `REPL_EVENT`: one entry in the coordinator's replication log. `body` is an
/// opaque, postcard-encoded payload whose shape is owned by
/// `partyline-replication`/`partyline-kernel` — the wire layer only needs to
/// frame and order it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplEventPayload {
    pub view: ViewNumber,
    pub seq: SeqNumber,
    pub body: Vec<u8>,
}

/// `REPL_ACK`: a follower acknowledging it has applied events up to `seq`.
/// `from` identifies the acking follower, since a coordinator may hold a
/// replication connection open to several of them at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplAckPayload {
    pub view: ViewNumber,
    pub seq: SeqNumber,
    pub from: ReplicaId,
}

/// `ELECTION`: bully-algorithm challenge sent to every replica with a higher id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionPayload {
    pub view: ViewNumber,
    pub from: ReplicaId,
}

/// `ANSWER`: response to an `ELECTION`, telling the challenger to stand down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerPayload {
    pub view: ViewNumber,
    pub from: ReplicaId,
}

/// `COORDINATOR`: the winner of an election announcing its new view to
/// every other replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorPayload {
    pub view: ViewNumber,
    pub id: ReplicaId,
    pub addr: SocketAddr,
}

/// `STATE_SNAPSHOT`: a full state dump sent to a follower whose replication
/// cursor has fallen too far behind the coordinator's bounded event buffer
///. `body` is opaque to the wire layer for the same reason as
/// [`ReplEventPayload::body`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshotPayload {
    pub view: ViewNumber,
    pub as_of_seq: SeqNumber,
    pub body: Vec<u8>,
}

/// `COORDINATOR_ANNOUNCE`: pushed to a client's listen socket whenever the
/// cluster completes an election, so clients in the `Reconnecting` state can
/// redirect without waiting for their next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorAnnouncePayload {
    pub view: ViewNumber,
    pub addr: SocketAddr,
}

/// A fully decoded packet paired with its wire-level type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Login(LoginPayload),
    Logout,
    Message(MessagePayload),
    ServerBroadcast(MessagePayload),
    KeepAlive,
    Disconnect(DisconnectPayload),
    ReplEvent(ReplEventPayload),
    ReplAck(ReplAckPayload),
    Election(ElectionPayload),
    Answer(AnswerPayload),
    Coordinator(CoordinatorPayload),
    StateSnapshot(StateSnapshotPayload),
    CoordinatorAnnounce(CoordinatorAnnouncePayload),
}

impl Packet {
    /// The wire type tag for this packet, written into the frame header.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Login(_) => PacketType::Login,
            Packet::Logout => PacketType::Logout,
            Packet::Message(_) => PacketType::Message,
            Packet::ServerBroadcast(_) => PacketType::ServerBroadcast,
            Packet::KeepAlive => PacketType::KeepAlive,
            Packet::Disconnect(_) => PacketType::Disconnect,
            Packet::ReplEvent(_) => PacketType::ReplEvent,
            Packet::ReplAck(_) => PacketType::ReplAck,
            Packet::Election(_) => PacketType::Election,
            Packet::Answer(_) => PacketType::Answer,
            Packet::Coordinator(_) => PacketType::Coordinator,
            Packet::StateSnapshot(_) => PacketType::StateSnapshot,
            Packet::CoordinatorAnnounce(_) => PacketType::CoordinatorAnnounce,
        }
    }
}
