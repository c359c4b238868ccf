//! Persistent replica-to-replica links.
//!
//! The cluster keeps one long-lived TCP connection per pair of replicas,
//! multiplexing election traffic (`ELECTION`/`ANSWER`/`COORDINATOR`) and
//! replication traffic (`REPL_EVENT`/`REPL_ACK`/`STATE_SNAPSHOT`) over it —
//! whichever packets make sense given each replica's current role. To avoid
//! establishing the same link twice, the replica with the lower id always
//! connects out; the one with the higher id only ever accepts.
//!
//! A link's first packet in either direction is always a `REPL_ACK` with
//! `seq` at whatever the sender has applied so far (`SeqNumber::ZERO` for a
//! link that just came up) — besides being a legitimate ack, it doubles as
//! the identifying handshake that tells the accepting side which replica
//! just connected, since the connection's source port reveals nothing.

use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use partyline_replication::ElectionEvent;
use partyline_types::{ReplicaId, SeqNumber, ViewNumber};
use partyline_wire::{read_packet, write_packet, Packet, ReplAckPayload, ReplEventPayload, WireError};
use tracing::{debug, warn};

use crate::core::ReplicaCore;
use crate::election_timer::apply_election_outputs;

/// A replica-to-replica connection, safe to share and write to from many
/// threads.
pub struct PeerLink {
    pub id: ReplicaId,
    stream: Mutex<TcpStream>,
}

impl PeerLink {
    pub fn new(id: ReplicaId, stream: TcpStream) -> Self {
        Self {
            id,
            stream: Mutex::new(stream),
        }
    }

    pub fn send(&self, packet: &Packet) -> Result<(), WireError> {
        let mut stream = self.stream.lock().unwrap();
        write_packet(&mut *stream, packet)
    }

    pub fn try_clone_stream(&self) -> std::io::Result<TcpStream> {
        self.stream.lock().unwrap().try_clone()
    }
}

/// Connects out to a peer, retrying with a fixed backoff until it
/// succeeds or `should_stop` reports true. Sends the identifying `REPL_ACK`
/// handshake once connected.
pub fn dial(
    self_id: ReplicaId,
    addr: SocketAddr,
    should_stop: impl Fn() -> bool,
) -> Option<TcpStream> {
    let mut backoff = Duration::from_millis(200);
    loop {
        if should_stop() {
            return None;
        }
        match TcpStream::connect(addr) {
            Ok(mut stream) => {
                let hello = Packet::ReplAck(ReplAckPayload {
                    view: ViewNumber::ZERO,
                    seq: SeqNumber::ZERO,
                    from: self_id,
                });
                if write_packet(&mut stream, &hello).is_ok() {
                    return Some(stream);
                }
            }
            Err(err) => {
                warn!(%addr, %err, "peer dial failed, retrying");
            }
        }
        std::thread::sleep(backoff);
        backoff = (backoff * 2).min(Duration::from_secs(5));
    }
}

/// Reads the identifying `REPL_ACK` handshake off a freshly accepted peer
/// connection, returning the connecting replica's id.
pub fn read_handshake(stream: &mut TcpStream) -> Result<ReplicaId, WireError> {
    match read_packet(stream)? {
        Packet::ReplAck(ReplAckPayload { from, .. }) => Ok(from),
        other => Err(WireError::DecodeError(format!(
            "expected REPL_ACK handshake, got {}",
            other.packet_type()
        ))),
    }
}

/// If we're the coordinator, brings a newly (re)connected follower up to
/// date: a full snapshot if its cursor has fallen out of the retained
/// buffer window, or a replay of everything since, otherwise.
pub fn catch_up_follower(core: &Arc<ReplicaCore>, link: &PeerLink) {
    if !core.is_coordinator() {
        return;
    }
    let after = SeqNumber::ZERO;
    if core.needs_snapshot(after) {
        let (view, as_of_seq, body) = core.snapshot();
        let _ = link.send(&Packet::StateSnapshot(partyline_wire::StateSnapshotPayload {
            view,
            as_of_seq,
            body,
        }));
    } else {
        for (seq, body) in core.entries_after(after) {
            let _ = link.send(&Packet::ReplEvent(ReplEventPayload {
                view: core.view(),
                seq,
                body,
            }));
        }
    }
}

/// Services one peer connection until it's closed, dispatching every
/// inbound packet into `core` and reacting with whatever reply the
/// protocol calls for.
pub fn run(core: Arc<ReplicaCore>, link: Arc<PeerLink>, mut reader: TcpStream) {
    loop {
        let packet = match read_packet(&mut reader) {
            Ok(p) => p,
            Err(err) => {
                debug!(peer = %link.id, %err, "peer link closed");
                break;
            }
        };

        match packet {
            Packet::Election(p) => {
                let outputs = core.drive_election(ElectionEvent::ElectionReceived { from: p.from });
                apply_election_outputs(&core, outputs);
            }
            Packet::Answer(p) => {
                let outputs = core.drive_election(ElectionEvent::AnswerReceived { from: p.from });
                apply_election_outputs(&core, outputs);
            }
            Packet::Coordinator(p) => {
                let outputs = core.drive_election(ElectionEvent::CoordinatorReceived {
                    from: p.id,
                    view: p.view,
                });
                apply_election_outputs(&core, outputs);
            }
            Packet::ReplEvent(p) => {
                match postcard::from_bytes::<partyline_kernel::Command>(&p.body) {
                    Ok(cmd) => {
                        if let Err(err) = core.apply_remote(cmd) {
                            warn!(peer = %link.id, %err, "failed to apply replicated command");
                        }
                        let _ = link.send(&Packet::ReplAck(ReplAckPayload {
                            view: p.view,
                            seq: p.seq,
                            from: core.id,
                        }));
                    }
                    Err(err) => warn!(peer = %link.id, %err, "malformed REPL_EVENT body"),
                }
            }
            Packet::ReplAck(p) => {
                core.record_ack(p.from, p.seq);
            }
            Packet::StateSnapshot(p) => {
                if let Err(err) = core.restore_snapshot(&p.body) {
                    warn!(peer = %link.id, %err, "failed to restore snapshot");
                }
            }
            other => {
                debug!(peer = %link.id, packet_type = %other.packet_type(), "unexpected packet on peer link");
            }
        }
    }

    core.unregister_peer(link.id);
}
