//! Drives the bully election state machine on a timer.
//!
//! One thread per replica ticks two clocks: a heartbeat timeout that fires
//! an election when the coordinator has gone quiet, and an answer timeout
//! that lets a candidate declare victory once nobody higher has objected.
//! Both clocks reset whenever a `COORDINATOR` announcement (ours or a
//! peer's) lands, via [`ReplicaCore::drive_election`].

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use partyline_replication::{ElectionEvent, ElectionOutput};
use partyline_wire::{write_packet, CoordinatorAnnouncePayload, CoordinatorPayload, Packet};
use tracing::{debug, info, warn};

use crate::core::ReplicaCore;

/// How long a `COORDINATOR_ANNOUNCE` push is allowed to take per client
/// before giving up and leaving that client to the poll fallback instead.
const ANNOUNCE_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Runs the election timer loop until `stop` is set. Intended to be spawned
/// on its own thread alongside the accept loop and peer links.
pub fn run(core: Arc<ReplicaCore>, heartbeat_timeout: Duration, answer_timeout: Duration, stop: Arc<AtomicBool>) {
    // Stagger the very first heartbeat so that a freshly started cluster
    // doesn't have every replica challenge at once.
    std::thread::sleep(Duration::from_millis(100 * u64::from(u32::from(core.id)) % 500));

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep(heartbeat_timeout);
        if stop.load(Ordering::Relaxed) {
            return;
        }
        if core.is_coordinator() {
            broadcast_heartbeat(&core);
            continue;
        }
        let outputs = core.drive_election(ElectionEvent::HeartbeatTimeout);
        if outputs.is_empty() {
            continue;
        }
        apply_election_outputs(&core, outputs);
        std::thread::sleep(answer_timeout);
        let outputs = core.drive_election(ElectionEvent::AnswerTimeout);
        apply_election_outputs(&core, outputs);
    }
}

/// The coordinator reuses `COORDINATOR` itself as its heartbeat: a follower
/// that keeps hearing it never times out, and a follower that just joined
/// adopts the current view immediately.
fn broadcast_heartbeat(core: &Arc<ReplicaCore>) {
    let view = core.view();
    let Some(addr) = core.client_addr() else {
        return;
    };
    for id in core.peer_ids() {
        if let Some(peer) = core.peer(id) {
            let _ = peer.send(&Packet::Coordinator(CoordinatorPayload { view, id: core.id, addr }));
        }
    }
}

pub(crate) fn apply_election_outputs(core: &Arc<ReplicaCore>, outputs: Vec<ElectionOutput>) {
    for output in outputs {
        match output {
            ElectionOutput::SendElection { to } => send_to(core, to, |from| {
                Packet::Election(partyline_wire::ElectionPayload { view: core.view(), from })
            }),
            ElectionOutput::SendAnswer { to } => send_to(core, to, |from| {
                Packet::Answer(partyline_wire::AnswerPayload { view: core.view(), from })
            }),
            ElectionOutput::BroadcastCoordinator { view } => {
                let Some(addr) = core.client_addr() else { continue };
                for id in core.peer_ids() {
                    if let Some(peer) = core.peer(id) {
                        let _ = peer.send(&Packet::Coordinator(CoordinatorPayload { view, id: core.id, addr }));
                    }
                }
            }
            ElectionOutput::BecameCoordinator { view } => {
                core.begin_view(view);
                info!(%view, "became coordinator");
                announce_to_known_clients(core, view);
            }
            ElectionOutput::BecameFollower { coordinator } => {
                info!(%coordinator, "became follower");
            }
        }
    }
}

/// Actively pushes `COORDINATOR_ANNOUNCE` to every client this replica knows
/// of from replicated session state, so a client reconnects the moment its
/// coordinator changes rather than waiting for its next poll. Best effort:
/// each client gets its own short-lived connection, and a client that can't
/// be reached here simply falls back to the poll path in
/// `partyline-client`'s `connection::connect_to_cluster`.
fn announce_to_known_clients(core: &Arc<ReplicaCore>, view: partyline_types::ViewNumber) {
    let Some(addr) = core.client_addr() else { return };
    let mut targets = Vec::new();
    core.for_each_session(|_, record| targets.push(record.listen_addr));
    targets.dedup();

    std::thread::spawn(move || {
        for listen_addr in targets {
            let packet = Packet::CoordinatorAnnounce(CoordinatorAnnouncePayload { view, addr });
            match TcpStream::connect_timeout(&listen_addr, ANNOUNCE_CONNECT_TIMEOUT) {
                Ok(mut stream) => {
                    if let Err(err) = write_packet(&mut stream, &packet) {
                        debug!(%listen_addr, %err, "failed to push coordinator announcement");
                    }
                }
                Err(err) => debug!(%listen_addr, %err, "client unreachable for coordinator announcement"),
            }
        }
    });
}

fn send_to(core: &Arc<ReplicaCore>, to: partyline_types::ReplicaId, build: impl FnOnce(partyline_types::ReplicaId) -> Packet) {
    match core.peer(to) {
        Some(peer) => {
            if let Err(err) = peer.send(&build(core.id)) {
                warn!(peer = %to, %err, "failed to send election message");
            }
        }
        None => warn!(peer = %to, "no link to peer for election message"),
    }
}
