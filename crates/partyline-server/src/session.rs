//! Per-client session handling: one reader thread per connection, blocking
//! on `read_packet`, plus a paired writer thread draining an mpsc channel
//!. Splitting read and write onto separate threads lets us push
//! server-initiated packets (broadcasts, `COORDINATOR_ANNOUNCE`) to a client
//! at any time without fighting the reader for the socket.

use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use partyline_kernel::Command;
use partyline_types::{Groupname, Timestamp, Username};
use partyline_wire::{read_packet, write_packet, DisconnectPayload, Packet};
use tracing::{debug, info, warn};

use crate::core::ReplicaCore;

/// Accepts one client connection through to its `LOGIN`, then services it
/// until it disconnects or the connection fails.
pub fn handle_client(stream: TcpStream, core: Arc<ReplicaCore>) {
    let peer = stream.peer_addr().ok();
    let writer_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            warn!(?peer, %err, "failed to clone client stream for writer thread");
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<Packet>();
    let writer = thread::spawn(move || writer_loop(writer_stream, rx));

    if let Err(err) = reader_loop(stream, &core, &tx) {
        debug!(?peer, %err, "client connection ended");
    }

    drop(tx);
    let _ = writer.join();
}

fn writer_loop(mut stream: TcpStream, rx: mpsc::Receiver<Packet>) {
    while let Ok(packet) = rx.recv() {
        if write_packet(&mut stream, &packet).is_err() {
            break;
        }
    }
}

fn reject(stream: &mut TcpStream, reason: impl Into<String>) {
    let _ = write_packet(stream, &Packet::Disconnect(DisconnectPayload { reason: reason.into() }));
}

fn reader_loop(
    mut stream: TcpStream,
    core: &Arc<ReplicaCore>,
    tx: &mpsc::Sender<Packet>,
) -> Result<(), partyline_wire::WireError> {
    let login = match read_packet(&mut stream)? {
        Packet::Login(p) => p,
        _ => {
            reject(&mut stream, "expected LOGIN as the first packet");
            return Ok(());
        }
    };

    if !core.is_coordinator() {
        reject(
            &mut stream,
            format!("not the coordinator, try {:?}", core.coordinator_hint()),
        );
        return Ok(());
    }

    let username = match Username::parse(login.username) {
        Ok(u) => u,
        Err(err) => {
            reject(&mut stream, format!("invalid username: {err}"));
            return Ok(());
        }
    };
    let groupname = match Groupname::parse(login.groupname) {
        Ok(g) => g,
        Err(err) => {
            reject(&mut stream, format!("invalid groupname: {err}"));
            return Ok(());
        }
    };
    let Some(listen_addr) = stream.peer_addr().ok().map(|mut a| {
        a.set_port(login.listen_port);
        a
    }) else {
        reject(&mut stream, "could not resolve peer address");
        return Ok(());
    };

    let session = if let Some(existing) = core.find_resumable_session(&username, &groupname) {
        core.resume_session(existing, tx.clone());
        let update = Command::CoordinatorUpdate {
            session: existing,
            listen_addr,
        };
        if let Err(err) = core.apply_local(update) {
            core.unregister_session(existing);
            reject(&mut stream, err.to_string());
            return Ok(());
        }
        info!(%existing, %username, %groupname, "session resumed");
        existing
    } else {
        let session = core.new_session_id();
        core.register_session(session, tx.clone());

        let open = Command::OpenSession {
            session,
            username: username.clone(),
            groupname: groupname.clone(),
            listen_addr,
        };
        if let Err(err) = core.apply_local(open) {
            core.unregister_session(session);
            reject(&mut stream, err.to_string());
            return Ok(());
        }
        info!(%session, %username, %groupname, "session opened");
        session
    };

    let result = client_loop(&mut stream, core, session);

    match &result {
        // An explicit LOGOUT (or the client sending us a DISCONNECT) means
        // the client is done; tear the session down right away.
        Ok(()) => {
            let _ = core.apply_local(Command::CloseSession { session });
            core.unregister_session(session);
            info!(%session, "session closed");
        }
        // Anything else is an unannounced connection loss: hold the session
        // so a reconnect within the grace window can resume it, and let the
        // reaper close it if the window lapses.
        Err(_) => {
            core.mark_disconnected(session);
            info!(%session, "connection lost, holding session for grace window");
        }
    }

    result
}

fn client_loop(
    stream: &mut TcpStream,
    core: &Arc<ReplicaCore>,
    session: partyline_types::SessionId,
) -> Result<(), partyline_wire::WireError> {
    loop {
        let packet = read_packet(stream)?;
        core.touch_session(session);
        match packet {
            Packet::Message(p) => {
                let cmd = Command::PostMessage {
                    session,
                    timestamp: Timestamp::now(),
                    body: p.body,
                };
                if let Err(err) = core.apply_local(cmd) {
                    debug!(%session, %err, "rejected PostMessage");
                }
            }
            Packet::KeepAlive => {}
            Packet::Logout | Packet::Disconnect(_) => return Ok(()),
            other => {
                debug!(%session, packet_type = %other.packet_type(), "unexpected packet from client, ignoring");
            }
        }
    }
}
