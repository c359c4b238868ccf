//! Establishing and (re-)identifying a connection to a coordinator.

use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use partyline_config::ReplicaSet;
use partyline_wire::{read_packet, write_packet, LoginPayload, Packet};
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(800);

/// Tries `hint` first if given, then every replica's client address in
/// order, returning the first one that accepts a TCP connection. This is
/// the fallback used when no `COORDINATOR_ANNOUNCE` has arrived yet.
pub fn connect_to_cluster(replicas: &ReplicaSet, hint: Option<SocketAddr>) -> ClientResult<TcpStream> {
    let candidates = hint.into_iter().chain(replicas.client_addrs());
    for addr in candidates {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(stream) => {
                debug!(%addr, "connected to replica");
                return Ok(stream);
            }
            Err(err) => warn!(%addr, %err, "replica unreachable, trying next"),
        }
    }
    Err(ClientError::NoReplicaReachable)
}

/// Sends `LOGIN` and waits briefly for an immediate rejection. A
/// coordinator that accepts the session sends nothing back here (history
/// replay, if any, follows as ordinary `MESSAGE` packets once the receive
/// thread is listening), so the absence of a prompt `DISCONNECT` is treated
/// as success.
pub fn login(stream: &mut TcpStream, username: &str, groupname: &str, listen_port: u16) -> ClientResult<()> {
    write_packet(
        stream,
        &Packet::Login(LoginPayload {
            username: username.to_string(),
            groupname: groupname.to_string(),
            listen_port,
        }),
    )?;

    stream.set_read_timeout(Some(Duration::from_millis(300)))?;
    let reply = read_packet(stream);
    stream.set_read_timeout(None)?;

    match reply {
        Ok(Packet::Disconnect(p)) => Err(ClientError::LoginRejected(p.reason)),
        Ok(other) => Err(ClientError::UnexpectedLoginReply(other.packet_type().to_string())),
        Err(partyline_wire::WireError::Timeout) => Ok(()),
        Err(err) => Err(err.into()),
    }
}
