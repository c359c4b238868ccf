//! Listens on the client's own `listen_port` for `COORDINATOR_ANNOUNCE`
//! pushes from a replica that just won an election.

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use partyline_wire::{read_packet, Packet};
use tracing::{debug, warn};

/// Binds an ephemeral (or fixed, if `preferred_port != 0`) listen socket
/// and spawns the accept loop. Returns the bound address so the caller can
/// report it in `LOGIN`.
pub fn spawn(preferred_port: u16, announced: Sender<SocketAddr>, stop: Arc<AtomicBool>) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(("0.0.0.0", preferred_port))?;
    let bound = listener.local_addr()?;

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let mut stream = match stream {
                Ok(s) => s,
                Err(err) => {
                    warn!(%err, "announce accept failed");
                    continue;
                }
            };
            match read_packet(&mut stream) {
                Ok(Packet::CoordinatorAnnounce(p)) => {
                    debug!(addr = %p.addr, view = %p.view, "received coordinator announce");
                    let _ = announced.send(p.addr);
                }
                Ok(other) => warn!(packet_type = %other.packet_type(), "unexpected packet on announce socket"),
                Err(err) => debug!(%err, "announce connection closed"),
            }
        }
    });

    Ok(bound)
}
