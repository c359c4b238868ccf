//! Wires together the client accept loop, the peer mesh, the election
//! timer, and the admin console into one running replica.

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use partyline_types::ReplicaId;
use tracing::{error, info, warn};

use crate::core::ReplicaCore;
use crate::error::{ServerError, ServerResult};
use crate::peer::PeerLink;
use crate::{admin, election_timer, peer, reaper, session};

/// A running replica. Dropping this does not stop it — call [`Server::shutdown`]
/// or let the process receive SIGINT/SIGTERM.
pub struct Server {
    core: Arc<ReplicaCore>,
    stop: Arc<AtomicBool>,
}

pub struct RunConfig {
    pub heartbeat_timeout: Duration,
    pub answer_timeout: Duration,
    /// How long a disconnected session is held before the reaper closes it.
    pub session_grace: Duration,
    pub run_admin_console: bool,
}

impl Server {
    /// Binds the client and peer listen sockets and spawns every background
    /// thread. Returns once the cluster is ready to accept connections;
    /// the accept loops themselves keep running on their own threads until
    /// `shutdown` is called.
    pub fn start(core: Arc<ReplicaCore>, config: RunConfig) -> ServerResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));

        let client_addr = core
            .replicas
            .get(core.id)
            .ok_or(ServerError::Config(partyline_config::ConfigError::UnknownReplica(
                core.id.as_u32(),
            )))?
            .client_addr;
        let peer_addr = core.replicas.get(core.id).unwrap().peer_addr;

        let client_listener = TcpListener::bind(client_addr).map_err(|source| ServerError::BindFailed {
            addr: client_addr,
            source,
        })?;
        let peer_listener = TcpListener::bind(peer_addr).map_err(|source| ServerError::BindFailed {
            addr: peer_addr,
            source,
        })?;

        spawn_client_accept_loop(Arc::clone(&core), client_listener, Arc::clone(&stop));
        spawn_peer_accept_loop(Arc::clone(&core), peer_listener, Arc::clone(&stop));
        spawn_peer_connectors(Arc::clone(&core), Arc::clone(&stop));

        {
            let core = Arc::clone(&core);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                election_timer::run(core, config.heartbeat_timeout, config.answer_timeout, stop)
            });
        }

        {
            let core = Arc::clone(&core);
            let stop = Arc::clone(&stop);
            let session_grace = config.session_grace;
            thread::spawn(move || reaper::run(core, session_grace, stop));
        }

        if config.run_admin_console {
            let core = Arc::clone(&core);
            thread::spawn(move || admin::run(core));
        }

        info!(%client_addr, %peer_addr, replica = %core.id, "replica started");

        Ok(Self { core, stop })
    }

    pub fn core(&self) -> &Arc<ReplicaCore> {
        &self.core
    }

    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn spawn_client_accept_loop(core: Arc<ReplicaCore>, listener: TcpListener, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            match stream {
                Ok(stream) => {
                    let core = Arc::clone(&core);
                    thread::spawn(move || session::handle_client(stream, core));
                }
                Err(err) => warn!(%err, "client accept failed"),
            }
        }
    });
}

fn spawn_peer_accept_loop(core: Arc<ReplicaCore>, listener: TcpListener, stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        for stream in listener.incoming() {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let mut stream = match stream {
                Ok(s) => s,
                Err(err) => {
                    warn!(%err, "peer accept failed");
                    continue;
                }
            };
            let core = Arc::clone(&core);
            thread::spawn(move || match peer::read_handshake(&mut stream) {
                Ok(from) => establish_link(core, from, stream),
                Err(err) => warn!(%err, "peer handshake failed"),
            });
        }
    });
}

/// Dials every peer with a higher id than ours, per the lower-connects
/// convention. Peers with a lower id are expected to connect to us
/// instead, via `spawn_peer_accept_loop`.
fn spawn_peer_connectors(core: Arc<ReplicaCore>, stop: Arc<AtomicBool>) {
    for entry in core.replicas.peers_of(core.id) {
        let target = ReplicaId::new(entry.id);
        if target <= core.id {
            continue;
        }
        let addr = entry.peer_addr;
        let core = Arc::clone(&core);
        let stop = Arc::clone(&stop);
        thread::spawn(move || loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let should_stop = || stop.load(Ordering::Relaxed);
            match peer::dial(core.id, addr, should_stop) {
                Some(stream) => establish_link(Arc::clone(&core), target, stream),
                None => return,
            }
            if stop.load(Ordering::Relaxed) {
                return;
            }
            // The link dropped; back off briefly before redialing.
            thread::sleep(Duration::from_millis(500));
        });
    }
}

fn establish_link(core: Arc<ReplicaCore>, id: ReplicaId, stream: std::net::TcpStream) {
    let reader = match stream.try_clone() {
        Ok(s) => s,
        Err(err) => {
            error!(peer = %id, %err, "failed to clone peer stream");
            return;
        }
    };
    let link = Arc::new(PeerLink::new(id, stream));
    core.register_peer(Arc::clone(&link));
    info!(peer = %id, "peer link established");
    peer::catch_up_follower(&core, &link);
    peer::run(core, link, reader);
}
