//! Shared replica state: the kernel, the replication log, the election
//! state machine, and the registry of locally connected client sessions.
//!
//! Everything here is guarded by `std` synchronization primitives rather
//! than routed through a single event loop: several threads —
//! per-client session threads, per-peer replication threads, the election
//! timer — all reach into a `ReplicaCore` concurrently.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::mpsc::Sender;
use std::sync::{Mutex, RwLock};
use std::time::Instant;

use std::sync::Arc;

use partyline_config::ReplicaSet;
use partyline_kernel::{self as kernel, Command, Effect, KernelError};
use partyline_replication::{ElectionEvent, ElectionOutput, ElectionState, ReplicationLog, Role};
use partyline_types::{Groupname, ReplicaId, SessionId, SessionIdGenerator, Username};
use partyline_wire::Packet;
use tracing::warn;

use crate::peer::PeerLink;

struct SessionHandle {
    outbox: Sender<Packet>,
    last_seen: Instant,
    /// `false` once the client's connection has dropped. A disconnected
    /// session is held, not closed, so a client reconnecting within the
    /// grace window resumes it instead of opening a fresh one.
    connected: bool,
}

/// All mutable state for one replica, shared across every thread that
/// serves it.
pub struct ReplicaCore {
    pub id: ReplicaId,
    pub replicas: ReplicaSet,
    kernel: Mutex<kernel::State>,
    election: Mutex<ElectionState>,
    repl_log: Mutex<ReplicationLog>,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    session_ids: Mutex<SessionIdGenerator>,
    peers: RwLock<HashMap<ReplicaId, Arc<PeerLink>>>,
}

impl ReplicaCore {
    pub fn new(
        id: ReplicaId,
        replicas: ReplicaSet,
        max_sessions: usize,
        history_size: usize,
        replication_buffer: usize,
    ) -> Self {
        let peers = replicas.peers_of(id).map(|e| ReplicaId::new(e.id)).collect();
        let cluster_size = replicas.len();
        Self {
            id,
            replicas,
            kernel: Mutex::new(kernel::State::new(max_sessions, history_size)),
            election: Mutex::new(ElectionState::new(id, peers)),
            repl_log: Mutex::new(ReplicationLog::new(
                partyline_types::ViewNumber::ZERO,
                replication_buffer,
                cluster_size,
            )),
            sessions: RwLock::new(HashMap::new()),
            session_ids: Mutex::new(SessionIdGenerator::new(id)),
            peers: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Peer registry
    // ------------------------------------------------------------------

    pub fn register_peer(&self, link: Arc<PeerLink>) {
        self.peers.write().unwrap().insert(link.id, link);
    }

    pub fn unregister_peer(&self, id: ReplicaId) {
        self.peers.write().unwrap().remove(&id);
    }

    pub fn peer(&self, id: ReplicaId) -> Option<Arc<PeerLink>> {
        self.peers.read().unwrap().get(&id).cloned()
    }

    pub fn peer_ids(&self) -> Vec<ReplicaId> {
        self.peers.read().unwrap().keys().copied().collect()
    }

    fn broadcast_to_peers(&self, packet: &Packet) {
        let peers: Vec<_> = self.peers.read().unwrap().values().cloned().collect();
        for peer in peers {
            if let Err(err) = peer.send(packet) {
                warn!(peer = %peer.id, %err, "failed to send to peer");
            }
        }
    }

    pub fn new_session_id(&self) -> SessionId {
        self.session_ids.lock().unwrap().generate()
    }

    // ------------------------------------------------------------------
    // Session registry
    // ------------------------------------------------------------------

    pub fn register_session(&self, id: SessionId, outbox: Sender<Packet>) {
        self.sessions.write().unwrap().insert(
            id,
            SessionHandle {
                outbox,
                last_seen: Instant::now(),
                connected: true,
            },
        );
    }

    pub fn unregister_session(&self, id: SessionId) {
        self.sessions.write().unwrap().remove(&id);
    }

    pub fn touch_session(&self, id: SessionId) {
        if let Some(handle) = self.sessions.write().unwrap().get_mut(&id) {
            handle.last_seen = Instant::now();
        }
    }

    /// Marks a session's connection as dropped without tearing down the
    /// kernel-level session. Called when a client's socket disconnects
    /// without an explicit `LOGOUT`, so the session survives long enough for
    /// a reconnect to resume it.
    pub fn mark_disconnected(&self, id: SessionId) {
        if let Some(handle) = self.sessions.write().unwrap().get_mut(&id) {
            handle.connected = false;
            handle.last_seen = Instant::now();
        }
    }

    /// Re-attaches a disconnected session to a new connection's outbox.
    pub fn resume_session(&self, id: SessionId, outbox: Sender<Packet>) {
        if let Some(handle) = self.sessions.write().unwrap().get_mut(&id) {
            handle.outbox = outbox;
            handle.connected = true;
            handle.last_seen = Instant::now();
        }
    }

    /// Finds a still-open kernel session for `username`/`groupname` whose
    /// connection has dropped, so a `LOGIN` can resume it instead of opening
    /// a new one. Returns `None` once the grace window has expired and the
    /// reaper has torn the old session down.
    pub fn find_resumable_session(&self, username: &Username, groupname: &Groupname) -> Option<SessionId> {
        let candidate = {
            let kernel = self.kernel.lock().unwrap();
            kernel
                .sessions()
                .find(|(_, record)| record.username == *username && record.groupname == *groupname)
                .map(|(id, _)| *id)?
        };
        let sessions = self.sessions.read().unwrap();
        let disconnected = sessions.get(&candidate).is_some_and(|h| !h.connected);
        disconnected.then_some(candidate)
    }

    /// Sessions whose connection has dropped and stayed dropped for at least
    /// `grace`, past the window a reconnect can resume within.
    pub fn idle_sessions(&self, grace: std::time::Duration) -> Vec<SessionId> {
        let now = Instant::now();
        self.sessions
            .read()
            .unwrap()
            .iter()
            .filter(|(_, h)| !h.connected && now.duration_since(h.last_seen) > grace)
            .map(|(id, _)| *id)
            .collect()
    }

    fn deliver(&self, session: SessionId, packet: Packet) {
        let sessions = self.sessions.read().unwrap();
        if let Some(handle) = sessions.get(&session) {
            // A closed receiver just means the session's writer thread has
            // already exited; the reader loop will notice and clean up.
            let _ = handle.outbox.send(packet);
        }
    }

    // ------------------------------------------------------------------
    // Election
    // ------------------------------------------------------------------

    pub fn is_coordinator(&self) -> bool {
        self.election.lock().unwrap().role() == Role::Coordinator
    }

    pub fn view(&self) -> partyline_types::ViewNumber {
        self.election.lock().unwrap().view()
    }

    pub fn coordinator_hint(&self) -> Option<SocketAddr> {
        let coordinator = self.election.lock().unwrap().coordinator()?;
        self.replicas.get(coordinator).map(|e| e.client_addr)
    }

    pub fn drive_election(&self, event: ElectionEvent) -> Vec<ElectionOutput> {
        self.election.lock().unwrap().on_event(event)
    }

    /// Adopts a freshly won view in the replication log, discarding any
    /// follower acks left over from before the election.
    pub fn begin_view(&self, view: partyline_types::ViewNumber) {
        self.repl_log.lock().unwrap().begin_view(view);
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.replicas.get(self.id).map(|e| e.client_addr)
    }

    // ------------------------------------------------------------------
    // Admin introspection
    // ------------------------------------------------------------------

    pub fn for_each_session(&self, mut f: impl FnMut(SessionId, &kernel::SessionRecord)) {
        let kernel = self.kernel.lock().unwrap();
        for (id, record) in kernel.sessions() {
            f(*id, record);
        }
    }

    pub fn for_each_group(&self, mut f: impl FnMut(&partyline_types::Groupname, &std::collections::BTreeSet<SessionId>)) {
        let kernel = self.kernel.lock().unwrap();
        for (name, group) in kernel.groups() {
            f(name, group.members());
        }
    }

    // ------------------------------------------------------------------
    // Replication
    // ------------------------------------------------------------------

    pub fn record_ack(&self, follower: ReplicaId, seq: partyline_types::SeqNumber) -> bool {
        self.repl_log.lock().unwrap().record_ack(follower, seq)
    }

    pub fn entries_after(&self, after: partyline_types::SeqNumber) -> Vec<(partyline_types::SeqNumber, Vec<u8>)> {
        self.repl_log.lock().unwrap().entries_after(after)
    }

    pub fn needs_snapshot(&self, after: partyline_types::SeqNumber) -> bool {
        self.repl_log.lock().unwrap().needs_snapshot(after)
    }

    pub fn snapshot(&self) -> (partyline_types::ViewNumber, partyline_types::SeqNumber, Vec<u8>) {
        let view = self.election.lock().unwrap().view();
        let as_of_seq = self.repl_log.lock().unwrap().high_watermark();
        let state = self.kernel.lock().unwrap().clone();
        let body = postcard::to_allocvec(&state).expect("kernel state is always serializable");
        (view, as_of_seq, body)
    }

    pub fn restore_snapshot(&self, body: &[u8]) -> Result<(), postcard::Error> {
        let state: kernel::State = postcard::from_bytes(body)?;
        *self.kernel.lock().unwrap() = state;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Command application
    // ------------------------------------------------------------------

    /// Applies a command that originated locally (from one of our own
    /// connected clients). If we're the coordinator, appends it to the
    /// replication log and fans the resulting `REPL_EVENT` out to every
    /// connected follower.
    pub fn apply_local(&self, cmd: Command) -> Result<Vec<Effect>, KernelError> {
        let effects = self.apply(cmd.clone())?;
        if self.is_coordinator() {
            let view = self.view();
            let body = postcard::to_allocvec(&cmd).expect("command is always serializable");
            let seq = self.repl_log.lock().unwrap().append(body.clone());
            self.broadcast_to_peers(&Packet::ReplEvent(partyline_wire::ReplEventPayload {
                view,
                seq,
                body,
            }));
        }
        Ok(effects)
    }

    /// Applies a command received over a replication link from the
    /// coordinator. Effects are executed the same way as for a locally
    /// originated command — if this replica happens to have its own
    /// session registered for the affected group (e.g. it *was* the
    /// coordinator a moment ago), delivery still reaches it.
    pub fn apply_remote(&self, cmd: Command) -> Result<Vec<Effect>, KernelError> {
        self.apply(cmd)
    }

    fn apply(&self, cmd: Command) -> Result<Vec<Effect>, KernelError> {
        let mut kernel = self.kernel.lock().unwrap();
        // Cloned rather than moved out: `apply_committed` only hands state
        // back on success, and we need the original intact if a precondition
        // (session cap, unknown session) rejects the command.
        let (new_state, effects) = kernel::apply_committed(kernel.clone(), cmd)?;
        *kernel = new_state;
        drop(kernel);

        for effect in &effects {
            match effect {
                Effect::DeliverHistory { session, records, .. } => {
                    for record in records {
                        self.deliver(
                            *session,
                            Packet::Message(partyline_wire::MessagePayload {
                                timestamp: record.timestamp,
                                sender: record.sender.clone(),
                                kind: record.kind.as_byte(),
                                body: record.body.clone(),
                            }),
                        );
                    }
                }
                Effect::BroadcastToGroup { groupname, record, exclude } => {
                    let members = self.kernel.lock().unwrap().group_members(groupname);
                    for member in members {
                        if Some(member) == *exclude {
                            continue;
                        }
                        self.deliver(
                            member,
                            Packet::Message(partyline_wire::MessagePayload {
                                timestamp: record.timestamp,
                                sender: record.sender.clone(),
                                kind: record.kind.as_byte(),
                                body: record.body.clone(),
                            }),
                        );
                    }
                }
                Effect::EvictSession { session, reason } => {
                    self.deliver(
                        *session,
                        Packet::Disconnect(partyline_wire::DisconnectPayload {
                            reason: reason.clone(),
                        }),
                    );
                }
            }
        }

        Ok(effects)
    }
}
