//! Commands committed through the replication log and applied to the kernel.
//!
//! A [`Command`] is the unit of replication: the coordinator applies
//! it locally, then ships the same value, postcard-encoded, to every
//! follower as the `body` of a `REPL_EVENT`. Applying the identical command
//! against identical state is what keeps followers in lockstep with the
//! coordinator.

use std::net::SocketAddr;

use partyline_types::{Groupname, SessionId, Timestamp, Username};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// A client session joining `groupname` under `username`. `listen_addr`
    /// is the client's own listen socket, used to push `COORDINATOR_ANNOUNCE`
    /// during a view change.
    OpenSession {
        session: SessionId,
        username: Username,
        groupname: Groupname,
        listen_addr: SocketAddr,
    },

    /// A session disconnecting, either voluntarily (`LOGOUT`) or because the
    /// server tore it down (cap eviction, connection failure).
    CloseSession { session: SessionId },

    /// A chat message posted by an existing session.
    PostMessage {
        session: SessionId,
        timestamp: Timestamp,
        body: String,
    },

    /// A session resuming under a new socket handle after its client
    /// reconnected within the grace window, issued by the coordinator
    /// instead of a fresh `OpenSession` so the session's identity (and its
    /// hold on the per-user cap) carries over rather than being recreated.
    CoordinatorUpdate {
        session: SessionId,
        listen_addr: SocketAddr,
    },
}
