//! Effects produced by the kernel.
//!
//! Effects represent side effects that the server must execute after a
//! command is applied. The kernel is pure — it produces effects but never
//! executes them directly.

use partyline_types::{Groupname, MessageRecord, SessionId};

/// An effect to be executed by the server.
///
/// Effects are produced by [`super::kernel::apply_committed`] and describe
/// actions that must happen outside the pure kernel: writing bytes to a
/// socket, tearing down a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Replay a group's bounded history to a session that just joined.
    DeliverHistory {
        session: SessionId,
        groupname: Groupname,
        records: Vec<MessageRecord>,
    },

    /// Fan a record out to every current member of a group, optionally
    /// skipping one session.
    BroadcastToGroup {
        groupname: Groupname,
        record: MessageRecord,
        exclude: Option<SessionId>,
    },

    /// Tear down a session's connection (session-cap rejection, or an
    /// eviction the server decided on independently).
    EvictSession { session: SessionId, reason: String },
}
