//! # partyline-replication: bully election and primary-backup replication
//!
//! Two independent state machines, both pure and IO-free — the server
//! thread that owns real sockets and timers drives them and carries out
//! their [`election::Output`]s and replication decisions:
//!
//! - [`election`]: bully leader election. Decides who the
//!   coordinator is.
//! - [`log`]: the coordinator's bounded replication log and per-follower
//!   commit tracking. Decides when a command is safe to
//!   acknowledge to a client.
//!
//! Commands flowing through the log are [`partyline_kernel::Command`]
//! values, postcard-encoded into the `body` of a
//! `partyline_wire::ReplEventPayload`.

pub mod election;
pub mod log;

pub use election::{ElectionState, Event as ElectionEvent, Output as ElectionOutput, Role};
pub use log::ReplicationLog;
