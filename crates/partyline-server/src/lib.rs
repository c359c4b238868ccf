//! # partyline-server: replica daemon
//!
//! Each replica runs one `ReplicaCore` (session/group/history state plus
//! the replication log and the bully election state machine) and serves
//! three kinds of connection from its own thread:
//!
//! - one client session thread per connected chat client (`session`),
//! - one peer link thread per other replica in the cluster (`peer`),
//! - a single election timer thread driving leader election (`election_timer`).
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        partyline-server                        │
//! │  ┌────────────┐   ┌─────────────┐   ┌────────────────────┐    │
//! │  │  Listener  │ → │  Sessions   │ → │     ReplicaCore     │    │
//! │  │  (client)  │   │ (1 thread   │   │ kernel + repl log   │    │
//! │  │            │   │  per conn)  │   │ + election state    │    │
//! │  └────────────┘   └─────────────┘   └──────────┬─────────┘    │
//! │  ┌────────────┐   ┌─────────────┐               │              │
//! │  │  Listener  │ → │ Peer links  │───────────────┘              │
//! │  │  (peer)    │   │ (1 thread   │                               │
//! │  │            │   │  per peer)  │                               │
//! │  └────────────┘   └─────────────┘                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is a deliberate departure from an `mio`-based reactor: a chat
//! server's connection count and message rate don't warrant one, and
//! thread-per-connection keeps each protocol role (client session, peer
//! link, election timer) readable as its own blocking loop.

mod admin;
mod core;
mod election_timer;
mod error;
mod peer;
mod reaper;
mod server;
mod session;

pub use crate::core::ReplicaCore;
pub use error::{ServerError, ServerResult};
pub use server::{RunConfig, Server};
