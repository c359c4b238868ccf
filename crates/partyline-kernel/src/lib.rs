//! # partyline-kernel: the pure functional core of one replica
//!
//! The kernel is the deterministic heart of a replica. It receives committed
//! commands — already ordered by the replication layer — and produces new
//! state plus effects for the server to carry out.
//!
//! ## Key principles
//!
//! - **No IO**: the kernel never touches the network or a socket.
//! - **No clocks**: timestamps travel in on [`Command::PostMessage`], minted
//!   by the caller, not read from the system clock here.
//! - **No randomness**: the same state plus the same command always produces
//!   the same new state and the same effects, which is what lets a follower
//!   reapply a coordinator's committed command log and land on identical
//!   state.
//!
//! ## Architecture
//!
//! - [`command`]: commands that can be committed (`OpenSession`, `PostMessage`, ...)
//! - [`effects`]: side effects for the server to execute (`BroadcastToGroup`, ...)
//! - [`state`]: in-memory sessions, groups, and bounded history
//! - [`kernel`]: the `apply_committed` function tying it together

pub mod command;
pub mod effects;
pub mod kernel;
pub mod state;

#[cfg(test)]
mod tests;

pub use command::Command;
pub use effects::Effect;
pub use kernel::{apply_committed, KernelError};
pub use state::{GroupState, SessionRecord, State};
