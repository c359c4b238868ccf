//! # partyline-client: chat client library
//!
//! Connects to a partyline cluster, posts and receives messages, and
//! follows the cluster through a leader election without the user having
//! to reconnect by hand. Three background threads per live
//! connection (`session::keep_alive_loop`, `session::receive_loop`, plus a
//! single long-lived stdin reader) are coordinated by [`Client`], which
//! owns the `Connected` → `ServerDown` → `Reconnecting` state machine.

mod announce;
mod client;
mod connection;
mod error;
mod session;

pub use client::{Client, ClientConfig, ClientState};
pub use error::{ClientError, ClientResult};
pub use session::ChatEvent;
