//! # partyline-config: CLI arguments and static cluster topology
//!
//! Configuration has two independent pieces:
//! 1. [`args`]: per-process settings parsed from the command line with
//!    `clap` — replica id, timeouts, session/history limits.
//! 2. [`replicas`]: the cluster's static topology — every replica's id and
//!    addresses — loaded from a TOML file shared by every process.

mod args;
mod error;
mod replicas;

pub use args::{ClientArgs, ServerArgs};
pub use error::ConfigError;
pub use replicas::{ReplicaEntry, ReplicaSet};
