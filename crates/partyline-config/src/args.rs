//! Command-line argument parsing for the server and client binaries.

use std::path::PathBuf;

use clap::Parser;
use partyline_types::limits;

use crate::ConfigError;

/// Starts one replica of a partyline cluster.
#[derive(Debug, Parser)]
#[command(name = "partyline-server", version, about)]
pub struct ServerArgs {
    /// This replica's id. Must match an entry in the replica set and is
    /// used as the total order for bully election.
    #[arg(long)]
    pub id: u32,

    /// Path to the TOML file describing every replica in the cluster.
    #[arg(long)]
    pub replicas_file: PathBuf,

    /// Maximum concurrent sessions per username, cluster-wide.
    #[arg(long, default_value_t = limits::DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,

    /// Number of recent messages replayed to a client on join.
    #[arg(long, default_value_t = limits::DEFAULT_HISTORY_SIZE)]
    pub history_size: usize,

    /// How long a follower waits without a coordinator heartbeat before
    /// starting an election.
    #[arg(long, default_value_t = 3000)]
    pub heartbeat_timeout_ms: u64,

    /// How long a candidate waits for `ANSWER` before declaring itself
    /// coordinator.
    #[arg(long, default_value_t = 1000)]
    pub answer_timeout_ms: u64,

    /// How many recent replication events the coordinator buffers before
    /// falling back to a full snapshot for a lagging follower.
    #[arg(long, default_value_t = 256)]
    pub replication_buffer: usize,

    /// How long a session is held after its connection drops before the
    /// session is closed, giving a client time to reconnect (e.g. across a
    /// coordinator failover) and resume it instead of opening a new one.
    #[arg(long, default_value_t = 15_000)]
    pub session_grace_ms: u64,
}

impl ServerArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_sessions == 0 {
            return Err(ConfigError::ArgumentError(
                "--max-sessions must be at least 1".into(),
            ));
        }
        if self.history_size == 0 {
            return Err(ConfigError::ArgumentError(
                "--history-size must be at least 1".into(),
            ));
        }
        if self.answer_timeout_ms >= self.heartbeat_timeout_ms {
            return Err(ConfigError::ArgumentError(
                "--answer-timeout-ms must be smaller than --heartbeat-timeout-ms".into(),
            ));
        }
        if self.session_grace_ms == 0 {
            return Err(ConfigError::ArgumentError("--session-grace-ms must be at least 1".into()));
        }
        Ok(())
    }
}

/// Connects a chat client to a partyline cluster.
#[derive(Debug, Parser)]
#[command(name = "partyline-client", version, about)]
pub struct ClientArgs {
    /// Display name, 4-20 characters from `[A-Za-z0-9.]`.
    #[arg(long)]
    pub username: String,

    /// Chat room to join.
    #[arg(long)]
    pub groupname: String,

    /// Path to the TOML file describing every replica in the cluster, used
    /// both for the initial connection and as a fallback list to poll if
    /// the coordinator goes down before announcing its successor.
    #[arg(long)]
    pub replicas_file: PathBuf,

    /// Local port the client listens on for `COORDINATOR_ANNOUNCE` pushes.
    /// `0` picks an ephemeral port.
    #[arg(long, default_value_t = 0)]
    pub listen_port: u16,

    /// Keep-alive interval sent to the coordinator while idle.
    #[arg(long, default_value_t = 1000)]
    pub keep_alive_ms: u64,
}

impl ClientArgs {
    pub fn validate(&self) -> Result<(), ConfigError> {
        partyline_types::Username::parse(&self.username)
            .map_err(|e| ConfigError::ArgumentError(format!("--username: {e}")))?;
        partyline_types::Groupname::parse(&self.groupname)
            .map_err(|e| ConfigError::ArgumentError(format!("--groupname: {e}")))?;
        Ok(())
    }
}
