//! Configuration and CLI argument error types.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read replica list at {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse replica list at {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid argument: {0}")]
    ArgumentError(String),

    #[error("replica id {0} is not listed in the replica set")]
    UnknownReplica(u32),

    #[error("replica set must contain at least one entry")]
    EmptyReplicaSet,
}
