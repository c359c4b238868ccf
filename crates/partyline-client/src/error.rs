//! Client error types.

use partyline_wire::WireError;
use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] partyline_config::ConfigError),

    #[error("no replica in the configured set accepted a connection")]
    NoReplicaReachable,

    #[error("login rejected: {0}")]
    LoginRejected(String),

    #[error("server sent an unexpected packet during login: {0}")]
    UnexpectedLoginReply(String),
}
