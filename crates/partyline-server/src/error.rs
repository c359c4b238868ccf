//! Server error types.

use std::net::SocketAddr;

use partyline_kernel::KernelError;
use partyline_wire::WireError;
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("wire protocol error: {0}")]
    Wire(#[from] WireError),

    #[error("kernel error: {0}")]
    Kernel(#[from] KernelError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("not the coordinator (current coordinator: {coordinator_hint:?}, view: {view})")]
    NotCoordinator {
        view: u32,
        coordinator_hint: Option<SocketAddr>,
    },

    #[error("configuration error: {0}")]
    Config(#[from] partyline_config::ConfigError),
}

impl ServerError {
    pub fn not_coordinator(view: u32, coordinator_hint: Option<SocketAddr>) -> Self {
        Self::NotCoordinator { view, coordinator_hint }
    }

    pub fn is_not_coordinator(&self) -> bool {
        matches!(self, Self::NotCoordinator { .. })
    }
}
