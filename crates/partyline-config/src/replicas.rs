//! Static replica-set configuration: which replicas exist, and where.
//!
//! The cluster topology is static for the lifetime of a run
//! Non-goals rule out dynamic membership changes) and is given once, either
//! inline on the command line or as a TOML file:
//!
//! ```toml
//! [[replicas]]
//! id = 1
//! client_addr = "127.0.0.1:6000"
//! peer_addr = "127.0.0.1:7000"
//!
//! [[replicas]]
//! id = 2
//! client_addr = "127.0.0.1:6001"
//! peer_addr = "127.0.0.1:7001"
//! ```

use std::net::SocketAddr;
use std::path::Path;

use partyline_types::ReplicaId;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One replica's addresses: `client_addr` is where clients connect,
/// `peer_addr` is where other replicas connect for replication and
/// election traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEntry {
    pub id: u32,
    pub client_addr: SocketAddr,
    pub peer_addr: SocketAddr,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ReplicaSetFile {
    #[serde(default)]
    replicas: Vec<ReplicaEntry>,
}

/// The full, static set of replicas in the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSet {
    entries: Vec<ReplicaEntry>,
}

impl ReplicaSet {
    pub fn new(entries: Vec<ReplicaEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyReplicaSet);
        }
        Ok(Self { entries })
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ReplicaSetFile = toml::from_str(&raw).map_err(|source| ConfigError::ParseError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(file.replicas)
    }

    pub fn entries(&self) -> &[ReplicaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: ReplicaId) -> Option<&ReplicaEntry> {
        self.entries.iter().find(|e| e.id == id.as_u32())
    }

    pub fn peers_of(&self, id: ReplicaId) -> impl Iterator<Item = &ReplicaEntry> {
        self.entries.iter().filter(move |e| e.id != id.as_u32())
    }

    pub fn client_addrs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.entries.iter().map(|e| e.client_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_replica_set_is_rejected() {
        assert!(matches!(ReplicaSet::new(vec![]), Err(ConfigError::EmptyReplicaSet)));
    }

    #[test]
    fn loads_replica_set_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [[replicas]]
            id = 1
            client_addr = "127.0.0.1:6000"
            peer_addr = "127.0.0.1:7000"

            [[replicas]]
            id = 2
            client_addr = "127.0.0.1:6001"
            peer_addr = "127.0.0.1:7001"
            "#
        )
        .unwrap();

        let set = ReplicaSet::from_toml_file(file.path()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.peers_of(ReplicaId::new(1)).count(), 1);
        assert!(set.get(ReplicaId::new(2)).is_some());
    }
}
