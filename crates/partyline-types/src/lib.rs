//! # partyline-types: core types for the partyline chat service
//!
//! This crate contains the value types shared by every other crate in the
//! workspace:
//! - Validated names ([`Username`], [`Groupname`])
//! - Entity identifiers ([`ReplicaId`], [`SessionId`])
//! - Replication coordinates ([`ViewNumber`], `SeqNumber`)
//! - Temporal types ([`Timestamp`])
//! - Message records ([`MessageKind`], [`MessageRecord`])
//! - System-wide limits (`limits` module)

use std::fmt::{Debug, Display};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Limits
// ============================================================================

/// Hard limits enforced by every layer of the system (wire, kernel, server).
pub mod limits {
    /// Minimum length of a username/groupname, in bytes.
    pub const NAME_MIN: usize = 4;
    /// Maximum length of a username/groupname, in bytes.
    pub const NAME_MAX: usize = 20;
    /// Maximum length of a chat message body, in bytes.
    pub const MESSAGE_MAX: usize = 512;
    /// Maximum total frame size (header + payload), in bytes.
    pub const PACKET_MAX: usize = 64 * 1024;
    /// Default per-user session cap (overridable via configuration).
    pub const DEFAULT_MAX_SESSIONS: usize = 3;
    /// Default history replay window, in records per group.
    pub const DEFAULT_HISTORY_SIZE: usize = 50;
}

// ============================================================================
// Validation
// ============================================================================

/// Error returned when a name or address fails validation.
///
/// These are surfaced to callers as `ArgumentError` (see `partyline-config`)
/// and must never be observed past a crate boundary once construction
/// succeeds: every [`Username`]/[`Groupname`] in the system is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("name must be between {min} and {max} characters, got {actual}")]
    Length {
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("name must contain only letters, digits, and '.', found {0:?}")]
    Charset(char),
}

fn validate_name(raw: &str) -> Result<(), ValidationError> {
    let len = raw.chars().count();
    if len < limits::NAME_MIN || len > limits::NAME_MAX {
        return Err(ValidationError::Length {
            min: limits::NAME_MIN,
            max: limits::NAME_MAX,
            actual: len,
        });
    }
    if let Some(bad) = raw
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.'))
    {
        return Err(ValidationError::Charset(bad));
    }
    Ok(())
}

// ============================================================================
// Username / Groupname
// ============================================================================

/// A validated chat handle: 4-20 characters from `[A-Za-z0-9.]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Username(String);

impl Username {
    /// Validates and wraps a raw username.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_name(&raw)?;
        Ok(Self(raw))
    }

    /// The literal sender name used to rewrite the echo of a user's own
    /// message client-side. Never appears on the wire.
    pub const YOU: &'static str = "You";

    /// The sentinel sender name for server-authored broadcasts.
    pub const SERVER: &'static str = "SERVER";

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Username {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Username {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated chat room name, same charset as [`Username`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Groupname(String);

impl Groupname {
    pub fn parse(raw: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = raw.into();
        validate_name(&raw)?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Groupname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Groupname {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// ReplicaId / ViewNumber / SeqNumber
// ============================================================================

/// Unique, totally-ordered identifier for a replica.
///
/// The bully election in `partyline-replication` relies on this total order:
/// the replica with the numerically highest id wins ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(u32);

impl ReplicaId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl Display for ReplicaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "replica#{}", self.0)
    }
}

impl From<u32> for ReplicaId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<ReplicaId> for u32 {
    fn from(id: ReplicaId) -> Self {
        id.0
    }
}

/// Monotonic coordinator epoch. Incremented on every successful election.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ViewNumber(u32);

impl ViewNumber {
    pub const ZERO: ViewNumber = ViewNumber(0);

    pub fn new(v: u32) -> Self {
        Self(v)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the next view number.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for ViewNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Monotonic, per-view sequence number for replication events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct SeqNumber(u64);

impl SeqNumber {
    pub const ZERO: SeqNumber = SeqNumber(0);

    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for SeqNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// SessionId
// ============================================================================

/// Stable identifier for a session: the id is unique cluster-wide because it
/// embeds the replica that minted it, so a session's identity never
/// collides across a view change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId {
    replica: ReplicaId,
    local: u64,
}

impl SessionId {
    pub fn new(replica: ReplicaId, local: u64) -> Self {
        Self { replica, local }
    }

    pub fn replica(self) -> ReplicaId {
        self.replica
    }

    pub fn local(self) -> u64 {
        self.local
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session#{}.{}", self.replica.as_u32(), self.local)
    }
}

/// Mints fresh, monotonically increasing [`SessionId`]s for one replica.
#[derive(Debug)]
pub struct SessionIdGenerator {
    replica: ReplicaId,
    next: u64,
}

impl SessionIdGenerator {
    pub fn new(replica: ReplicaId) -> Self {
        Self { replica, next: 0 }
    }

    pub fn generate(&mut self) -> SessionId {
        let id = SessionId::new(self.replica, self.next);
        self.next += 1;
        id
    }
}

// ============================================================================
// Timestamp
// ============================================================================

/// Wall-clock timestamp, stored as whole seconds since the Unix epoch (the
/// wire format for `MESSAGE.timestamp` is `int64` seconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Timestamp = Timestamp(0);

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(self) -> i64 {
        self.0
    }

    /// Creates a timestamp for the current wall-clock time.
    ///
    /// # Panics
    ///
    /// Panics if the system clock is set before the Unix epoch.
    pub fn now() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before Unix epoch")
            .as_secs();
        Self(secs as i64)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::EPOCH
    }
}

// ============================================================================
// MessageRecord
// ============================================================================

/// Whether a [`MessageRecord`] was authored by a user or synthesized by the
/// server (join/leave notices, administrative broadcasts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    User,
    Server,
}

impl MessageKind {
    pub fn as_byte(self) -> u8 {
        match self {
            MessageKind::User => 0,
            MessageKind::Server => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(MessageKind::User),
            1 => Some(MessageKind::Server),
            _ => None,
        }
    }
}

/// An immutable chat message, as stored in a group's history store.
///
/// `sender` carries the original username even for the author's own echo;
/// rewriting to [`Username::YOU`] is a client-side presentation concern
/// only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub timestamp: Timestamp,
    pub sender: String,
    pub kind: MessageKind,
    pub body: String,
}

impl MessageRecord {
    pub fn new(timestamp: Timestamp, sender: impl Into<String>, kind: MessageKind, body: impl Into<String>) -> Self {
        Self {
            timestamp,
            sender: sender.into(),
            kind,
            body: body.into(),
        }
    }

    pub fn user(timestamp: Timestamp, sender: &Username, body: impl Into<String>) -> Self {
        Self::new(timestamp, sender.as_str(), MessageKind::User, body)
    }

    pub fn server(timestamp: Timestamp, body: impl Into<String>) -> Self {
        Self::new(timestamp, Username::SERVER, MessageKind::Server, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("abc" => false; "three chars too short")]
    #[test_case("abcd" => true; "four chars is the floor")]
    #[test_case(&"a".repeat(20) => true; "twenty chars is the ceiling")]
    #[test_case(&"a".repeat(21) => false; "twenty one chars too long")]
    #[test_case("al.ce01" => true; "dots and digits allowed")]
    #[test_case("al ce" => false; "space rejected")]
    #[test_case("al-ce" => false; "hyphen rejected")]
    fn username_validation(raw: &str) -> bool {
        Username::parse(raw).is_ok()
    }

    #[test]
    fn session_ids_are_monotonic_per_replica() {
        let mut gen = SessionIdGenerator::new(ReplicaId::new(1));
        let a = gen.generate();
        let b = gen.generate();
        assert_eq!(a.replica(), ReplicaId::new(1));
        assert!(b.local() > a.local());
    }

    #[test]
    fn view_number_increments() {
        let v = ViewNumber::new(4);
        assert_eq!(v.next(), ViewNumber::new(5));
    }

    proptest::proptest! {
        #[test]
        fn valid_usernames_round_trip_through_as_str(s in "[A-Za-z0-9.]{4,20}") {
            let name = Username::parse(s.clone()).unwrap();
            proptest::prop_assert_eq!(name.as_str(), s);
        }
    }
}
