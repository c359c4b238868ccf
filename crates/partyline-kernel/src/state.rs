//! Kernel state management.
//!
//! The kernel maintains in-memory sessions, groups, and bounded chat
//! history. State transitions are done by taking ownership and returning a
//! new state (builder pattern), which keeps `apply_committed` free of
//! interior mutability while still avoiding unnecessary clones of the
//! `BTreeMap`s underneath.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::net::SocketAddr;

use partyline_types::{Groupname, MessageRecord, SessionId, Username};
use serde::{Deserialize, Serialize};

/// A logged-in client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub username: Username,
    pub groupname: Groupname,
    pub listen_addr: SocketAddr,
}

/// One chat room: its current membership and bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GroupState {
    members: BTreeSet<SessionId>,
    history: VecDeque<MessageRecord>,
}

impl GroupState {
    pub fn members(&self) -> &BTreeSet<SessionId> {
        &self.members
    }

    pub fn history(&self) -> &VecDeque<MessageRecord> {
        &self.history
    }
}

/// The kernel's in-memory state.
///
/// State uses a builder pattern: methods take ownership of `self`, mutate,
/// and return `self`. This supports the functional-core pattern used by
/// `apply_committed` while avoiding unnecessary clones of the internal maps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    sessions: BTreeMap<SessionId, SessionRecord>,
    groups: BTreeMap<Groupname, GroupState>,
    session_counts: BTreeMap<Username, usize>,
    max_sessions_per_user: usize,
    history_size: usize,
}

impl Default for State {
    fn default() -> Self {
        Self::new(
            partyline_types::limits::DEFAULT_MAX_SESSIONS,
            partyline_types::limits::DEFAULT_HISTORY_SIZE,
        )
    }
}

impl State {
    /// Creates a new empty state with the given per-user session cap and
    /// per-group history window.
    pub fn new(max_sessions_per_user: usize, history_size: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            groups: BTreeMap::new(),
            session_counts: BTreeMap::new(),
            max_sessions_per_user,
            history_size,
        }
    }

    pub fn max_sessions_per_user(&self) -> usize {
        self.max_sessions_per_user
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn session(&self, id: &SessionId) -> Option<&SessionRecord> {
        self.sessions.get(id)
    }

    pub fn session_exists(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of sessions currently open for `username`, across every group.
    pub fn session_count_for(&self, username: &Username) -> usize {
        self.session_counts.get(username).copied().unwrap_or(0)
    }

    pub fn sessions(&self) -> impl Iterator<Item = (&SessionId, &SessionRecord)> {
        self.sessions.iter()
    }

    /// Inserts a session and joins its group. Internal to the kernel;
    /// external code should go through `apply_committed`, which enforces
    /// the session cap first.
    pub(crate) fn with_session_opened(mut self, id: SessionId, record: SessionRecord) -> Self {
        *self.session_counts.entry(record.username.clone()).or_insert(0) += 1;
        self.groups
            .entry(record.groupname.clone())
            .or_default()
            .members
            .insert(id);
        self.sessions.insert(id, record);
        self
    }

    /// Removes a session and its group membership. No-op if the session is
    /// already gone (idempotent under replay).
    pub(crate) fn with_session_closed(mut self, id: SessionId) -> Self {
        if let Some(record) = self.sessions.remove(&id) {
            if let Some(count) = self.session_counts.get_mut(&record.username) {
                *count = count.saturating_sub(1);
            }
            if let Some(group) = self.groups.get_mut(&record.groupname) {
                group.members.remove(&id);
            }
        }
        self
    }

    /// Updates a session's listen address in place, without touching its
    /// group membership or the per-user session count. Used when a client
    /// resumes an existing session under a new connection rather than
    /// opening a fresh one. Caller must have already confirmed the session
    /// exists.
    pub(crate) fn with_listen_addr_updated(mut self, id: SessionId, listen_addr: SocketAddr) -> Self {
        if let Some(record) = self.sessions.get_mut(&id) {
            record.listen_addr = listen_addr;
        }
        self
    }

    // ========================================================================
    // Groups
    // ========================================================================

    pub fn group(&self, name: &Groupname) -> Option<&GroupState> {
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = (&Groupname, &GroupState)> {
        self.groups.iter()
    }

    pub fn group_members(&self, name: &Groupname) -> BTreeSet<SessionId> {
        self.groups.get(name).map(|g| g.members.clone()).unwrap_or_default()
    }

    pub fn group_history(&self, name: &Groupname) -> Vec<MessageRecord> {
        self.groups
            .get(name)
            .map(|g| g.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Destroys a group, dropping its history, once its member set is empty.
    /// Must run after the departing session's leave note has already been
    /// posted to history — calling this before `with_message_posted` would
    /// let that call silently recreate the group via `.or_default()`.
    pub(crate) fn with_group_destroyed_if_empty(mut self, name: &Groupname) -> Self {
        if self.groups.get(name).is_some_and(|g| g.members.is_empty()) {
            self.groups.remove(name);
        }
        self
    }

    /// Appends a record to a group's history, evicting the oldest entry once
    /// `history_size` is exceeded, keeping each group's history bounded.
    pub(crate) fn with_message_posted(mut self, name: &Groupname, record: MessageRecord) -> Self {
        let group = self.groups.entry(name.clone()).or_default();
        group.history.push_back(record);
        while group.history.len() > self.history_size {
            group.history.pop_front();
        }
        self
    }
}
