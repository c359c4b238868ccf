//! Coordinator-side replication log.
//!
//! The coordinator keeps a bounded buffer of recently committed command
//! bytes plus a cursor per follower. A command is *committed* (safe to ack
//! back to the client) once a majority of the cluster — the coordinator
//! itself plus enough followers — has applied it. Followers whose cursor
//! has fallen behind the buffer's retained window are no longer caught up
//! incrementally; they need a full [`partyline_wire::StateSnapshotPayload`]
//! instead (`needs_snapshot`).

use std::collections::{BTreeMap, VecDeque};

use partyline_types::{ReplicaId, SeqNumber, ViewNumber};

#[derive(Debug, Clone)]
struct Entry {
    seq: SeqNumber,
    body: Vec<u8>,
}

/// The coordinator's view of replication progress for one view.
#[derive(Debug, Clone)]
pub struct ReplicationLog {
    view: ViewNumber,
    next_seq: SeqNumber,
    buffer: VecDeque<Entry>,
    buffer_cap: usize,
    follower_acked: BTreeMap<ReplicaId, SeqNumber>,
    cluster_size: usize,
}

impl ReplicationLog {
    /// `cluster_size` is the total replica count (coordinator included); a
    /// command commits once `acked + 1 > cluster_size / 2` replicas (the
    /// coordinator, implicitly, plus enough followers) have it.
    pub fn new(view: ViewNumber, buffer_cap: usize, cluster_size: usize) -> Self {
        Self {
            view,
            next_seq: SeqNumber::ZERO,
            buffer: VecDeque::new(),
            buffer_cap,
            follower_acked: BTreeMap::new(),
            cluster_size,
        }
    }

    pub fn view(&self) -> ViewNumber {
        self.view
    }

    /// Adopts a new view after winning an election. Follower acks from the
    /// previous view say nothing about what's been applied under the new
    /// one, so they're discarded rather than carried forward.
    pub fn begin_view(&mut self, view: ViewNumber) {
        self.view = view;
        self.follower_acked.clear();
    }

    fn majority(&self) -> usize {
        self.cluster_size / 2 + 1
    }

    /// Appends a new committed-locally entry and returns its sequence
    /// number. Evicts the oldest buffered entry once `buffer_cap` is
    /// exceeded — followers that fall behind that window must be caught up
    /// with a snapshot instead (`needs_snapshot`).
    pub fn append(&mut self, body: Vec<u8>) -> SeqNumber {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.next();
        self.buffer.push_back(Entry { seq, body });
        while self.buffer.len() > self.buffer_cap {
            self.buffer.pop_front();
        }
        seq
    }

    /// The most recent sequence number appended, or `SeqNumber::ZERO` if
    /// nothing has been appended yet. Used to stamp a `STATE_SNAPSHOT` with
    /// the point in the log it was taken at.
    pub fn high_watermark(&self) -> SeqNumber {
        self.buffer.back().map_or(SeqNumber::ZERO, |e| e.seq)
    }

    /// Entries still in the buffer with `seq > after`, in order, for a
    /// follower whose cursor is still inside the retained window.
    pub fn entries_after(&self, after: SeqNumber) -> Vec<(SeqNumber, Vec<u8>)> {
        self.buffer
            .iter()
            .filter(|e| e.seq > after)
            .map(|e| (e.seq, e.body.clone()))
            .collect()
    }

    /// True if `after` is older than everything the buffer still retains —
    /// the caller must send a full state snapshot rather than a replay.
    pub fn needs_snapshot(&self, after: SeqNumber) -> bool {
        match self.buffer.front() {
            // A gap exists if the oldest retained entry isn't the very next
            // one the follower needs: entries between `after` and it were
            // already evicted.
            Some(oldest) => oldest.seq.as_u64() > after.as_u64() + 1,
            None => false,
        }
    }

    /// Records that `follower` has applied everything up to and including
    /// `seq`. Returns `true` if this ack just brought `seq` (or something
    /// at or after it) to majority commit.
    pub fn record_ack(&mut self, follower: ReplicaId, seq: SeqNumber) -> bool {
        let was_committed = self.is_committed(seq);
        self.follower_acked
            .entry(follower)
            .and_modify(|cur| *cur = (*cur).max(seq))
            .or_insert(seq);
        !was_committed && self.is_committed(seq)
    }

    /// Number of followers (not counting the coordinator) that have acked
    /// at least `seq`.
    fn followers_at_or_past(&self, seq: SeqNumber) -> usize {
        self.follower_acked.values().filter(|acked| **acked >= seq).count()
    }

    /// Whether `seq` has majority commit: the coordinator (always "acked",
    /// since it applied the command before replicating it) plus enough
    /// followers.
    pub fn is_committed(&self, seq: SeqNumber) -> bool {
        1 + self.followers_at_or_past(seq) >= self.majority()
    }

    pub fn last_acked(&self, follower: ReplicaId) -> SeqNumber {
        self.follower_acked.get(&follower).copied().unwrap_or(SeqNumber::ZERO)
    }

    pub fn forget_follower(&mut self, follower: ReplicaId) {
        self.follower_acked.remove(&follower);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(cluster_size: usize) -> ReplicationLog {
        ReplicationLog::new(ViewNumber::ZERO, 4, cluster_size)
    }

    #[test]
    fn three_node_cluster_commits_with_one_follower_ack() {
        let mut log = log(3);
        let seq = log.append(vec![1]);
        assert!(!log.is_committed(seq));
        assert!(log.record_ack(ReplicaId::new(2), seq));
        assert!(log.is_committed(seq));
    }

    #[test]
    fn single_node_cluster_commits_immediately() {
        let mut log = log(1);
        let seq = log.append(vec![1]);
        assert!(log.is_committed(seq));
    }

    #[test]
    fn record_ack_only_reports_newly_committed_transitions() {
        let mut log = log(3);
        let seq = log.append(vec![1]);
        assert!(log.record_ack(ReplicaId::new(2), seq));
        assert!(!log.record_ack(ReplicaId::new(3), seq)); // already committed
    }

    #[test]
    fn buffer_evicts_oldest_entries_past_capacity() {
        let mut log = ReplicationLog::new(ViewNumber::ZERO, 2, 3);
        log.append(vec![0]);
        log.append(vec![1]);
        let last = log.append(vec![2]);
        let entries = log.entries_after(SeqNumber::ZERO);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.last().unwrap().0, last);
    }

    #[test]
    fn follower_far_behind_the_retained_window_needs_a_snapshot() {
        let mut log = ReplicationLog::new(ViewNumber::ZERO, 2, 3);
        for i in 0..5 {
            log.append(vec![i]);
        }
        assert!(log.needs_snapshot(SeqNumber::ZERO));
    }

    #[test]
    fn begin_view_clears_stale_follower_acks() {
        let mut log = log(3);
        let seq = log.append(vec![1]);
        log.record_ack(ReplicaId::new(2), seq);
        log.begin_view(ViewNumber::new(7));
        assert_eq!(log.view(), ViewNumber::new(7));
        assert_eq!(log.last_acked(ReplicaId::new(2)), SeqNumber::ZERO);
    }

    #[test]
    fn follower_inside_the_window_does_not_need_a_snapshot() {
        let mut log = ReplicationLog::new(ViewNumber::ZERO, 4, 3);
        for i in 0..3 {
            log.append(vec![i]);
        }
        assert!(!log.needs_snapshot(SeqNumber::ZERO));
    }
}
