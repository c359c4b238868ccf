//! Bully leader election.
//!
//! `ElectionState` is a pure state machine: it consumes [`Event`]s (timer
//! firings and inbound wire messages, already decoded by the caller) and
//! produces [`Output`]s (messages to send, role transitions to act on). It
//! never touches a socket or a clock directly — the server thread that owns
//! the real `TcpStream`s and timers drives it.
//!
//! Algorithm, restated in terms of this state machine: a replica that
//! suspects the coordinator is down challenges every replica with a higher
//! [`ReplicaId`] (`SendElection`). If nobody answers within `T_answer`, it
//! declares itself coordinator. If someone answers, it waits for that
//! process (or a still-higher one) to announce itself via `COORDINATOR`.
//! Any replica that receives a challenge from a lower id answers it and, if
//! not already a candidate, starts its own election — this is what lets the
//! highest live replica always win, even if the failure is detected first
//! by a low-numbered one.

use std::collections::BTreeSet;

use partyline_types::{ReplicaId, ViewNumber};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Coordinator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// No heartbeat from the coordinator within `T_timeout`.
    HeartbeatTimeout,
    /// No `ANSWER` received within `T_answer` of starting an election.
    AnswerTimeout,
    ElectionReceived { from: ReplicaId },
    AnswerReceived { from: ReplicaId },
    CoordinatorReceived { from: ReplicaId, view: ViewNumber },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    SendElection { to: ReplicaId },
    SendAnswer { to: ReplicaId },
    BroadcastCoordinator { view: ViewNumber },
    BecameCoordinator { view: ViewNumber },
    BecameFollower { coordinator: ReplicaId },
}

/// State for one replica's view of the election protocol.
#[derive(Debug, Clone)]
pub struct ElectionState {
    id: ReplicaId,
    peers: BTreeSet<ReplicaId>,
    view: ViewNumber,
    role: Role,
    coordinator: Option<ReplicaId>,
    /// Peers with a higher id we've challenged and are still waiting to
    /// hear `ANSWER` from.
    awaiting_answers: BTreeSet<ReplicaId>,
}

impl ElectionState {
    pub fn new(id: ReplicaId, peers: BTreeSet<ReplicaId>) -> Self {
        Self {
            id,
            peers,
            view: ViewNumber::ZERO,
            role: Role::Follower,
            coordinator: None,
            awaiting_answers: BTreeSet::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn view(&self) -> ViewNumber {
        self.view
    }

    pub fn coordinator(&self) -> Option<ReplicaId> {
        self.coordinator
    }

    fn higher_peers(&self) -> impl Iterator<Item = ReplicaId> + '_ {
        self.peers.iter().copied().filter(move |p| *p > self.id)
    }

    /// Begins a fresh election: challenge every replica with a higher id.
    /// If there is none, we win immediately (this is the highest-id replica
    /// in the cluster).
    fn begin_election(&mut self, outputs: &mut Vec<Output>) {
        self.role = Role::Candidate;
        self.awaiting_answers = self.higher_peers().collect();

        if self.awaiting_answers.is_empty() {
            self.win_election(outputs);
            return;
        }

        for peer in self.higher_peers() {
            outputs.push(Output::SendElection { to: peer });
        }
    }

    fn win_election(&mut self, outputs: &mut Vec<Output>) {
        self.view = self.view.next();
        self.role = Role::Coordinator;
        self.coordinator = Some(self.id);
        outputs.push(Output::BecameCoordinator { view: self.view });
        outputs.push(Output::BroadcastCoordinator { view: self.view });
    }

    /// Drives the state machine with one event, returning the outputs the
    /// caller must act on (send these messages, adopt this new role).
    pub fn on_event(&mut self, event: Event) -> Vec<Output> {
        let mut outputs = Vec::new();
        match event {
            Event::HeartbeatTimeout => {
                if self.role != Role::Coordinator {
                    self.begin_election(&mut outputs);
                }
            }

            Event::AnswerTimeout => {
                if self.role == Role::Candidate && self.awaiting_answers.is_empty() {
                    self.win_election(&mut outputs);
                }
                // Otherwise someone higher answered; keep waiting for their
                // COORDINATOR announcement (a later HeartbeatTimeout will
                // retry the election if they never send one).
            }

            Event::ElectionReceived { from } => {
                if self.id > from {
                    outputs.push(Output::SendAnswer { to: from });
                    if self.role != Role::Candidate {
                        self.begin_election(&mut outputs);
                    }
                }
            }

            Event::AnswerReceived { from } => {
                self.awaiting_answers.remove(&from);
            }

            Event::CoordinatorReceived { from, view } => {
                if view > self.view || (view == self.view && from > self.id) {
                    self.view = view;
                    self.role = Role::Follower;
                    self.coordinator = Some(from);
                    self.awaiting_answers.clear();
                    outputs.push(Output::BecameFollower { coordinator: from });
                }
                // A stale COORDINATOR from a lower view is ignored, and a
                // same-view COORDINATOR from a lower id loses the tie-break —
                // the higher (view, id) pair always wins, so two replicas
                // that both declare themselves coordinator in the same view
                // converge on the higher id rather than both stepping down.
            }
        }
        outputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peers(ids: &[u32]) -> BTreeSet<ReplicaId> {
        ids.iter().copied().map(ReplicaId::new).collect()
    }

    #[test]
    fn highest_replica_wins_immediately_with_no_higher_peers() {
        let mut state = ElectionState::new(ReplicaId::new(3), peers(&[1, 2]));
        let outputs = state.on_event(Event::HeartbeatTimeout);
        assert!(outputs.contains(&Output::BecameCoordinator { view: ViewNumber::new(1) }));
        assert_eq!(state.role(), Role::Coordinator);
    }

    #[test]
    fn lower_replica_challenges_higher_peers_and_waits() {
        let mut state = ElectionState::new(ReplicaId::new(1), peers(&[2, 3]));
        let outputs = state.on_event(Event::HeartbeatTimeout);
        assert_eq!(outputs.len(), 2);
        assert!(outputs.contains(&Output::SendElection { to: ReplicaId::new(2) }));
        assert!(outputs.contains(&Output::SendElection { to: ReplicaId::new(3) }));
        assert_eq!(state.role(), Role::Candidate);
    }

    #[test]
    fn candidate_wins_if_no_answer_arrives_before_timeout() {
        let mut state = ElectionState::new(ReplicaId::new(2), peers(&[1, 3]));
        state.on_event(Event::HeartbeatTimeout);
        let outputs = state.on_event(Event::AnswerTimeout);
        assert!(outputs.iter().any(|o| matches!(o, Output::BecameCoordinator { .. })));
    }

    #[test]
    fn candidate_defers_if_a_higher_peer_answers() {
        let mut state = ElectionState::new(ReplicaId::new(2), peers(&[1, 3]));
        state.on_event(Event::HeartbeatTimeout);
        state.on_event(Event::AnswerReceived { from: ReplicaId::new(3) });
        let outputs = state.on_event(Event::AnswerTimeout);
        assert!(outputs.is_empty());
        assert_eq!(state.role(), Role::Candidate);
    }

    #[test]
    fn receiving_election_from_a_lower_id_triggers_answer_and_own_election() {
        let mut state = ElectionState::new(ReplicaId::new(5), peers(&[1, 2, 9]));
        let outputs = state.on_event(Event::ElectionReceived { from: ReplicaId::new(2) });
        assert!(outputs.contains(&Output::SendAnswer { to: ReplicaId::new(2) }));
        assert!(outputs.contains(&Output::SendElection { to: ReplicaId::new(9) }));
    }

    #[test]
    fn election_from_a_higher_id_is_not_answered() {
        let mut state = ElectionState::new(ReplicaId::new(1), peers(&[2]));
        let outputs = state.on_event(Event::ElectionReceived { from: ReplicaId::new(2) });
        assert!(outputs.is_empty());
    }

    #[test]
    fn coordinator_announcement_adopts_the_new_view() {
        let mut state = ElectionState::new(ReplicaId::new(1), peers(&[2, 3]));
        let outputs = state.on_event(Event::CoordinatorReceived {
            from: ReplicaId::new(3),
            view: ViewNumber::new(5),
        });
        assert_eq!(outputs, vec![Output::BecameFollower { coordinator: ReplicaId::new(3) }]);
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.view(), ViewNumber::new(5));
    }

    #[test]
    fn stale_coordinator_announcement_is_ignored() {
        let mut state = ElectionState::new(ReplicaId::new(1), peers(&[2, 3]));
        state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(3), view: ViewNumber::new(5) });
        let outputs = state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(2), view: ViewNumber::new(2) });
        assert!(outputs.is_empty());
        assert_eq!(state.coordinator(), Some(ReplicaId::new(3)));
    }

    #[test]
    fn higher_id_wins_the_tie_when_views_are_equal() {
        // Replica 3 declared itself coordinator for view 5 and already
        // believes it. A same-view COORDINATOR from the lower-id replica 2
        // must not knock it down to follower.
        let mut state = ElectionState::new(ReplicaId::new(3), peers(&[1, 2]));
        state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(3), view: ViewNumber::new(5) });
        let outputs = state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(2), view: ViewNumber::new(5) });
        assert!(outputs.is_empty());
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.coordinator(), Some(ReplicaId::new(3)));
    }

    #[test]
    fn lower_id_defers_to_higher_id_when_views_are_equal() {
        // Replica 2 believed itself the coordinator for view 5, but replica
        // 3 (higher id) also claims view 5: the tie-break must defer to 3.
        let mut state = ElectionState::new(ReplicaId::new(2), peers(&[1, 3]));
        state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(2), view: ViewNumber::new(5) });
        let outputs = state.on_event(Event::CoordinatorReceived { from: ReplicaId::new(3), view: ViewNumber::new(5) });
        assert_eq!(outputs, vec![Output::BecameFollower { coordinator: ReplicaId::new(3) }]);
        assert_eq!(state.role(), Role::Follower);
        assert_eq!(state.coordinator(), Some(ReplicaId::new(3)));
    }
}
