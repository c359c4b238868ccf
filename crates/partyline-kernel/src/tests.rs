//! Unit tests for partyline-kernel.
//!
//! The kernel is pure (no IO), making it ideal for unit testing: every code
//! path can be exercised without mocks or a real socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use partyline_types::{Groupname, SessionId, Timestamp, Username};

use super::*;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

fn session(local: u64) -> SessionId {
    SessionId::new(partyline_types::ReplicaId::new(1), local)
}

fn open(state: State, local: u64, user: &str, group: &str) -> (State, Vec<Effect>) {
    apply_committed(
        state,
        Command::OpenSession {
            session: session(local),
            username: Username::parse(user).unwrap(),
            groupname: Groupname::parse(group).unwrap(),
            listen_addr: addr(4000 + local as u16),
        },
    )
    .unwrap()
}

#[test]
fn opening_a_session_joins_the_group_and_replays_empty_history() {
    let state = State::new(3, 50);
    let (state, effects) = open(state, 0, "alice", "lobby");

    assert!(state.session_exists(&session(0)));
    assert_eq!(state.group_members(&Groupname::parse("lobby").unwrap()).len(), 1);
    assert!(matches!(
        &effects[0],
        Effect::DeliverHistory { records, .. } if records.is_empty()
    ));
}

#[test]
fn second_session_sees_first_users_join_note_in_history() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let (state, effects) = open(state, 1, "bob", "lobby");

    let Effect::DeliverHistory { records, .. } = &effects[0] else {
        panic!("expected DeliverHistory");
    };
    assert_eq!(records.len(), 1);
    assert!(records[0].body.contains("alice joined"));
    assert_eq!(state.group_members(&Groupname::parse("lobby").unwrap()).len(), 2);
}

#[test]
fn session_cap_is_enforced_per_user_not_per_group() {
    let state = State::new(2, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let (state, _) = open(state, 1, "alice", "other-room");

    let err = apply_committed(
        state,
        Command::OpenSession {
            session: session(2),
            username: Username::parse("alice").unwrap(),
            groupname: Groupname::parse("third-room").unwrap(),
            listen_addr: addr(4002),
        },
    )
    .unwrap_err();

    assert!(matches!(
        err,
        KernelError::SessionCapExceeded { count: 2, max: 2, .. }
    ));
}

#[test]
fn duplicate_session_id_is_rejected() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");

    let err = apply_committed(
        state,
        Command::OpenSession {
            session: session(0),
            username: Username::parse("mallory").unwrap(),
            groupname: Groupname::parse("lobby").unwrap(),
            listen_addr: addr(4009),
        },
    )
    .unwrap_err();

    assert!(matches!(err, KernelError::SessionAlreadyExists(_)));
}

#[test]
fn posting_a_message_appends_to_history_and_broadcasts() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");

    let (state, effects) = apply_committed(
        state,
        Command::PostMessage {
            session: session(0),
            timestamp: Timestamp::from_secs(100),
            body: "hello".into(),
        },
    )
    .unwrap();

    let history = state.group_history(&Groupname::parse("lobby").unwrap());
    assert_eq!(history.last().unwrap().body, "hello");
    assert!(matches!(
        &effects[0],
        Effect::BroadcastToGroup { exclude: None, .. }
    ));
}

#[test]
fn a_message_exactly_at_the_byte_limit_is_accepted() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let body = "a".repeat(partyline_types::limits::MESSAGE_MAX);

    let (state, _) = apply_committed(
        state,
        Command::PostMessage {
            session: session(0),
            timestamp: Timestamp::from_secs(100),
            body: body.clone(),
        },
    )
    .unwrap();

    let history = state.group_history(&Groupname::parse("lobby").unwrap());
    assert_eq!(history.last().unwrap().body, body);
}

#[test]
fn a_message_one_byte_over_the_limit_is_rejected() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let body = "a".repeat(partyline_types::limits::MESSAGE_MAX + 1);

    let err = apply_committed(
        state,
        Command::PostMessage {
            session: session(0),
            timestamp: Timestamp::from_secs(100),
            body,
        },
    )
    .unwrap_err();

    assert!(matches!(
        err,
        KernelError::MessageTooLong { max, .. } if max == partyline_types::limits::MESSAGE_MAX
    ));
}

#[test]
fn posting_from_unknown_session_fails() {
    let state = State::new(3, 50);
    let err = apply_committed(
        state,
        Command::PostMessage {
            session: session(0),
            timestamp: Timestamp::EPOCH,
            body: "hi".into(),
        },
    )
    .unwrap_err();
    assert!(matches!(err, KernelError::SessionNotFound(_)));
}

#[test]
fn history_is_bounded_and_drops_the_oldest_entry() {
    let mut state = State::new(3, 2);
    let (s, _) = open(state, 0, "alice", "lobby");
    state = s;

    for i in 0..5 {
        let (s, _) = apply_committed(
            state,
            Command::PostMessage {
                session: session(0),
                timestamp: Timestamp::from_secs(i),
                body: format!("msg-{i}"),
            },
        )
        .unwrap();
        state = s;
    }

    let history = state.group_history(&Groupname::parse("lobby").unwrap());
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].body, "msg-3");
    assert_eq!(history[1].body, "msg-4");
}

#[test]
fn closing_a_session_frees_its_slot_in_the_cap_and_leaves_a_note() {
    let state = State::new(1, 50);
    let (state, _) = open(state, 0, "alice", "lobby");

    let (state, effects) = apply_committed(state, Command::CloseSession { session: session(0) }).unwrap();
    assert!(!state.session_exists(&session(0)));
    assert!(matches!(&effects[0], Effect::BroadcastToGroup { .. }));

    // The freed slot lets alice open a new session under the same cap.
    let (state, _) = open(state, 1, "alice", "lobby");
    assert!(state.session_exists(&session(1)));
}

#[test]
fn last_member_leaving_destroys_the_group_and_its_history() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");

    let (state, _) = apply_committed(
        state,
        Command::PostMessage {
            session: session(0),
            timestamp: Timestamp::from_secs(1),
            body: "hello".into(),
        },
    )
    .unwrap();
    assert!(state.group(&Groupname::parse("lobby").unwrap()).is_some());

    let (state, _) = apply_committed(state, Command::CloseSession { session: session(0) }).unwrap();

    assert!(state.group(&Groupname::parse("lobby").unwrap()).is_none());
    assert!(state.group_history(&Groupname::parse("lobby").unwrap()).is_empty());
}

#[test]
fn group_survives_while_other_members_remain() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let (state, _) = open(state, 1, "bob", "lobby");

    let (state, _) = apply_committed(state, Command::CloseSession { session: session(0) }).unwrap();

    let group = state.group(&Groupname::parse("lobby").unwrap()).unwrap();
    assert_eq!(group.members().len(), 1);
}

#[test]
fn coordinator_update_resumes_a_session_under_its_new_address() {
    let state = State::new(3, 50);
    let (state, _) = open(state, 0, "alice", "lobby");
    let new_addr = addr(9999);

    let (state, effects) = apply_committed(
        state,
        Command::CoordinatorUpdate {
            session: session(0),
            listen_addr: new_addr,
        },
    )
    .unwrap();

    assert!(effects.is_empty());
    assert_eq!(state.session(&session(0)).unwrap().listen_addr, new_addr);
    // Resuming doesn't touch the session cap: alice can't open a second one.
    assert_eq!(state.session_count_for(&Username::parse("alice").unwrap()), 1);
}

#[test]
fn coordinator_update_for_an_unknown_session_fails() {
    let state = State::new(3, 50);
    let err = apply_committed(
        state,
        Command::CoordinatorUpdate {
            session: session(0),
            listen_addr: addr(9999),
        },
    )
    .unwrap_err();
    assert!(matches!(err, KernelError::SessionNotFound(_)));
}

#[test]
fn closing_an_unknown_session_fails() {
    let state = State::new(3, 50);
    let err = apply_committed(state, Command::CloseSession { session: session(0) }).unwrap_err();
    assert!(matches!(err, KernelError::SessionNotFound(_)));
}

proptest::proptest! {
    /// No matter how many `OpenSession` commands land for the same user, at
    /// most `max_sessions_per_user` of them ever succeed, and every later
    /// attempt fails with `SessionCapExceeded` rather than silently
    /// admitting the session.
    #[test]
    fn session_count_never_exceeds_cap(max in 1usize..6, attempts in 1usize..20) {
        let mut state = State::new(max, 50);
        let mut opened = 0usize;
        for i in 0..attempts {
            let result = apply_committed(
                state.clone(),
                Command::OpenSession {
                    session: session(i as u64),
                    username: Username::parse("alice").unwrap(),
                    groupname: Groupname::parse("lobby").unwrap(),
                    listen_addr: addr(4000 + i as u16),
                },
            );
            match result {
                Ok((s, _)) => {
                    state = s;
                    opened += 1;
                }
                Err(KernelError::SessionCapExceeded { count, max: m, .. }) => {
                    proptest::prop_assert_eq!(count, max);
                    proptest::prop_assert_eq!(m, max);
                }
                Err(e) => proptest::prop_assert!(false, "unexpected error: {e:?}"),
            }
        }
        proptest::prop_assert!(opened <= max);
        proptest::prop_assert_eq!(state.session_count_for(&Username::parse("alice").unwrap()), opened);
    }
}
