//! The kernel — pure functional core of one replica.
//!
//! The kernel applies committed commands to produce new state and effects.
//! It is completely pure: no IO, no clocks, no randomness. This makes it
//! deterministic — replaying the same command log on a follower produces
//! state identical to the coordinator's.
//!
//! # Example
//!
//! ```ignore
//! let state = State::default();
//! let cmd = Command::OpenSession { .. };
//!
//! let (new_state, effects) = apply_committed(state, cmd)?;
//! // Server executes effects against real sockets...
//! ```

use partyline_types::{MessageRecord, SessionId, Username};

use crate::command::Command;
use crate::effects::Effect;
use crate::state::{SessionRecord, State};

/// Applies a committed command to the state, producing new state and
/// effects.
///
/// Takes ownership of state, returns new state — no cloning of the
/// `BTreeMap`s backing it.
pub fn apply_committed(state: State, cmd: Command) -> Result<(State, Vec<Effect>), KernelError> {
    let mut effects = Vec::new();

    match cmd {
        Command::OpenSession {
            session,
            username,
            groupname,
            listen_addr,
        } => {
            // Precondition: session id hasn't been used before.
            if state.session_exists(&session) {
                return Err(KernelError::SessionAlreadyExists(session));
            }

            // Precondition: the user is under their session cap.
            let count = state.session_count_for(&username);
            let max = state.max_sessions_per_user();
            if count >= max {
                return Err(KernelError::SessionCapExceeded {
                    username,
                    count,
                    max,
                });
            }

            let history = state.group_history(&groupname);
            effects.push(Effect::DeliverHistory {
                session,
                groupname: groupname.clone(),
                records: history,
            });

            let join_note = MessageRecord::server(
                partyline_types::Timestamp::EPOCH,
                format!("{username} joined {groupname}"),
            );
            effects.push(Effect::BroadcastToGroup {
                groupname: groupname.clone(),
                record: join_note.clone(),
                exclude: Some(session),
            });

            let record = SessionRecord {
                username: username.clone(),
                groupname: groupname.clone(),
                listen_addr,
            };
            let new_state = state
                .with_session_opened(session, record)
                .with_message_posted(&groupname, join_note);

            // Postcondition: the session now exists and counts toward the cap.
            debug_assert!(new_state.session_exists(&session));
            debug_assert!(new_state.session_count_for(&username) <= new_state.max_sessions_per_user());

            Ok((new_state, effects))
        }

        Command::CloseSession { session } => {
            // Precondition: the session must exist.
            let record = state
                .session(&session)
                .cloned()
                .ok_or(KernelError::SessionNotFound(session))?;

            let leave_note = MessageRecord::server(
                partyline_types::Timestamp::EPOCH,
                format!("{} left {}", record.username, record.groupname),
            );
            effects.push(Effect::BroadcastToGroup {
                groupname: record.groupname.clone(),
                record: leave_note.clone(),
                exclude: None,
            });

            let new_state = state
                .with_session_closed(session)
                .with_message_posted(&record.groupname, leave_note)
                .with_group_destroyed_if_empty(&record.groupname);

            // Postcondition: the session is gone.
            debug_assert!(!new_state.session_exists(&session));

            Ok((new_state, effects))
        }

        Command::PostMessage {
            session,
            timestamp,
            body,
        } => {
            // Precondition: the session must exist; only live sessions post.
            let record = state
                .session(&session)
                .cloned()
                .ok_or(KernelError::SessionNotFound(session))?;

            if body.len() > partyline_types::limits::MESSAGE_MAX {
                return Err(KernelError::MessageTooLong {
                    len: body.len(),
                    max: partyline_types::limits::MESSAGE_MAX,
                });
            }

            let message = MessageRecord::user(timestamp, &record.username, body);
            effects.push(Effect::BroadcastToGroup {
                groupname: record.groupname.clone(),
                record: message.clone(),
                exclude: None,
            });

            let history_before = state.group_history(&record.groupname).len();
            let new_state = state.with_message_posted(&record.groupname, message);

            // Postcondition: history grows by exactly one, bounded at history_size.
            let history_after = new_state.group_history(&record.groupname).len();
            debug_assert!(history_after <= new_state.history_size());
            debug_assert!(history_after == (history_before + 1).min(new_state.history_size()));

            Ok((new_state, effects))
        }

        Command::CoordinatorUpdate { session, listen_addr } => {
            // Precondition: the session must still exist.
            if !state.session_exists(&session) {
                return Err(KernelError::SessionNotFound(session));
            }

            let new_state = state.with_listen_addr_updated(session, listen_addr);

            debug_assert_eq!(
                new_state.session(&session).map(|r| r.listen_addr),
                Some(listen_addr)
            );

            Ok((new_state, effects))
        }
    }
}

/// Errors that can occur when applying commands to the kernel.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("session {0} already exists")]
    SessionAlreadyExists(SessionId),

    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    #[error("user {username} already has {count} sessions open (max {max})")]
    SessionCapExceeded {
        username: Username,
        count: usize,
        max: usize,
    },

    #[error("message is {len} bytes, exceeds the {max}-byte limit")]
    MessageTooLong { len: usize, max: usize },
}
