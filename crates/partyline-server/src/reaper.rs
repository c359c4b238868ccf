//! Expires sessions whose connection dropped and never reconnected within
//! the grace window, emitting the `CloseSession` that was deferred when the
//! connection was lost.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use partyline_kernel::Command;
use tracing::info;

use crate::core::ReplicaCore;

/// Polls for sessions past their grace window until `stop` is set. Intended
/// to be spawned on its own thread alongside the accept loops and the
/// election timer.
pub fn run(core: Arc<ReplicaCore>, grace: Duration, stop: Arc<AtomicBool>) {
    let poll_interval = (grace / 4).max(Duration::from_millis(100));
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        std::thread::sleep(poll_interval);
        if stop.load(Ordering::Relaxed) {
            return;
        }
        // Only the coordinator ever has locally connected client sessions;
        // a follower's session registry is always empty.
        if !core.is_coordinator() {
            continue;
        }
        for session in core.idle_sessions(grace) {
            let _ = core.apply_local(Command::CloseSession { session });
            core.unregister_session(session);
            info!(%session, "session expired past grace window");
        }
    }
}
