//! `partyline-server` binary entry point.

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use partyline_config::{ReplicaSet, ServerArgs};
use partyline_server::{ReplicaCore, RunConfig, Server};
use partyline_types::ReplicaId;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ServerArgs::parse();
    if let Err(err) = args.validate() {
        error!(%err, "invalid arguments");
        return ExitCode::FAILURE;
    }

    let replicas = match ReplicaSet::from_toml_file(&args.replicas_file) {
        Ok(set) => set,
        Err(err) => {
            error!(%err, "failed to load replica set");
            return ExitCode::FAILURE;
        }
    };

    let id = ReplicaId::new(args.id);
    if replicas.get(id).is_none() {
        error!(id = args.id, "replica id not present in replica set");
        return ExitCode::FAILURE;
    }

    let core = Arc::new(ReplicaCore::new(
        id,
        replicas,
        args.max_sessions,
        args.history_size,
        args.replication_buffer,
    ));

    let run_config = RunConfig {
        heartbeat_timeout: Duration::from_millis(args.heartbeat_timeout_ms),
        answer_timeout: Duration::from_millis(args.answer_timeout_ms),
        session_grace: Duration::from_millis(args.session_grace_ms),
        run_admin_console: true,
    };

    let server = match Server::start(core, run_config) {
        Ok(server) => server,
        Err(err) => {
            error!(%err, "failed to start replica");
            return ExitCode::FAILURE;
        }
    };

    install_signal_handlers(&server);

    // The background threads do the work; the main thread just waits.
    // `std::thread::park` wakes spuriously, so loop on an explicit flag.
    let parked = Arc::new(AtomicBool::new(false));
    while !parked.load(Ordering::Relaxed) {
        std::thread::park_timeout(Duration::from_secs(3600));
    }

    ExitCode::SUCCESS
}

#[cfg(unix)]
fn install_signal_handlers(server: &Server) {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let core = Arc::clone(server.core());
    let mut signals = match Signals::new([SIGINT, SIGTERM]) {
        Ok(s) => s,
        Err(err) => {
            error!(%err, "failed to install signal handlers");
            return;
        }
    };
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            tracing::info!(replica = %core.id, "shutting down on signal");
            // The accept loops block in `listener.incoming()`, so there is
            // no clean way to join them; exiting the process is the
            // pragmatic equivalent of `Server::shutdown` for a signal.
            std::process::exit(0);
        }
    });
}

#[cfg(not(unix))]
fn install_signal_handlers(_server: &Server) {}
