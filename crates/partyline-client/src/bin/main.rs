//! `partyline-client` binary entry point.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use partyline_client::{Client, ClientConfig};
use partyline_config::{ClientArgs, ReplicaSet};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = ClientArgs::parse();
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

    let client = Client::new(
        ClientConfig {
            username: args.username,
            groupname: args.groupname,
            replicas,
            listen_port: args.listen_port,
            keep_alive: Duration::from_millis(args.keep_alive_ms),
        },
        |event| println!("[{}] {}", event.sender, event.body),
    );

    if let Err(err) = client.run() {
        error!(%err, "client exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
