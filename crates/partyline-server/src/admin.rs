//! Stdin admin console: a handful of operator commands for inspecting a
//! running replica without a client connection.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::core::ReplicaCore;

const HELP: &str = "commands: list users | list groups | status | help | quit";

/// Reads commands from stdin until EOF, reporting on `core`. Meant to be
/// run on its own thread; returning just means stdin closed.
pub fn run(core: Arc<ReplicaCore>) {
    let stdin = io::stdin();
    print!("partyline> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match line.trim() {
            "list users" => core.for_each_session(|id, record| {
                println!("{id}\t{}\t{}", record.username, record.groupname);
            }),
            "list groups" => core.for_each_group(|name, members| {
                println!("{name}\t{} members", members.len());
            }),
            "status" => {
                println!(
                    "replica {} view {} role {}",
                    core.id,
                    core.view(),
                    if core.is_coordinator() { "coordinator" } else { "follower" }
                );
            }
            "help" => println!("{HELP}"),
            "quit" | "exit" => break,
            "" => {}
            other => println!("unknown command {other:?} ({HELP})"),
        }
        print!("partyline> ");
        let _ = io::stdout().flush();
    }
}
