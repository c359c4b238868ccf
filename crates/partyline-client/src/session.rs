//! The two threads that service one live connection: `KEEP_ALIVE` on a
//! timer, and inbound `MESSAGE`/`DISCONNECT` packets keep-alive
//! loop and receive thread).

use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use partyline_wire::{read_packet, write_packet, Packet};
use tracing::{debug, info, warn};

/// Shared write half of the connection; `KEEP_ALIVE` and user-typed
/// `MESSAGE` packets both go through here; one lock keeps the two threads
/// from interleaving writes mid-frame.
pub type Writer = Arc<Mutex<TcpStream>>;

/// One chat message as delivered to the caller of [`crate::Client::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEvent {
    pub sender: String,
    pub body: String,
}

/// Sends `KEEP_ALIVE` every `interval` until `stop` is set or a send
/// fails, in which case it reports the connection down and exits.
pub fn keep_alive_loop(writer: Writer, interval: Duration, stop: Arc<AtomicBool>, down: Sender<()>) {
    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(interval);
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let result = write_packet(&mut *writer.lock().unwrap(), &Packet::KeepAlive);
        if let Err(err) = result {
            warn!(%err, "keep-alive failed, server presumed down");
            let _ = down.send(());
            return;
        }
    }
}

/// Reads packets until the connection closes or a `DISCONNECT` arrives,
/// forwarding chat traffic to `on_message`. The binary's `on_message`
/// prints to stdout (the one place this crate's output isn't `tracing`,
/// it's the transcript, not a diagnostic); tests instead collect
/// events through a channel.
pub fn receive_loop(
    mut reader: TcpStream,
    stop: Arc<AtomicBool>,
    down: Sender<()>,
    on_message: Arc<dyn Fn(ChatEvent) + Send + Sync>,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        match read_packet(&mut reader) {
            Ok(Packet::Message(p)) | Ok(Packet::ServerBroadcast(p)) => {
                on_message(ChatEvent { sender: p.sender, body: p.body });
            }
            Ok(Packet::Disconnect(p)) => {
                info!(reason = %p.reason, "disconnected by server");
                let _ = down.send(());
                return;
            }
            Ok(other) => {
                debug!(packet_type = %other.packet_type(), "unexpected packet from server, ignoring");
            }
            Err(err) => {
                warn!(%err, "receive failed, server presumed down");
                let _ = down.send(());
                return;
            }
        }
    }
}
