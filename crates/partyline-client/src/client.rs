//! Client state machine: `Connected` → `ServerDown` → `Reconnecting` →
//! `Connected`.

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use partyline_config::ReplicaSet;
use partyline_types::Timestamp;
use partyline_wire::{write_packet, MessagePayload, Packet};
use tracing::{info, warn};

use crate::connection;
use crate::error::ClientResult;
use crate::session::{self, ChatEvent, Writer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    ServerDown,
    Reconnecting,
}

pub struct ClientConfig {
    pub username: String,
    pub groupname: String,
    pub replicas: ReplicaSet,
    pub listen_port: u16,
    pub keep_alive: Duration,
}

/// Runs the client until `stop` is set: connects, services the connection,
/// and reconnects on failure, redirecting to whatever coordinator it last
/// learned of.
pub struct Client {
    config: ClientConfig,
    state: Arc<Mutex<ClientState>>,
    current_writer: Arc<Mutex<Option<Writer>>>,
    down_rx: Mutex<Option<Receiver<()>>>,
    stop: Arc<AtomicBool>,
    on_message: Arc<dyn Fn(ChatEvent) + Send + Sync>,
}

impl Client {
    /// `on_message` is invoked from the receive thread for every chat
    /// message delivered to this client. The binary passes a closure that
    /// prints to stdout; tests pass one that forwards into a channel.
    pub fn new(config: ClientConfig, on_message: impl Fn(ChatEvent) + Send + Sync + 'static) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(ClientState::ServerDown)),
            current_writer: Arc::new(Mutex::new(None)),
            down_rx: Mutex::new(None),
            stop: Arc::new(AtomicBool::new(false)),
            on_message: Arc::new(on_message),
        }
    }

    pub fn state(&self) -> ClientState {
        *self.state.lock().unwrap()
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Posts a chat message over the current connection, if any. Returns
    /// `Ok(())` even while disconnected — a message typed while the
    /// connection is down is simply dropped, the same as a line typed into
    /// a dead terminal.
    pub fn send_message(&self, body: &str) -> ClientResult<()> {
        Self::post(&self.current_writer, &self.config.username, body)
    }

    fn post(current_writer: &Arc<Mutex<Option<Writer>>>, username: &str, body: &str) -> ClientResult<()> {
        if body.is_empty() {
            return Ok(());
        }
        let Some(writer) = current_writer.lock().unwrap().clone() else {
            return Ok(());
        };
        let packet = Packet::Message(MessagePayload {
            timestamp: Timestamp::now(),
            sender: username.to_string(),
            kind: 0,
            body: body.to_string(),
        });
        write_packet(&mut *writer.lock().unwrap(), &packet)?;
        Ok(())
    }

    /// Blocks the calling thread, running the client until `stop()` is
    /// called or stdin closes.
    pub fn run(&self) -> ClientResult<()> {
        let (announced_tx, announced_rx) = mpsc::channel::<SocketAddr>();
        let bound = crate::announce::spawn(self.config.listen_port, announced_tx, Arc::clone(&self.stop))?;
        info!(listen_addr = %bound, "listening for coordinator announcements");

        self.spawn_input_thread();

        let mut hint: Option<SocketAddr> = None;
        while !self.stop.load(Ordering::Relaxed) {
            *self.state.lock().unwrap() = ClientState::Reconnecting;
            match self.connect_once(hint) {
                Ok(()) => {}
                Err(err) => {
                    warn!(%err, "connection attempt failed, retrying");
                    std::thread::sleep(Duration::from_millis(500));
                    continue;
                }
            }
            *self.state.lock().unwrap() = ClientState::Connected;

            hint = self.wait_for_disconnect(&announced_rx);
            *self.current_writer.lock().unwrap() = None;
            *self.state.lock().unwrap() = ClientState::ServerDown;
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
        }
        Ok(())
    }

    fn connect_once(&self, hint: Option<SocketAddr>) -> ClientResult<()> {
        let mut stream = connection::connect_to_cluster(&self.config.replicas, hint)?;
        connection::login(
            &mut stream,
            &self.config.username,
            &self.config.groupname,
            self.config.listen_port,
        )?;

        let reader = stream.try_clone()?;
        let writer: Writer = Arc::new(Mutex::new(stream));
        *self.current_writer.lock().unwrap() = Some(Arc::clone(&writer));

        let (down_tx, down_rx) = mpsc::channel::<()>();
        self.down_rx.lock().unwrap().replace(down_rx);

        let stop = Arc::clone(&self.stop);
        let keep_alive = self.config.keep_alive;
        {
            let writer = Arc::clone(&writer);
            let stop = Arc::clone(&stop);
            let down_tx = down_tx.clone();
            std::thread::spawn(move || session::keep_alive_loop(writer, keep_alive, stop, down_tx));
        }
        let on_message = Arc::clone(&self.on_message);
        std::thread::spawn(move || session::receive_loop(reader, stop, down_tx, on_message));

        Ok(())
    }

    fn wait_for_disconnect(&self, announced: &Receiver<SocketAddr>) -> Option<SocketAddr> {
        // Either background thread (keep-alive or receive) reports the
        // connection down, or a new coordinator announces itself directly.
        // Polling both every 100ms is simpler than select()-ing two
        // different channel types and the latency cost is invisible next
        // to the failover timers anyway.
        loop {
            if self.stop.load(Ordering::Relaxed) {
                return None;
            }
            if let Ok(addr) = announced.try_recv() {
                return Some(addr);
            }
            if let Some(rx) = self.down_rx.lock().unwrap().as_ref() {
                if rx.try_recv().is_ok() {
                    return None;
                }
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    }

    fn spawn_input_thread(&self) {
        let current_writer = Arc::clone(&self.current_writer);
        let stop = Arc::clone(&self.stop);
        let username = self.config.username.clone();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let Ok(line) = line else { return };
                if line.is_empty() {
                    continue;
                }
                let _ = Self::post(&current_writer, &username, &line);
            }
        });
    }
}
