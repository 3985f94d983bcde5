//! Coordination engine: primary election, registration and command relay.
//!
//! Every process runs one `CoordinationEngine`. On `initialize` it tries to
//! listen on the well-known address, then always connects outbound to that
//! same address and sends a `Request` for its own identity. Whichever process
//! holds the listener arbitrates every `Request`, its own included.
//!
//! # Concurrency
//!
//! All engine state lives on the task that calls [`CoordinationEngine::run`].
//! Socket IO happens on per-connection tasks that only talk to the engine
//! through channels, so the registries are never touched concurrently and
//! need no locking. Commands from one connection are handled in the order
//! they were framed.

pub mod arbiter;
pub mod listener;
pub mod state;

pub use arbiter::Arbiter;
pub use listener::ListenerHandle;
pub use state::InstanceState;

use crate::client::{Client, ClientEvent, ClientId, CommandSink};
use crate::command::{Command, CommandKind};
use crate::config::EngineConfig;
use crate::flags::LaunchFlags;
use crate::identity::AppIdentity;
use crate::{PrimusError, Result};
use listener::{ConnectionSlot, Incoming};
use std::collections::BTreeSet;
use std::io;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Connection-refused retries before giving up on reaching any server.
const MAX_REFUSED_RETRIES: u32 = 3;

/// Reconnects after the server closed the connection without ever answering.
const MAX_LOST_RECONNECTS: u32 = 3;

/// Events surfaced to the surrounding application.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `initialize` finished. `standalone` is set for `--no-server`.
    Initialized { standalone: bool },
    StateChanged(InstanceState),
    /// Another launch of this application forwarded its arguments here.
    Raised { arguments: Vec<String> },
    /// Any command the engine does not consume itself.
    Command(Command),
}

enum Control {
    Send(Command),
    Shutdown,
}

/// Cloneable handle for sending commands through a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    identity: AppIdentity,
    control_tx: mpsc::UnboundedSender<Control>,
}

impl EngineHandle {
    /// A new command of `kind` for this instance's identity.
    pub fn command(&self, kind: CommandKind) -> Command {
        Command::new(kind, self.identity.clone())
    }

    /// Send `command` to the primary over the outbound connection.
    pub fn send(&self, command: Command) -> Result<()> {
        self.control(Control::Send(command))
    }

    /// Ask the primary for its identity and the full roster.
    pub fn request_roster(&self) -> Result<()> {
        self.send(self.command(CommandKind::Identify))
    }

    /// Clear the primary's registry.
    pub fn unlock(&self) -> Result<()> {
        self.send(self.command(CommandKind::Unlock))
    }

    /// Stop the engine loop.
    pub fn shutdown(&self) -> Result<()> {
        self.control(Control::Shutdown)
    }

    fn control(&self, control: Control) -> Result<()> {
        self.control_tx
            .send(control)
            .map_err(|_| PrimusError::EngineStopped)
    }
}

/// An inbound connection and its slot in the listener's connection count.
struct Peer {
    client: Client,
    _slot: ConnectionSlot,
}

impl CommandSink for Peer {
    fn id(&self) -> ClientId {
        self.client.id()
    }

    fn send_command(&self, command: &Command) -> Result<()> {
        self.client.send_command(command)
    }
}

pub struct CoordinationEngine {
    identity: AppIdentity,
    config: EngineConfig,
    state: InstanceState,
    standalone: bool,

    listener: Option<ListenerHandle>,
    outbound: Option<Client>,
    arbiter: Arbiter<Peer>,

    /// Arguments of the last `Request`, resent if the connection is refused.
    request_arguments: Vec<String>,
    refused_retries: u32,
    /// Connections lost since the server last sent anything.
    lost_reconnects: u32,
    reply_deadline: Option<Instant>,

    roster: BTreeSet<AppIdentity>,
    server_identity: Option<AppIdentity>,

    client_tx: mpsc::UnboundedSender<ClientEvent>,
    client_rx: mpsc::UnboundedReceiver<ClientEvent>,
    incoming_tx: mpsc::UnboundedSender<Incoming>,
    incoming_rx: mpsc::UnboundedReceiver<Incoming>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

impl CoordinationEngine {
    /// Create an engine for `identity`. Returns the engine and the receiver
    /// for its notifications.
    pub fn new(
        identity: AppIdentity,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notification>)> {
        let identity = identity.validated()?;
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let engine = Self {
            arbiter: Arbiter::new(identity.clone()),
            identity,
            config,
            state: InstanceState::AwaitingReply,
            standalone: false,
            listener: None,
            outbound: None,
            request_arguments: Vec::new(),
            refused_retries: 0,
            lost_reconnects: 0,
            reply_deadline: None,
            roster: BTreeSet::new(),
            server_identity: None,
            client_tx,
            client_rx,
            incoming_tx,
            incoming_rx,
            control_tx,
            control_rx,
            notify_tx,
        };

        Ok((engine, notify_rx))
    }

    pub fn identity(&self) -> &AppIdentity {
        &self.identity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_standalone(&self) -> bool {
        self.standalone
    }

    /// True while this process holds the listening socket.
    pub fn is_primary(&self) -> bool {
        self.listener.is_some()
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().map(ListenerHandle::addr)
    }

    /// Identities this instance has learned about from the primary.
    pub fn roster(&self) -> impl Iterator<Item = &AppIdentity> {
        self.roster.iter()
    }

    pub fn server_identity(&self) -> Option<&AppIdentity> {
        self.server_identity.as_ref()
    }

    /// Identities registered with this process, if it is primary.
    pub fn registered(&self) -> impl Iterator<Item = &AppIdentity> {
        self.arbiter.registered()
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            identity: self.identity.clone(),
            control_tx: self.control_tx.clone(),
        }
    }

    /// Start coordinating for a launch with `arguments`.
    ///
    /// Tries to become primary, connects to whoever is, and sends a `Request`
    /// carrying `arguments` verbatim. The outcome arrives later as state
    /// changes while [`run`](Self::run) is driving the engine.
    pub async fn initialize(&mut self, arguments: &[String]) {
        let flags = LaunchFlags::parse(arguments);

        if flags.no_server {
            info!("Running {} standalone", self.identity);
            self.standalone = true;
            self.set_state(InstanceState::Alive);
            self.notify(Notification::Initialized { standalone: true });
            return;
        }

        self.config = self.config.clone().apply_flags(&flags);
        self.start_session(arguments.to_vec()).await;
        self.notify(Notification::Initialized { standalone: false });
    }

    /// Drive the engine until it reaches `Dead` or is shut down.
    pub async fn run(&mut self) -> InstanceState {
        while !self.state.is_terminal() {
            let deadline = self.reply_deadline;
            tokio::select! {
                Some(event) = self.client_rx.recv() => self.on_client_event(event).await,
                Some(incoming) = self.incoming_rx.recv() => self.on_incoming(incoming),
                Some(control) = self.control_rx.recv() => {
                    if !self.on_control(control) {
                        break;
                    }
                }
                _ = reply_timeout(deadline) => self.on_reply_timeout(),
                else => break,
            }
        }
        self.state
    }

    async fn start_session(&mut self, arguments: Vec<String>) {
        self.start_listener().await;
        self.request_arguments = arguments;
        self.open_outbound();
        self.set_state(InstanceState::AwaitingReply);
        self.reply_deadline = Some(Instant::now() + self.config.timeout_delay);
    }

    async fn start_listener(&mut self) {
        if self.listener.is_some() {
            return;
        }
        match ListenerHandle::bind(&self.config.host, self.config.port, self.incoming_tx.clone())
            .await
        {
            Ok(handle) => self.listener = Some(handle),
            Err(e) => debug!(
                "Not listening on {} ({}), another instance is primary",
                self.config.address(),
                e
            ),
        }
    }

    fn open_outbound(&mut self) {
        let client = Client::connect(
            self.config.host.clone(),
            self.config.port,
            self.client_tx.clone(),
        );
        let request = Command::new(CommandKind::Request, self.identity.clone())
            .with_arguments(self.request_arguments.clone());
        if let Err(e) = client.send_command(&request) {
            warn!("Failed to queue request: {}", e);
        }
        debug!("Outbound client {} requesting {}", client.id(), self.identity);
        self.outbound = Some(client);
    }

    fn is_outbound(&self, client: ClientId) -> bool {
        self.outbound.as_ref().map(Client::id) == Some(client)
    }

    async fn on_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connected { client } => {
                if self.is_outbound(client) {
                    debug!("Connected to coordination server at {}", self.config.address());
                    self.refused_retries = 0;
                }
            }
            ClientEvent::Command(command) => {
                let sender = ClientId::from(command.sender_id);
                if self.is_outbound(sender) {
                    self.on_server_command(command);
                } else if self.arbiter.is_connected(sender) {
                    self.arbiter.redirect(command);
                } else {
                    debug!("Dropping {} from stale connection {}", command.kind, sender);
                }
            }
            ClientEvent::Disconnected { client, error } => {
                if self.is_outbound(client) {
                    self.on_outbound_lost(error).await;
                } else {
                    self.arbiter.disconnect(client);
                }
            }
        }
    }

    fn on_incoming(&mut self, incoming: Incoming) {
        let peer = incoming.peer;
        let (stream, slot) = incoming.into_parts();
        let client = Client::from_stream(stream, self.client_tx.clone());
        debug!("Inbound connection {} from {}", client.id(), peer);
        self.arbiter.add_client(Peer {
            client,
            _slot: slot,
        });
    }

    /// A command the primary sent to this instance's outbound connection.
    fn on_server_command(&mut self, command: Command) {
        self.lost_reconnects = 0;
        self.track_roster(&command);

        if command.id != self.identity {
            self.notify(Notification::Command(command));
            return;
        }

        match command.kind {
            CommandKind::Accepted | CommandKind::Denied | CommandKind::Abort => {
                match self.state.on_command(command.kind) {
                    Some(next) => {
                        if command.kind != CommandKind::Abort {
                            self.reply_deadline = None;
                        }
                        self.set_state(next);
                    }
                    None => debug!("Ignoring {} in state {}", command.kind, self.state),
                }
            }
            CommandKind::Raise if self.state == InstanceState::Alive => {
                info!("Raised by another launch with {:?}", command.arguments);
                self.send_outbound(&Command::new(CommandKind::Alive, self.identity.clone()));
                self.notify(Notification::Raised {
                    arguments: command.arguments,
                });
            }
            _ => self.notify(Notification::Command(command)),
        }
    }

    fn track_roster(&mut self, command: &Command) {
        match command.kind {
            CommandKind::IdentifyServer => {
                self.server_identity = Some(command.id.clone());
                self.roster.insert(command.id.clone());
            }
            CommandKind::Identify => {
                self.roster.insert(command.id.clone());
            }
            CommandKind::Killed => {
                self.roster.remove(&command.id);
            }
            _ => {}
        }
    }

    async fn on_outbound_lost(&mut self, error: Option<io::ErrorKind>) {
        self.outbound = None;

        if error == Some(io::ErrorKind::ConnectionRefused) {
            if self.listener.is_none() && self.refused_retries < MAX_REFUSED_RETRIES {
                self.refused_retries += 1;
                info!(
                    "No coordination server at {}, starting one",
                    self.config.address()
                );
                self.start_listener().await;
                self.open_outbound();
            } else {
                // Nobody is listening, so nobody can object.
                info!("Coordination server unreachable, assuming primary");
                self.reply_deadline = None;
                if self.state == InstanceState::AwaitingReply {
                    self.set_state(InstanceState::Alive);
                }
            }
            return;
        }

        let reason = error.map_or_else(|| "closed".to_string(), |kind| kind.to_string());
        if self.lost_reconnects >= MAX_LOST_RECONNECTS {
            warn!(
                "Coordination server keeps dropping the connection ({}), assuming primary",
                reason
            );
            self.reply_deadline = None;
            if self.state == InstanceState::AwaitingReply {
                self.set_state(InstanceState::Alive);
            }
            return;
        }
        self.lost_reconnects += 1;

        if self.state == InstanceState::AwaitingReply {
            // Still waiting on the first reply: resend the request but keep
            // the running deadline.
            warn!(
                "Lost connection to coordination server ({}), reconnecting",
                reason
            );
            self.start_listener().await;
            self.open_outbound();
        } else {
            warn!(
                "Lost connection to coordination server ({}), re-initializing",
                reason
            );
            // Re-register only; the original launch arguments were already handled.
            self.start_session(Vec::new()).await;
        }
    }

    fn on_reply_timeout(&mut self) {
        self.reply_deadline = None;
        if let Some(next) = self.state.on_timeout() {
            info!(
                "No reply within {:?}, assuming {} is primary",
                self.config.timeout_delay, self.identity
            );
            self.set_state(next);
        }
    }

    fn on_control(&mut self, control: Control) -> bool {
        match control {
            Control::Send(command) => {
                if self.standalone {
                    debug!("Standalone, not sending {}", command.kind);
                } else {
                    self.send_outbound(&command);
                }
                true
            }
            Control::Shutdown => {
                info!("Coordination engine shutting down");
                false
            }
        }
    }

    fn send_outbound(&self, command: &Command) {
        match &self.outbound {
            Some(client) => {
                if let Err(e) = client.send_command(command) {
                    warn!("Failed to send {}: {}", command.kind, e);
                }
            }
            None => debug!("No outbound connection, dropping {}", command.kind),
        }
    }

    fn set_state(&mut self, next: InstanceState) {
        if self.state != next {
            info!("{}: {} -> {}", self.identity, self.state, next);
            self.state = next;
            self.notify(Notification::StateChanged(next));
        }
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notify_tx.send(notification);
    }
}

async fn reply_timeout(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn identity(name: &str) -> AppIdentity {
        AppIdentity::new(name, "alice", ":0", std::process::id())
    }

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn test_invalid_identity_is_rejected() {
        let result = CoordinationEngine::new(
            AppIdentity::new("", "alice", ":0", 1),
            EngineConfig::default(),
        );
        assert!(matches!(result, Err(PrimusError::InvalidIdentity { .. })));
    }

    #[tokio::test]
    async fn test_no_server_runs_standalone() {
        let (mut engine, mut notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine.initialize(&["--no-server".to_string()]).await;

        assert!(engine.is_standalone());
        assert!(!engine.is_primary());
        assert_eq!(engine.state(), InstanceState::Alive);
        assert_eq!(
            notes.recv().await,
            Some(Notification::StateChanged(InstanceState::Alive))
        );
        assert_eq!(
            notes.recv().await,
            Some(Notification::Initialized { standalone: true })
        );
    }

    #[tokio::test]
    async fn test_server_host_and_port_flags_override_config() {
        let port = free_port();
        let (mut engine, _notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine
            .initialize(&[
                "--server-host".to_string(),
                "127.0.0.1".to_string(),
                "--server-port".to_string(),
                port.to_string(),
            ])
            .await;

        assert_eq!(engine.config().port, port);
        assert_eq!(engine.listen_addr().map(|a| a.port()), Some(port));
    }

    #[tokio::test]
    async fn test_first_instance_becomes_primary_and_alive() {
        let config = EngineConfig::default().with_port(free_port());
        let (mut engine, _notes) = CoordinationEngine::new(identity("editor"), config).unwrap();
        engine.initialize(&[]).await;
        assert!(engine.is_primary());
        assert_eq!(engine.state(), InstanceState::AwaitingReply);

        let handle = engine.handle();
        let task = tokio::spawn(async move {
            let state = engine.run().await;
            (state, engine)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.shutdown().unwrap();
        let (state, engine) = task.await.unwrap();

        assert_eq!(state, InstanceState::Alive);
        assert_eq!(engine.registered().count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_assumes_primary_and_ignores_late_accept() {
        // A listener that accepts but never answers.
        let silent = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let config = EngineConfig::default()
            .with_port(port)
            .with_timeout_delay(Duration::from_millis(500));
        let (mut engine, mut notes) = CoordinationEngine::new(identity("editor"), config).unwrap();
        engine.initialize(&[]).await;
        assert!(!engine.is_primary());

        let handle = engine.handle();
        let task = tokio::spawn(async move {
            let state = engine.run().await;
            (state, engine)
        });

        let (_stream, _) = silent.accept().await.unwrap();
        assert_eq!(
            notes.recv().await,
            Some(Notification::Initialized { standalone: false })
        );
        assert_eq!(
            notes.recv().await,
            Some(Notification::StateChanged(InstanceState::Alive))
        );

        handle.shutdown().unwrap();
        let (state, mut engine) = task.await.unwrap();
        assert_eq!(state, InstanceState::Alive);

        // A late Accepted is a no-op once past AwaitingReply.
        let outbound = engine.outbound.as_ref().map(Client::id).unwrap();
        let mut late = Command::new(CommandKind::Accepted, identity("editor"));
        late.sender_id = outbound.as_u32();
        engine.on_server_command(late);
        assert_eq!(engine.state(), InstanceState::Alive);
        assert!(notes.try_recv().is_err());
    }

    async fn wait_for_state(
        notes: &mut mpsc::UnboundedReceiver<Notification>,
        state: InstanceState,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match notes.recv().await {
                    Some(Notification::StateChanged(s)) if s == state => return,
                    Some(_) => {}
                    None => panic!("notification channel closed"),
                }
            }
        })
        .await
        .expect("state not reached");
    }

    #[tokio::test]
    async fn test_server_that_drops_connections_is_given_up_on() {
        // Accepts every connection and closes it without a word.
        let dropper = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = dropper.local_addr().unwrap().port();
        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = dropper.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(stream);
            }
        });

        // The reply timeout is far away, so reaching Alive means the engine
        // stopped reconnecting on its own.
        let config = EngineConfig::default()
            .with_port(port)
            .with_timeout_delay(Duration::from_secs(30));
        let (mut engine, mut notes) = CoordinationEngine::new(identity("editor"), config).unwrap();
        engine.initialize(&[]).await;
        assert!(!engine.is_primary());

        let handle = engine.handle();
        let task = tokio::spawn(async move {
            let state = engine.run().await;
            (state, engine)
        });

        wait_for_state(&mut notes, InstanceState::Alive).await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        handle.shutdown().unwrap();
        let (state, engine) = task.await.unwrap();
        assert_eq!(state, InstanceState::Alive);
        assert!(engine.reply_deadline.is_none());
        assert!(accepts.load(Ordering::SeqCst) <= MAX_LOST_RECONNECTS as usize + 1);
    }

    #[tokio::test]
    async fn test_refused_connection_starts_listener_and_becomes_primary() {
        let port = free_port();
        let config = EngineConfig::default()
            .with_port(port)
            .with_timeout_delay(Duration::from_secs(30));
        let (mut engine, mut notes) = CoordinationEngine::new(identity("editor"), config).unwrap();

        // Hold the port through initialize so the bind fails, then free it
        // before the outbound connect runs.
        let holder = std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
        engine.initialize(&[]).await;
        assert!(!engine.is_primary());
        drop(holder);

        let handle = engine.handle();
        let task = tokio::spawn(async move {
            let state = engine.run().await;
            (state, engine)
        });

        wait_for_state(&mut notes, InstanceState::Alive).await;
        handle.shutdown().unwrap();
        let (state, engine) = task.await.unwrap();
        assert_eq!(state, InstanceState::Alive);
        assert!(engine.is_primary());
        assert_eq!(engine.registered().count(), 1);
    }

    #[tokio::test]
    async fn test_refused_after_retries_assumes_primary() {
        let (mut engine, mut notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine.refused_retries = MAX_REFUSED_RETRIES;
        engine.reply_deadline = Some(Instant::now() + Duration::from_secs(30));

        engine
            .on_outbound_lost(Some(io::ErrorKind::ConnectionRefused))
            .await;

        assert_eq!(engine.state(), InstanceState::Alive);
        assert!(engine.reply_deadline.is_none());
        assert!(!engine.is_primary());
        assert_eq!(
            notes.try_recv().ok(),
            Some(Notification::StateChanged(InstanceState::Alive))
        );
    }

    #[tokio::test]
    async fn test_raise_replies_alive_and_surfaces_arguments() {
        let (mut engine, mut notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine.state = InstanceState::Alive;

        let raise = Command::new(CommandKind::Raise, identity("editor"))
            .with_arguments(vec!["notes.txt".to_string()]);
        engine.on_server_command(raise);

        assert_eq!(engine.state(), InstanceState::Alive);
        assert_eq!(
            notes.recv().await,
            Some(Notification::Raised {
                arguments: vec!["notes.txt".to_string()]
            })
        );
    }

    #[tokio::test]
    async fn test_abort_kills_alive_instance() {
        let (mut engine, _notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine.state = InstanceState::Alive;

        engine.on_server_command(Command::new(CommandKind::Abort, identity("editor")));
        assert_eq!(engine.state(), InstanceState::Dead);
    }

    #[tokio::test]
    async fn test_foreign_commands_are_forwarded_and_tracked() {
        let (mut engine, mut notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();

        engine.on_server_command(Command::new(CommandKind::IdentifyServer, identity("shell")));
        engine.on_server_command(Command::new(CommandKind::Identify, identity("viewer")));
        engine.on_server_command(Command::new(CommandKind::Killed, identity("viewer")));

        assert_eq!(engine.server_identity(), Some(&identity("shell")));
        assert_eq!(engine.roster().cloned().collect::<Vec<_>>(), vec![identity("shell")]);

        // Foreign Accepted does not resolve this instance's request.
        engine.on_server_command(Command::new(CommandKind::Accepted, identity("viewer")));
        assert_eq!(engine.state(), InstanceState::AwaitingReply);

        let mut forwarded = 0;
        while let Ok(Notification::Command(_)) = notes.try_recv() {
            forwarded += 1;
        }
        assert_eq!(forwarded, 4);
    }

    #[tokio::test]
    async fn test_notifications_drain_then_close_after_engine_dropped() {
        let (mut engine, mut notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        engine.initialize(&["--no-server".to_string()]).await;
        engine.on_server_command(Command::new(CommandKind::Abort, identity("editor")));
        drop(engine);

        let mut drained = Vec::new();
        while let Some(note) = notes.recv().await {
            drained.push(note);
        }
        assert_eq!(
            drained,
            vec![
                Notification::StateChanged(InstanceState::Alive),
                Notification::Initialized { standalone: true },
                Notification::StateChanged(InstanceState::Dead),
            ]
        );
    }

    #[tokio::test]
    async fn test_handle_fails_after_engine_dropped() {
        let (engine, _notes) =
            CoordinationEngine::new(identity("editor"), EngineConfig::default()).unwrap();
        let handle = engine.handle();
        drop(engine);
        assert!(matches!(handle.shutdown(), Err(PrimusError::EngineStopped)));
    }
}
