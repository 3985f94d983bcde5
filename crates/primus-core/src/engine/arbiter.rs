//! Registry and relay logic of the primary instance.
//!
//! The arbiter owns every inbound connection (`connected`) and maps each
//! accepted application identity to the connection that holds it
//! (`accepted`). Both collections key on `ClientId`, so a disconnect removes
//! the client from one place and the registry only ever holds ids.

use crate::client::{ClientId, CommandSink};
use crate::command::{Command, CommandKind};
use crate::flags::LaunchFlags;
use crate::identity::AppIdentity;
use std::collections::BTreeMap;
use tracing::{debug, info};

pub struct Arbiter<C: CommandSink> {
    server: AppIdentity,
    connected: BTreeMap<ClientId, C>,
    accepted: BTreeMap<AppIdentity, ClientId>,
}

impl<C: CommandSink> Arbiter<C> {
    /// `server` is the identity reported in `IdentifyServer` replies.
    pub fn new(server: AppIdentity) -> Self {
        Self {
            server,
            connected: BTreeMap::new(),
            accepted: BTreeMap::new(),
        }
    }

    /// Track a newly accepted inbound connection.
    pub fn add_client(&mut self, client: C) -> ClientId {
        let id = client.id();
        self.connected.insert(id, client);
        id
    }

    pub fn is_connected(&self, client: ClientId) -> bool {
        self.connected.contains_key(&client)
    }

    pub fn connected_count(&self) -> usize {
        self.connected.len()
    }

    pub fn registry_len(&self) -> usize {
        self.accepted.len()
    }

    /// Connection currently holding `id`.
    pub fn holder(&self, id: &AppIdentity) -> Option<ClientId> {
        self.accepted.get(id).copied()
    }

    /// Registered identities in registry order.
    pub fn registered(&self) -> impl Iterator<Item = &AppIdentity> {
        self.accepted.keys()
    }

    /// Dispatch a command received from one of the inbound connections.
    pub fn redirect(&mut self, command: Command) {
        let sender = ClientId::from(command.sender_id);
        if !self.is_connected(sender) {
            debug!("Ignoring {} from unknown connection {}", command.kind, sender);
            return;
        }

        match command.kind {
            CommandKind::Unlock => {
                info!("Registry unlocked by {}, dropping {} entries", sender, self.accepted.len());
                self.accepted.clear();
            }
            CommandKind::Request => self.handle_request(command, sender),
            CommandKind::Alive => {
                // The sender already holds this identity; everyone else
                // waiting on it loses.
                let denied = Command::new(CommandKind::Denied, command.id);
                self.broadcast(&denied, sender);
            }
            CommandKind::Identify => self.handle_identify(sender),
            _ => self.broadcast(&command, sender),
        }
    }

    fn handle_request(&mut self, command: Command, sender: ClientId) {
        let flags = LaunchFlags::parse(&command.arguments);
        let id = command.id;

        let mut existing = *self.accepted.entry(id.clone()).or_insert(sender);
        if existing != sender && !self.is_connected(existing) {
            debug!("Holder {} of {} is gone, handing over to {}", existing, id, sender);
            self.accepted.insert(id.clone(), sender);
            existing = sender;
        }

        if existing == sender {
            if flags.abort {
                self.deny(&id, sender);
            } else {
                self.accept(&id, sender);
            }
        } else if flags.replace {
            info!("{} replaces holder {} of {}", sender, existing, id);
            self.send_to(existing, &Command::new(CommandKind::Abort, id.clone()));
            // The requester is about to hold the identity, so it is not told
            // that the identity died.
            self.broadcast_excluding(
                &Command::new(CommandKind::Killed, id.clone()),
                &[existing, sender],
            );
            self.accepted.insert(id.clone(), sender);
            self.accept(&id, sender);
        } else if flags.abort {
            info!("{} aborts holder {} of {}", sender, existing, id);
            self.send_to(existing, &Command::new(CommandKind::Abort, id.clone()));
            self.broadcast(&Command::new(CommandKind::Killed, id.clone()), existing);
            self.deny(&id, sender);
        } else {
            debug!("Raising holder {} of {} for {}", existing, id, sender);
            let raise = Command::new(CommandKind::Raise, id).with_arguments(command.arguments);
            self.send_to(existing, &raise);
        }
    }

    fn accept(&mut self, id: &AppIdentity, client: ClientId) {
        info!("Accepted {} on {}", id, client);
        self.send_to(client, &Command::new(CommandKind::Accepted, id.clone()));
        self.broadcast(&Command::new(CommandKind::Identify, id.clone()), client);
    }

    fn deny(&mut self, id: &AppIdentity, client: ClientId) {
        info!("Denied {} on {}", id, client);
        // Whether the entry was the requester's own or an aborted holder's,
        // nobody holds the identity afterwards.
        self.accepted.remove(id);
        self.send_to(client, &Command::new(CommandKind::Denied, id.clone()));
        self.broadcast(&Command::new(CommandKind::Identify, id.clone()), client);
    }

    fn handle_identify(&self, sender: ClientId) {
        self.send_to(
            sender,
            &Command::new(CommandKind::IdentifyServer, self.server.clone()),
        );
        for id in self.accepted.keys() {
            self.send_to(sender, &Command::new(CommandKind::Identify, id.clone()));
        }
    }

    /// Send `command` to every connection except `sender`.
    pub fn broadcast(&self, command: &Command, sender: ClientId) {
        self.broadcast_excluding(command, &[sender]);
    }

    fn broadcast_excluding(&self, command: &Command, excluded: &[ClientId]) {
        for (id, client) in &self.connected {
            if !excluded.contains(id) {
                if let Err(e) = client.send_command(command) {
                    debug!("Broadcast of {} to {} failed: {}", command.kind, id, e);
                }
            }
        }
    }

    fn send_to(&self, target: ClientId, command: &Command) {
        match self.connected.get(&target) {
            Some(client) => {
                if let Err(e) = client.send_command(command) {
                    debug!("Sending {} to {} failed: {}", command.kind, target, e);
                }
            }
            None => debug!("Dropping {} for unknown connection {}", command.kind, target),
        }
    }

    /// Forget a closed connection, announcing `Killed` for every identity it held.
    pub fn disconnect(&mut self, client: ClientId) {
        let held: Vec<AppIdentity> = self
            .accepted
            .iter()
            .filter(|(_, holder)| **holder == client)
            .map(|(id, _)| id.clone())
            .collect();

        for id in held {
            info!("Holder {} of {} disconnected", client, id);
            self.broadcast(&Command::new(CommandKind::Killed, id.clone()), client);
            self.accepted.remove(&id);
        }

        self.connected.remove(&client);
    }
}
