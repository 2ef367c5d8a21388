//! The message bus proper.
//!
//! [`Bus`] holds all daemon state and is driven synchronously by a single
//! task: every inbound message is fully routed before the next one is
//! handled. Outbound messages are handed to per-client queues which are
//! drained by the connection writers.

use std::num::NonZeroU32;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::org_freedesktop_dbus::{error, DESTINATION, INTERFACE, PATH};
use crate::proto::{Flags, MessageType};
use crate::telemetry::{self, Direction};
use crate::{BodyBuf, Message};

use self::clients::Clients;
mod clients;

use self::match_rule::Match;
mod match_rule;

use self::names::{NameEvent, Names};
mod names;

use self::methods::{MethodError, Response};
mod methods;

mod introspect;


/// The number of messages which may be queued for a client before it is
/// disconnected.
pub(crate) const OUTBOUND_CAPACITY: usize = 1024;

/// State of the message bus.
pub(crate) struct Bus {
    guid: Box<str>,
    clients: Clients,
    names: Names,
    /// Clients whose outbound queue filled up, waiting to be disconnected.
    overflowed: Vec<Box<str>>,
}

impl Bus {
    pub(crate) fn new(guid: &str) -> Self {
        Self {
            guid: guid.into(),
            clients: Clients::new(),
            names: Names::new(),
            overflowed: Vec::new(),
        }
    }

    /// Test if no clients are connected.
    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Test if neither clients nor names are left.
    pub(crate) fn is_vacant(&self) -> bool {
        self.clients.is_empty() && self.names.iter().next().is_none()
    }

    /// The number of connected clients.
    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }

    /// Unique ids of all connected clients.
    pub(crate) fn client_ids(&self) -> Vec<Box<str>> {
        self.clients.ids().map(Box::from).collect()
    }

    /// Take the clients which couldn't keep up with their outbound messages.
    ///
    /// These must be disconnected with [`Bus::remove_client`].
    pub(crate) fn take_overflowed(&mut self) -> Vec<Box<str>> {
        std::mem::take(&mut self.overflowed)
    }

    /// Add a newly authenticated client whose outbound messages are sent to
    /// `outbound`, returning its unique id.
    pub(crate) fn add_client(&mut self, outbound: Sender<Message>) -> Box<str> {
        let id = self.clients.insert(outbound);
        tracing::debug!(client = &*id, "Client connected");
        self.name_owner_changed(&id, None, Some(&id));
        id
    }

    /// Remove a client, releasing every name it owns or waits for.
    ///
    /// Returns `false` if the client was not connected.
    pub(crate) fn remove_client(&mut self, id: &str) -> bool {
        if self.clients.remove(id).is_none() {
            return false;
        }

        tracing::debug!(client = id, "Client disconnected");

        let mut events = Vec::new();
        self.names.remove_client(id, &mut events);
        self.emit(events);
        self.name_owner_changed(id, Some(id), None);
        true
    }

    /// Route a message received from client `id`.
    pub(crate) fn handle_message(&mut self, id: &str, mut message: Message) {
        if !self.clients.contains(id) {
            return;
        }

        message.set_sender(Some(id));
        telemetry::trace(id, Direction::Inbound, &message);

        let destination = message.destination().map(Box::<str>::from);
        let mut target = None;

        if let Some(destination) = destination.as_deref().filter(|d| *d != DESTINATION) {
            target = self.resolve(destination).map(Box::<str>::from);

            match &target {
                Some(target) => {
                    self.deliver(target, message.clone(), true);
                }
                None if message.message_type() == MessageType::METHOD_CALL => {
                    let error = MethodError::new(
                        error::SERVICE_UNKNOWN,
                        format!("The name {destination} is unknown"),
                    );

                    self.reply(id, &message, Err(error));
                }
                None => {}
            }
        }

        let mut exclude = vec![id];
        exclude.extend(target.as_deref());
        self.broadcast(&message, target.is_some(), true, &exclude);

        if destination.as_deref().map_or(true, |d| d == DESTINATION) {
            self.dispatch(id, &message);
        }
    }

    /// Resolve a unique id or well-known name to a connected client.
    fn resolve<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.clients.contains(name) {
            return Some(name);
        }

        let owner = self.names.owner(name)?;
        Some(self.clients.get(owner)?.id())
    }

    /// Handle a message addressed to the bus itself.
    fn dispatch(&mut self, id: &str, message: &Message) {
        if message.message_type() != MessageType::METHOD_CALL {
            return;
        }

        match self.call(id, message) {
            Ok(Response::Return(body)) => {
                self.reply(id, message, Ok(body));
            }
            Ok(Response::Hello(body)) => {
                self.reply(id, message, Ok(body));
                self.unicast_name_signal(id, "NameAcquired", id);
            }
            Err(error) => {
                tracing::debug!(client = id, name = error.name, message = error.message, "Bus method failed");
                self.reply(id, message, Err(error));
            }
        }
    }

    /// Reply to a method call from the bus.
    fn reply(&mut self, id: &str, call: &Message, result: Result<BodyBuf, MethodError>) {
        if call.flags() & Flags::NO_REPLY_EXPECTED {
            return;
        }

        let reply = match result {
            Ok(body) => call.method_return(NonZeroU32::MIN).with_body(body),
            Err(error) => {
                let mut body = BodyBuf::new();
                body.write(error.message.as_str());
                call.error(error.name, NonZeroU32::MIN).with_body(body)
            }
        };

        self.deliver(id, reply, false);
    }

    /// Emit the signals of ownership changes in order.
    fn emit(&mut self, events: Vec<NameEvent>) {
        for event in events {
            match event {
                NameEvent::Lost { client, name } => {
                    tracing::debug!(client = &*client, name = &*name, "Name lost");
                    self.unicast_name_signal(&client, "NameLost", &name);
                }
                NameEvent::Acquired { client, name } => {
                    tracing::debug!(client = &*client, name = &*name, "Name acquired");
                    self.unicast_name_signal(&client, "NameAcquired", &name);
                }
                NameEvent::OwnerChanged { name, old, new } => {
                    self.name_owner_changed(&name, old.as_deref(), new.as_deref());
                }
            }
        }
    }

    /// Send `NameAcquired` or `NameLost` to a single client.
    fn unicast_name_signal(&mut self, id: &str, member: &str, name: &str) {
        let mut body = BodyBuf::new();
        body.write(name);

        let signal = Message::signal(PATH, INTERFACE, member, NonZeroU32::MIN)
            .with_destination(id)
            .with_body(body);

        self.deliver(id, signal, false);
    }

    /// Broadcast `NameOwnerChanged` to every client with a matching rule.
    fn name_owner_changed(&mut self, name: &str, old: Option<&str>, new: Option<&str>) {
        let mut body = BodyBuf::new();
        body.write(name);
        body.write(old.unwrap_or_default());
        body.write(new.unwrap_or_default());

        let signal =
            Message::signal(PATH, INTERFACE, "NameOwnerChanged", NonZeroU32::MIN).with_body(body);

        self.broadcast(&signal, false, false, &[]);
    }

    /// Send a copy of `message` to every client, except those in `exclude`,
    /// which has at least one rule matching it.
    fn broadcast(
        &mut self,
        message: &Message,
        has_destination: bool,
        preserve_serial: bool,
        exclude: &[&str],
    ) {
        let targets = self
            .clients
            .iter()
            .filter(|client| !exclude.contains(&client.id()))
            .filter(|client| {
                client
                    .matches()
                    .iter()
                    .any(|rule| rule.matches(message, has_destination, &self.names))
            })
            .map(|client| Box::<str>::from(client.id()))
            .collect::<Vec<_>>();

        for id in targets {
            self.deliver(&id, message.clone(), preserve_serial);
        }
    }

    /// Queue a message for the connection of client `id`, applying the
    /// outbound filter.
    fn deliver(&mut self, id: &str, mut message: Message, preserve_serial: bool) {
        let Some(client) = self.clients.get_mut(id) else {
            return;
        };

        if !preserve_serial {
            message.set_serial(client.next_serial());
        }

        if message.sender().is_none() {
            message.set_sender(Some(DESTINATION));
        }

        if message.destination().is_none() {
            message.set_destination(Some(id));
        }

        telemetry::trace(id, Direction::Outbound, &message);

        match client.send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(..)) => {
                if !self.overflowed.iter().any(|o| **o == *id) {
                    tracing::warn!(client = id, "Outbound queue is full, disconnecting");
                    self.overflowed.push(id.into());
                }
            }
            Err(TrySendError::Closed(..)) => {
                tracing::warn!(client = id, "Dropping message for closed connection");
            }
        }
    }
}
