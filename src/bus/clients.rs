use std::collections::HashMap;
use std::num::NonZeroU32;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;

use crate::Message;

use super::match_rule::Match;

/// A connected and authenticated peer.
pub(crate) struct Client {
    id: Box<str>,
    outbound: Sender<Message>,
    /// Installed match rules, most recent first.
    matches: Vec<Match>,
    serial: u32,
}

impl Client {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub(crate) fn add_match(&mut self, rule: Match) {
        self.matches.insert(0, rule);
    }

    /// Remove the first rule equal to `rule`.
    pub(crate) fn remove_match(&mut self, rule: &Match) -> bool {
        let Some(index) = self.matches.iter().position(|m| m == rule) else {
            return false;
        };

        self.matches.remove(index);
        true
    }

    /// Allocate the serial of the next message originating from the bus on
    /// this connection.
    pub(crate) fn next_serial(&mut self) -> NonZeroU32 {
        loop {
            self.serial = self.serial.wrapping_add(1);

            if let Some(serial) = NonZeroU32::new(self.serial) {
                return serial;
            }
        }
    }

    /// Queue a message for the writer of this connection without waiting
    /// for room in its queue.
    pub(crate) fn send(&self, message: Message) -> Result<(), TrySendError<Message>> {
        self.outbound.try_send(message)
    }
}

/// Connected clients by unique id.
pub(crate) struct Clients {
    clients: HashMap<Box<str>, Client>,
    next_major: u32,
    next_minor: u32,
}

impl Clients {
    pub(crate) fn new() -> Self {
        Self {
            clients: HashMap::new(),
            next_major: 1,
            next_minor: 0,
        }
    }

    /// Register a new client, allocating the next unique id for it.
    pub(crate) fn insert(&mut self, outbound: Sender<Message>) -> Box<str> {
        let id: Box<str> = format!(":{}.{}", self.next_major, self.next_minor).into();

        if self.next_minor == u32::MAX {
            self.next_minor = 0;
            self.next_major = self.next_major.wrapping_add(1);
        } else {
            self.next_minor += 1;
        }

        let client = Client {
            id: id.clone(),
            outbound,
            matches: Vec::new(),
            serial: 0,
        };

        self.clients.insert(id.clone(), client);
        id
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    pub(crate) fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Client> {
        self.clients.get_mut(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.values()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(|id| &**id)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.clients.len()
    }
}
