use std::collections::{BTreeMap, VecDeque};

use crate::org_freedesktop_dbus::{NameFlag, NameReply, ReleaseNameReply};

/// A side effect of a change in name ownership, to be emitted by the bus in
/// the order it was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NameEvent {
    /// `NameLost` is sent to `client`.
    Lost { client: Box<str>, name: Box<str> },
    /// `NameAcquired` is sent to `client`.
    Acquired { client: Box<str>, name: Box<str> },
    /// `NameOwnerChanged` is broadcast.
    OwnerChanged {
        name: Box<str>,
        old: Option<Box<str>>,
        new: Option<Box<str>>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NameOwner {
    client: Box<str>,
    flags: NameFlag,
}

#[derive(Debug, Default)]
struct Name {
    owner: Option<NameOwner>,
    queue: VecDeque<NameOwner>,
}

impl Name {
    fn is_empty(&self) -> bool {
        self.owner.is_none() && self.queue.is_empty()
    }

    fn is_owner(&self, client: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| *o.client == *client)
    }

    fn unqueue(&mut self, client: &str) -> bool {
        let Some(index) = self.queue.iter().position(|o| *o.client == *client) else {
            return false;
        };

        self.queue.remove(index);
        true
    }

    fn queue(&mut self, owner: NameOwner) {
        match self.queue.iter_mut().find(|o| o.client == owner.client) {
            Some(existing) => existing.flags = owner.flags,
            None => self.queue.push_back(owner),
        }
    }

    /// Hand the name over to `owner`.
    ///
    /// The previous owner goes to the front of the queue unless it holds
    /// `DO_NOT_QUEUE`.
    fn replace_owner(&mut self, name: &str, owner: Option<NameOwner>, events: &mut Vec<NameEvent>) {
        let old = match self.owner.take() {
            Some(old) => {
                events.push(NameEvent::Lost {
                    client: old.client.clone(),
                    name: name.into(),
                });

                let id = old.client.clone();

                if !(old.flags & NameFlag::DO_NOT_QUEUE) {
                    self.queue.push_front(old);
                }

                Some(id)
            }
            None => None,
        };

        let new = owner.as_ref().map(|o| o.client.clone());

        if let Some(owner) = owner {
            self.unqueue(&owner.client);

            events.push(NameEvent::Acquired {
                client: owner.client.clone(),
                name: name.into(),
            });

            self.owner = Some(owner);
        }

        events.push(NameEvent::OwnerChanged {
            name: name.into(),
            old,
            new,
        });
    }

    /// Release the name from its current owner to the head of the queue.
    fn release_owner(&mut self, name: &str, events: &mut Vec<NameEvent>) {
        let next = self.queue.pop_front();

        if let Some(owner) = &mut self.owner {
            owner.flags = owner.flags | NameFlag::DO_NOT_QUEUE;
        }

        self.replace_owner(name, next, events);
    }
}

/// The registry of well-known names, their primary owners and queues.
///
/// Names without an owner and with an empty queue are removed.
#[derive(Debug, Default)]
pub(crate) struct Names {
    names: BTreeMap<Box<str>, Name>,
}

impl Names {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The unique id of the primary owner of `name`.
    pub(crate) fn owner(&self, name: &str) -> Option<&str> {
        Some(&*self.names.get(name)?.owner.as_ref()?.client)
    }

    /// Test if `name` is known to the registry.
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    /// Iterate over all known names.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(|name| &**name)
    }

    /// The clients waiting in the queue of `name`, provided it has an owner.
    pub(crate) fn queued(&self, name: &str) -> Option<Vec<&str>> {
        let entry = self.names.get(name)?;
        entry.owner.as_ref()?;
        Some(entry.queue.iter().map(|o| &*o.client).collect())
    }

    /// Request ownership of `name` on behalf of `client`.
    pub(crate) fn request(
        &mut self,
        client: &str,
        name: &str,
        flags: NameFlag,
        events: &mut Vec<NameEvent>,
    ) -> NameReply {
        let entry = self.names.entry(name.into()).or_default();

        let owner = NameOwner {
            client: client.into(),
            flags,
        };

        let reply = match &entry.owner {
            None => NameReply::PRIMARY_OWNER,
            Some(current) if *current.client == *client => NameReply::ALREADY_OWNER,
            Some(current)
                if flags & NameFlag::REPLACE_EXISTING
                    && current.flags & NameFlag::ALLOW_REPLACEMENT =>
            {
                NameReply::PRIMARY_OWNER
            }
            Some(..) if flags & NameFlag::DO_NOT_QUEUE => NameReply::EXISTS,
            Some(..) => NameReply::IN_QUEUE,
        };

        match reply {
            NameReply::PRIMARY_OWNER => entry.replace_owner(name, Some(owner), events),
            NameReply::ALREADY_OWNER => {
                if let Some(current) = &mut entry.owner {
                    current.flags = flags;
                }
            }
            NameReply::EXISTS => {
                entry.unqueue(client);
            }
            _ => entry.queue(owner),
        }

        self.reap(name);
        reply
    }

    /// Release `client` from `name`, either as its owner or from its queue.
    pub(crate) fn release(
        &mut self,
        client: &str,
        name: &str,
        events: &mut Vec<NameEvent>,
    ) -> ReleaseNameReply {
        let Some(entry) = self.names.get_mut(name) else {
            return ReleaseNameReply::NON_EXISTENT;
        };

        let reply = if entry.is_owner(client) {
            entry.release_owner(name, events);
            ReleaseNameReply::RELEASED
        } else if entry.unqueue(client) {
            ReleaseNameReply::RELEASED
        } else {
            ReleaseNameReply::NOT_OWNER
        };

        self.reap(name);
        reply
    }

    /// Release every name owned by `client` and remove it from every queue.
    pub(crate) fn remove_client(&mut self, client: &str, events: &mut Vec<NameEvent>) {
        let names = self.names.keys().cloned().collect::<Vec<_>>();

        for name in names {
            let Some(entry) = self.names.get_mut(&name) else {
                continue;
            };

            if entry.is_owner(client) {
                entry.release_owner(&name, events);
            }

            entry.unqueue(client);
            self.reap(&name);
        }
    }

    fn reap(&mut self, name: &str) {
        if self.names.get(name).is_some_and(Name::is_empty) {
            self.names.remove(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::org_freedesktop_dbus::{NameFlag, NameReply, ReleaseNameReply};

    use super::{NameEvent, Names};

    const NAME: &str = "com.example.S";

    #[test]
    fn request_events() {
        let mut names = Names::new();
        let mut events = Vec::new();

        let reply = names.request(":1.0", NAME, NameFlag::ALLOW_REPLACEMENT, &mut events);
        assert_eq!(reply, NameReply::PRIMARY_OWNER);
        assert_eq!(
            events,
            [
                NameEvent::Acquired {
                    client: ":1.0".into(),
                    name: NAME.into()
                },
                NameEvent::OwnerChanged {
                    name: NAME.into(),
                    old: None,
                    new: Some(":1.0".into())
                },
            ]
        );

        events.clear();
        let reply = names.request(":1.1", NAME, NameFlag::REPLACE_EXISTING, &mut events);
        assert_eq!(reply, NameReply::PRIMARY_OWNER);
        assert_eq!(
            events,
            [
                NameEvent::Lost {
                    client: ":1.0".into(),
                    name: NAME.into()
                },
                NameEvent::Acquired {
                    client: ":1.1".into(),
                    name: NAME.into()
                },
                NameEvent::OwnerChanged {
                    name: NAME.into(),
                    old: Some(":1.0".into()),
                    new: Some(":1.1".into())
                },
            ]
        );

        assert_eq!(names.owner(NAME), Some(":1.1"));
        assert_eq!(names.queued(NAME), Some(vec![":1.0"]));
    }

    #[test]
    fn client_appears_once() {
        let mut names = Names::new();
        let mut events = Vec::new();

        names.request(":1.0", NAME, NameFlag::default(), &mut events);
        names.request(":1.1", NAME, NameFlag::default(), &mut events);
        names.request(":1.1", NAME, NameFlag::ALLOW_REPLACEMENT, &mut events);
        assert_eq!(names.queued(NAME), Some(vec![":1.1"]));

        // Asking not to be queued removes a waiting client.
        let reply = names.request(":1.1", NAME, NameFlag::DO_NOT_QUEUE, &mut events);
        assert_eq!(reply, NameReply::EXISTS);
        assert_eq!(names.queued(NAME), Some(vec![]));
    }

    #[test]
    fn remove_client_reaps_names() {
        let mut names = Names::new();
        let mut events = Vec::new();

        names.request(":1.0", NAME, NameFlag::default(), &mut events);
        names.request(":1.0", "com.example.T", NameFlag::default(), &mut events);
        names.request(":1.1", "com.example.T", NameFlag::default(), &mut events);
        events.clear();

        names.remove_client(":1.0", &mut events);
        assert!(!names.contains(NAME));
        assert_eq!(names.owner("com.example.T"), Some(":1.1"));
        assert_eq!(names.iter().collect::<Vec<_>>(), ["com.example.T"]);

        let changed = events
            .iter()
            .filter(|e| matches!(e, NameEvent::OwnerChanged { .. }))
            .count();
        assert_eq!(changed, 2);

        names.remove_client(":1.1", &mut events);
        assert_eq!(names.iter().count(), 0);
        assert_eq!(
            names.release(":1.1", NAME, &mut events),
            ReleaseNameReply::NON_EXISTENT
        );
    }
}
