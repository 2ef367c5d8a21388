//! The server side of the SASL handshake which D-Bus performs before any
//! messages are exchanged.
//!
//! The state machine here performs no I/O. It is fed one line at a time by
//! [`crate::connection`] and responds with what to send back. Cookies for
//! `DBUS_COOKIE_SHA1` are loaded by the caller when asked to through
//! [`Step::LoadCookie`].

#[cfg(test)]
mod tests;

pub(crate) use self::keyring::{Cookie, Keyring, CONTEXT};
mod keyring;

use std::fmt;
use std::io;
use std::str::from_utf8;

use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::{Digest, Sha1};

use crate::utils::{split_word, trim_line};

/// The maximum length of a single line in the handshake.
pub(crate) const MAX_LINE_LENGTH: usize = 16384;

/// The number of rejected authentication attempts before the connection is
/// closed.
const MAX_REJECTED: usize = 6;

/// The supported mechanisms.
const EXTERNAL: &[u8] = b"EXTERNAL";
const COOKIE_SHA1: &[u8] = b"DBUS_COOKIE_SHA1";
const ANONYMOUS: &[u8] = b"ANONYMOUS";

/// Length of the challenge sent to `DBUS_COOKIE_SHA1` clients.
const CHALLENGE_LENGTH: usize = 16;

/// What the server accepts as proof of identity.
#[derive(Debug, Clone)]
pub(crate) struct Policy {
    /// Accept the ANONYMOUS mechanism.
    pub(crate) allow_anonymous: bool,
    /// When set, EXTERNAL must authenticate exactly this user.
    pub(crate) same_user: Option<u32>,
    /// Accept DBUS_COOKIE_SHA1 from clients able to read this keyring.
    pub(crate) cookie: Option<CookiePolicy>,
}

/// Configuration of the DBUS_COOKIE_SHA1 mechanism.
#[derive(Debug, Clone)]
pub(crate) struct CookiePolicy {
    /// The user running the daemon, which is the only one clients may claim
    /// to be.
    pub(crate) uid: u32,
    pub(crate) keyring: Keyring,
}

/// The next action to take after feeding a line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Step {
    /// Send the given line to the client and keep reading.
    Reply(Vec<u8>),
    /// Authentication is complete, switch to the message protocol.
    Begin,
    /// Close the connection.
    Close(SaslFailure),
    /// Load a cookie from the keyring and pass it to
    /// [`SaslServer::challenge`].
    LoadCookie(Keyring),
}

/// Why the handshake was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SaslFailure {
    /// BEGIN was sent before authentication succeeded.
    BeginWithoutAuth,
    /// Too many attempts were rejected.
    TooManyAttempts,
}

impl fmt::Display for SaslFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaslFailure::BeginWithoutAuth => write!(f, "BEGIN before successful AUTH"),
            SaslFailure::TooManyAttempts => write!(f, "too many rejected attempts"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingForAuth,
    WaitingForData,
    WaitingForBegin,
}

/// A DBUS_COOKIE_SHA1 exchange waiting for the client's response.
struct Exchange {
    challenge: String,
    secret: String,
}

/// Server side SASL state machine.
pub(crate) struct SaslServer<'a> {
    guid: &'a str,
    policy: Policy,
    /// The user id of the peer as reported by the operating system.
    peer_uid: Option<u32>,
    state: State,
    exchange: Option<Exchange>,
    rejected: usize,
}

impl<'a> SaslServer<'a> {
    pub(crate) fn new(guid: &'a str, policy: Policy, peer_uid: Option<u32>) -> Self {
        Self {
            guid,
            policy,
            peer_uid,
            state: State::WaitingForAuth,
            exchange: None,
            rejected: 0,
        }
    }

    /// Feed a single line, including or excluding the trailing `\r\n`.
    pub(crate) fn feed(&mut self, line: &[u8]) -> Step {
        let (command, argument) = split_word(trim_line(line));

        match (self.state, command) {
            (_, b"BEGIN") => {
                if self.state == State::WaitingForBegin {
                    Step::Begin
                } else {
                    Step::Close(SaslFailure::BeginWithoutAuth)
                }
            }
            (State::WaitingForAuth, b"AUTH") => self.auth(argument),
            (State::WaitingForAuth, b"ERROR") => self.reject(),
            (State::WaitingForData, b"DATA") => {
                let data = argument.unwrap_or_default();

                match self.exchange.take() {
                    Some(exchange) => self.cookie_response(exchange, data),
                    None => self.external(data),
                }
            }
            (State::WaitingForData | State::WaitingForBegin, b"CANCEL" | b"ERROR") => {
                self.reject()
            }
            (State::WaitingForBegin, b"NEGOTIATE_UNIX_FD") => {
                Step::Reply(b"ERROR \"Unix fd passing is not supported\"\r\n".to_vec())
            }
            _ => Step::Reply(b"ERROR \"Unknown or unexpected command\"\r\n".to_vec()),
        }
    }

    fn auth(&mut self, argument: Option<&[u8]>) -> Step {
        let Some(argument) = argument else {
            return self.reject();
        };

        let (mechanism, initial) = split_word(argument);

        match mechanism {
            EXTERNAL if self.peer_uid.is_some() => match initial {
                Some(initial) => self.external(initial),
                None => {
                    self.state = State::WaitingForData;
                    Step::Reply(b"DATA\r\n".to_vec())
                }
            },
            COOKIE_SHA1 if self.policy.cookie.is_some() => self.cookie(initial),
            ANONYMOUS if self.policy.allow_anonymous => self.accept(),
            _ => self.reject(),
        }
    }

    /// Start DBUS_COOKIE_SHA1, where the initial response is the hex encoded
    /// decimal user id the client claims to be.
    fn cookie(&mut self, initial: Option<&[u8]>) -> Step {
        let Some(policy) = &self.policy.cookie else {
            return self.reject();
        };

        let claimed = initial
            .and_then(|initial| hex::decode(initial).ok())
            .and_then(|claimed| from_utf8(&claimed).ok()?.parse::<u32>().ok());

        if claimed != Some(policy.uid) {
            tracing::debug!(?claimed, uid = policy.uid, "DBUS_COOKIE_SHA1 claims another user");
            return self.reject();
        }

        Step::LoadCookie(policy.keyring.clone())
    }

    /// Continue DBUS_COOKIE_SHA1 with the cookie loaded from the keyring,
    /// challenging the client to prove that it can read it too.
    pub(crate) fn challenge(&mut self, cookie: io::Result<Cookie>) -> Step {
        let cookie = match cookie {
            Ok(cookie) => cookie,
            Err(error) => {
                tracing::warn!(%error, "Failed to load cookie from keyring");
                return self.reject();
            }
        };

        let challenge = rand::thread_rng()
            .sample_iter(Alphanumeric)
            .take(CHALLENGE_LENGTH)
            .map(char::from)
            .collect::<String>();

        let data = format!("{CONTEXT} {} {challenge}", cookie.id);

        self.exchange = Some(Exchange {
            challenge,
            secret: cookie.secret,
        });

        self.state = State::WaitingForData;
        Step::Reply(format!("DATA {}\r\n", hex::encode(data)).into_bytes())
    }

    /// Check the response to a cookie challenge, which is the hex encoded
    /// client challenge and SHA-1 digest separated by a space.
    fn cookie_response(&mut self, exchange: Exchange, response: &[u8]) -> Step {
        let Some(response) = hex::decode(response)
            .ok()
            .and_then(|response| String::from_utf8(response).ok())
        else {
            return self.reject();
        };

        let mut tokens = response.split(' ');

        let (Some(client_challenge), Some(digest), None) =
            (tokens.next(), tokens.next(), tokens.next())
        else {
            tracing::debug!("Malformed DBUS_COOKIE_SHA1 response");
            return self.reject();
        };

        let expected = Sha1::digest(
            format!("{}:{client_challenge}:{}", exchange.challenge, exchange.secret).as_bytes(),
        );

        if hex::encode(expected) != digest {
            tracing::debug!("DBUS_COOKIE_SHA1 digest mismatch");
            return self.reject();
        }

        self.accept()
    }

    /// Check the response to EXTERNAL, which is the hex encoded decimal user
    /// id the client claims, or empty to use whatever the transport reports.
    fn external(&mut self, response: &[u8]) -> Step {
        let Some(peer_uid) = self.peer_uid else {
            return self.reject();
        };

        if !response.is_empty() {
            let claimed = hex::decode(response)
                .ok()
                .and_then(|claimed| from_utf8(&claimed).ok()?.parse::<u32>().ok());

            if claimed != Some(peer_uid) {
                tracing::debug!(?claimed, peer_uid, "EXTERNAL identity does not match peer");
                return self.reject();
            }
        }

        if let Some(uid) = self.policy.same_user {
            if uid != peer_uid {
                tracing::debug!(uid, peer_uid, "EXTERNAL peer is not the same user");
                return self.reject();
            }
        }

        self.accept()
    }

    fn accept(&mut self) -> Step {
        self.state = State::WaitingForBegin;
        Step::Reply(format!("OK {}\r\n", self.guid).into_bytes())
    }

    fn reject(&mut self) -> Step {
        self.state = State::WaitingForAuth;
        self.exchange = None;
        self.rejected += 1;

        if self.rejected >= MAX_REJECTED {
            return Step::Close(SaslFailure::TooManyAttempts);
        }

        let mut line = b"REJECTED".to_vec();

        if self.peer_uid.is_some() {
            line.push(b' ');
            line.extend_from_slice(EXTERNAL);
        }

        if self.policy.cookie.is_some() {
            line.push(b' ');
            line.extend_from_slice(COOKIE_SHA1);
        }

        if self.policy.allow_anonymous {
            line.push(b' ');
            line.extend_from_slice(ANONYMOUS);
        }

        line.extend_from_slice(b"\r\n");
        Step::Reply(line)
    }
}
