//! One-line tracing of messages passing through the bus, enabled with the
//! `message-trace` feature.

use std::fmt;

use crate::Message;

/// The direction a message travels relative to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Received from a client.
    Inbound,
    /// Sent to a client.
    Outbound,
}

/// Trace `message` passing through the connection of `client`.
#[cfg(feature = "message-trace")]
pub(crate) fn trace(client: &str, direction: Direction, message: &Message) {
    tracing::trace!(target: "tokio_dbus_daemon::message", "{}", Line { client, direction, message });
}

#[cfg(not(feature = "message-trace"))]
#[inline(always)]
pub(crate) fn trace(_: &str, _: Direction, _: &Message) {}

/// Formats a trace line, such as:
///
/// ```text
/// :1.0-> method_call 1(0) sender: :1.0 destination: org.freedesktop.DBus /org/freedesktop/DBus org.freedesktop.DBus.Hello
/// ```
#[cfg_attr(not(feature = "message-trace"), allow(dead_code))]
pub(crate) struct Line<'a> {
    pub(crate) client: &'a str,
    pub(crate) direction: Direction,
    pub(crate) message: &'a Message,
}

impl fmt::Display for Line<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NULL: &str = "(null)";

        let m = self.message;

        let direction = match self.direction {
            Direction::Inbound => "->",
            Direction::Outbound => "<-",
        };

        write!(
            f,
            "{}{direction} {} {}({}) sender: {} destination: {} {} {}.{}",
            self.client,
            m.message_type().as_str(),
            m.serial(),
            m.reply_serial().map_or(0, |serial| serial.get()),
            m.sender().unwrap_or(NULL),
            m.destination().unwrap_or(NULL),
            m.path().map_or(NULL, |path| path.as_str()),
            m.interface().unwrap_or(NULL),
            m.member().unwrap_or(NULL),
        )
    }
}
