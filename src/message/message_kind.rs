use std::num::NonZeroU32;

use crate::proto::MessageType;

/// The kind of a D-Bus message, carrying the header fields which are
/// required for that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageKind {
    /// A method call.
    MethodCall {
        /// The path being called.
        path: Box<str>,
        /// The member being called.
        member: Box<str>,
    },
    /// A method return.
    MethodReturn {
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// An error reply.
    Error {
        /// The name of the error.
        error_name: Box<str>,
        /// The serial this is a reply to.
        reply_serial: NonZeroU32,
    },
    /// A signal emission.
    Signal {
        /// The path emitting the signal.
        path: Box<str>,
        /// The member being signalled.
        member: Box<str>,
    },
}

impl MessageKind {
    /// The message type on the wire.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}
