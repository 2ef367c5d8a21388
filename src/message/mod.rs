//! Owned D-Bus messages and their wire encoding.

pub use self::message::Message;
mod message;

pub use self::message_kind::MessageKind;
mod message_kind;

pub use self::body::Body;
pub(crate) use self::body::Arg;
mod body;

pub(crate) use self::recv::{decode, message_length, PREFIX_SIZE};
mod recv;

pub(crate) use self::send::encode;
mod send;
