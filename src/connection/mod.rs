//! Listening for, authenticating and framing client connections.

pub(crate) use self::listener::{Listener, Stream};
mod listener;

pub(crate) use self::handshake::handshake;
mod handshake;

pub(crate) use self::transport::{MessageReader, MessageWriter};
mod transport;


use tokio::io::{AsyncRead, AsyncWrite};

/// The read half of an accepted stream.
pub(crate) type ReadHalf = Box<dyn AsyncRead + Send + Unpin>;

/// The write half of an accepted stream.
pub(crate) type WriteHalf = Box<dyn AsyncWrite + Send + Unpin>;
