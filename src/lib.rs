//! An in-process D-Bus message bus daemon for Tokio.
//!
//! A [`Daemon`] listens on a D-Bus address, authenticates clients over SASL,
//! assigns them unique names and routes messages between them. It implements
//! the `org.freedesktop.DBus` interface for name ownership and match rules,
//! which makes it suitable as a private session bus for tests and sandboxed
//! applications.
//!
//! ```no_run
//! use tokio_dbus_daemon::DaemonBuilder;
//!
//! # #[tokio::main] async fn main() -> tokio_dbus_daemon::Result<()> {
//! let daemon = DaemonBuilder::new().address("unix:tmpdir=/tmp").build()?;
//! println!("{}", daemon.client_address());
//!
//! let handle = daemon.start();
//! handle.shutdown().await?;
//! # Ok(()) }
//! ```

#[doc(inline)]
pub use self::write::Write;
mod write;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

pub mod proto;

pub mod org_freedesktop_dbus;

#[doc(inline)]
pub use self::signature::{OwnedSignature, Signature, SignatureError};
mod signature;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathError};
mod object_path;

#[doc(inline)]
pub use self::frame::Frame;
mod frame;

#[doc(inline)]
pub use self::buf::BodyBuf;
mod buf;

#[doc(inline)]
pub use self::message::{Body, Message, MessageKind};
mod message;

#[doc(inline)]
pub use self::daemon::{Daemon, DaemonBuilder, DaemonHandle};
mod daemon;

mod address;

mod bus;

mod connection;

mod name;

mod sasl;

mod telemetry;

mod utils;

#[cfg(test)]
mod testing;
