//! The daemon driving a [`Bus`] from a listening socket.

use std::collections::HashMap;
use std::future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Sleep};

use crate::bus::{Bus, OUTBOUND_CAPACITY};
use crate::connection::{handshake, Listener, MessageReader, MessageWriter, Stream};
use crate::error::{Error, Result};
use crate::sasl::Policy;
use crate::Message;

pub use self::daemon_builder::DaemonBuilder;
mod daemon_builder;

#[cfg(all(test, unix))]
mod tests;

/// Time a connection is given to authenticate.
const AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Time disconnected clients are given to receive their remaining messages
/// when the daemon stops.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// A D-Bus message bus daemon which has been bound but is not yet serving
/// clients.
///
/// Constructed through [`DaemonBuilder`].
///
/// # Examples
///
/// ```no_run
/// use tokio_dbus_daemon::DaemonBuilder;
///
/// # #[tokio::main] async fn main() -> tokio_dbus_daemon::Result<()> {
/// let daemon = DaemonBuilder::new().build()?;
/// println!("DBUS_SESSION_BUS_ADDRESS={}", daemon.client_address());
///
/// let mut handle = daemon.start();
///
/// // Stop once every client has left.
/// handle.idle_timeout().await;
/// handle.shutdown().await?;
/// # Ok(()) }
/// ```
pub struct Daemon {
    listener: Listener,
    guid: Box<str>,
    client_address: String,
    policy: Policy,
    idle_timeout: Duration,
    /// A private directory allocated for the socket, removed when the daemon
    /// stops.
    tmpdir: Option<TempDir>,
}

impl Daemon {
    /// The address clients connect to, including the guid of the daemon.
    pub fn client_address(&self) -> &str {
        &self.client_address
    }

    /// The guid of the daemon, as reported by `GetId`.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Start serving clients on a background task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> DaemonHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();

        let client_address = self.client_address.clone();
        let guid = self.guid.clone();
        let task = tokio::spawn(self.run(shutdown_rx, idle_tx));

        DaemonHandle {
            client_address,
            guid,
            idle: idle_rx,
            shutdown: shutdown_tx,
            task,
        }
    }

    async fn run(
        self,
        mut shutdown: oneshot::Receiver<()>,
        idle_tx: UnboundedSender<()>,
    ) -> Result<()> {
        let Daemon {
            listener,
            guid,
            client_address,
            policy,
            idle_timeout,
            tmpdir,
        } = self;

        tracing::info!(address = %client_address, "Listening");

        let guid = Arc::<str>::from(guid);
        let nonce = listener.nonce();

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut bus = Bus::new(&guid);
        let mut readers = HashMap::<Box<str>, JoinHandle<()>>::new();
        let mut writers = HashMap::<Box<str>, JoinHandle<()>>::new();
        let mut idle = None::<Pin<Box<Sleep>>>;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok(stream) => {
                            tracing::debug!("Accepted connection");
                            let task = authenticate(stream, nonce, guid.clone(), policy.clone(), events_tx.clone());
                            tokio::spawn(task);
                        }
                        Err(error) => {
                            tracing::warn!(%error, "Failed to accept connection");
                        }
                    }
                }
                Some(event) = events.recv() => {
                    let mut left = false;

                    match event {
                        Event::Authenticated { reader, writer } => {
                            if idle.take().is_some() {
                                tracing::debug!("Idle countdown cancelled");
                            }

                            let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                            let id = bus.add_client(tx);

                            writers.retain(|_, writer| !writer.is_finished());
                            writers.insert(id.clone(), tokio::spawn(write_loop(id.clone(), writer, rx)));

                            let reader = tokio::spawn(read_loop(id.clone(), reader, events_tx.clone()));
                            readers.insert(id, reader);
                        }
                        Event::Message { id, message } => {
                            bus.handle_message(&id, message);
                        }
                        Event::Closed { id } => {
                            readers.remove(&id);
                            left = bus.remove_client(&id);
                        }
                    }

                    // Disconnecting a client emits signals which may in turn
                    // overflow other clients.
                    loop {
                        let overflowed = bus.take_overflowed();

                        if overflowed.is_empty() {
                            break;
                        }

                        for id in overflowed {
                            if let Some(reader) = readers.remove(&id) {
                                reader.abort();
                            }

                            if let Some(writer) = writers.remove(&id) {
                                writer.abort();
                            }

                            left |= bus.remove_client(&id);
                        }
                    }

                    if left && bus.is_empty() {
                        tracing::debug!(?idle_timeout, "Last client left, starting idle countdown");
                        idle = Some(Box::pin(time::sleep(idle_timeout)));
                    }
                }
                _ = wait(&mut idle) => {
                    idle = None;
                    tracing::debug!("Idle timeout");
                    let _ = idle_tx.send(());
                }
            }
        }

        tracing::debug!(clients = bus.len(), "Shutting down");

        drop(idle);

        for id in bus.client_ids() {
            if let Some(reader) = readers.remove(&id) {
                reader.abort();
            }

            bus.remove_client(&id);
        }

        debug_assert!(bus.is_vacant(), "clients or names left after shutdown");
        drop(bus);
        drop(listener);

        flush(writers, FLUSH_TIMEOUT).await;

        if let Some(tmpdir) = tmpdir {
            tmpdir.close()?;
        }

        tracing::info!("Stopped");
        Ok(())
    }
}

/// A handle to a running [`Daemon`].
///
/// Dropping the handle stops the daemon.
pub struct DaemonHandle {
    client_address: String,
    guid: Box<str>,
    idle: UnboundedReceiver<()>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<Result<()>>,
}

impl DaemonHandle {
    /// The address clients connect to, including the guid of the daemon.
    pub fn client_address(&self) -> &str {
        &self.client_address
    }

    /// The guid of the daemon.
    pub fn guid(&self) -> &str {
        &self.guid
    }

    /// Wait for the idle countdown to fire, which happens when the last
    /// client has disconnected and no new client connected within the idle
    /// timeout.
    ///
    /// Returns `false` if the daemon has stopped.
    pub async fn idle_timeout(&mut self) -> bool {
        self.idle.recv().await.is_some()
    }

    /// Stop the daemon, disconnecting every client, and wait for it to
    /// finish.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());

        match self.task.await {
            Ok(result) => result,
            Err(error) => Err(Error::from(io::Error::other(error))),
        }
    }
}

enum Event {
    Authenticated {
        reader: MessageReader,
        writer: MessageWriter,
    },
    Message {
        id: Box<str>,
        message: Message,
    },
    Closed {
        id: Box<str>,
    },
}

async fn wait(idle: &mut Option<Pin<Box<Sleep>>>) {
    match idle {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

async fn authenticate(
    stream: Stream,
    nonce: Option<[u8; 16]>,
    guid: Arc<str>,
    policy: Policy,
    events: UnboundedSender<Event>,
) {
    match time::timeout(AUTH_TIMEOUT, handshake(stream, nonce, &guid, policy)).await {
        Ok(Ok((reader, writer))) => {
            let _ = events.send(Event::Authenticated { reader, writer });
        }
        Ok(Err(error)) => {
            tracing::warn!(%error, "Failed to authenticate connection");
        }
        Err(..) => {
            tracing::warn!("Connection did not authenticate in time");
        }
    }
}

async fn read_loop(id: Box<str>, mut reader: MessageReader, events: UnboundedSender<Event>) {
    loop {
        match reader.read().await {
            Ok(Some(message)) => {
                let id = id.clone();

                if events.send(Event::Message { id, message }).is_err() {
                    return;
                }
            }
            Ok(None) => break,
            Err(error) => {
                if !error.is_closed() {
                    tracing::warn!(client = &*id, %error, "Failed to read message");
                }

                break;
            }
        }
    }

    let _ = events.send(Event::Closed { id });
}

/// Wait for the writers of disconnected clients to flush their queues,
/// aborting those which are still writing once `timeout` has passed.
async fn flush(writers: HashMap<Box<str>, JoinHandle<()>>, timeout: Duration) {
    let deadline = Instant::now() + timeout;

    for (id, mut writer) in writers {
        if time::timeout_at(deadline, &mut writer).await.is_err() {
            tracing::warn!(client = &*id, "Connection did not flush in time");
            writer.abort();
        }
    }
}

async fn write_loop(id: Box<str>, mut writer: MessageWriter, mut messages: Receiver<Message>) {
    while let Some(message) = messages.recv().await {
        if let Err(error) = writer.write(&message).await {
            if !error.is_closed() {
                tracing::warn!(client = &*id, %error, "Failed to write message");
            }

            return;
        }
    }

    if let Err(error) = writer.shutdown().await {
        tracing::debug!(client = &*id, %error, "Failed to shut down connection");
    }
}
