use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::time;

use crate::address;
use crate::bus::OUTBOUND_CAPACITY;
use crate::connection::MessageWriter;
use crate::org_freedesktop_dbus::{NameFlag, DESTINATION, PEER_INTERFACE};
use crate::proto::MessageType;
use crate::testing::TestClient;
use crate::{BodyBuf, DaemonBuilder, DaemonHandle, Message, ObjectPath};

use super::{flush, write_loop};

const NAME: &str = "com.example.Echo";

fn start(dir: &tempfile::TempDir, idle_timeout: Duration) -> Result<DaemonHandle> {
    let daemon = DaemonBuilder::new()
        .address(format!("unix:dir={}", dir.path().display()))
        .idle_timeout(idle_timeout)
        .build()?;

    assert!(daemon.client_address().starts_with("unix:path="));
    assert!(daemon
        .client_address()
        .ends_with(&format!(",guid={}", daemon.guid())));

    Ok(daemon.start())
}

fn socket_path(handle: &DaemonHandle) -> Result<PathBuf> {
    let entries = address::parse(handle.client_address())?;

    let path = entries
        .iter()
        .find_map(|entry| entry.get("path"))
        .context("missing path")?;

    Ok(PathBuf::from(path))
}

fn str_body(value: &str) -> BodyBuf {
    let mut body = BodyBuf::new();
    body.write(value);
    body
}

#[tokio::test]
async fn route_between_clients() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let handle = start(&dir, Duration::from_secs(60))?;

    let mut a = TestClient::connect(handle.client_address()).await?;
    let mut b = TestClient::connect(handle.client_address()).await?;

    assert_eq!(a.hello().await?, ":1.0");
    assert_eq!(b.hello().await?, ":1.1");

    let mut body = str_body(NAME);
    body.store(NameFlag::default().bits());
    let reply = a.call("RequestName", body).await?;
    assert_eq!(reply.body().load::<u32>()?, 1);

    let reply = b.call("GetNameOwner", str_body(NAME)).await?;
    assert_eq!(reply.body().read_str()?, ":1.0");

    let reply = b.call("GetId", BodyBuf::new()).await?;
    assert_eq!(reply.body().read_str()?, handle.guid());

    let serial = b.next_serial();
    let call = Message::method_call(ObjectPath::new("/echo")?, "Echo", serial)
        .with_interface(NAME)
        .with_destination(NAME)
        .with_body(str_body("ping"));

    b.send(&call).await?;

    let received = loop {
        let message = a.recv().await?;

        if message.message_type() == MessageType::METHOD_CALL {
            break message;
        }
    };

    assert_eq!(received.sender(), Some(":1.1"));
    assert_eq!(received.destination(), Some(NAME));
    assert_eq!(received.serial(), serial);
    assert_eq!(received.body().read_str()?, "ping");

    let serial = a.next_serial();
    let reply = received
        .method_return(serial)
        .with_destination(":1.1")
        .with_body(str_body("pong"));

    a.send(&reply).await?;

    let reply = loop {
        let message = b.recv().await?;

        if message.reply_serial() == Some(call.serial()) {
            break message;
        }
    };

    assert_eq!(reply.sender(), Some(":1.0"));
    assert_eq!(reply.body().read_str()?, "pong");

    let reply = b
        .call("AddMatch", str_body("type='signal',member='NameOwnerChanged'"))
        .await?;
    assert_eq!(reply.message_type(), MessageType::METHOD_RETURN);

    drop(a);

    let mut changes = Vec::new();

    while changes.len() < 2 {
        let message = b.recv().await?;

        if message.member() == Some("NameOwnerChanged") {
            let mut body = message.body();
            let name = body.read_str()?.to_owned();
            let old = body.read_str()?.to_owned();
            let new = body.read_str()?.to_owned();
            changes.push((name, old, new));
        }
    }

    assert_eq!(
        changes,
        [
            (NAME.to_owned(), ":1.0".to_owned(), String::new()),
            (":1.0".to_owned(), ":1.0".to_owned(), String::new()),
        ]
    );

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn idle_timeout_after_last_client() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut handle = start(&dir, Duration::from_millis(100))?;

    // Nothing fires before a client has come and gone.
    assert!(time::timeout(Duration::from_millis(300), handle.idle_timeout())
        .await
        .is_err());

    let mut a = TestClient::connect(handle.client_address()).await?;
    a.hello().await?;
    drop(a);

    assert!(time::timeout(Duration::from_secs(5), handle.idle_timeout()).await?);

    // The countdown fires once per vacancy.
    assert!(time::timeout(Duration::from_millis(300), handle.idle_timeout())
        .await
        .is_err());

    // No countdown while a client remains.
    let mut a = TestClient::connect(handle.client_address()).await?;
    a.hello().await?;
    let mut b = TestClient::connect(handle.client_address()).await?;
    b.hello().await?;
    drop(a);

    assert!(time::timeout(Duration::from_millis(300), handle.idle_timeout())
        .await
        .is_err());

    drop(b);
    assert!(time::timeout(Duration::from_secs(5), handle.idle_timeout()).await?);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn new_connection_cancels_idle_countdown() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut handle = start(&dir, Duration::from_millis(500))?;

    let mut a = TestClient::connect(handle.client_address()).await?;
    a.hello().await?;
    drop(a);

    // Let the daemon notice the disconnect and start counting down.
    time::sleep(Duration::from_millis(50)).await;

    let mut b = TestClient::connect(handle.client_address()).await?;
    b.hello().await?;

    assert!(time::timeout(Duration::from_secs(1), handle.idle_timeout())
        .await
        .is_err());

    drop(b);
    assert!(time::timeout(Duration::from_secs(5), handle.idle_timeout()).await?);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn stalled_reader_is_disconnected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let handle = start(&dir, Duration::from_secs(60))?;
    let path = socket_path(&handle)?;

    let mut observer = TestClient::connect(handle.client_address()).await?;
    observer.hello().await?;
    observer
        .call("AddMatch", str_body("type='signal',member='NameOwnerChanged'"))
        .await?;

    let mut stalled = TestClient::connect(handle.client_address()).await?;
    let id = stalled.hello().await?;

    // Ping without ever reading the replies, until the daemon hangs up.
    time::timeout(Duration::from_secs(30), async {
        for _ in 0..200_000 {
            let serial = stalled.next_serial();

            let ping = Message::method_call(ObjectPath::ROOT, "Ping", serial)
                .with_interface(PEER_INTERFACE)
                .with_destination(DESTINATION);

            if stalled.send(&ping).await.is_err() {
                break;
            }
        }
    })
    .await?;

    loop {
        let message = observer.recv().await?;

        if message.member() != Some("NameOwnerChanged") {
            continue;
        }

        let mut body = message.body();
        let name = body.read_str()?.to_owned();
        let old = body.read_str()?.to_owned();
        let new = body.read_str()?.to_owned();

        if name == id && old == id && new.is_empty() {
            break;
        }
    }

    // The observer is still served.
    let reply = observer.call("GetId", BodyBuf::new()).await?;
    assert_eq!(reply.body().read_str()?, handle.guid());

    time::timeout(Duration::from_secs(10), handle.shutdown()).await??;
    assert!(!path.exists());
    Ok(())
}

#[tokio::test]
async fn flush_aborts_stalled_writers() -> Result<()> {
    let (mut client, server) = tokio::io::duplex(64);
    let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);

    for n in 1..=16 {
        let serial = std::num::NonZeroU32::new(n).context("serial")?;
        tx.send(Message::method_call(ObjectPath::ROOT, "Ping", serial))
            .await?;
    }

    drop(tx);

    let writer = tokio::spawn(write_loop(
        ":1.0".into(),
        MessageWriter::new(Box::new(server)),
        rx,
    ));

    let mut writers = HashMap::new();
    writers.insert(Box::<str>::from(":1.0"), writer);

    time::timeout(
        Duration::from_secs(5),
        flush(writers, Duration::from_millis(100)),
    )
    .await?;

    // The aborted writer has released its end of the stream.
    let mut received = Vec::new();
    time::timeout(Duration::from_secs(5), client.read_to_end(&mut received)).await??;
    assert!(!received.is_empty());
    Ok(())
}

#[tokio::test]
async fn shutdown_disconnects_and_cleans_up() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let handle = start(&dir, Duration::from_secs(60))?;
    let path = socket_path(&handle)?;
    assert!(path.exists());

    let mut a = TestClient::connect(handle.client_address()).await?;
    a.hello().await?;

    handle.shutdown().await?;

    while let Some(message) = a.recv_or_closed().await? {
        assert_eq!(message.message_type(), MessageType::SIGNAL);
    }

    assert!(!path.exists());
    Ok(())
}

#[cfg(feature = "libc")]
#[tokio::test]
async fn tcp_cookie_authentication() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keyring = dir.path().join("keyrings");

    let daemon = DaemonBuilder::new()
        .address("tcp:host=127.0.0.1")
        .keyring_dir(&keyring)
        .build()?;

    let handle = daemon.start();
    let uid = super::daemon_builder::effective_uid()?;

    let mut a = TestClient::connect_tcp(handle.client_address(), uid, &keyring).await?;
    assert_eq!(a.hello().await?, ":1.0");

    // A second client reuses the cookie created for the first one.
    let mut b = TestClient::connect_tcp(handle.client_address(), uid, &keyring).await?;
    assert_eq!(b.hello().await?, ":1.1");

    let contents = std::fs::read_to_string(keyring.join("org_gtk_gdbus_general"))?;
    assert_eq!(contents.lines().count(), 1);

    // Claiming to be someone else is refused.
    assert!(
        TestClient::connect_tcp(handle.client_address(), uid.wrapping_add(1), &keyring)
            .await
            .is_err()
    );

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn allocated_address() -> Result<()> {
    let daemon = DaemonBuilder::new().build()?;
    assert!(daemon.client_address().contains(",guid="));
    assert_eq!(daemon.guid().len(), 32);

    daemon.start().shutdown().await?;
    Ok(())
}
