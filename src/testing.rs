//! A minimal client used to talk to a running daemon in tests.

use std::fs;
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use sha1::{Digest, Sha1};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UnixStream};

use crate::address;
use crate::connection::{MessageReader, MessageWriter, ReadHalf, WriteHalf};
use crate::org_freedesktop_dbus::{DESTINATION, INTERFACE, PATH};
use crate::{BodyBuf, Message};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) struct TestClient {
    reader: MessageReader,
    writer: MessageWriter,
    serial: u32,
}

impl TestClient {
    /// Connect to the unix socket of `address` and authenticate as the
    /// current user.
    pub(crate) async fn connect(address: &str) -> Result<Self> {
        let entries = address::parse(address)?;

        let path = entries
            .iter()
            .find_map(|entry| entry.get("path"))
            .context("address has no unix path")?;

        let stream = UnixStream::connect(path).await?;
        let (read, mut write) = stream.into_split();
        let mut read = BufReader::new(Box::new(read) as ReadHalf);

        write.write_all(b"\0AUTH EXTERNAL\r\n").await?;
        expect_line(&mut read, "DATA\r\n").await?;
        write.write_all(b"DATA\r\n").await?;

        Self::begin(read, Box::new(write)).await
    }

    /// Connect to the tcp entry of `address` and authenticate as `uid` with
    /// `DBUS_COOKIE_SHA1`, reading cookies from `keyring`.
    pub(crate) async fn connect_tcp(address: &str, uid: u32, keyring: &Path) -> Result<Self> {
        let entries = address::parse(address)?;

        let (host, port) = entries
            .iter()
            .find_map(|entry| Some((entry.get("host")?, entry.get("port")?)))
            .context("address has no tcp host")?;

        let stream = TcpStream::connect((host, port.parse::<u16>()?)).await?;
        let (read, mut write) = stream.into_split();
        let mut read = BufReader::new(Box::new(read) as ReadHalf);

        let auth = format!("\0AUTH DBUS_COOKIE_SHA1 {}\r\n", hex::encode(uid.to_string()));
        write.write_all(auth.as_bytes()).await?;

        let mut line = String::new();
        read.read_line(&mut line).await?;

        let Some(data) = line.strip_prefix("DATA ").and_then(|l| l.strip_suffix("\r\n")) else {
            bail!("unexpected response: {line:?}");
        };

        let data = String::from_utf8(hex::decode(data)?)?;
        let mut tokens = data.split(' ');
        let context = tokens.next().context("missing context")?;
        let id = tokens.next().context("missing cookie id")?;
        let challenge = tokens.next().context("missing challenge")?;

        let contents = fs::read_to_string(keyring.join(context))?;

        let secret = contents
            .lines()
            .find_map(|line| {
                let mut tokens = line.split(' ');
                (tokens.next()? == id).then(|| tokens.nth(1))?
            })
            .context("cookie not in keyring")?;

        let client_challenge = hex::encode(rand::random::<[u8; 8]>());
        let digest = Sha1::digest(format!("{challenge}:{client_challenge}:{secret}").as_bytes());
        let response = hex::encode(format!("{client_challenge} {}", hex::encode(digest)));

        write.write_all(format!("DATA {response}\r\n").as_bytes()).await?;
        Self::begin(read, Box::new(write)).await
    }

    async fn begin(mut read: BufReader<ReadHalf>, mut write: WriteHalf) -> Result<Self> {
        let mut line = String::new();
        read.read_line(&mut line).await?;

        if !line.starts_with("OK ") {
            bail!("authentication rejected: {line:?}");
        }

        write.write_all(b"BEGIN\r\n").await?;

        Ok(Self {
            reader: MessageReader::new(read),
            writer: MessageWriter::new(write),
            serial: 0,
        })
    }

    pub(crate) fn next_serial(&mut self) -> NonZeroU32 {
        self.serial += 1;
        NonZeroU32::new(self.serial).unwrap_or(NonZeroU32::MIN)
    }

    pub(crate) async fn send(&mut self, message: &Message) -> Result<()> {
        self.writer.write(message).await?;
        Ok(())
    }

    /// Call a method on the bus and wait for its reply, skipping any other
    /// message received in the meantime.
    pub(crate) async fn call(&mut self, member: &str, body: BodyBuf) -> Result<Message> {
        let serial = self.next_serial();

        let message = Message::method_call(PATH, member, serial)
            .with_interface(INTERFACE)
            .with_destination(DESTINATION)
            .with_body(body);

        self.send(&message).await?;

        loop {
            let message = self.recv().await?;

            if message.reply_serial() == Some(serial) {
                return Ok(message);
            }
        }
    }

    pub(crate) async fn hello(&mut self) -> Result<String> {
        let reply = self.call("Hello", BodyBuf::new()).await?;
        Ok(reply.body().read_str()?.to_owned())
    }

    /// Receive the next message.
    pub(crate) async fn recv(&mut self) -> Result<Message> {
        let message = tokio::time::timeout(RECV_TIMEOUT, self.reader.read())
            .await
            .context("timed out waiting for message")??;

        message.ok_or_else(|| anyhow!("connection closed"))
    }

    /// Receive the next message, or `None` if the daemon closed the
    /// connection.
    pub(crate) async fn recv_or_closed(&mut self) -> Result<Option<Message>> {
        let message = tokio::time::timeout(RECV_TIMEOUT, self.reader.read())
            .await
            .context("timed out waiting for message")?;

        match message {
            Ok(message) => Ok(message),
            Err(error) if error.is_closed() => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}

async fn expect_line(read: &mut BufReader<ReadHalf>, expected: &str) -> Result<()> {
    let mut line = String::new();
    read.read_line(&mut line).await?;

    if line != expected {
        bail!("unexpected response: {line:?}");
    }

    Ok(())
}
