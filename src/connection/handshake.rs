use std::io;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::task;

use crate::error::{ErrorKind, Result};
use crate::sasl::{Cookie, Keyring, Policy, SaslServer, Step, CONTEXT, MAX_LINE_LENGTH};

use super::{MessageReader, MessageWriter, Stream};

/// Authenticate an accepted stream, returning the framed halves of the
/// connection once the client has sent `BEGIN`.
pub(crate) async fn handshake(
    stream: Stream,
    nonce: Option<[u8; 16]>,
    guid: &str,
    policy: Policy,
) -> Result<(MessageReader, MessageWriter)> {
    let peer_uid = stream.peer_uid();
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    if let Some(expected) = nonce {
        let mut nonce = [0u8; 16];
        reader.read_exact(&mut nonce).await?;

        if nonce != expected {
            return Err(ErrorKind::InvalidNonce.into());
        }
    }

    if reader.read_u8().await? != 0 {
        return Err(ErrorKind::SaslMissingNul.into());
    }

    let mut sasl = SaslServer::new(guid, policy, peer_uid);
    let mut line = Vec::new();

    'handshake: loop {
        line.clear();

        (&mut reader)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if line.last() != Some(&b'\n') {
            if line.len() < MAX_LINE_LENGTH {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }

            return Err(ErrorKind::SaslLineTooLong.into());
        }

        let mut step = sasl.feed(&line);

        loop {
            match step {
                Step::Reply(reply) => {
                    write.write_all(&reply).await?;
                    write.flush().await?;
                    break;
                }
                Step::LoadCookie(keyring) => {
                    step = sasl.challenge(load_cookie(keyring).await);
                }
                Step::Begin => break 'handshake,
                Step::Close(failure) => return Err(ErrorKind::Sasl(failure).into()),
            }
        }
    }

    Ok((MessageReader::new(reader), MessageWriter::new(write)))
}

/// Keyring access takes a file lock, so it runs on the blocking pool.
async fn load_cookie(keyring: Keyring) -> io::Result<Cookie> {
    match task::spawn_blocking(move || keyring.cookie(CONTEXT)).await {
        Ok(result) => result,
        Err(error) => Err(io::Error::other(error)),
    }
}
