use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};

use crate::error::Result;
use crate::message::{decode, encode, message_length, PREFIX_SIZE};
use crate::Message;

use super::{ReadHalf, WriteHalf};

/// Reads framed messages from a connection.
pub(crate) struct MessageReader {
    reader: BufReader<ReadHalf>,
}

impl MessageReader {
    pub(crate) fn new(reader: BufReader<ReadHalf>) -> Self {
        Self { reader }
    }

    /// Read the next message, or `None` if the peer closed the connection
    /// between messages.
    pub(crate) async fn read(&mut self) -> Result<Option<Message>> {
        let mut prefix = [0u8; PREFIX_SIZE];

        if self.reader.read(&mut prefix[..1]).await? == 0 {
            return Ok(None);
        }

        self.reader.read_exact(&mut prefix[1..]).await?;

        let length = message_length(&prefix)?;
        let mut bytes = vec![0u8; length];
        bytes[..PREFIX_SIZE].copy_from_slice(&prefix);
        self.reader.read_exact(&mut bytes[PREFIX_SIZE..]).await?;

        Ok(Some(decode(&bytes)?))
    }
}

/// Writes framed messages to a connection.
pub(crate) struct MessageWriter {
    writer: WriteHalf,
}

impl MessageWriter {
    pub(crate) fn new(writer: WriteHalf) -> Self {
        Self { writer }
    }

    pub(crate) async fn write(&mut self, message: &Message) -> Result<()> {
        let bytes = encode(message);
        self.writer.write_all(&bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write side of the connection.
    pub(crate) async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
