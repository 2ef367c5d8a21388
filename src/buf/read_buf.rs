use std::str::from_utf8;

use crate::buf::padding_to;
use crate::error::{ErrorKind, Result};
use crate::frame::Frame;
use crate::proto::Endianness;
use crate::{ObjectPath, Signature};

/// A cursor over a borrowed, aligned D-Bus buffer.
///
/// Alignment is computed relative to the start of the underlying slice, which
/// must therefore be 8-byte aligned on the wire.
#[derive(Clone)]
pub(crate) struct ReadBuf<'a> {
    data: &'a [u8],
    pos: usize,
    endianness: Endianness,
}

impl<'a> ReadBuf<'a> {
    pub(crate) fn new(data: &'a [u8], endianness: Endianness) -> Self {
        Self {
            data,
            pos: 0,
            endianness,
        }
    }

    /// The number of bytes read so far.
    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Test if there are no more bytes to read.
    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Skip over padding up to `align`.
    pub(crate) fn align(&mut self, align: usize) -> Result<()> {
        self.advance(padding_to(self.pos, align))
    }

    /// Skip over `n` bytes.
    pub(crate) fn advance(&mut self, n: usize) -> Result<()> {
        self.take(n)?;
        Ok(())
    }

    /// Take the next `n` bytes from the buffer.
    pub(crate) fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(ErrorKind::BufferUnderflow)?;

        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Load an aligned frame.
    pub(crate) fn load<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        self.align(T::SIZE)?;
        let bytes = self.take(T::SIZE)?;
        Ok(T::load(bytes, self.endianness))
    }

    /// Read a string, which is prefixed by a `u32` length and followed by a
    /// NUL byte.
    pub(crate) fn read_str(&mut self) -> Result<&'a str> {
        let len = self.load::<u32>()? as usize;
        let bytes = self.take_nul_terminated(len)?;
        Ok(from_utf8(bytes)?)
    }

    /// Read a signature, which is prefixed by a `u8` length and followed by a
    /// NUL byte.
    pub(crate) fn read_signature(&mut self) -> Result<&'a Signature> {
        let len = self.load::<u8>()? as usize;
        let bytes = self.take_nul_terminated(len)?;
        Ok(Signature::new(bytes)?)
    }

    /// Read an object path.
    pub(crate) fn read_object_path(&mut self) -> Result<&'a ObjectPath> {
        let path = self.read_str()?;
        Ok(ObjectPath::new(path)?)
    }

    fn take_nul_terminated(&mut self, len: usize) -> Result<&'a [u8]> {
        let bytes = self.take(len)?;

        if self.take(1)? != [0] || bytes.contains(&0) {
            return Err(ErrorKind::NotNullTerminated.into());
        }

        Ok(bytes)
    }
}
