use crate::buf::ReadBuf;
use crate::error::{ErrorKind, Result};
use crate::frame::Frame;
use crate::proto::Endianness;
use crate::{ObjectPath, Signature};

/// A reader over the arguments in the body of a [`Message`].
///
/// Every read is checked against the next complete type in the signature of
/// the body.
///
/// [`Message`]: crate::Message
#[derive(Clone)]
pub struct Body<'a> {
    buf: ReadBuf<'a>,
    signature: &'a Signature,
}

/// A string-like argument selected by a match rule.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Arg<'a> {
    String(&'a str),
    ObjectPath(&'a str),
    Other,
}

impl<'a> Body<'a> {
    pub(crate) fn new(bytes: &'a [u8], signature: &'a Signature, endianness: Endianness) -> Self {
        Self {
            buf: ReadBuf::new(bytes, endianness),
            signature,
        }
    }

    /// The signature of the arguments which have not been read yet.
    pub fn signature(&self) -> &'a Signature {
        self.signature
    }

    /// Test if all arguments have been read.
    pub fn is_empty(&self) -> bool {
        self.signature.is_empty()
    }

    /// Load a fixed-size argument.
    pub fn load<T>(&mut self) -> Result<T>
    where
        T: Frame,
    {
        self.expect(T::SIGNATURE)?;
        self.buf.load()
    }

    /// Read a string argument.
    pub fn read_str(&mut self) -> Result<&'a str> {
        self.expect(b"s")?;
        self.buf.read_str()
    }

    /// Read an object path argument.
    pub fn read_object_path(&mut self) -> Result<&'a ObjectPath> {
        self.expect(b"o")?;
        self.buf.read_object_path()
    }

    /// Read a signature argument.
    pub fn read_signature(&mut self) -> Result<&'a Signature> {
        self.expect(b"g")?;
        self.buf.read_signature()
    }

    /// Read an array of strings.
    pub fn read_str_array(&mut self) -> Result<Vec<&'a str>> {
        self.expect(b"as")?;

        let length = self.buf.load::<u32>()? as usize;
        self.buf.align(4)?;
        let end = self.buf.position() + length;

        let mut values = Vec::new();

        while self.buf.position() < end {
            values.push(self.buf.read_str()?);
        }

        Ok(values)
    }

    /// Skip the next argument, whatever its type.
    pub fn skip(&mut self) -> Result<()> {
        let Some((head, tail)) = self.signature.split_first() else {
            return Err(ErrorKind::BodyTypeMismatch.into());
        };

        crate::signature::skip(head, &mut self.buf)?;
        self.signature = tail;
        Ok(())
    }

    /// Select the `n`th argument without consuming anything.
    pub(crate) fn arg(&self, n: usize) -> Option<Arg<'a>> {
        let mut this = self.clone();

        for _ in 0..n {
            this.skip().ok()?;
        }

        let (head, _) = this.signature.split_first()?;

        match head.as_bytes() {
            b"s" => this.read_str().ok().map(Arg::String),
            b"o" => this
                .read_object_path()
                .ok()
                .map(|path| Arg::ObjectPath(path.as_str())),
            _ => Some(Arg::Other),
        }
    }

    fn expect(&mut self, expected: &[u8]) -> Result<()> {
        match self.signature.split_first() {
            Some((head, tail)) if head.as_bytes() == expected => {
                self.signature = tail;
                Ok(())
            }
            _ => Err(ErrorKind::BodyTypeMismatch.into()),
        }
    }
}
