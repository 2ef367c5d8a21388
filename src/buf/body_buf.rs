use crate::buf::AlignedBuf;
use crate::frame::Frame;
use crate::proto::{Endianness, Type};
use crate::signature::Signature;
use crate::Write;

/// A buffer used to build the body of a message, keeping track of its
/// signature.
///
/// # Examples
///
/// ```
/// use tokio_dbus_daemon::BodyBuf;
///
/// let mut body = BodyBuf::new();
/// body.write("org.example.Foo");
/// body.store(4u32);
/// body.write_array(["a", "b"]);
///
/// assert_eq!(body.signature(), "suas");
/// ```
#[derive(Clone)]
pub struct BodyBuf {
    buf: AlignedBuf,
    signature: Vec<u8>,
}

impl BodyBuf {
    /// Construct a new body buffer using native endianness.
    pub fn new() -> Self {
        Self::with_endianness(Endianness::NATIVE)
    }

    /// Construct a new body buffer with the given endianness.
    pub fn with_endianness(endianness: Endianness) -> Self {
        Self {
            buf: AlignedBuf::new(endianness),
            signature: Vec::new(),
        }
    }

    /// The endianness of the body.
    pub fn endianness(&self) -> Endianness {
        self.buf.endianness()
    }

    /// The signature of the body built so far.
    pub fn signature(&self) -> &Signature {
        Signature::new_unchecked(&self.signature)
    }

    /// The bytes of the body built so far.
    pub fn get(&self) -> &[u8] {
        self.buf.get()
    }

    /// Store a fixed-size value.
    pub fn store<T>(&mut self, frame: T)
    where
        T: Frame,
    {
        self.signature.extend_from_slice(T::SIGNATURE);
        self.buf.store(frame);
    }

    /// Write a value with a custom encoding, such as a string.
    pub fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Write,
    {
        self.signature.extend_from_slice(T::SIGNATURE);
        self.buf.write(value);
    }

    /// Write an array of values.
    pub fn write_array<'a, I, T>(&mut self, values: I)
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a + ?Sized + Write,
    {
        self.signature.push(b'a');
        self.signature.extend_from_slice(T::SIGNATURE);

        let length = self.buf.alloc::<u32>();

        let align = T::SIGNATURE
            .first()
            .map(|&b| Type::new(b).alignment())
            .unwrap_or(1);

        self.buf.align_mut(align);
        let start = self.buf.len();

        for value in values {
            self.buf.write(value);
        }

        let len = (self.buf.len() - start) as u32;
        self.buf.store_at(length, len);
    }

    pub(crate) fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.buf.into_vec(), self.signature)
    }
}

impl Default for BodyBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
