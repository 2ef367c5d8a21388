use crate::buf::AlignedBuf;
use crate::{ObjectPath, Signature};

mod sealed {
    use crate::{ObjectPath, Signature};

    pub trait Sealed {}

    impl Sealed for str {}
    impl Sealed for ObjectPath {}
    impl Sealed for Signature {}
}

/// A value with a variable-length wire encoding that can be written to a
/// buffer.
pub trait Write: self::sealed::Sealed {
    /// The signature of the value.
    #[doc(hidden)]
    const SIGNATURE: &'static [u8];

    /// Write `self` into `buf`.
    #[doc(hidden)]
    fn write_to(&self, buf: &mut AlignedBuf);
}

/// Write a length-prefixed string to the buffer.
///
/// # Examples
///
/// ```
/// use tokio_dbus_daemon::BodyBuf;
/// use tokio_dbus_daemon::proto::Endianness;
///
/// let mut body = BodyBuf::with_endianness(Endianness::LITTLE);
/// body.write("foo");
///
/// assert_eq!(body.get(), &[3, 0, 0, 0, 102, 111, 111, 0]);
/// ```
impl Write for str {
    const SIGNATURE: &'static [u8] = b"s";

    #[inline]
    fn write_to(&self, buf: &mut AlignedBuf) {
        buf.store(self.len() as u32);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}

impl Write for ObjectPath {
    const SIGNATURE: &'static [u8] = b"o";

    #[inline]
    fn write_to(&self, buf: &mut AlignedBuf) {
        self.as_str().write_to(buf);
    }
}

/// Write a signature, which is prefixed by a single length byte.
///
/// # Examples
///
/// ```
/// use tokio_dbus_daemon::{BodyBuf, Signature};
///
/// let mut body = BodyBuf::new();
/// body.write(Signature::new("as")?);
///
/// assert_eq!(body.get(), &[2, b'a', b's', 0]);
/// # Ok::<_, tokio_dbus_daemon::SignatureError>(())
/// ```
impl Write for Signature {
    const SIGNATURE: &'static [u8] = b"g";

    #[inline]
    fn write_to(&self, buf: &mut AlignedBuf) {
        buf.store(self.len() as u8);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}
