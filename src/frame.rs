use crate::proto::Endianness;

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A verbatim frame that can be stored and loaded from a buffer.
///
/// This is implemented for fixed-size primitives such as `u32`. The alignment
/// of a frame on the wire is the same as its size.
pub trait Frame: Copy + self::sealed::Sealed {
    /// The signature of the frame.
    #[doc(hidden)]
    const SIGNATURE: &'static [u8];

    /// The size in bytes of the frame, which is also its alignment.
    #[doc(hidden)]
    const SIZE: usize;

    /// Load the frame from exactly [`Frame::SIZE`] bytes.
    #[doc(hidden)]
    fn load(bytes: &[u8], endianness: Endianness) -> Self;

    /// Store the frame at the end of `out`.
    #[doc(hidden)]
    fn store(self, out: &mut Vec<u8>, endianness: Endianness);
}

macro_rules! impl_number {
    ($($ty:ty, $signature:literal),* $(,)?) => {
        $(
            impl self::sealed::Sealed for $ty {}

            impl Frame for $ty {
                const SIGNATURE: &'static [u8] = $signature;
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn load(bytes: &[u8], endianness: Endianness) -> Self {
                    let mut array = [0; std::mem::size_of::<$ty>()];
                    array.copy_from_slice(&bytes[..Self::SIZE]);

                    if endianness == Endianness::BIG {
                        <$ty>::from_be_bytes(array)
                    } else {
                        <$ty>::from_le_bytes(array)
                    }
                }

                #[inline]
                fn store(self, out: &mut Vec<u8>, endianness: Endianness) {
                    if endianness == Endianness::BIG {
                        out.extend_from_slice(&self.to_be_bytes());
                    } else {
                        out.extend_from_slice(&self.to_le_bytes());
                    }
                }
            }
        )*
    }
}

impl_number! {
    u8, b"y",
    i16, b"n",
    u16, b"q",
    i32, b"i",
    u32, b"u",
    i64, b"x",
    u64, b"t",
    f64, b"d",
}

impl self::sealed::Sealed for bool {}

/// Booleans are encoded as a `u32` which is either 0 or 1.
impl Frame for bool {
    const SIGNATURE: &'static [u8] = b"b";
    const SIZE: usize = 4;

    #[inline]
    fn load(bytes: &[u8], endianness: Endianness) -> Self {
        u32::load(bytes, endianness) != 0
    }

    #[inline]
    fn store(self, out: &mut Vec<u8>, endianness: Endianness) {
        u32::from(self).store(out, endianness);
    }
}
