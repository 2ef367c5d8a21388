//! Types for dealing with buffers.

#[cfg(test)]
mod tests;

pub(crate) use self::read_buf::ReadBuf;
mod read_buf;

pub use self::aligned_buf::{AlignedBuf, Alloc};
mod aligned_buf;

pub use self::body_buf::BodyBuf;
mod body_buf;

/// The maximum length of an array in bytes.
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1u32 << 26;

/// The maximum length of a message, including header and body.
pub(crate) const MAX_MESSAGE_LENGTH: usize = 1usize << 27;

/// Calculate padding with the assumption that alignment is a power of two.
#[inline(always)]
pub(crate) fn padding_to(len: usize, align: usize) -> usize {
    let mask = align - 1;
    (align - (len & mask)) & mask
}
