use std::marker::PhantomData;

use crate::buf::padding_to;
use crate::frame::Frame;
use crate::proto::Endianness;
use crate::Write;

/// A growable buffer which keeps track of D-Bus alignment.
///
/// Alignment is relative to the start of the buffer.
#[derive(Clone)]
pub struct AlignedBuf {
    data: Vec<u8>,
    endianness: Endianness,
}

/// A reserved location in an [`AlignedBuf`] which is filled in later.
#[must_use = "Allocations must be filled in with AlignedBuf::store_at"]
pub struct Alloc<T> {
    at: usize,
    _marker: PhantomData<T>,
}

impl AlignedBuf {
    pub(crate) fn new(endianness: Endianness) -> Self {
        Self {
            data: Vec::new(),
            endianness,
        }
    }

    pub(crate) fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn get(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Pad the buffer with zeros up to `align`.
    pub(crate) fn align_mut(&mut self, align: usize) {
        let padding = padding_to(self.data.len(), align);
        self.data.resize(self.data.len() + padding, 0);
    }

    /// Store an aligned frame.
    pub(crate) fn store<T>(&mut self, frame: T)
    where
        T: Frame,
    {
        self.align_mut(T::SIZE);
        frame.store(&mut self.data, self.endianness);
    }

    /// Reserve space for a frame which is stored later.
    pub(crate) fn alloc<T>(&mut self) -> Alloc<T>
    where
        T: Frame,
    {
        self.align_mut(T::SIZE);
        let at = self.data.len();
        self.data.resize(at + T::SIZE, 0);

        Alloc {
            at,
            _marker: PhantomData,
        }
    }

    /// Fill in a previously reserved location.
    pub(crate) fn store_at<T>(&mut self, alloc: Alloc<T>, frame: T)
    where
        T: Frame,
    {
        let mut bytes = Vec::with_capacity(T::SIZE);
        frame.store(&mut bytes, self.endianness);
        self.data[alloc.at..alloc.at + T::SIZE].copy_from_slice(&bytes);
    }

    /// Write a value which has a custom wire encoding.
    pub(crate) fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Write,
    {
        value.write_to(self);
    }

    /// Extend the buffer with raw bytes followed by a NUL byte.
    pub(crate) fn extend_from_slice_nul(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.data.push(0);
    }

    /// Extend the buffer with raw bytes.
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }
}
