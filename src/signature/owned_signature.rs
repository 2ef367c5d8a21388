use std::fmt;
use std::ops::Deref;

use super::{Signature, SignatureError};

/// An owned D-Bus signature.
#[derive(Default, Clone, Hash, PartialEq, Eq)]
pub struct OwnedSignature(Box<[u8]>);

impl OwnedSignature {
    /// The empty owned signature.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Construct a new owned signature, validating it.
    pub fn new<B>(bytes: &B) -> Result<Self, SignatureError>
    where
        B: ?Sized + AsRef<[u8]>,
    {
        Ok(Signature::new(bytes)?.to_owned())
    }

    pub(super) fn from_signature(signature: &Signature) -> Self {
        Self(signature.as_bytes().into())
    }
}

impl Deref for OwnedSignature {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Self::Target {
        Signature::new_unchecked(&self.0)
    }
}

impl AsRef<Signature> for OwnedSignature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl fmt::Display for OwnedSignature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl fmt::Debug for OwnedSignature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl PartialEq<Signature> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        **self == *other
    }
}

impl PartialEq<&Signature> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        **self == **other
    }
}

impl PartialEq<&str> for OwnedSignature {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        **self == *other
    }
}
