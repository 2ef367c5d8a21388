use std::borrow::Borrow;
use std::fmt;
use std::str::from_utf8_unchecked;

use super::validation::validate;
use super::{OwnedSignature, SignatureError};

/// A D-Bus signature.
///
/// # Examples
///
/// ```
/// use tokio_dbus_daemon::Signature;
///
/// assert!(Signature::new(b"a{sv}").is_ok());
/// assert!(Signature::new(b"a{vs}").is_err());
/// assert_eq!(Signature::new(b"sas")?.iter().count(), 2);
/// # Ok::<_, tokio_dbus_daemon::SignatureError>(())
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_unchecked(b"");

    /// A single string.
    pub const STRING: &'static Signature = Signature::new_unchecked(b"s");

    /// A single unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_unchecked(b"u");

    /// A single boolean.
    pub const BOOLEAN: &'static Signature = Signature::new_unchecked(b"b");

    /// Construct a new signature, validating it.
    pub fn new<B>(bytes: &B) -> Result<&Signature, SignatureError>
    where
        B: ?Sized + AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();
        validate(bytes)?;
        Ok(Self::new_unchecked(bytes))
    }

    /// Construct a signature which must consist of exactly one complete
    /// type, as is required for variants.
    pub fn new_single<B>(bytes: &B) -> Result<&Signature, SignatureError>
    where
        B: ?Sized + AsRef<[u8]>,
    {
        let bytes = bytes.as_ref();

        if validate(bytes)? != 1 {
            return Err(SignatureError::NotSingleCompleteType);
        }

        Ok(Self::new_unchecked(bytes))
    }

    pub(crate) const fn new_unchecked(bytes: &[u8]) -> &Signature {
        // SAFETY: Signature is repr(transparent) over [u8].
        unsafe { &*(bytes as *const [u8] as *const Signature) }
    }

    /// Test if the signature is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the length of the signature in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the signature as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the signature as a string.
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation only permits ASCII type codes.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Iterate over the complete types in the signature.
    pub fn iter(&self) -> Iter<'_> {
        Iter { rest: &self.0 }
    }

    /// Split off the first complete type of the signature.
    pub(crate) fn split_first(&self) -> Option<(&Signature, &Signature)> {
        let n = single_type_len(&self.0)?;
        let (head, tail) = self.0.split_at(n);
        Some((Self::new_unchecked(head), Self::new_unchecked(tail)))
    }
}

/// Get the length of the complete type which starts `bytes`.
fn single_type_len(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;

    for (n, &b) in bytes.iter().enumerate() {
        match b {
            b'a' => continue,
            b'(' | b'{' => depth += 1,
            b')' | b'}' => depth = depth.checked_sub(1)?,
            _ => {}
        }

        if depth == 0 {
            return Some(n + 1);
        }
    }

    None
}

/// Iterator over the complete types of a [`Signature`].
pub struct Iter<'a> {
    rest: &'a [u8],
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Signature;

    fn next(&mut self) -> Option<Self::Item> {
        let n = single_type_len(self.rest)?;
        let (head, tail) = self.rest.split_at(n);
        self.rest = tail;
        Some(Signature::new_unchecked(head))
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

impl AsRef<[u8]> for Signature {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ToOwned for Signature {
    type Owned = OwnedSignature;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        OwnedSignature::from_signature(self)
    }
}

impl Borrow<Signature> for OwnedSignature {
    #[inline]
    fn borrow(&self) -> &Signature {
        self
    }
}

impl PartialEq<str> for Signature {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other.as_bytes()
    }
}

impl PartialEq<&str> for Signature {
    #[inline]
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other.as_bytes()
    }
}
