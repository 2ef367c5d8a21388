use std::error;
use std::fmt;

use super::validate;

/// The error raised when a string is not a valid [`ObjectPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub struct ObjectPathError;

impl fmt::Display for ObjectPathError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Not a valid object path")
    }
}

impl error::Error for ObjectPathError {}

/// A validated object path.
///
/// The following rules define a [valid object path]:
///
/// [valid object path]: https://dbus.freedesktop.org/doc/dbus-specification.html#message-protocol-marshaling-object-path
///
/// * The path must begin with an ASCII '/' character, and must consist of
///   elements separated by slash characters.
/// * Each element must only contain the ASCII characters "[A-Z][a-z][0-9]_".
/// * No element may be the empty string.
/// * A trailing '/' character is not allowed unless the path is the root path.
#[derive(PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ObjectPath(str);

impl ObjectPath {
    /// The special `"/"` object path.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_daemon::ObjectPath;
    ///
    /// assert_eq!(ObjectPath::ROOT, ObjectPath::new("/")?);
    /// # Ok::<_, tokio_dbus_daemon::ObjectPathError>(())
    /// ```
    pub const ROOT: &'static Self = Self::new_const("/");

    /// Construct a new object path.
    ///
    /// # Panics
    ///
    /// Panics if the argument is not a valid object path.
    #[track_caller]
    pub const fn new_const(path: &str) -> &Self {
        if !validate(path.as_bytes()) {
            panic!("Invalid D-Bus object path");
        }

        Self::new_unchecked(path)
    }

    /// Construct a new validated object path.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_daemon::ObjectPath;
    ///
    /// assert!(ObjectPath::new("/org/freedesktop/DBus").is_ok());
    /// assert!(ObjectPath::new("/org/").is_err());
    /// ```
    pub fn new<P>(path: &P) -> Result<&Self, ObjectPathError>
    where
        P: ?Sized + AsRef<str>,
    {
        let path = path.as_ref();

        if !validate(path.as_bytes()) {
            return Err(ObjectPathError);
        }

        Ok(Self::new_unchecked(path))
    }

    pub(crate) const fn new_unchecked(path: &str) -> &Self {
        // SAFETY: The string slice is repr transparent over this type.
        unsafe { &*(path as *const str as *const ObjectPath) }
    }

    /// Get the object path as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Test if this path is `namespace` or a descendant of it.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_daemon::ObjectPath;
    ///
    /// let ns = ObjectPath::new("/org/example")?;
    ///
    /// assert!(ObjectPath::new("/org/example")?.starts_with(ns));
    /// assert!(ObjectPath::new("/org/example/Foo")?.starts_with(ns));
    /// assert!(!ObjectPath::new("/org/examples")?.starts_with(ns));
    /// assert!(ObjectPath::new("/org/examples")?.starts_with(ObjectPath::ROOT));
    /// # Ok::<_, tokio_dbus_daemon::ObjectPathError>(())
    /// ```
    pub fn starts_with(&self, namespace: &ObjectPath) -> bool {
        if namespace == ObjectPath::ROOT {
            return true;
        }

        match self.0.strip_prefix(&namespace.0) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for ObjectPath {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for ObjectPath {
    #[inline]
    fn eq(&self, other: &str) -> bool {
        self.0 == *other
    }
}
