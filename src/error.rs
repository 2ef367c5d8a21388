use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::sasl::SaslFailure;
use crate::{ObjectPathError, SignatureError};

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Test if the error indicates that the remote end closed the connection.
    pub fn is_closed(&self) -> bool {
        match &self.kind {
            ErrorKind::Io(error) => matches!(
                error.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(_: ObjectPathError) -> Self {
        Self::new(ErrorKind::InvalidObjectPath)
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::InvalidAddress(address) => write!(f, "Invalid d-bus address `{address}`"),
            ErrorKind::UnsupportedAddress(address) => {
                write!(f, "No supported transport in d-bus address `{address}`")
            }
            ErrorKind::InvalidProtocol => write!(f, "Invalid protocol"),
            ErrorKind::InvalidEndianness(byte) => write!(f, "Invalid endianness marker {byte:#x}"),
            ErrorKind::InvalidVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::InvalidHeaderField(code) => {
                write!(f, "Header field {code} has the wrong type")
            }
            ErrorKind::InvalidObjectPath => write!(f, "Invalid object path"),
            ErrorKind::BodyTypeMismatch => write!(f, "Body argument has an unexpected type"),
            ErrorKind::UnknownMessageType(value) => write!(f, "Unknown message type {value}"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingReplySerial => write!(f, "Missing required REPLY_SERIAL header"),
            ErrorKind::MissingErrorName => write!(f, "Missing required ERROR_NAME header"),
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ZeroReplySerial => write!(f, "Zero REPLY_SERIAL header"),
            ErrorKind::NotNullTerminated => write!(f, "String is not null terminated"),
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::MessageTooLong(length) => {
                write!(f, "Message of length {length} is too long (max is 134217728)")
            }
            ErrorKind::SaslLineTooLong => write!(f, "SASL line is too long"),
            ErrorKind::SaslMissingNul => write!(f, "Missing credentials byte before SASL"),
            ErrorKind::Sasl(failure) => write!(f, "Authentication failed: {failure}"),
            ErrorKind::InvalidNonce => write!(f, "Nonce mismatch"),
            ErrorKind::SameUserUnsupported => write!(
                f,
                "Same-user authentication requires the `libc` feature to be enabled"
            ),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    Utf8Error(Utf8Error),
    BufferUnderflow,
    InvalidAddress(Box<str>),
    UnsupportedAddress(Box<str>),
    InvalidProtocol,
    InvalidEndianness(u8),
    InvalidVersion(u8),
    InvalidHeaderField(u8),
    InvalidObjectPath,
    BodyTypeMismatch,
    UnknownMessageType(u8),
    MissingPath,
    MissingMember,
    MissingReplySerial,
    MissingErrorName,
    ZeroSerial,
    ZeroReplySerial,
    NotNullTerminated,
    ArrayTooLong(u32),
    MessageTooLong(usize),
    SaslLineTooLong,
    SaslMissingNul,
    Sasl(SaslFailure),
    InvalidNonce,
    #[cfg_attr(feature = "libc", allow(unused))]
    SameUserUnsupported,
}
