use std::num::NonZeroU32;
use std::sync::Arc;

use crate::message::{Body, MessageKind};
use crate::proto::{Endianness, Flags, MessageType};
use crate::{BodyBuf, ObjectPath, OwnedSignature, Signature};

/// An owned D-Bus message.
///
/// The body is kept in its wire encoding and shared between clones, since the
/// bus never modifies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The kind of the message.
    pub(super) kind: MessageKind,
    /// Serial of the message.
    pub(super) serial: NonZeroU32,
    /// Flags in the message.
    pub(super) flags: Flags,
    /// The interface of the message.
    pub(super) interface: Option<Box<str>>,
    /// The destination of the message.
    pub(super) destination: Option<Box<str>>,
    /// The sender of the message.
    pub(super) sender: Option<Box<str>>,
    /// The signature of the body.
    pub(super) signature: OwnedSignature,
    /// The body associated with the message.
    pub(super) body: Arc<[u8]>,
    /// The endianness of the message.
    pub(super) endianness: Endianness,
}

impl Message {
    fn new(kind: MessageKind, serial: NonZeroU32) -> Self {
        Self {
            kind,
            serial,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            signature: OwnedSignature::empty(),
            body: Arc::from([]),
            endianness: Endianness::NATIVE,
        }
    }

    /// Construct a method call.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use tokio_dbus_daemon::{Message, ObjectPath};
    /// use tokio_dbus_daemon::proto::MessageType;
    ///
    /// let serial = NonZeroU32::MIN;
    /// let m = Message::method_call(ObjectPath::new("/org/freedesktop/DBus")?, "Hello", serial);
    ///
    /// assert_eq!(m.message_type(), MessageType::METHOD_CALL);
    /// assert_eq!(m.member(), Some("Hello"));
    /// # Ok::<_, tokio_dbus_daemon::Error>(())
    /// ```
    pub fn method_call(path: &ObjectPath, member: &str, serial: NonZeroU32) -> Self {
        Self::new(
            MessageKind::MethodCall {
                path: path.as_str().into(),
                member: member.into(),
            },
            serial,
        )
    }

    /// Construct a signal.
    pub fn signal(path: &ObjectPath, interface: &str, member: &str, serial: NonZeroU32) -> Self {
        Self::new(
            MessageKind::Signal {
                path: path.as_str().into(),
                member: member.into(),
            },
            serial,
        )
        .with_interface(interface)
    }

    /// Construct a method return replying to this message.
    ///
    /// The destination of the reply is the sender of this message.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use tokio_dbus_daemon::{Message, MessageKind, ObjectPath};
    ///
    /// let m = Message::method_call(ObjectPath::ROOT, "Ping", NonZeroU32::MIN)
    ///     .with_sender(":1.0");
    ///
    /// let reply = m.method_return(NonZeroU32::MIN.saturating_add(1));
    /// assert_eq!(reply.destination(), Some(":1.0"));
    /// assert!(matches!(reply.kind(), MessageKind::MethodReturn { reply_serial } if *reply_serial == m.serial()));
    /// ```
    pub fn method_return(&self, serial: NonZeroU32) -> Self {
        let mut reply = Self::new(
            MessageKind::MethodReturn {
                reply_serial: self.serial,
            },
            serial,
        );

        reply.destination = self.sender.clone();
        reply
    }

    /// Construct an error replying to this message.
    ///
    /// The destination of the reply is the sender of this message.
    pub fn error(&self, error_name: &str, serial: NonZeroU32) -> Self {
        let mut reply = Self::new(
            MessageKind::Error {
                error_name: error_name.into(),
                reply_serial: self.serial,
            },
            serial,
        );

        reply.destination = self.sender.clone();
        reply
    }

    /// Get the kind of the message.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Get the type of the message.
    pub fn message_type(&self) -> MessageType {
        self.kind.message_type()
    }

    /// Get the serial of the message.
    pub fn serial(&self) -> NonZeroU32 {
        self.serial
    }

    /// Get the reply serial of the message, if it is a reply.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        match self.kind {
            MessageKind::MethodReturn { reply_serial } => Some(reply_serial),
            MessageKind::Error { reply_serial, .. } => Some(reply_serial),
            _ => None,
        }
    }

    /// Get the flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    /// Get the object path of a method call or signal.
    pub fn path(&self) -> Option<&ObjectPath> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } | MessageKind::Signal { path, .. } => {
                Some(ObjectPath::new_unchecked(path))
            }
            _ => None,
        }
    }

    /// Get the member of a method call or signal.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } | MessageKind::Signal { member, .. } => {
                Some(member)
            }
            _ => None,
        }
    }

    /// Get the error name of an error reply.
    pub fn error_name(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::Error { error_name, .. } => Some(error_name),
            _ => None,
        }
    }

    /// Get the interface of the message.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Modify the interface of the message.
    pub fn with_interface(self, interface: &str) -> Self {
        Self {
            interface: Some(interface.into()),
            ..self
        }
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    pub fn with_destination(self, destination: &str) -> Self {
        Self {
            destination: Some(destination.into()),
            ..self
        }
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    pub fn with_sender(self, sender: &str) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self
        }
    }

    /// Get the signature of the body.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the endianness of the message.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Modify the body and signature of the message to match the provided
    /// body buffer, adopting its endianness.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::num::NonZeroU32;
    ///
    /// use tokio_dbus_daemon::{BodyBuf, Message, ObjectPath};
    ///
    /// let mut body = BodyBuf::new();
    /// body.write("com.example.Service");
    /// body.store(4u32);
    ///
    /// let m = Message::method_call(ObjectPath::ROOT, "RequestName", NonZeroU32::MIN)
    ///     .with_body(body);
    ///
    /// assert_eq!(m.signature(), "su");
    ///
    /// let mut body = m.body();
    /// assert_eq!(body.read_str()?, "com.example.Service");
    /// assert_eq!(body.load::<u32>()?, 4);
    /// # Ok::<_, tokio_dbus_daemon::Error>(())
    /// ```
    pub fn with_body(self, body: BodyBuf) -> Self {
        let endianness = body.endianness();
        let (body, signature) = body.into_parts();

        Self {
            signature: Signature::new_unchecked(&signature).to_owned(),
            body: body.into(),
            endianness,
            ..self
        }
    }

    /// Get a reader over the body of the message.
    pub fn body(&self) -> Body<'_> {
        Body::new(&self.body, &self.signature, self.endianness)
    }

    pub(crate) fn set_sender(&mut self, sender: Option<&str>) {
        self.sender = sender.map(Box::from);
    }

    pub(crate) fn set_destination(&mut self, destination: Option<&str>) {
        self.destination = destination.map(Box::from);
    }

    pub(crate) fn set_serial(&mut self, serial: NonZeroU32) {
        self.serial = serial;
    }
}
