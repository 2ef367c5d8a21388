use crate::buf::AlignedBuf;
use crate::message::{Message, MessageKind};
use crate::proto::Variant;
use crate::{ObjectPath, Signature, Write};

/// Encode a message in its own endianness.
///
/// The body is copied verbatim, only the header is marshalled.
pub(crate) fn encode(message: &Message) -> Vec<u8> {
    let mut buf = AlignedBuf::new(message.endianness);

    buf.store(message.endianness.get());
    buf.store(message.message_type().get());
    buf.store(message.flags.bits());
    buf.store(1u8);
    buf.store(message.body.len() as u32);
    buf.store(message.serial.get());

    let length = buf.alloc::<u32>();
    let start = buf.len();

    match &message.kind {
        MessageKind::MethodCall { path, member } | MessageKind::Signal { path, member } => {
            field(&mut buf, Variant::PATH, ObjectPath::new_unchecked(path));

            if let Some(interface) = message.interface.as_deref() {
                field(&mut buf, Variant::INTERFACE, interface);
            }

            field(&mut buf, Variant::MEMBER, &**member);
        }
        MessageKind::MethodReturn { reply_serial } => {
            if let Some(interface) = message.interface.as_deref() {
                field(&mut buf, Variant::INTERFACE, interface);
            }

            field_u32(&mut buf, Variant::REPLY_SERIAL, reply_serial.get());
        }
        MessageKind::Error {
            error_name,
            reply_serial,
        } => {
            if let Some(interface) = message.interface.as_deref() {
                field(&mut buf, Variant::INTERFACE, interface);
            }

            field(&mut buf, Variant::ERROR_NAME, &**error_name);
            field_u32(&mut buf, Variant::REPLY_SERIAL, reply_serial.get());
        }
    }

    if let Some(destination) = message.destination.as_deref() {
        field(&mut buf, Variant::DESTINATION, destination);
    }

    if let Some(sender) = message.sender.as_deref() {
        field(&mut buf, Variant::SENDER, sender);
    }

    if !message.signature.is_empty() {
        field(&mut buf, Variant::SIGNATURE, &*message.signature);
    }

    let fields_length = (buf.len() - start) as u32;
    buf.store_at(length, fields_length);

    buf.align_mut(8);
    buf.extend_from_slice(&message.body);
    buf.into_vec()
}

fn field<T>(buf: &mut AlignedBuf, code: Variant, value: &T)
where
    T: ?Sized + Write,
{
    buf.align_mut(8);
    buf.store(code.get());
    buf.write(Signature::new_unchecked(T::SIGNATURE));
    buf.write(value);
}

fn field_u32(buf: &mut AlignedBuf, code: Variant, value: u32) {
    buf.align_mut(8);
    buf.store(code.get());
    buf.write(Signature::new_unchecked(b"u"));
    buf.store(value);
}
