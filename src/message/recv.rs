use std::num::NonZeroU32;
use std::sync::Arc;

use crate::buf::{padding_to, ReadBuf, MAX_ARRAY_LENGTH, MAX_MESSAGE_LENGTH};
use crate::error::{ErrorKind, Result};
use crate::message::{Message, MessageKind};
use crate::proto::{Endianness, Flags, Header, MessageType, Variant};
use crate::signature::skip;
use crate::Signature;

/// The size of the prefix which determines the length of a message: the fixed
/// header followed by the length of the header field array.
pub(crate) const PREFIX_SIZE: usize = Header::SIZE + 4;

/// Compute the total length of a message from its prefix.
pub(crate) fn message_length(prefix: &[u8; PREFIX_SIZE]) -> Result<usize> {
    let endianness = endianness(prefix[0])?;

    let mut buf = ReadBuf::new(prefix, endianness);
    buf.advance(4)?;
    let body_length = buf.load::<u32>()? as usize;
    buf.advance(4)?;
    let fields_length = buf.load::<u32>()?;

    if fields_length > MAX_ARRAY_LENGTH {
        return Err(ErrorKind::ArrayTooLong(fields_length).into());
    }

    let header = PREFIX_SIZE + fields_length as usize;

    let total = (header + padding_to(header, 8))
        .checked_add(body_length)
        .ok_or(ErrorKind::MessageTooLong(usize::MAX))?;

    if total > MAX_MESSAGE_LENGTH {
        return Err(ErrorKind::MessageTooLong(total).into());
    }

    Ok(total)
}

fn endianness(byte: u8) -> Result<Endianness> {
    match Endianness::new(byte) {
        e @ (Endianness::LITTLE | Endianness::BIG) => Ok(e),
        _ => Err(ErrorKind::InvalidEndianness(byte).into()),
    }
}

/// Decode a complete message.
pub(crate) fn decode(bytes: &[u8]) -> Result<Message> {
    let Some(&first) = bytes.first() else {
        return Err(ErrorKind::BufferUnderflow.into());
    };

    let endianness = endianness(first)?;
    let mut buf = ReadBuf::new(bytes, endianness);

    buf.advance(1)?;

    let header = Header {
        endianness,
        message_type: MessageType::new(buf.load::<u8>()?),
        flags: Flags::from_bits(buf.load::<u8>()?),
        version: buf.load::<u8>()?,
        body_length: buf.load::<u32>()?,
        serial: buf.load::<u32>()?,
    };

    if header.version != 1 {
        return Err(ErrorKind::InvalidVersion(header.version).into());
    }

    let serial = NonZeroU32::new(header.serial).ok_or(ErrorKind::ZeroSerial)?;

    let fields_length = buf.load::<u32>()?;

    if fields_length > MAX_ARRAY_LENGTH {
        return Err(ErrorKind::ArrayTooLong(fields_length).into());
    }

    let end = buf.position() + fields_length as usize;

    let mut path = None;
    let mut interface = None;
    let mut member = None;
    let mut error_name = None;
    let mut reply_serial = None;
    let mut destination = None;
    let mut sender = None;
    let mut signature = Signature::EMPTY;

    while buf.position() < end {
        buf.align(8)?;

        let code = buf.load::<u8>()?;
        let field = buf.read_signature()?;

        let expected: &[u8] = match Variant::new(code) {
            Variant::PATH => b"o",
            Variant::INTERFACE
            | Variant::MEMBER
            | Variant::ERROR_NAME
            | Variant::DESTINATION
            | Variant::SENDER => b"s",
            Variant::REPLY_SERIAL | Variant::UNIX_FDS => b"u",
            Variant::SIGNATURE => b"g",
            _ => {
                // Unknown header fields must be ignored.
                if field.iter().count() != 1 {
                    return Err(ErrorKind::InvalidHeaderField(code).into());
                }

                skip(field, &mut buf)?;
                continue;
            }
        };

        if field.as_bytes() != expected {
            return Err(ErrorKind::InvalidHeaderField(code).into());
        }

        match Variant::new(code) {
            Variant::PATH => path = Some(buf.read_object_path()?),
            Variant::INTERFACE => interface = Some(buf.read_str()?),
            Variant::MEMBER => member = Some(buf.read_str()?),
            Variant::ERROR_NAME => error_name = Some(buf.read_str()?),
            Variant::DESTINATION => destination = Some(buf.read_str()?),
            Variant::SENDER => sender = Some(buf.read_str()?),
            Variant::SIGNATURE => signature = buf.read_signature()?,
            Variant::REPLY_SERIAL => {
                let value = buf.load::<u32>()?;
                reply_serial = Some(NonZeroU32::new(value).ok_or(ErrorKind::ZeroReplySerial)?);
            }
            _ => {
                buf.load::<u32>()?;
            }
        }
    }

    if buf.position() != end {
        return Err(ErrorKind::InvalidProtocol.into());
    }

    buf.align(8)?;
    let body = buf.take(header.body_length as usize)?;

    let kind = match header.message_type {
        MessageType::METHOD_CALL => MessageKind::MethodCall {
            path: path.ok_or(ErrorKind::MissingPath)?.as_str().into(),
            member: member.ok_or(ErrorKind::MissingMember)?.into(),
        },
        MessageType::METHOD_RETURN => MessageKind::MethodReturn {
            reply_serial: reply_serial.ok_or(ErrorKind::MissingReplySerial)?,
        },
        MessageType::ERROR => MessageKind::Error {
            error_name: error_name.ok_or(ErrorKind::MissingErrorName)?.into(),
            reply_serial: reply_serial.ok_or(ErrorKind::MissingReplySerial)?,
        },
        MessageType::SIGNAL => MessageKind::Signal {
            path: path.ok_or(ErrorKind::MissingPath)?.as_str().into(),
            member: member.ok_or(ErrorKind::MissingMember)?.into(),
        },
        other => return Err(ErrorKind::UnknownMessageType(other.get()).into()),
    };

    Ok(Message {
        kind,
        serial,
        flags: header.flags,
        interface: interface.map(Box::from),
        destination: destination.map(Box::from),
        sender: sender.map(Box::from),
        signature: signature.to_owned(),
        body: Arc::from(body),
        endianness: header.endianness,
    })
}
