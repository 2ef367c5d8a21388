use crate::buf::{ReadBuf, MAX_ARRAY_LENGTH};
use crate::error::{ErrorKind, Result};
use crate::proto::Type;

use super::{Signature, MAX_DEPTH};

/// Skip over values in `buf` described by `signature`.
///
/// Array contents are skipped by length, so only the framing of the value is
/// checked.
pub(crate) fn skip(signature: &Signature, buf: &mut ReadBuf<'_>) -> Result<()> {
    let mut rest = signature;

    while let Some((head, tail)) = rest.split_first() {
        skip_one(head, buf, 0)?;
        rest = tail;
    }

    Ok(())
}

/// Skip a single complete type.
fn skip_one(signature: &Signature, buf: &mut ReadBuf<'_>, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(ErrorKind::InvalidProtocol.into());
    }

    let Some((&first, _)) = signature.as_bytes().split_first() else {
        return Err(ErrorKind::InvalidProtocol.into());
    };

    match Type::new(first) {
        Type::BYTE => {
            buf.load::<u8>()?;
        }
        Type::INT16 | Type::UINT16 => {
            buf.load::<u16>()?;
        }
        Type::BOOLEAN | Type::INT32 | Type::UINT32 | Type::UNIX_FD => {
            buf.load::<u32>()?;
        }
        Type::INT64 | Type::UINT64 | Type::DOUBLE => {
            buf.load::<u64>()?;
        }
        Type::STRING => {
            buf.read_str()?;
        }
        Type::OBJECT_PATH => {
            buf.read_object_path()?;
        }
        Type::SIGNATURE => {
            buf.read_signature()?;
        }
        Type::VARIANT => {
            let inner = buf.read_signature()?;

            let mut types = inner.iter();

            let (Some(inner), None) = (types.next(), types.next()) else {
                return Err(ErrorKind::InvalidProtocol.into());
            };

            skip_one(inner, buf, depth + 1)?;
        }
        Type::ARRAY => {
            let length = buf.load::<u32>()?;

            if length > MAX_ARRAY_LENGTH {
                return Err(ErrorKind::ArrayTooLong(length).into());
            }

            let element = signature.as_bytes().get(1).copied().unwrap_or(b'y');
            buf.align(Type::new(element).alignment())?;
            buf.advance(length as usize)?;
        }
        Type::OPEN_PAREN | Type::OPEN_BRACE => {
            buf.align(8)?;

            let bytes = signature.as_bytes();
            let fields = Signature::new_unchecked(&bytes[1..bytes.len() - 1]);

            for field in fields.iter() {
                skip_one(field, buf, depth + 1)?;
            }
        }
        _ => return Err(ErrorKind::InvalidProtocol.into()),
    }

    Ok(())
}
