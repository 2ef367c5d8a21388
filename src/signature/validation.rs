use crate::proto::Type;

use super::{SignatureError, MAX_CONTAINER_DEPTH, MAX_DEPTH};

#[derive(Debug, Clone, Copy)]
enum Kind {
    Array,
    Struct,
    Dict,
}

/// Validate a signature, returning the number of complete types it contains.
pub(super) fn validate(bytes: &[u8]) -> Result<usize, SignatureError> {
    use SignatureError::*;

    if bytes.len() > u8::MAX as usize {
        return Err(SignatureTooLong);
    }

    let mut stack = Vec::<(Kind, u8)>::new();
    let mut arrays = 0;
    let mut structs = 0;
    let mut complete = 0;

    for &b in bytes {
        let mut is_basic = match Type::new(b) {
            Type::BYTE
            | Type::BOOLEAN
            | Type::INT16
            | Type::UINT16
            | Type::INT32
            | Type::UINT32
            | Type::INT64
            | Type::UINT64
            | Type::DOUBLE
            | Type::STRING
            | Type::OBJECT_PATH
            | Type::SIGNATURE
            | Type::UNIX_FD => true,
            Type::VARIANT => false,
            Type::ARRAY => {
                if stack.len() == MAX_DEPTH || arrays == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumArrayRecursion);
                }

                stack.push((Kind::Array, 0));
                arrays += 1;
                continue;
            }
            Type::OPEN_PAREN => {
                if stack.len() == MAX_DEPTH || structs == MAX_CONTAINER_DEPTH {
                    return Err(ExceededMaximumStructRecursion);
                }

                stack.push((Kind::Struct, 0));
                structs += 1;
                continue;
            }
            Type::CLOSE_PAREN => {
                match stack.pop() {
                    Some((Kind::Struct, 0)) => return Err(StructHasNoFields),
                    Some((Kind::Struct, _)) => {}
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(StructEndedButNotStarted),
                }

                structs -= 1;
                false
            }
            Type::OPEN_BRACE => {
                if stack.len() == MAX_DEPTH {
                    return Err(ExceededMaximumDictRecursion);
                }

                if !matches!(stack.last(), Some((Kind::Array, _))) {
                    return Err(DictEntryNotInsideArray);
                }

                stack.push((Kind::Dict, 0));
                continue;
            }
            Type::CLOSE_BRACE => {
                match stack.pop() {
                    Some((Kind::Dict, 0)) => return Err(DictEntryHasNoFields),
                    Some((Kind::Dict, 1)) => return Err(DictEntryHasOnlyOneField),
                    Some((Kind::Dict, 2)) => {}
                    Some((Kind::Dict, _)) => return Err(DictEntryHasTooManyFields),
                    Some((Kind::Array, _)) => return Err(MissingArrayElementType),
                    _ => return Err(DictEndedButNotStarted),
                }

                false
            }
            _ => return Err(UnknownTypeCode(b)),
        };

        while let Some((Kind::Array, _)) = stack.last() {
            stack.pop();
            arrays -= 1;
            is_basic = false;
        }

        match stack.last_mut() {
            Some((Kind::Dict, 0)) if !is_basic => return Err(DictKeyMustBeBasicType),
            Some((_, n)) => *n = n.saturating_add(1),
            None => complete += 1,
        }
    }

    match stack.last() {
        Some((Kind::Array, _)) => Err(MissingArrayElementType),
        Some((Kind::Struct, _)) => Err(StructStartedButNotEnded),
        Some((Kind::Dict, _)) => Err(DictStartedButNotEnded),
        None => Ok(complete),
    }
}
