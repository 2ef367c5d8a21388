//! Validation of bus names.

/// The maximum length of a bus name.
const MAX_LENGTH: usize = 255;

/// Test if `name` is a valid bus name, either unique (`:1.42`) or well-known
/// (`com.example.Service`).
pub(crate) fn is_name(name: &str) -> bool {
    match name.strip_prefix(':') {
        Some(rest) => validate(name.len(), rest, true),
        None => validate(name.len(), name, false),
    }
}

/// Test if `name` is a valid unique name such as `:1.42`.
pub(crate) fn is_unique_name(name: &str) -> bool {
    match name.strip_prefix(':') {
        Some(rest) => validate(name.len(), rest, true),
        None => false,
    }
}

fn validate(len: usize, rest: &str, unique: bool) -> bool {
    if len == 0 || len > MAX_LENGTH {
        return false;
    }

    let mut elements = 0;

    for element in rest.split('.') {
        let bytes = element.as_bytes();

        let Some(first) = bytes.first() else {
            return false;
        };

        if !unique && first.is_ascii_digit() {
            return false;
        }

        if !bytes
            .iter()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-'))
        {
            return false;
        }

        elements += 1;
    }

    elements >= 2
}
