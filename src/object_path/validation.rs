/// Test if `bytes` is a valid object path.
pub(super) const fn validate(bytes: &[u8]) -> bool {
    if bytes.is_empty() || bytes[0] != b'/' {
        return false;
    }

    let mut n = 1;
    let mut last = b'/';

    while n < bytes.len() {
        let b = bytes[n];

        match b {
            b'/' if last == b'/' => return false,
            b'/' | b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'_' => {}
            _ => return false,
        }

        last = b;
        n += 1;
    }

    // Only the root path may end in a slash.
    bytes.len() == 1 || last != b'/'
}
