/// Strip the line terminator and any other trailing whitespace.
pub(crate) fn trim_line(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |n| n + 1);

    &line[..end]
}

/// Split off the first space-separated word of `line`.
pub(crate) fn split_word(line: &[u8]) -> (&[u8], Option<&[u8]>) {
    match line.iter().position(|&b| b == b' ') {
        Some(n) => (&line[..n], Some(&line[n + 1..])),
        None => (line, None),
    }
}
