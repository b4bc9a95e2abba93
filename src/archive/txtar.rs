//! Codec for the txtar text archive format.
//!
//! A txtar archive is a free-form comment followed by files, each introduced
//! by a marker line of the form `-- name --`. File data runs until the next
//! marker line. Data that does not end in a newline gains one when encoded.

const MARKER_START: &[u8] = b"-- ";
const MARKER_END: &[u8] = b" --";

/// A decoded txtar archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Txtar {
    /// Text before the first file marker.
    pub comment: Vec<u8>,
    /// Files in the order they appear.
    pub files: Vec<(String, Vec<u8>)>,
}

/// Decode txtar data. Decoding never fails; data without markers is all comment.
pub fn parse(data: &[u8]) -> Txtar {
    let (comment, mut name, mut rest) = find_file_marker(data);
    let mut archive = Txtar {
        comment: comment.to_vec(),
        files: Vec::new(),
    };
    while let Some(current) = name {
        let (body, next_name, after) = find_file_marker(rest);
        archive.files.push((current, body.to_vec()));
        name = next_name;
        rest = after;
    }
    archive
}

/// Encode files (and an optional comment) as txtar.
pub fn format<'a>(comment: &[u8], files: impl IntoIterator<Item = (&'a str, &'a [u8])>) -> Vec<u8> {
    let mut out = fix_newline(comment);
    for (name, data) in files {
        out.extend_from_slice(MARKER_START);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(MARKER_END);
        out.push(b'\n');
        out.extend_from_slice(&fix_newline(data));
    }
    out
}

/// Check whether data contains at least one file marker line.
pub fn has_file_markers(data: &[u8]) -> bool {
    find_file_marker(data).1.is_some()
}

/// Split `data` at the first marker line.
///
/// Returns the bytes before the marker, the marker's file name, and the
/// bytes after the marker line.
fn find_file_marker(data: &[u8]) -> (&[u8], Option<String>, &[u8]) {
    let mut offset = 0;
    loop {
        if let Some((name, after)) = marker_name(&data[offset..]) {
            return (&data[..offset], Some(name), after);
        }
        match data[offset..].iter().position(|&b| b == b'\n') {
            Some(newline) => offset += newline + 1,
            None => return (data, None, &[]),
        }
    }
}

/// Parse a marker at the start of `line`, returning the name and the rest of the input.
fn marker_name(data: &[u8]) -> Option<(String, &[u8])> {
    if !data.starts_with(MARKER_START) {
        return None;
    }
    let (mut line, after) = match data.iter().position(|&b| b == b'\n') {
        Some(newline) => (&data[..newline], &data[newline + 1..]),
        None => (data, &data[data.len()..]),
    };
    if line.ends_with(b"\r") {
        line = &line[..line.len() - 1];
    }
    if !line.ends_with(MARKER_END) || line.len() < MARKER_START.len() + MARKER_END.len() {
        return None;
    }
    let name = &line[MARKER_START.len()..line.len() - MARKER_END.len()];
    Some((String::from_utf8_lossy(name).trim().to_string(), after))
}

fn fix_newline(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out
}
