//! Slice-based STOMP frame parser (produces owned Vecs from input slices).

use crate::error::MalformedFrame;

/// One frame as it appeared on the wire: command and headers are still
/// escaped bytes, the body is raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub command: Vec<u8>,
    pub headers: Vec<(Vec<u8>, Vec<u8>)>,
    pub body: Vec<u8>,
    /// Bytes of input consumed, up to and including the NUL terminator.
    pub consumed: usize,
}

type ParseResult = Result<Option<RawFrame>, MalformedFrame>;

/// Extract the first `content-length` header value from a header list.
///
/// Returns:
/// - Ok(Some(n)) when a valid content-length header is present and parsed.
/// - Ok(None) when no content-length header is present.
/// - Err when content-length is present but not a valid unsigned integer.
fn get_content_length(headers: &[(Vec<u8>, Vec<u8>)]) -> Result<Option<usize>, MalformedFrame> {
    let Some((_, v)) = headers.iter().find(|(k, _)| k == b"content-length") else {
        return Ok(None);
    };
    let s = std::str::from_utf8(v).map_err(|_| MalformedFrame::InvalidUtf8("content-length"))?;
    let trimmed = s.trim();
    trimmed
        .parse::<usize>()
        .map(Some)
        .map_err(|_| MalformedFrame::InvalidContentLength(trimmed.to_string()))
}

/// Length of the end-of-line sequence starting at `pos` (`\n` or `\r\n`),
/// or 0 if there is none.
pub(crate) fn eol_len(input: &[u8], pos: usize) -> usize {
    match input.get(pos) {
        Some(b'\n') => 1,
        Some(b'\r') if input.get(pos + 1) == Some(&b'\n') => 2,
        _ => 0,
    }
}

/// Parse a single STOMP frame from a raw byte slice.
///
/// Returns `Ok(Some(frame))` when a full frame was parsed, `Ok(None)` when
/// more bytes are required, and `Err` on protocol errors. With `at_eof` set
/// the input is treated as complete, so running out of bytes is reported as
/// the corresponding [`MalformedFrame`] instead of `Ok(None)`.
///
/// Leading EOLs (heartbeats) are skipped. Bytes after the NUL terminator are
/// left unconsumed.
pub fn parse_frame_slice(input: &[u8], at_eof: bool) -> ParseResult {
    parse_frame_limited(input, at_eof, usize::MAX)
}

/// Like [`parse_frame_slice`], but a declared `content-length` above
/// `max_body` fails with [`MalformedFrame::FrameTooLarge`] as soon as the
/// header block is complete, before any of the body is buffered.
pub(crate) fn parse_frame_limited(input: &[u8], at_eof: bool, max_body: usize) -> ParseResult {
    let incomplete = |err: MalformedFrame| if at_eof { Err(err) } else { Ok(None) };
    let len = input.len();
    let mut pos = 0usize;

    loop {
        let eol = eol_len(input, pos);
        if eol == 0 {
            break;
        }
        pos += eol;
    }
    if pos >= len || (input[pos] == b'\r' && pos + 1 == len) {
        return incomplete(MalformedFrame::MissingCommand);
    }

    // command line
    let Some(cmd_end_rel) = input[pos..].iter().position(|&b| b == b'\n') else {
        if input[pos..].contains(&0) {
            return Err(MalformedFrame::MissingCommand);
        }
        return incomplete(MalformedFrame::MissingTerminator);
    };
    let mut command = &input[pos..pos + cmd_end_rel];
    if command.last() == Some(&b'\r') {
        command = &command[..command.len() - 1];
    }
    if command.is_empty() || command.contains(&0) {
        return Err(MalformedFrame::MissingCommand);
    }
    let command = command.to_vec();
    pos += cmd_end_rel + 1;

    // headers, until a blank line
    let mut headers: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    loop {
        if pos >= len {
            return incomplete(MalformedFrame::MissingTerminator);
        }
        let eol = eol_len(input, pos);
        if eol > 0 {
            pos += eol;
            break;
        }
        let Some(line_end_rel) = input[pos..].iter().position(|&b| b == b'\n') else {
            return incomplete(MalformedFrame::MissingTerminator);
        };
        let mut line = &input[pos..pos + line_end_rel];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(MalformedFrame::HeaderWithoutColon(
                String::from_utf8_lossy(line).into_owned(),
            ));
        };
        headers.push((line[..colon].to_vec(), line[colon + 1..].to_vec()));
        pos += line_end_rel + 1;
    }

    // body
    let body = match get_content_length(&headers)? {
        Some(content_len) => {
            if content_len > max_body {
                return Err(MalformedFrame::FrameTooLarge(max_body));
            }
            let Some(end) = pos.checked_add(content_len) else {
                return Err(MalformedFrame::InvalidContentLength(content_len.to_string()));
            };
            if end >= len {
                return incomplete(MalformedFrame::BodyLengthMismatch {
                    expected: content_len,
                });
            }
            if input[end] != 0 {
                return Err(MalformedFrame::BodyLengthMismatch {
                    expected: content_len,
                });
            }
            let body = input[pos..end].to_vec();
            pos = end + 1;
            body
        }
        None => match input[pos..].iter().position(|&b| b == 0) {
            Some(nul_rel) => {
                let body = input[pos..pos + nul_rel].to_vec();
                pos += nul_rel + 1;
                body
            }
            None => return incomplete(MalformedFrame::MissingTerminator),
        },
    };

    Ok(Some(RawFrame {
        command,
        headers,
        body,
        consumed: pos,
    }))
}

/// Undo STOMP 1.2 header escaping (`\r`, `\n`, `\c`, `\\`).
///
/// Any other escape sequence, or a trailing lone backslash, is an error.
pub fn unescape_header_value(input: &[u8]) -> Result<Vec<u8>, MalformedFrame> {
    if !input.contains(&b'\\') {
        return Ok(input.to_vec());
    }
    let mut out = Vec::with_capacity(input.len());
    let mut it = input.iter();
    while let Some(&b) = it.next() {
        if b != b'\\' {
            out.push(b);
            continue;
        }
        match it.next() {
            Some(b'r') => out.push(b'\r'),
            Some(b'n') => out.push(b'\n'),
            Some(b'c') => out.push(b':'),
            Some(b'\\') => out.push(b'\\'),
            Some(&other) => return Err(MalformedFrame::InvalidEscape(other as char)),
            None => return Err(MalformedFrame::InvalidEscape(' ')),
        }
    }
    Ok(out)
}
