use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ConnError, MalformedFrame};
use crate::frame::{Command, Frame};
use crate::parser::{
    RawFrame, eol_len, parse_frame_limited, parse_frame_slice, unescape_header_value,
};

/// Default upper bound on a single buffered frame (10 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// Escape a STOMP 1.2 header key or value for wire transmission.
///
/// - backslash (0x5c) → `\\`
/// - carriage return (0x0d) → `\r`
/// - line feed (0x0a) → `\n`
/// - colon (0x3a) → `\c`
fn escape_header_value(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\r' => result.push_str("\\r"),
            '\n' => result.push_str("\\n"),
            ':' => result.push_str("\\c"),
            _ => result.push(ch),
        }
    }
    result
}

fn decode_header_part(
    raw: &[u8],
    escaped: bool,
    what: &'static str,
) -> Result<String, MalformedFrame> {
    let bytes = if escaped {
        unescape_header_value(raw)?
    } else {
        raw.to_vec()
    };
    String::from_utf8(bytes).map_err(|_| MalformedFrame::InvalidUtf8(what))
}

/// Turn a parsed wire frame into an owned `Frame`, unescaping headers unless
/// escaping is off or the frame is part of the handshake.
fn build_frame(raw: RawFrame, escaping: bool) -> Result<Frame, MalformedFrame> {
    let command = std::str::from_utf8(&raw.command)
        .map_err(|_| MalformedFrame::InvalidUtf8("command"))?
        .parse::<Command>()?;
    let escaped = escaping && !command.is_handshake();

    let mut headers = Vec::with_capacity(raw.headers.len());
    for (k, v) in &raw.headers {
        headers.push((
            decode_header_part(k, escaped, "header key")?,
            decode_header_part(v, escaped, "header value")?,
        ));
    }

    Ok(Frame {
        command,
        headers,
        body: raw.body,
    })
}

/// Append the wire form of `frame` to `dst`.
///
/// A `content-length` header is added when the body contains a NUL byte or
/// is not UTF-8 and the caller did not provide one.
fn write_frame(frame: &Frame, escaping: bool, dst: &mut BytesMut) {
    let escaped = escaping && !frame.command.is_handshake();

    dst.extend_from_slice(frame.command.as_str().as_bytes());
    dst.put_u8(b'\n');

    let mut write_header = |k: &str, v: &str| {
        if escaped {
            dst.extend_from_slice(escape_header_value(k).as_bytes());
            dst.put_u8(b':');
            dst.extend_from_slice(escape_header_value(v).as_bytes());
        } else {
            dst.extend_from_slice(k.as_bytes());
            dst.put_u8(b':');
            dst.extend_from_slice(v.as_bytes());
        }
        dst.put_u8(b'\n');
    };

    for (k, v) in &frame.headers {
        write_header(k, v);
    }
    if !frame.has_header("content-length")
        && (frame.body.contains(&0) || std::str::from_utf8(&frame.body).is_err())
    {
        write_header("content-length", &frame.body.len().to_string());
    }

    dst.put_u8(b'\n');
    dst.extend_from_slice(&frame.body);
    dst.put_u8(0);
}

/// Encode a single frame using STOMP 1.2 escaping rules.
///
/// Never fails: any `Frame` value has a wire form. CONNECT, STOMP and
/// CONNECTED headers are written verbatim.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut dst = BytesMut::new();
    write_frame(frame, true, &mut dst);
    dst.to_vec()
}

/// Decode exactly one frame from a complete buffer.
///
/// Leading EOLs are skipped and trailing EOLs after the NUL terminator are
/// allowed; any other trailing byte is an error.
pub fn decode(bytes: &[u8]) -> Result<Frame, MalformedFrame> {
    let raw = parse_frame_slice(bytes, true)?.ok_or(MalformedFrame::MissingTerminator)?;
    let mut pos = raw.consumed;
    while pos < bytes.len() {
        let eol = eol_len(bytes, pos);
        if eol == 0 {
            return Err(MalformedFrame::TrailingBytes);
        }
        pos += eol;
    }
    build_frame(raw, true)
}

/// Items produced or consumed by the codec.
///
/// A `StompItem` is either a decoded `Frame` or a `Heartbeat` marker
/// representing a single EOL received on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompItem {
    /// A decoded STOMP frame (command + headers + body)
    Frame(Frame),
    /// A single heartbeat pulse (LF or CRLF)
    Heartbeat,
}

/// `StompCodec` implements `tokio_util::codec::{Decoder, Encoder}` for the
/// STOMP wire protocol and is the incremental frame reader of a connection.
///
/// Responsibilities:
/// - Decode incoming bytes into `StompItem::Frame` or `StompItem::Heartbeat`,
///   across arbitrary chunk boundaries.
/// - Support both NUL-terminated frames and frames using the `content-length`
///   header for binary bodies containing NUL bytes.
/// - Encode `StompItem` back into bytes for the wire format.
///
/// Header escaping is on by default. A connection that negotiates STOMP 1.0
/// turns it off with [`StompCodec::set_escaping`].
#[derive(Debug, Clone)]
pub struct StompCodec {
    escaping: bool,
    max_frame_len: usize,
}

impl StompCodec {
    pub fn new() -> Self {
        Self {
            escaping: true,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Limit how many bytes of a single incomplete frame may be buffered.
    /// A declared `content-length` above the limit is refused as soon as the
    /// header block has arrived.
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn set_escaping(&mut self, escaping: bool) {
        self.escaping = escaping;
    }

    pub fn escaping(&self) -> bool {
        self.escaping
    }
}

impl Default for StompCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StompCodec {
    type Item = StompItem;
    type Error = ConnError;

    /// Decode bytes from `src` into a `StompItem`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when more bytes are
    /// required. Once an error is returned `Framed` stops producing items,
    /// which is what makes a malformed stream unusable.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let eol = eol_len(src.chunk(), 0);
        if eol > 0 {
            src.advance(eol);
            return Ok(Some(StompItem::Heartbeat));
        }
        // a lone CR may be the start of a CRLF heartbeat
        if src.chunk() == b"\r" {
            return Ok(None);
        }

        match parse_frame_limited(src.chunk(), false, self.max_frame_len)? {
            Some(raw) => {
                src.advance(raw.consumed);
                let frame = build_frame(raw, self.escaping)?;
                Ok(Some(StompItem::Frame(frame)))
            }
            None if src.len() > self.max_frame_len => {
                Err(MalformedFrame::FrameTooLarge(self.max_frame_len).into())
            }
            None => Ok(None),
        }
    }
}

impl Encoder<StompItem> for StompCodec {
    type Error = ConnError;

    /// Encode a `StompItem` into the provided destination buffer.
    fn encode(&mut self, item: StompItem, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            StompItem::Heartbeat => dst.put_u8(b'\n'),
            StompItem::Frame(frame) => write_frame(&frame, self.escaping, dst),
        }
        Ok(())
    }
}
