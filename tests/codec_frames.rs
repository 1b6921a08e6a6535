//! Frame encoding/decoding: content-length bodies, incremental input and
//! malformed data.

use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use relay_stomp::codec::{self, StompCodec, StompItem};
use relay_stomp::{Command, ConnError, Frame, MalformedFrame};
use tokio_util::codec::Decoder;

fn sample_frames() -> Vec<Frame> {
    vec![
        Frame::new(Command::Message)
            .header("subscription", "sub-0")
            .header("message-id", "m-1")
            .header("ack", "a:1")
            .set_body(b"text body".to_vec()),
        Frame::new(Command::Message)
            .header("subscription", "sub-0")
            .set_body(vec![1, 0, 2, 0, 3]),
        Frame::new(Command::Receipt).header("receipt-id", "rcpt-9"),
        Frame::new(Command::Error)
            .header("message", "nope")
            .header("message", "duplicate ignored on read")
            .set_body("détails".as_bytes().to_vec()),
    ]
}

fn wire(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, f) in frames.iter().enumerate() {
        out.extend_from_slice(&codec::encode(f));
        if i % 2 == 0 {
            out.extend_from_slice(b"\n");
        }
    }
    out
}

fn drain(codec: &mut StompCodec, buf: &mut BytesMut, out: &mut Vec<Frame>) {
    while let Some(item) = codec.decode(buf).expect("decode failed") {
        if let StompItem::Frame(f) = item {
            out.push(f);
        }
    }
}

#[test]
fn encode_matches_wire_format() {
    let frame = Frame::new(Command::Send)
        .header("destination", "/queue/a")
        .header("content-type", "text/plain")
        .set_body(b"hello".to_vec());
    assert_eq!(
        codec::encode(&frame),
        b"SEND\ndestination:/queue/a\ncontent-type:text/plain\n\nhello\0".to_vec()
    );
}

#[test]
fn binary_body_gets_content_length() {
    let frame = Frame::new(Command::Send).set_body(vec![b'a', 0, b'b']);
    let bytes = codec::encode(&frame);
    assert_eq!(bytes, b"SEND\ncontent-length:3\n\na\0b\0".to_vec());

    let back = codec::decode(&bytes).unwrap();
    assert_eq!(back.body, vec![b'a', 0, b'b']);
    assert_eq!(back.get_header("content-length"), Some("3"));
}

#[test]
fn caller_content_length_is_kept() {
    let frame = Frame::new(Command::Send)
        .header("content-length", "5")
        .set_body(b"hello".to_vec());
    let bytes = codec::encode(&frame);
    assert_eq!(bytes, b"SEND\ncontent-length:5\n\nhello\0".to_vec());
    assert_eq!(codec::decode(&bytes).unwrap(), frame);
}

#[test]
fn text_frames_round_trip_unchanged() {
    for frame in sample_frames().into_iter().filter(|f| !f.body.contains(&0)) {
        assert_eq!(codec::decode(&codec::encode(&frame)).unwrap(), frame);
    }
}

#[test]
fn decode_accepts_crlf_lines() {
    let f = codec::decode(b"\r\nMESSAGE\r\nsubscription:s\r\nmessage-id:1\r\n\r\nbody\0\r\n")
        .unwrap();
    assert_eq!(f.command, Command::Message);
    assert_eq!(f.get_header("subscription"), Some("s"));
    assert_eq!(f.get_header("message-id"), Some("1"));
    assert_eq!(f.body, b"body");
}

#[test]
fn whitespace_in_headers_is_significant() {
    let f = codec::decode(b"MESSAGE\n key : value \n\n\0").unwrap();
    assert_eq!(f.get_header(" key "), Some(" value "));
}

#[test]
fn decode_rejects_malformed_input() {
    let cases: Vec<(&[u8], MalformedFrame)> = vec![
        (b"", MalformedFrame::MissingCommand),
        (b"\0", MalformedFrame::MissingCommand),
        (b"FOO\n\n\0", MalformedFrame::UnknownCommand("FOO".into())),
        (b"SEND\nno-colon-here\n\n\0", MalformedFrame::HeaderWithoutColon("no-colon-here".into())),
        (b"SEND\ncontent-length:abc\n\n\0", MalformedFrame::InvalidContentLength("abc".into())),
        (b"SEND\ncontent-length:2\n\nabc\0", MalformedFrame::BodyLengthMismatch { expected: 2 }),
        (b"SEND\ncontent-length:9\n\nabc\0", MalformedFrame::BodyLengthMismatch { expected: 9 }),
        (b"SEND\n\nno terminator", MalformedFrame::MissingTerminator),
        (b"SEND\n\n\0junk", MalformedFrame::TrailingBytes),
    ];
    for (input, expected) in cases {
        assert_eq!(
            codec::decode(input),
            Err(expected),
            "input {:?}",
            String::from_utf8_lossy(input)
        );
    }
}

#[test]
fn codec_reports_malformed_stream() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"SEND\nbroken header line\n\n\0"[..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ConnError::Malformed(MalformedFrame::HeaderWithoutColon(_)))
    ));
}

#[test]
fn byte_at_a_time_feed_yields_same_frames() {
    let frames = sample_frames();
    let bytes = wire(&frames);

    let mut codec = StompCodec::new();
    let mut buf = BytesMut::new();
    let mut out = Vec::new();
    for b in bytes {
        buf.extend_from_slice(&[b]);
        drain(&mut codec, &mut buf, &mut out);
    }
    assert_eq!(out.len(), frames.len());
    assert_eq!(out[0], frames[0]);
    assert_eq!(out[1].body, frames[1].body);
    assert_eq!(out[3].get_header("message"), Some("nope"));
    assert!(buf.is_empty());
}

#[test]
fn random_chunking_yields_same_frames() {
    let frames = sample_frames();
    let bytes = wire(&frames);
    let mut rng = StdRng::seed_from_u64(0x5707);

    for _ in 0..200 {
        let mut codec = StompCodec::new();
        let mut buf = BytesMut::new();
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let n = rng.gen_range(1..=17).min(bytes.len() - pos);
            buf.extend_from_slice(&bytes[pos..pos + n]);
            pos += n;
            drain(&mut codec, &mut buf, &mut out);
        }
        assert_eq!(out.len(), frames.len());
        for (got, sent) in out.iter().zip(&frames) {
            assert_eq!(got.command, sent.command);
            assert_eq!(got.body, sent.body);
        }
    }
}

#[test]
fn incomplete_content_length_body_waits() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:4\n\nab"[..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    buf.extend_from_slice(b"\0d\0");
    match codec.decode(&mut buf).unwrap() {
        Some(StompItem::Frame(f)) => assert_eq!(f.body, b"ab\0d"),
        other => panic!("expected frame, got {:?}", other),
    }
}

#[test]
fn overflowing_content_length_is_rejected() {
    let raw = format!("SEND\ncontent-length:{}\n\nabc\0", u64::MAX);
    assert!(matches!(
        codec::decode(raw.as_bytes()),
        Err(MalformedFrame::InvalidContentLength(_))
    ));

    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(raw.as_bytes());
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ConnError::Malformed(MalformedFrame::FrameTooLarge(_)))
    ));
}

#[test]
fn declared_length_over_limit_fails_without_buffering_body() {
    let mut codec = StompCodec::new().with_max_frame_len(1024);
    let mut buf = BytesMut::from(&b"MESSAGE\ncontent-length:4096\n\nab"[..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(ConnError::Malformed(MalformedFrame::FrameTooLarge(1024)))
    ));
}
