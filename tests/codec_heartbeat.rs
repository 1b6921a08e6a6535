//! Unit tests for heartbeat encoding and decoding in the STOMP codec.

use bytes::BytesMut;
use relay_stomp::codec::{StompCodec, StompItem};
use relay_stomp::{Command, Frame};
use tokio_util::codec::{Decoder, Encoder};

fn next(codec: &mut StompCodec, buf: &mut BytesMut) -> StompItem {
    codec
        .decode(buf)
        .expect("decode failed")
        .expect("no item")
}

#[test]
fn decode_single_lf_as_heartbeat() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&[0x0Au8][..]);
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    assert!(
        buf.is_empty(),
        "buffer should be empty after consuming heartbeat"
    );
}

#[test]
fn decode_crlf_as_one_heartbeat() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\r\n"[..]);
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    assert!(buf.is_empty());
}

#[test]
fn decode_multiple_consecutive_heartbeats() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\n\r\n\n"[..]);
    for remaining in [3, 1, 0] {
        assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
        assert_eq!(buf.len(), remaining);
    }
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn decode_heartbeat_before_frame() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\nSEND\ndestination:/queue/test\n\nhello\0"[..]);

    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    match next(&mut codec, &mut buf) {
        StompItem::Frame(f) => {
            assert_eq!(f.command, Command::Send);
            assert_eq!(f.body, b"hello");
        }
        other => panic!("expected frame, got {:?}", other),
    }
}

#[test]
fn every_eol_after_a_frame_is_a_heartbeat() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"SEND\ndestination:/queue/test\n\nhello\0\n\r\n"[..]);

    match next(&mut codec, &mut buf) {
        StompItem::Frame(f) => assert_eq!(f.command, "SEND"),
        other => panic!("expected frame, got {:?}", other),
    }
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    assert!(buf.is_empty());
}

#[test]
fn interleaved_heartbeats_and_frames() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\nSEND\n\n\0\nMESSAGE\nmessage-id:1\n\nbody\0\n"[..]);

    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    match next(&mut codec, &mut buf) {
        StompItem::Frame(f) => assert_eq!(f.command, Command::Send),
        other => panic!("expected SEND frame, got {:?}", other),
    }
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    match next(&mut codec, &mut buf) {
        StompItem::Frame(f) => {
            assert_eq!(f.command, Command::Message);
            assert_eq!(f.body, b"body");
        }
        other => panic!("expected MESSAGE frame, got {:?}", other),
    }
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
    assert!(buf.is_empty());
}

#[test]
fn split_crlf_heartbeat_waits_for_lf() {
    let mut codec = StompCodec::new();
    let mut buf = BytesMut::from(&b"\r"[..]);
    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert_eq!(buf.len(), 1, "lone CR must stay buffered");
    buf.extend_from_slice(b"\n");
    assert_eq!(next(&mut codec, &mut buf), StompItem::Heartbeat);
}

#[test]
fn encode_heartbeat() {
    let mut codec = StompCodec::new();
    let mut dst = BytesMut::new();
    codec
        .encode(StompItem::Heartbeat, &mut dst)
        .expect("encode failed");
    assert_eq!(&dst[..], &[0x0Au8]);
}

#[test]
fn encode_frame_then_heartbeat() {
    let mut codec = StompCodec::new();
    let mut dst = BytesMut::new();

    let frame = Frame::new(Command::Send)
        .header("destination", "/queue/test")
        .set_body(b"hello".to_vec());

    codec
        .encode(StompItem::Frame(frame), &mut dst)
        .expect("encode failed");
    codec
        .encode(StompItem::Heartbeat, &mut dst)
        .expect("encode failed");

    let len = dst.len();
    assert_eq!(dst[len - 2], 0x00); // NUL terminator
    assert_eq!(dst[len - 1], 0x0A); // Heartbeat LF
}
