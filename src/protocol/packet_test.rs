use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::Error;
use crate::protocol::packet::{PacketCodec, write_packets};

const SMALL_MAX: usize = 16;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

fn deframe_all(codec: &mut PacketCodec, buf: &mut BytesMut) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(p) = codec.decode(buf).unwrap() {
        out.push(p.to_vec());
    }
    out
}

#[test]
fn test_frame_deframe_boundaries() {
    for len in [0, SMALL_MAX - 1, SMALL_MAX, SMALL_MAX + 1, SMALL_MAX * 2, SMALL_MAX * 3 + 5] {
        let data = payload(len);
        let mut wire = BytesMut::new();
        let mut seq = 0u8;
        write_packets(&mut wire, &data, &mut seq, SMALL_MAX);

        let expected_packets = len / SMALL_MAX + 1;
        assert_eq!(seq as usize, expected_packets, "len {len}");
        assert_eq!(wire.len(), len + 4 * expected_packets, "len {len}");

        let mut codec = PacketCodec::with_max_payload(SMALL_MAX);
        let decoded = deframe_all(&mut codec, &mut wire);
        assert_eq!(decoded, vec![data], "len {len}");
        assert!(wire.is_empty());
    }
}

#[test]
fn test_exact_max_payload_ends_with_empty_packet() {
    let mut wire = BytesMut::new();
    let mut seq = 0u8;
    write_packets(&mut wire, &payload(SMALL_MAX), &mut seq, SMALL_MAX);
    assert_eq!(&wire[wire.len() - 4..], &[0, 0, 0, 1]);
}

#[test]
fn test_sequence_wraps_over_many_packets() {
    let mut wire = BytesMut::new();
    let mut seq = 0u8;
    for i in 0..300usize {
        let before = seq;
        write_packets(&mut wire, &payload(i % SMALL_MAX), &mut seq, SMALL_MAX);
        assert_eq!(seq, before.wrapping_add(1));
    }
    assert_eq!(seq, (300 % 256) as u8);

    let mut codec = PacketCodec::with_max_payload(SMALL_MAX);
    let decoded = deframe_all(&mut codec, &mut wire);
    assert_eq!(decoded.len(), 300);
    assert_eq!(codec.sequence(), 44);
}

#[test]
fn test_partial_input_waits_for_more() {
    let data = payload(SMALL_MAX + 3);
    let mut wire = BytesMut::new();
    let mut seq = 0u8;
    write_packets(&mut wire, &data, &mut seq, SMALL_MAX);

    let mut codec = PacketCodec::with_max_payload(SMALL_MAX);
    let mut buf = BytesMut::new();
    let mut decoded = None;
    for byte in wire.iter() {
        buf.extend_from_slice(&[*byte]);
        if let Some(p) = codec.decode(&mut buf).unwrap() {
            decoded = Some(p);
        }
    }
    assert_eq!(decoded.as_deref(), Some(data.as_slice()));
}

#[test]
fn test_out_of_order_sequence_is_rejected() {
    let mut wire = BytesMut::new();
    let mut seq = 3u8;
    write_packets(&mut wire, b"hello", &mut seq, SMALL_MAX);

    let mut codec = PacketCodec::with_max_payload(SMALL_MAX);
    codec.set_sequence(1);
    let err = codec.decode(&mut wire).unwrap_err();
    assert!(matches!(
        err,
        Error::PacketOutOfOrder {
            expected: 1,
            actual: 3
        }
    ));
    assert!(err.is_fatal());
}

#[test]
fn test_encoder_shares_sequence_with_decoder() {
    let mut codec = PacketCodec::new();
    let mut server = BytesMut::new();
    let mut seq = 0u8;
    write_packets(&mut server, b"greeting", &mut seq, SMALL_MAX);
    codec.decode(&mut server).unwrap().unwrap();

    let mut out = BytesMut::new();
    codec.encode(&b"response"[..], &mut out).unwrap();
    assert_eq!(out[3], 1);
    assert_eq!(codec.sequence(), 2);
}

#[test]
fn test_write_command_reports_reply_sequence() {
    let codec = PacketCodec::with_max_payload(SMALL_MAX);
    let mut out = BytesMut::new();
    assert_eq!(codec.write_command(&mut out, b"\x0e"), 1);
    assert_eq!(codec.write_command(&mut out, &payload(SMALL_MAX * 2)), 3);
}
