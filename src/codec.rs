//! The frame codec: encodes outbound `Frame`s into masked client frames, and parses
//! inbound bytes into `Frame`s per RFC 6455 §5.2. Grounded on the read/write-half
//! logic the teacher keeps split across `read.rs`/`write.rs`, folded here into two
//! pure functions operating on a `BytesMut` so the `Dispatcher` can drive them
//! against its own buffer instead of a live socket half.

use crate::error::Error;
use crate::frame::{Frame, OpCode, MAX_CONTROL_PAYLOAD_SIZE};
use bytes::{Buf, BytesMut};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Encodes a single wire frame as a client would send it: always masked, with a
/// fresh, independently random 32-bit key per frame (RFC 6455 §5.3), the same way
/// the teacher's `write.rs::write_frame_client` builds its mask.
///
/// `Frame`'s fields are public, so this re-checks the payload contract
/// `message.rs::into_frames` already enforces on the `WsMessage` path — a
/// caller building a `Frame` directly must not be able to put invalid UTF-8
/// or a bad close code on the wire just by skipping that layer.
pub fn encode(frame: &Frame) -> Result<BytesMut, Error> {
    if frame.opcode.is_control() && frame.payload.len() > MAX_CONTROL_PAYLOAD_SIZE {
        return Err(Error::PayloadTooLarge);
    }
    // A Text opcode only means "whole message" when final_fragment is set; a
    // fragment start can split a multi-byte character at the chunk boundary.
    if frame.opcode == OpCode::Text && frame.final_fragment {
        std::str::from_utf8(&frame.payload).map_err(|_| Error::InvalidUtf8)?;
    }
    if frame.opcode == OpCode::Close && !frame.payload.is_empty() {
        if frame.payload.len() < 2 {
            return Err(Error::ControlFramePayloadSize);
        }
        let code = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
        if !(1000..=4999).contains(&code) {
            return Err(Error::InvalidCloseCode(code));
        }
    }

    let mut rng = StdRng::from_rng(&mut rand::rng());
    let mask = [
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>(),
        rng.random::<u8>(),
    ];

    let mut out = BytesMut::with_capacity(frame.payload.len() + 14);
    let first_byte = (frame.final_fragment as u8) << 7 | frame.opcode.as_u8();
    out.extend_from_slice(&[first_byte]);

    let payload_len = frame.payload.len();
    if payload_len <= 125 {
        out.extend_from_slice(&[0b1000_0000 | payload_len as u8]);
    } else if payload_len <= 65535 {
        out.extend_from_slice(&[126 | 0b1000_0000, (payload_len >> 8) as u8, payload_len as u8]);
    } else {
        out.extend_from_slice(&[127 | 0b1000_0000]);
        out.extend_from_slice(&(payload_len as u64).to_be_bytes());
    }

    out.extend_from_slice(&mask);

    let mut masked_payload = Vec::with_capacity(payload_len);
    for (i, &byte) in frame.payload.iter().enumerate() {
        masked_payload.push(byte ^ mask[i % 4]);
    }
    out.extend_from_slice(&masked_payload);

    Ok(out)
}

/// Parses the shortest prefix of `buf` that forms one frame, consuming it from
/// `buf` on success. Returns `Ok(None)` when `buf` doesn't yet hold a complete
/// frame — the caller should await more bytes and retry, never treating an
/// incomplete header as an error.
pub fn parse(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Frame>, Error> {
    if buf.len() < 2 {
        return Ok(None);
    }

    let first = buf[0];
    let second = buf[1];

    let final_fragment = (first & 0b1000_0000) != 0;
    let rsv1 = (first & 0b0100_0000) != 0;
    let rsv2 = (first & 0b0010_0000) != 0;
    let rsv3 = (first & 0b0001_0000) != 0;
    if rsv1 || rsv2 || rsv3 {
        return Err(Error::RSVNotZero);
    }

    let opcode = OpCode::from(first & 0b0000_1111)?;
    if !final_fragment && opcode.is_control() {
        return Err(Error::ControlFramesFragmented);
    }

    // A client MUST fail the connection if a server frame arrives masked (RFC 6455 §5.1).
    let masked = (second & 0b1000_0000) != 0;
    if masked {
        return Err(Error::UnmaskedRequired);
    }

    let len_field = (second & 0b0111_1111) as usize;
    if len_field > MAX_CONTROL_PAYLOAD_SIZE && opcode.is_control() {
        return Err(Error::ControlFramePayloadSize);
    }

    let mut header_len = 2usize;
    let payload_len: usize = match len_field {
        126 => {
            if buf.len() < header_len + 2 {
                return Ok(None);
            }
            let len = u16::from_be_bytes([buf[header_len], buf[header_len + 1]]) as usize;
            header_len += 2;
            len
        }
        127 => {
            if buf.len() < header_len + 8 {
                return Ok(None);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[header_len..header_len + 8]);
            header_len += 8;
            u64::from_be_bytes(raw) as usize
        }
        n => n,
    };

    if payload_len > max_frame_size {
        return Err(Error::MaxFrameSize);
    }

    let total_len = header_len + payload_len;
    if buf.len() < total_len {
        return Ok(None);
    }

    let mut frame_bytes = buf.split_to(total_len);
    frame_bytes.advance(header_len);
    let payload = frame_bytes.to_vec();

    Ok(Some(Frame::new(final_fragment, opcode, payload)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_sets_mask_bit_and_random_key() {
        let frame = Frame::new(true, OpCode::Text, b"hello".to_vec());
        let encoded = encode(&frame).unwrap();
        assert_eq!(encoded[1] & 0b1000_0000, 0b1000_0000);
    }

    #[test]
    fn test_encode_rejects_invalid_utf8_text_frame() {
        let frame = Frame::new(true, OpCode::Text, vec![0xFF, 0xFE]);
        assert!(matches!(encode(&frame), Err(Error::InvalidUtf8)));
    }

    #[test]
    fn test_encode_allows_non_utf8_mid_fragment() {
        // A fragment start (final_fragment=false) may split a multi-byte
        // character; only a complete Text frame's bytes must be valid UTF-8.
        let lead_byte_of_two_byte_char = vec![0xC2];
        let frame = Frame::new(false, OpCode::Text, lead_byte_of_two_byte_char);
        assert!(encode(&frame).is_ok());
    }

    #[test]
    fn test_encode_rejects_bad_close_code() {
        let mut payload = 999u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"bogus");
        let frame = Frame::new(true, OpCode::Close, payload);
        assert!(matches!(encode(&frame), Err(Error::InvalidCloseCode(999))));
    }

    #[test]
    fn test_encode_allows_empty_close_frame() {
        let frame = Frame::new(true, OpCode::Close, Vec::new());
        assert!(encode(&frame).is_ok());
    }

    #[test]
    fn test_encode_then_manual_unmask_recovers_payload() {
        let frame = Frame::new(true, OpCode::Binary, vec![1, 2, 3, 4, 5]);
        let mut encoded = encode(&frame).unwrap();

        assert!((encoded[1] & 0b1000_0000) != 0);
        let len = (encoded[1] & 0b0111_1111) as usize;
        let mask = [encoded[2], encoded[3], encoded[4], encoded[5]];
        for (i, b) in encoded[6..6 + len].iter_mut().enumerate() {
            *b ^= mask[i % 4];
        }
        assert_eq!(&encoded[6..6 + len], frame.payload.as_slice());
    }

    #[test]
    fn test_parse_rejects_masked_server_frame() {
        let frame = Frame::new(true, OpCode::Text, b"hi".to_vec());
        let encoded = encode(&frame).unwrap();
        let mut buf = BytesMut::from(&encoded[..]);
        assert!(matches!(parse(&mut buf, 1 << 20), Err(Error::UnmaskedRequired)));
    }

    #[test]
    fn test_parse_unmasked_server_frame() {
        // Unmasked server->client frame: FIN=1, opcode=Text, len=5, payload "hello".
        let mut buf = BytesMut::from(&[0b1000_0001u8, 5, b'h', b'e', b'l', b'l', b'o'][..]);
        let frame = parse(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload, b"hello");
        assert!(frame.final_fragment);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_incomplete_returns_none() {
        let mut buf = BytesMut::from(&[0b1000_0001u8, 5, b'h', b'e'][..]);
        assert!(parse(&mut buf, 1 << 20).unwrap().is_none());
        // Nothing consumed on incomplete.
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_parse_multiple_frames_in_one_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0b1000_0001u8, 2, b'h', b'i']);
        buf.extend_from_slice(&[0b1000_0001u8, 2, b'y', b'o']);
        let total_len = buf.len();

        let first = parse(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(first.payload, b"hi");
        let second = parse(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(second.payload, b"yo");
        assert!(buf.is_empty());
        assert_eq!(total_len, 8);
    }

    #[test]
    fn test_parse_rejects_reserved_bits() {
        let mut buf = BytesMut::from(&[0b1100_0001u8, 0][..]);
        assert!(matches!(parse(&mut buf, 1 << 20), Err(Error::RSVNotZero)));
    }

    #[test]
    fn test_parse_rejects_fragmented_control_frame() {
        let mut buf = BytesMut::from(&[0b0000_1001u8, 0][..]);
        assert!(matches!(parse(&mut buf, 1 << 20), Err(Error::ControlFramesFragmented)));
    }

    #[test]
    fn test_parse_rejects_oversized_control_payload() {
        let mut buf = BytesMut::from(&[0b1000_1001u8, 126][..]);
        assert!(matches!(parse(&mut buf, 1 << 20), Err(Error::ControlFramePayloadSize)));
    }

    #[test]
    fn test_parse_extended_length_16bit() {
        let mut buf = BytesMut::new();
        let payload = vec![7u8; 300];
        buf.extend_from_slice(&[0b1000_0010u8, 126]);
        buf.extend_from_slice(&(300u16).to_be_bytes());
        buf.extend_from_slice(&payload);

        let frame = parse(&mut buf, 1 << 20).unwrap().unwrap();
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload.len(), 300);
    }

    #[test]
    fn test_parse_rejects_over_max_frame_size() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0b1000_0010u8, 126]);
        buf.extend_from_slice(&(300u16).to_be_bytes());
        buf.extend_from_slice(&vec![0u8; 300]);

        assert!(matches!(parse(&mut buf, 100), Err(Error::MaxFrameSize)));
    }

    #[test]
    fn test_parse_bad_opcode() {
        let mut buf = BytesMut::from(&[0b1000_0011u8, 0][..]);
        assert!(matches!(parse(&mut buf, 1 << 20), Err(Error::InvalidOpcode(0x3))));
    }

    #[test]
    fn test_client_frames_use_independent_masks() {
        let frame = Frame::new(true, OpCode::Text, b"same payload".to_vec());
        let a = encode(&frame).unwrap();
        let b = encode(&frame).unwrap();
        // Masks live at bytes [2..6); with random 32-bit keys these match only
        // with astronomically low probability.
        assert_ne!(&a[2..6], &b[2..6]);
    }
}
