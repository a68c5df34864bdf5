use bytes::{Buf, BufMut, Bytes, BytesMut};
use prost::Message;

use crate::container::Container;
use crate::error::{FrameError, Result};

/// Frame header: marker (1) + packed marker/length word (4) = 5 bytes.
pub const HEADER_LEN: usize = 5;

/// First header marker byte.
pub const MAGIC0: u8 = 0x0D;

/// Second header marker byte, packed into the low byte of the length word.
pub const MAGIC1: u8 = 0xA4;

/// Maximum payload length representable by the 24-bit length field.
pub const MAX_PAYLOAD_LEN: usize = 0xFF_FFFF;

/// Encode a container into the wire format.
///
/// Wire format (little-endian):
/// ```text
/// byte 0      : 0x0D
/// bytes 1-4   : u32 = (length24 << 8) | 0xA4
/// bytes 5..   : serialized container, length24 bytes
/// ```
pub fn encode_frame(container: &Container, dst: &mut BytesMut) -> Result<()> {
    let len = container.encoded_len();
    if len > MAX_PAYLOAD_LEN {
        return Err(FrameError::FrameTooLarge { len });
    }
    dst.reserve(HEADER_LEN + len);
    dst.put_u8(MAGIC0);
    dst.put_u32_le(((len as u32) << 8) | MAGIC1 as u32);
    container
        .encode(dst)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    Ok(())
}

/// Frame an already-serialized container verbatim (byte-exact republish).
pub fn encode_raw_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::FrameTooLarge { len: payload.len() });
    }
    dst.reserve(HEADER_LEN + payload.len());
    dst.put_u8(MAGIC0);
    dst.put_u32_le(((payload.len() as u32) << 8) | MAGIC1 as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Split the next framed payload off the front of `src`.
///
/// Returns `Ok(None)` if the buffer does not yet hold a complete frame.
/// On success, consumes header and payload from the buffer and returns the
/// payload bytes (the serialized container, still undecoded).
pub fn split_frame(src: &mut BytesMut) -> Result<Option<Bytes>> {
    if src.len() < HEADER_LEN {
        return Ok(None); // Need more data
    }

    let byte0 = src[0];
    let byte1 = src[1];
    if byte0 != MAGIC0 || byte1 != MAGIC1 {
        return Err(FrameError::BadMagic { byte0, byte1 });
    }

    // The low byte of the length word is the second marker.
    let word = u32::from_le_bytes([src[1], src[2], src[3], src[4]]);
    let len = (word >> 8) as usize;

    if src.len() < HEADER_LEN + len {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_LEN);
    Ok(Some(src.split_to(len).freeze()))
}

/// Decode the next complete frame into a container.
///
/// Returns the container and the total number of bytes consumed
/// (header + payload).
pub fn decode_frame(src: &mut BytesMut) -> Result<Option<(Container, usize)>> {
    match split_frame(src)? {
        Some(payload) => {
            let consumed = HEADER_LEN + payload.len();
            let container = Container::decode(payload)?;
            Ok(Some((container, consumed)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::TimeStamp;

    fn sample_container() -> Container {
        Container {
            data_type: 5,
            serialized_data: Bytes::from_static(b"sensor reading"),
            sent: Some(TimeStamp {
                seconds: 1_700_000_000,
                microseconds: 250_000,
            }),
            received: None,
        }
    }

    #[test]
    fn roundtrip_preserves_container() {
        let container = sample_container();
        let mut wire = BytesMut::new();
        encode_frame(&container, &mut wire).unwrap();

        let payload_len = wire.len() - HEADER_LEN;
        let (decoded, consumed) = decode_frame(&mut wire).unwrap().unwrap();

        assert_eq!(decoded, container);
        assert_eq!(consumed, HEADER_LEN + payload_len);
        assert!(wire.is_empty());
    }

    #[test]
    fn header_layout_matches_wire_contract() {
        let mut wire = BytesMut::new();
        encode_raw_frame(b"abc", &mut wire).unwrap();

        assert_eq!(wire[0], 0x0D);
        let word = u32::from_le_bytes([wire[1], wire[2], wire[3], wire[4]]);
        assert_eq!(word & 0xFF, 0xA4);
        assert_eq!(word >> 8, 3);
        assert_eq!(&wire[5..], b"abc");
    }

    #[test]
    fn incomplete_header_needs_more_data() {
        let mut buf = BytesMut::from(&[0x0D, 0xA4, 0x01][..]);
        assert!(split_frame(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_needs_more_data() {
        let mut wire = BytesMut::new();
        encode_raw_frame(b"hello world", &mut wire).unwrap();
        wire.truncate(HEADER_LEN + 4);

        assert!(split_frame(&mut wire).unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut buf = BytesMut::from(&[0xFF, 0xA4, 0x00, 0x00, 0x00][..]);
        let err = split_frame(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::BadMagic { byte0: 0xFF, .. }));

        let mut buf = BytesMut::from(&[0x0D, 0x00, 0x00, 0x00, 0x00][..]);
        let err = split_frame(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::BadMagic {
                byte0: 0x0D,
                byte1: 0x00
            }
        ));
    }

    #[test]
    fn oversized_raw_payload_is_a_detectable_error() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let mut wire = BytesMut::new();
        let err = encode_raw_frame(&payload, &mut wire).unwrap_err();
        assert!(matches!(err, FrameError::FrameTooLarge { len } if len == payload.len()));
        assert!(wire.is_empty());
    }

    #[test]
    fn multiple_frames_in_one_buffer() {
        let first = sample_container();
        let second = Container::new(7, Bytes::from_static(b"second"));

        let mut wire = BytesMut::new();
        encode_frame(&first, &mut wire).unwrap();
        encode_frame(&second, &mut wire).unwrap();

        let (c1, _) = decode_frame(&mut wire).unwrap().unwrap();
        let (c2, _) = decode_frame(&mut wire).unwrap().unwrap();

        assert_eq!(c1, first);
        assert_eq!(c2.data_type, 7);
        assert!(wire.is_empty());
    }

    #[test]
    fn empty_payload_frame() {
        let mut wire = BytesMut::new();
        encode_raw_frame(b"", &mut wire).unwrap();
        assert_eq!(wire.len(), HEADER_LEN);

        let payload = split_frame(&mut wire).unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        // A frame whose payload is not a valid serialized container.
        // Field 1 wire type 7 is invalid.
        let mut wire = BytesMut::new();
        encode_raw_frame(&[0x0F, 0xFF, 0xFF], &mut wire).unwrap();
        let err = decode_frame(&mut wire).unwrap_err();
        assert!(matches!(err, FrameError::Decode(_)));
    }
}
