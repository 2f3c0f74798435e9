// Copyright (C) 2025 HasX
// Licensed under the GNU AGPL v3.0. See LICENSE file for details.
// Website: https://hasx.dev

//! ASCII-hex envelope framing and CRC-CCITT checksum for the stream
//! driver family, plus the little/big-endian integer field helpers used
//! throughout the crate.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use crc::{Crc, CRC_16_CCITT_FALSE};

use crate::error::{Result, Status};

/// CRC-CCITT (the CCITT-FALSE variant: poly 0x1021, init 0xFFFF) used to
/// check stream-family envelopes.
const CCITT: Crc<u16> = Crc::<u16>::new(&CRC_16_CCITT_FALSE);

pub fn crc(bytes: &[u8]) -> u16 {
    CCITT.checksum(bytes)
}

/// Encodes `src` as uppercase ASCII hex, two characters per byte.
pub fn bin2hex(src: &[u8]) -> String {
    hex::encode_upper(src)
}

/// Decodes an ASCII-hex string into bytes. Fails with [`Status::Protocol`]
/// on an odd-length string or any non-hex digit.
pub fn hex2bin(ascii: &str) -> Result<Vec<u8>> {
    hex::decode(ascii).map_err(|e| Status::Protocol(format!("invalid hex payload: {e}")))
}

/// Builds a stream-family envelope: `{` + hex(payload) + hex_be(crc) + `}`.
/// The CRC is computed over the ASCII-hex payload bytes, not the raw
/// payload, and serialized as two big-endian hex bytes.
pub fn encode_envelope(payload: &[u8]) -> Vec<u8> {
    let hex_payload = bin2hex(payload);
    let crc_value = crc(hex_payload.as_bytes());
    let mut crc_bytes = [0u8; 2];
    BigEndian::write_u16(&mut crc_bytes, crc_value);
    let hex_crc = bin2hex(&crc_bytes);

    let mut out = Vec::with_capacity(hex_payload.len() + hex_crc.len() + 2);
    out.push(b'{');
    out.extend_from_slice(hex_payload.as_bytes());
    out.extend_from_slice(hex_crc.as_bytes());
    out.push(b'}');
    out
}

/// Parses and validates a stream-family envelope, returning the decoded
/// payload. Fails with [`Status::Protocol`] on a missing/misplaced brace,
/// non-hex body, or CRC mismatch.
pub fn decode_envelope(frame: &[u8]) -> Result<Vec<u8>> {
    if frame.len() < 6 {
        return Err(Status::Protocol("envelope shorter than minimum frame size".into()));
    }
    if frame[0] != b'{' {
        return Err(Status::Protocol("envelope missing leading '{'".into()));
    }
    if frame[frame.len() - 1] != b'}' {
        return Err(Status::Protocol("envelope missing trailing '}'".into()));
    }
    let body = std::str::from_utf8(&frame[1..frame.len() - 1])
        .map_err(|_| Status::Protocol("envelope body is not ASCII".into()))?;
    if body.len() < 4 {
        return Err(Status::Protocol("envelope body shorter than CRC field".into()));
    }
    let (hex_payload, hex_crc) = body.split_at(body.len() - 4);

    let received_crc_bytes = hex2bin(hex_crc)?;
    let received_crc = BigEndian::read_u16(&received_crc_bytes);
    let computed_crc = crc(hex_payload.as_bytes());
    if received_crc != computed_crc {
        return Err(Status::Protocol(format!(
            "CRC mismatch: computed {computed_crc:#06x}, received {received_crc:#06x}"
        )));
    }

    hex2bin(hex_payload)
}

/// Total on-wire size of an envelope carrying an `n`-byte payload.
pub fn envelope_size(payload_len: usize) -> usize {
    2 * payload_len + 6
}

pub fn u16_le(buf: &[u8]) -> u16 {
    LittleEndian::read_u16(buf)
}

pub fn u24_le(buf: &[u8]) -> u32 {
    LittleEndian::read_u24(buf)
}

pub fn u32_le(buf: &[u8]) -> u32 {
    LittleEndian::read_u32(buf)
}

pub fn u16_be(buf: &[u8]) -> u16 {
    BigEndian::read_u16(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_encode_matches_scenario_1() {
        let payload = [0x00, 0x00, 0x00, 0x04, 0x00, 0x04];
        let frame = encode_envelope(&payload);
        let s = String::from_utf8(frame.clone()).unwrap();
        assert!(s.starts_with("{000000040004"));
        assert!(s.ends_with('}'));
        assert_eq!(frame.len(), envelope_size(payload.len()));
    }

    #[test]
    fn envelope_round_trip() {
        for payload in [vec![], vec![0u8], vec![1, 2, 3, 4, 5], vec![0xFFu8; 64]] {
            let frame = encode_envelope(&payload);
            let decoded = decode_envelope(&frame).unwrap();
            assert_eq!(decoded, payload);
        }
    }

    #[test]
    fn decode_rejects_bad_brackets() {
        let mut frame = encode_envelope(&[1, 2, 3]);
        frame[0] = b'[';
        assert!(matches!(decode_envelope(&frame), Err(Status::Protocol(_))));
    }

    #[test]
    fn decode_rejects_bad_crc() {
        let mut frame = encode_envelope(&[1, 2, 3]);
        let last = frame.len() - 2;
        frame[last] ^= 0xFF;
        assert!(matches!(decode_envelope(&frame), Err(Status::Protocol(_))));
    }

    #[test]
    fn decode_rejects_non_hex() {
        let mut frame = encode_envelope(&[1, 2, 3]);
        frame[1] = b'Z';
        assert!(matches!(decode_envelope(&frame), Err(Status::Protocol(_))));
    }

    #[test]
    fn decode_rejects_odd_length_body() {
        // Drop one hex digit from the payload, shifting everything so the
        // body no longer splits into whole bytes.
        let frame = encode_envelope(&[1, 2, 3]);
        let mut broken = frame.clone();
        broken.remove(1);
        assert!(decode_envelope(&broken).is_err());
    }

    #[test]
    fn probe_round_trip() {
        // Spec scenario 2: {123DBA} -> {!D5B3}, 8 and 7 bytes respectively.
        let probe = b"{123DBA}";
        let response = b"{!D5B3}";
        assert_eq!(probe.len(), 8);
        assert_eq!(response.len(), 7);
    }

    #[test]
    fn crc_is_deterministic() {
        let a = crc(b"000000040004");
        let b = crc(b"000000040004");
        assert_eq!(a, b);
    }
}
