//! Wire frame codec.
//!
//! Frames are fixed-grammar text: `<deviceId>V<vv>C<cc>T<tt>` where the
//! device id is one or more ASCII alphanumerics and each field is a
//! zero-padded two-digit decimal (00-99). Example: `D1V07C42T19`.
//!
//! `decode` is pure and total: any deviation from the grammar yields
//! `DecodeError::MalformedFrame`, nothing panics.

use crate::error::DecodeError;

/// The fixed-size `V..C..T..` tail of every frame.
const TAIL_LEN: usize = 9;

/// One successfully decoded frame, before it is stamped into a `LiveSample`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub device_id: String,
    pub voltage: u8,
    pub current: u8,
    pub temperature: u8,
}

/// Decodes a raw text frame.
pub fn decode(raw: &str) -> Result<DecodedFrame, DecodeError> {
    let malformed = || DecodeError::MalformedFrame(raw.to_string());
    let bytes = raw.as_bytes();
    if bytes.len() < TAIL_LEN + 1 {
        return Err(malformed());
    }

    let (id, tail) = bytes.split_at(bytes.len() - TAIL_LEN);
    if id.is_empty() || !id.iter().all(|b| b.is_ascii_alphanumeric()) {
        return Err(malformed());
    }
    if tail[0] != b'V' || tail[3] != b'C' || tail[6] != b'T' {
        return Err(malformed());
    }

    let voltage = two_digits(&tail[1..3]).ok_or_else(malformed)?;
    let current = two_digits(&tail[4..6]).ok_or_else(malformed)?;
    let temperature = two_digits(&tail[7..9]).ok_or_else(malformed)?;

    Ok(DecodedFrame {
        // id is pure ASCII alphanumerics, checked above
        device_id: String::from_utf8_lossy(id).into_owned(),
        voltage,
        current,
        temperature,
    })
}

/// Encodes a frame. Inverse of `decode` for values in 0..=99; used by the
/// devkit frame builders and demo feeds, not by the client hot path.
pub fn encode(device_id: &str, voltage: u8, current: u8, temperature: u8) -> String {
    debug_assert!(voltage <= 99 && current <= 99 && temperature <= 99);
    format!("{device_id}V{voltage:02}C{current:02}T{temperature:02}")
}

fn two_digits(bytes: &[u8]) -> Option<u8> {
    let hi = (bytes[0] as char).to_digit(10)?;
    let lo = (bytes[1] as char).to_digit(10)?;
    Some((hi * 10 + lo) as u8)
}
