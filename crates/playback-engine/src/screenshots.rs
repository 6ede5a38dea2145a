//! Base64 wire format for [`Frame`] captures embedded in recorded steps.
//!
//! Neither `Bundle` nor `RecordedStep` carry explicit pixel dimensions
//! alongside their base64 blobs (only `recorded_screenshot_bounds`, a
//! document-coordinate rect that need not match the captured image's
//! pixel size 1:1 under device scaling). This crate owns a small
//! self-contained framing instead: a 4-byte little-endian width, a
//! 4-byte little-endian height, then raw RGBA8 pixels.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use playback_adapters::Frame;

const HEADER_LEN: usize = 8;

/// Decode a base64-encoded [`Frame`], per this module's framing. Returns
/// `None` on any malformed input rather than panicking, since the source
/// is an untrusted recording asset.
#[must_use]
pub fn decode_frame_b64(encoded: &str) -> Option<Frame> {
    let bytes = STANDARD.decode(encoded).ok()?;
    if bytes.len() < HEADER_LEN {
        return None;
    }
    let width = u32::from_le_bytes(bytes[0..4].try_into().ok()?);
    let height = u32::from_le_bytes(bytes[4..8].try_into().ok()?);
    let pixels = &bytes[HEADER_LEN..];
    if pixels.len() != (width as usize) * (height as usize) * 4 {
        return None;
    }
    Some(Frame::new(pixels.to_vec(), width, height))
}

/// Encode a [`Frame`] using this module's framing.
#[must_use]
pub fn encode_frame_b64(frame: &Frame) -> String {
    let mut bytes = Vec::with_capacity(HEADER_LEN + frame.pixels.len());
    bytes.extend_from_slice(&frame.width.to_le_bytes());
    bytes.extend_from_slice(&frame.height.to_le_bytes());
    bytes.extend_from_slice(&frame.pixels);
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_base64() {
        let frame = Frame::solid(4, 3, [10, 20, 30, 255]);
        let encoded = encode_frame_b64(&frame);
        let decoded = decode_frame_b64(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(decode_frame_b64(&STANDARD.encode([1, 2, 3])).is_none());
    }
}
