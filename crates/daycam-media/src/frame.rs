//! In-memory video frames.

use image::RgbImage;

use crate::error::{MediaError, MediaResult};

/// Decoded RGB frame owned by the capture loop for one iteration.
pub type Frame = RgbImage;

/// Byte length of an RGB24 frame.
pub fn rgb_frame_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Wrap raw RGB24 bytes as a frame.
pub fn frame_from_raw(width: u32, height: u32, data: Vec<u8>) -> MediaResult<Frame> {
    let expected_len = rgb_frame_len(width, height);
    if data.len() != expected_len {
        return Err(MediaError::invalid_frame(format!(
            "Invalid frame data length: expected {}, got {}",
            expected_len,
            data.len()
        )));
    }

    RgbImage::from_raw(width, height, data)
        .ok_or_else(|| MediaError::invalid_frame("Failed to create image buffer"))
}

/// Reject frames the detector cannot scale (zero width or height).
pub fn validate_frame(frame: &Frame) -> MediaResult<()> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        return Err(MediaError::invalid_frame(format!(
            "frame must be at least 1x1, got {width}x{height}"
        )));
    }
    Ok(())
}
