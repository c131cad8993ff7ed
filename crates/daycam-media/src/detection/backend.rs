//! Inference backend seam.

use crate::error::MediaResult;
use crate::frame::Frame;

/// Coordinate space the network reports box geometry in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSpace {
    /// Fractions of the frame width/height (Darknet YOLO)
    Normalized,
    /// Pixels of the square network input (YOLOv5/v8 exports)
    InputPixels { size: u32 },
}

/// Layout of one candidate row: `[cx, cy, w, h, ..., class scores]`.
///
/// The offset and coordinate space belong to the model architecture, so a
/// backend carries its own layout instead of the decoder assuming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLayout {
    /// Index of the first class score
    pub score_offset: usize,
    pub coordinates: CoordinateSpace,
}

impl DecodeLayout {
    /// Darknet YOLOv3: `[cx, cy, w, h, objectness, 80 class scores]`, normalized.
    pub const DARKNET: DecodeLayout = DecodeLayout {
        score_offset: 5,
        coordinates: CoordinateSpace::Normalized,
    };
}

/// Runs the network forward on a frame.
///
/// Implementations own any model handle; the detector never shares a backend
/// between frames concurrently.
pub trait InferenceBackend: Send {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Row layout of [`InferenceBackend::forward`] output.
    fn layout(&self) -> DecodeLayout;

    /// Resize/normalize `frame` to the network input and return one row per
    /// candidate, concatenated across all output layers.
    fn forward(&mut self, frame: &Frame) -> MediaResult<Vec<Vec<f32>>>;
}
