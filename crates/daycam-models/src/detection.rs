//! Person detections in absolute pixel coordinates.

use serde::{Deserialize, Serialize};

/// Label attached to every detection the recorder keeps.
pub const PERSON_LABEL: &str = "person";

/// Axis-aligned box in pixel coordinates of the frame it was detected on.
///
/// Coordinates may be negative or extend past the frame edge: they are the
/// denormalized network output, not a clipped region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    /// X coordinate of the top-left corner
    pub x: i32,
    /// Y coordinate of the top-left corner
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    /// Create a new bounding box.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }

    /// Box area in pixels (zero for degenerate boxes).
    pub fn area(&self) -> i64 {
        i64::from(self.width.max(0)) * i64::from(self.height.max(0))
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = i64::from(self.x.max(other.x));
        let y1 = i64::from(self.y.max(other.y));
        let x2 = self.right().min(other.right());
        let y2 = self.bottom().min(other.bottom());

        let inter_w = (x2 - x1).max(0);
        let inter_h = (y2 - y1).max(0);
        let intersection = inter_w * inter_h;

        let union = self.area() + other.area() - intersection;
        if union > 0 {
            intersection as f32 / union as f32
        } else {
            0.0
        }
    }
}

/// A single person detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Class label, always [`PERSON_LABEL`]
    pub label: String,
    /// Detection confidence [0, 1]
    pub confidence: f32,
}

impl Detection {
    /// Create a person detection.
    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            label: PERSON_LABEL.to_string(),
            confidence,
        }
    }
}
