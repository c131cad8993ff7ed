//! Candidate row decoding.

use daycam_models::{BoundingBox, Detection};

use super::backend::{CoordinateSpace, DecodeLayout};

/// Largest coordinate magnitude a decoded box may carry, in pixels.
///
/// Far beyond any frame, yet small enough that edge sums stay inside `i32`.
pub const MAX_COORDINATE: i32 = 1 << 20;

/// Decode raw candidate rows into person detections.
///
/// A row is kept only when its arg-max class is `person_class` and that score
/// is strictly greater than `confidence_threshold`. Box geometry is mapped to
/// pixels of the frame being decoded (`frame_width` x `frame_height`), so the
/// caller must pass the dimensions of the current frame every time.
pub fn decode_candidates(
    rows: &[Vec<f32>],
    layout: DecodeLayout,
    frame_width: u32,
    frame_height: u32,
    person_class: usize,
    confidence_threshold: f32,
) -> Vec<Detection> {
    let (scale_w, scale_h) = match layout.coordinates {
        CoordinateSpace::Normalized => (frame_width as f32, frame_height as f32),
        CoordinateSpace::InputPixels { size } => {
            let size = size.max(1) as f32;
            (frame_width as f32 / size, frame_height as f32 / size)
        }
    };

    rows.iter()
        .filter_map(|row| {
            if row.len() < 4 || !row[..4].iter().all(|v| v.is_finite()) {
                return None;
            }
            let scores = row.get(layout.score_offset..)?;
            let (class_id, score) = arg_max(scores)?;
            if class_id != person_class || score <= confidence_threshold {
                return None;
            }

            // Center and size are truncated to pixels before the corner is derived
            let center_x = to_pixels(f64::from(row[0] * scale_w));
            let center_y = to_pixels(f64::from(row[1] * scale_h));
            let w = to_pixels(f64::from(row[2] * scale_w));
            let h = to_pixels(f64::from(row[3] * scale_h));

            let bbox = BoundingBox::new(
                to_pixels(f64::from(center_x) - f64::from(w) / 2.0),
                to_pixels(f64::from(center_y) - f64::from(h) / 2.0),
                w,
                h,
            );
            Some(Detection::person(bbox, score))
        })
        .collect()
}

/// Truncate toward zero, bounded to `±MAX_COORDINATE`.
fn to_pixels(value: f64) -> i32 {
    let bound = f64::from(MAX_COORDINATE);
    value.clamp(-bound, bound) as i32
}

/// Index and value of the highest score; the first index wins ties.
fn arg_max(scores: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Darknet row with 3 classes: person, bicycle, car.
    fn row(cx: f32, cy: f32, w: f32, h: f32, scores: [f32; 3]) -> Vec<f32> {
        let mut row = vec![cx, cy, w, h, 0.9];
        row.extend_from_slice(&scores);
        row
    }

    fn decode(rows: &[Vec<f32>], width: u32, height: u32) -> Vec<Detection> {
        decode_candidates(rows, DecodeLayout::DARKNET, width, height, 0, 0.5)
    }

    #[test]
    fn test_denormalizes_to_frame_pixels() {
        let rows = vec![row(0.5, 0.5, 0.25, 0.5, [0.8, 0.1, 0.1])];
        let dets = decode(&rows, 640, 480);

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].bbox, BoundingBox::new(240, 120, 160, 240));
        assert!((dets[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(dets[0].label, "person");
    }

    #[test]
    fn test_uses_current_frame_size() {
        let rows = vec![row(0.5, 0.5, 0.25, 0.5, [0.8, 0.1, 0.1])];
        let large = decode(&rows, 640, 480);
        let small = decode(&rows, 320, 240);
        assert_eq!(small[0].bbox, BoundingBox::new(120, 60, 80, 120));
        assert_ne!(large[0].bbox, small[0].bbox);
    }

    #[test]
    fn test_excludes_scores_at_or_below_threshold() {
        let rows = vec![
            row(0.5, 0.5, 0.1, 0.1, [0.5, 0.1, 0.1]),
            row(0.5, 0.5, 0.1, 0.1, [0.3, 0.1, 0.1]),
            row(0.5, 0.5, 0.1, 0.1, [0.51, 0.1, 0.1]),
        ];
        let dets = decode(&rows, 640, 480);
        assert_eq!(dets.len(), 1);
        assert!(dets.iter().all(|d| d.confidence > 0.5));
    }

    #[test]
    fn test_excludes_other_classes() {
        // Person scores above threshold but car wins the arg-max
        let rows = vec![row(0.5, 0.5, 0.1, 0.1, [0.7, 0.1, 0.9])];
        assert!(decode(&rows, 640, 480).is_empty());
    }

    #[test]
    fn test_input_pixel_layout() {
        let layout = DecodeLayout {
            score_offset: 4,
            coordinates: CoordinateSpace::InputPixels { size: 640 },
        };
        // Center of a 640 input, 160x320 box, on a 1280x960 frame
        let rows = vec![vec![320.0, 320.0, 160.0, 320.0, 0.95, 0.01]];
        let dets = decode_candidates(&rows, layout, 1280, 960, 0, 0.5);
        assert_eq!(dets[0].bbox, BoundingBox::new(480, 240, 320, 480));
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let rows = vec![vec![0.5, 0.5, 0.1, 0.1, 0.9]];
        assert!(decode(&rows, 640, 480).is_empty());
    }

    #[test]
    fn test_arg_max_first_wins_ties() {
        assert_eq!(arg_max(&[0.6, 0.6, 0.1]), Some((0, 0.6)));
        assert_eq!(arg_max(&[0.1, 0.7, 0.7]), Some((1, 0.7)));
        assert_eq!(arg_max(&[]), None);
    }

    #[test]
    fn test_truncates_center_and_size_before_corner() {
        // 0.3 * 101 = 30.3 -> 30 and 0.05 * 101 = 5.05 -> 5; corner 30 - 2.5 = 27.5 -> 27
        let rows = vec![row(0.3, 0.3, 0.05, 0.05, [0.9, 0.0, 0.0])];
        let dets = decode(&rows, 101, 101);
        assert_eq!(dets[0].bbox, BoundingBox::new(27, 27, 5, 5));
    }

    #[test]
    fn test_out_of_range_geometry_is_bounded() {
        let rows = vec![row(1e9, 0.5, 0.1, 0.2, [0.9, 0.0, 0.0])];
        let dets = decode(&rows, 640, 480);
        let bbox = dets[0].bbox;
        assert!(bbox.x <= MAX_COORDINATE);
        assert_eq!(bbox.width, 64);
        assert!(bbox.right() < i64::from(i32::MAX));
        assert!(bbox.iou(&bbox) > 0.99);
    }

    #[test]
    fn test_non_finite_geometry_is_dropped() {
        let rows = vec![
            row(0.5, 0.5, f32::INFINITY, 0.2, [0.9, 0.0, 0.0]),
            row(f32::NAN, 0.5, 0.1, 0.2, [0.9, 0.0, 0.0]),
        ];
        assert!(decode(&rows, 640, 480).is_empty());
    }
}
