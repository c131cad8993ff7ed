//! Greedy non-maximum suppression.

use daycam_models::Detection;

/// Remove overlapping detections, keeping the highest confidence per cluster.
///
/// Candidates at or below `score_threshold` are dropped first. Remaining
/// candidates are visited in descending confidence (stable, so equal scores
/// keep their input order) and any later box whose IoU with a kept box
/// exceeds `iou_threshold` is suppressed.
///
/// Every pair in the result has IoU <= `iou_threshold`, so running it again on
/// its own output returns the same set.
pub fn non_maximum_suppression(
    detections: Vec<Detection>,
    score_threshold: f32,
    iou_threshold: f32,
) -> Vec<Detection> {
    let mut candidates: Vec<Detection> = detections
        .into_iter()
        .filter(|d| d.confidence > score_threshold)
        .collect();

    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = keep
            .iter()
            .any(|kept| kept.bbox.iou(&candidate.bbox) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }

    keep
}
