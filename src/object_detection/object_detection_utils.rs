use crate::annotations::bounding_box::iou;
use crate::annotations::detection::Detection;

/// Non maxmimum suppression is a way of removing duplicate detections.
///
/// Detections are sorted by confidence (highest first, stable for ties) and accepted greedily.
/// An accepted detection suppresses every later detection of the same class whose IoU with it
/// is strictly greater than `iou_threshold`. Boxes of different classes never suppress each
/// other. The survivors are returned in descending confidence order.
pub fn non_maximum_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut detections_to_remove: Vec<bool> = vec![false; detections.len()];
    for (current_index, current_det) in detections.iter().enumerate() {
        if detections_to_remove[current_index] {
            continue;
        }
        for (other_index, other_det) in detections[current_index + 1..].iter().enumerate() {
            let other_index = current_index + other_index + 1;
            if detections_to_remove[other_index] {
                continue;
            }
            if current_det.class_id != other_det.class_id {
                continue;
            }
            if iou(current_det, other_det) > iou_threshold {
                detections_to_remove[other_index] = true;
            }
        }
    }
    detections
        .into_iter()
        .zip(detections_to_remove)
        .filter_map(|(det, removed)| if removed { None } else { Some(det) })
        .collect()
}
