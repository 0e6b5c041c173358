use crate::annotations::detection::Detection;
use crate::annotations::keypoint::Keypoint;
use crate::config::DetectParams;
use crate::image_utils::letterbox::GeometricTransform;
use ndarray::ArrayView2;
use tracing::warn;

/// Leading features of every box: center x, center y, width, height.
pub const BOX_FEATURES: usize = 4;

/// Features per keypoint: x, y, visibility.
pub const KEYPOINT_FEATURES: usize = 3;

/// Candidates decoded from one image, before suppression.
#[derive(Debug, Default)]
pub struct DecodedImage {
    pub detections: Vec<Detection>,
    /// Boxes whose keypoint storage could not be allocated. They are kept, without keypoints.
    pub keypoint_allocation_failures: usize,
}

/// Number of class scores per box for a model emitting `num_features` features.
///
/// Malformed layouts (not even one class left) fall back to a single class with a warning
/// rather than failing the decode.
pub fn class_count(num_features: usize, num_keypoints: usize) -> usize {
    let reserved = BOX_FEATURES + KEYPOINT_FEATURES * num_keypoints;
    if num_features <= reserved {
        warn!(
            num_features,
            num_keypoints, "invalid class count, falling back to a single class"
        );
        1
    } else {
        num_features - reserved
    }
}

/// Decodes one image's slice of a transposed YOLO output.
///
/// `output` is `[features, boxes]`: each feature is a contiguous run across all boxes. Box
/// geometry is in letterboxed model-input pixels and is mapped back through `transform` into
/// coordinates normalized to the original `image_width x image_height` image.
pub fn decode_output(
    output: ArrayView2<f32>,
    params: &DetectParams,
    transform: &GeometricTransform,
    image_width: u32,
    image_height: u32,
) -> DecodedImage {
    let (num_features, num_boxes) = output.dim();
    let mut decoded = DecodedImage::default();
    if num_features <= BOX_FEATURES {
        warn!(num_features, "model output has no class scores, nothing to decode");
        return decoded;
    }

    let num_keypoints = params.keypoints_per_detection();
    let num_classes = class_count(num_features, num_keypoints);
    let keypoint_start = BOX_FEATURES + num_classes;
    let keypoints_readable =
        num_keypoints > 0 && keypoint_start + KEYPOINT_FEATURES * num_keypoints <= num_features;
    if num_keypoints > 0 && !keypoints_readable {
        warn!(
            num_features,
            num_keypoints, "output too small for the requested keypoints, dropping them"
        );
    }

    for i in 0..num_boxes {
        let (class_id, score) = best_class(&output, num_classes, i);
        if score < params.confidence_threshold {
            continue;
        }

        let cx = output[[0, i]];
        let cy = output[[1, i]];
        let w = output[[2, i]];
        let h = output[[3, i]];

        let mut detection = Detection::new(
            class_id as u32,
            score,
            transform.unmap_x(cx, image_width),
            transform.unmap_y(cy, image_height),
            transform.unmap_width(w, image_width),
            transform.unmap_height(h, image_height),
        );

        if keypoints_readable {
            let mut keypoints: Vec<Keypoint> = Vec::new();
            if keypoints.try_reserve_exact(num_keypoints).is_err() {
                warn!(box_index = i, "failed to allocate keypoints, keeping the box without them");
                decoded.keypoint_allocation_failures += 1;
            } else {
                for k in 0..num_keypoints {
                    let base = keypoint_start + k * KEYPOINT_FEATURES;
                    keypoints.push(Keypoint::new(
                        transform.unmap_x(output[[base, i]], image_width),
                        transform.unmap_y(output[[base + 1, i]], image_height),
                        output[[base + 2, i]],
                    ));
                }
            }
            detection.keypoints = keypoints;
        }

        decoded.detections.push(detection);
    }
    decoded
}

/// Highest class score for box `i`. Starts from a score of zero, so a box whose scores are all
/// non-positive reports class 0 with score 0.
fn best_class(output: &ArrayView2<f32>, num_classes: usize, i: usize) -> (usize, f32) {
    let mut best_class = 0_usize;
    let mut best_score = 0_f32;
    for c in 0..num_classes {
        let score = output[[BOX_FEATURES + c, i]];
        if score > best_score {
            best_score = score;
            best_class = c;
        }
    }
    (best_class, best_score)
}
