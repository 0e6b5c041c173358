use crate::annotations::bounding_box::BoundingBoxGeometry;
use crate::annotations::keypoint::Keypoint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A detection is what is produced as output from an object detection model.
///
/// The box is stored as center + extent normalized to the ORIGINAL image, never in the
/// letterboxed model-input space. Pose models also attach an ordered list of keypoints which
/// the detection owns exclusively.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keypoints: Vec<Keypoint>,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, x: f32, y: f32, width: f32, height: f32) -> Self {
        Detection {
            class_id,
            confidence,
            x,
            y,
            width,
            height,
            keypoints: Vec::new(),
        }
    }

    pub fn with_keypoints(mut self, keypoints: Vec<Keypoint>) -> Self {
        self.keypoints = keypoints;
        self
    }
}

impl BoundingBoxGeometry for Detection {
    fn center(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    fn extent(&self) -> (f32, f32) {
        (self.width, self.height)
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "class {} ({:.2}%) at ({:.4}, {:.4}) {:.4}x{:.4}",
            self.class_id,
            self.confidence * 100.0,
            self.x,
            self.y,
            self.width,
            self.height
        )?;
        if !self.keypoints.is_empty() {
            write!(f, " with {} keypoints", self.keypoints.len())?;
        }
        Ok(())
    }
}

/// All accepted detections for one image, ordered by descending confidence.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
}

impl DetectionResult {
    pub fn new(detections: Vec<Detection>) -> Self {
        DetectionResult { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }
}

impl IntoIterator for DetectionResult {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.into_iter()
    }
}

/// One `DetectionResult` per input image, in input order.
#[derive(Debug, Default, PartialEq)]
pub struct BatchDetectionResult {
    results: Vec<DetectionResult>,
    keypoint_allocation_failures: usize,
}

impl BatchDetectionResult {
    pub fn new(results: Vec<DetectionResult>) -> Self {
        BatchDetectionResult {
            results,
            keypoint_allocation_failures: 0,
        }
    }

    pub(crate) fn with_keypoint_allocation_failures(mut self, failures: usize) -> Self {
        self.keypoint_allocation_failures = failures;
        self
    }

    /// Number of detections that lost their keypoints because the allocation failed.
    ///
    /// The batch itself is still valid when this is non-zero.
    pub fn keypoint_allocation_failures(&self) -> usize {
        self.keypoint_allocation_failures
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn results(&self) -> &[DetectionResult] {
        &self.results
    }

    pub fn get(&self, index: usize) -> Option<&DetectionResult> {
        self.results.get(index)
    }

    /// Moves the result at `index` out, leaving an empty result in its slot.
    pub fn take(&mut self, index: usize) -> Option<DetectionResult> {
        self.results.get_mut(index).map(std::mem::take)
    }

    /// Unwraps a batch-of-one into its only result.
    ///
    /// The slot is emptied before the envelope is dropped, so the detections have exactly one
    /// owner at every point. An empty envelope yields an empty result.
    pub fn into_single(mut self) -> DetectionResult {
        self.take(0).unwrap_or_default()
    }

    pub fn into_results(self) -> Vec<DetectionResult> {
        self.results
    }
}
