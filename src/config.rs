use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Which head layout the model was exported with.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Plain detector: `4 + num_classes` features per box.
    #[default]
    Detection,
    /// Pose detector: `4 + num_classes + 3 * num_keypoints` features per box.
    Pose,
}

impl ModelKind {
    /// Maps the C-side integer. Anything but 1 is a plain detector.
    pub fn from_raw(value: i32) -> Self {
        match value {
            1 => ModelKind::Pose,
            _ => ModelKind::Detection,
        }
    }
}

/// Per-call detection parameters.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DetectParams {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub model_kind: ModelKind,
    pub num_keypoints: usize,
}

impl Default for DetectParams {
    fn default() -> Self {
        DetectParams {
            confidence_threshold: 0.25,
            nms_threshold: 0.45,
            model_kind: ModelKind::Detection,
            num_keypoints: 0,
        }
    }
}

impl DetectParams {
    pub fn new(confidence_threshold: f32, nms_threshold: f32) -> Self {
        DetectParams {
            confidence_threshold,
            nms_threshold,
            ..Default::default()
        }
    }

    pub fn pose(mut self, num_keypoints: usize) -> Self {
        self.model_kind = ModelKind::Pose;
        self.num_keypoints = num_keypoints;
        self
    }

    /// Keypoints the decoder extracts per box; zero unless this is a pose model.
    pub fn keypoints_per_detection(&self) -> usize {
        match self.model_kind {
            ModelKind::Pose => self.num_keypoints,
            ModelKind::Detection => 0,
        }
    }
}

/// Settings for a detection run, as read from a JSON file.
///
/// ```json
/// { "model_path": "yolov8n-pose.onnx", "use_gpu": true,
///   "confidence_threshold": 0.5, "model_kind": "pose", "num_keypoints": 17 }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: Option<PathBuf>,
    pub use_gpu: bool,
    pub batch_size: usize,
    #[serde(flatten)]
    pub params: DetectParams,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            model_path: None,
            use_gpu: false,
            batch_size: 8,
            params: DetectParams::default(),
        }
    }
}

impl DetectionConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(filepath: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(filepath)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;

    #[test]
    fn empty_json_gives_defaults() {
        let config = DetectionConfig::from_json_str("{}").unwrap();
        assert_eq!(config, DetectionConfig::default());
        assert_eq!(config.params.keypoints_per_detection(), 0);
    }

    #[test]
    fn flattened_params_are_read() {
        let config = DetectionConfig::from_json_str(
            r#"{"model_path": "m.onnx", "confidence_threshold": 0.6,
                "model_kind": "pose", "num_keypoints": 17, "batch_size": 2}"#,
        )
        .unwrap();
        assert_eq!(config.model_path, Some(PathBuf::from("m.onnx")));
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.params.confidence_threshold, 0.6);
        assert_eq!(config.params.nms_threshold, 0.45);
        assert_eq!(config.params.keypoints_per_detection(), 17);
    }

    #[test]
    fn keypoints_ignored_for_plain_models() {
        let params = DetectParams {
            num_keypoints: 17,
            ..Default::default()
        };
        assert_eq!(params.keypoints_per_detection(), 0);
    }

    #[test]
    fn model_kind_from_raw() {
        assert_eq!(ModelKind::from_raw(0), ModelKind::Detection);
        assert_eq!(ModelKind::from_raw(1), ModelKind::Pose);
        assert_eq!(ModelKind::from_raw(7), ModelKind::Detection);
    }

    #[test]
    fn malformed_json_is_an_invalid_argument() {
        let err = DetectionConfig::from_json_str("{ nope").unwrap_err();
        assert!(matches!(err, DetectError::Config(_)));
    }
}
