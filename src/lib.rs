//! YOLO object detection over ONNX Runtime.
//!
//! RGBA images are letterboxed into the model input, run through the model in one batch,
//! decoded from the transposed `[features, boxes]` output and filtered with class-aware
//! non-maximum suppression. Results come back as normalized boxes (and keypoints for pose
//! models) relative to each original image.
//!
//! The same pipeline is exposed to C through [`ffi`].

pub mod annotations;
pub mod config;
pub mod error;
pub mod ffi;
pub mod image_utils;
pub mod object_detection;

pub use annotations::detection::{BatchDetectionResult, Detection, DetectionResult};
pub use annotations::keypoint::Keypoint;
pub use config::{DetectParams, DetectionConfig, ModelKind};
pub use error::{DetectError, ErrorCode, Result};
pub use image_utils::letterbox::GeometricTransform;
pub use image_utils::rgba_view::RgbaImageView;
pub use object_detection::batch::{detect, detect_batch};
pub use object_detection::object_detection_model::{InferenceBackend, ModelDescriptor};
pub use object_detection::runtime::{Model, Runtime};
