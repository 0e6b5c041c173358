pub mod accelerator;
pub mod batch;
pub mod object_detection_model;
pub mod object_detection_utils;
#[cfg(feature = "onnxruntime")]
pub mod ort_inference_session;
pub mod runtime;
pub mod yolo_output;
