use crate::error::Result;
use ndarray::{Array4, ArrayD};

/// Static facts about a loaded model that the pipeline needs before running it.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDescriptor {
    pub input_width: u32,
    pub input_height: u32,
    pub input_name: String,
    pub output_names: Vec<String>,
}

/// Spatial size assumed when the model reports a dynamic or missing input shape.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

impl Default for ModelDescriptor {
    fn default() -> Self {
        ModelDescriptor {
            input_width: DEFAULT_INPUT_SIZE,
            input_height: DEFAULT_INPUT_SIZE,
            input_name: "images".to_string(),
            output_names: vec!["output0".to_string()],
        }
    }
}

/// Defines a trait that all inference backends must follow.
///
/// The batch pipeline only needs the input geometry and a way to turn one `[N, 3, H, W]`
/// tensor into the model's first output. Keeping this behind a trait lets the pipeline be
/// driven by onnxruntime in production and by an in-memory stub in tests.
pub trait InferenceBackend {
    fn descriptor(&self) -> &ModelDescriptor;

    /// Runs the model once on the whole batch and returns its first output tensor, which for
    /// YOLO heads is shaped `[N, features, boxes]`.
    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>>;
}

/// Reads one declared input dimension, falling back to [`DEFAULT_INPUT_SIZE`] when the model
/// leaves it dynamic (negative) or does not declare it.
pub fn resolve_dimension(dims: &[i64], axis: usize) -> u32 {
    match dims.get(axis) {
        Some(&d) if d > 0 && d <= u32::MAX as i64 => d as u32,
        _ => DEFAULT_INPUT_SIZE,
    }
}
