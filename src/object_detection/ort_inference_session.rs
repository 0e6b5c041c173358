use crate::error::{DetectError, Result};
use crate::object_detection::object_detection_model::{
    InferenceBackend, ModelDescriptor, resolve_dimension,
};
use ndarray::{Array4, ArrayD};
use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, ValueType};
use std::path::Path;
use tracing::info;

const INTRA_OP_THREADS: usize = 4;

/// An onnxruntime inference session.
///
/// The detection pipeline only ever talks to it through [`InferenceBackend`]; everything it
/// needs to know about the graph is read once into a [`ModelDescriptor`] when the session is
/// created.
pub struct OrtInferenceSession {
    session: Session,
    descriptor: ModelDescriptor,
}

impl OrtInferenceSession {
    /// Loads `model_path`. With `use_gpu` the CUDA provider is registered ahead of the CPU one;
    /// onnxruntime falls back to the CPU when CUDA cannot be used.
    pub fn new(model_path: &Path, use_gpu: bool) -> Result<Self> {
        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_OP_THREADS)?;
        if use_gpu {
            builder = builder.with_execution_providers([
                CUDAExecutionProvider::default().build(),
                CPUExecutionProvider::default().build(),
            ])?;
        }
        let session = builder.commit_from_file(model_path)?;
        let descriptor = describe(&session)?;
        info!(
            model = %model_path.display(),
            use_gpu,
            input = %descriptor.input_name,
            input_width = descriptor.input_width,
            input_height = descriptor.input_height,
            outputs = descriptor.output_names.len(),
            "loaded model"
        );
        Ok(Self {
            session,
            descriptor,
        })
    }
}

fn describe(session: &Session) -> Result<ModelDescriptor> {
    let input = session
        .inputs
        .first()
        .ok_or_else(|| DetectError::RuntimeFailure("model declares no inputs".to_string()))?;
    let dims: Vec<i64> = match &input.input_type {
        ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
        _ => Vec::new(),
    };
    let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
    if output_names.is_empty() {
        return Err(DetectError::RuntimeFailure(
            "model declares no outputs".to_string(),
        ));
    }
    // NCHW
    Ok(ModelDescriptor {
        input_width: resolve_dimension(&dims, 3),
        input_height: resolve_dimension(&dims, 2),
        input_name: input.name.clone(),
        output_names,
    })
}

impl InferenceBackend for OrtInferenceSession {
    fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    fn run(&mut self, input: Array4<f32>) -> Result<ArrayD<f32>> {
        let input_tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![self.descriptor.input_name.as_str() => input_tensor])?;
        let output = outputs[self.descriptor.output_names[0].as_str()]
            .try_extract_array::<f32>()?
            .to_owned();
        Ok(output)
    }
}
