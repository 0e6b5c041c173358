use crate::annotations::detection::{BatchDetectionResult, DetectionResult};
use crate::config::DetectParams;
use crate::error::{DetectError, Result};
use crate::image_utils::rgba_view::RgbaImageView;
use crate::object_detection::batch;
use crate::object_detection::object_detection_model::{InferenceBackend, ModelDescriptor};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Process-level inference environment.
///
/// Opening and closing are idempotent and safe to call from any thread. Models can only be
/// loaded while the runtime is open. Models that are already loaded keep working after
/// `close`; they own their sessions.
#[derive(Debug, Default)]
pub struct Runtime {
    open: Mutex<bool>,
}

impl Runtime {
    pub const fn new() -> Self {
        Runtime {
            open: Mutex::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, bool> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initializes the inference environment. Calling it again while open does nothing.
    #[cfg(feature = "onnxruntime")]
    pub fn open(&self) -> Result<()> {
        self.open_with(|| {
            ort::init().with_name("onnx-detect").commit()?;
            Ok(())
        })
    }

    #[cfg(not(feature = "onnxruntime"))]
    pub fn open(&self) -> Result<()> {
        self.open_with(|| Err(DetectError::RuntimeNotFound))
    }

    /// Runs `init` unless already open. The runtime is marked open only when `init` succeeds.
    fn open_with<F: FnOnce() -> Result<()>>(&self, init: F) -> Result<()> {
        let mut open = self.state();
        if !*open {
            init()?;
            tracing::info!("inference runtime initialized");
            *open = true;
        }
        Ok(())
    }

    /// Marks the runtime closed. Safe to call when it was never opened.
    pub fn close(&self) {
        let mut open = self.state();
        if *open {
            debug!("inference runtime closed");
            *open = false;
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state()
    }

    /// Loads an ONNX model. Fails with `NotInitialized` unless the runtime is open.
    #[cfg(feature = "onnxruntime")]
    pub fn load_model(&self, model_path: &Path, use_gpu: bool) -> Result<Model> {
        use crate::object_detection::ort_inference_session::OrtInferenceSession;

        if !self.is_open() {
            return Err(DetectError::NotInitialized);
        }
        if model_path.as_os_str().is_empty() {
            return Err(DetectError::invalid("model path is empty"));
        }
        let session = OrtInferenceSession::new(model_path, use_gpu)?;
        Ok(Model::from_backend(session))
    }

    #[cfg(not(feature = "onnxruntime"))]
    pub fn load_model(&self, _model_path: &Path, _use_gpu: bool) -> Result<Model> {
        Err(DetectError::RuntimeNotFound)
    }
}

/// A loaded detector.
///
/// Not meant to be shared between threads without external locking: every detection call
/// takes `&mut self`.
pub struct Model {
    backend: Box<dyn InferenceBackend + Send>,
}

impl Model {
    /// Wraps any inference backend, e.g. a session built elsewhere or an in-memory stub.
    pub fn from_backend(backend: impl InferenceBackend + Send + 'static) -> Self {
        Model {
            backend: Box::new(backend),
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        self.backend.descriptor()
    }

    /// Model input width and height in pixels.
    pub fn input_size(&self) -> (u32, u32) {
        let descriptor = self.descriptor();
        (descriptor.input_width, descriptor.input_height)
    }

    pub fn detect(&mut self, image: &RgbaImageView, params: &DetectParams) -> Result<DetectionResult> {
        batch::detect(self.backend.as_mut(), image, params)
    }

    pub fn detect_batch(
        &mut self,
        images: &[RgbaImageView],
        params: &DetectParams,
    ) -> Result<BatchDetectionResult> {
        batch::detect_batch(self.backend.as_mut(), images, params)
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("descriptor", self.descriptor())
            .finish()
    }
}
