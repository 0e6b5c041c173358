use itertools::Itertools;
use serde::Serialize;

pub const CPU_PROVIDER: &str = "CPUExecutionProvider";
pub const CUDA_PROVIDER: &str = "CUDAExecutionProvider";
pub const TENSORRT_PROVIDER: &str = "TensorrtExecutionProvider";
pub const COREML_PROVIDER: &str = "CoreMLExecutionProvider";
pub const DIRECTML_PROVIDER: &str = "DmlExecutionProvider";

/// What the inference runtime can accelerate on this machine. Purely informational: loading a
/// model with `use_gpu` still falls back to the CPU when CUDA cannot be registered.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GpuReport {
    pub cuda_available: bool,
    pub tensorrt_available: bool,
    pub coreml_available: bool,
    pub directml_available: bool,
    pub device_name: String,
    pub cuda_device_count: i32,
}

impl GpuReport {
    /// Builds the report from execution provider names as the runtime reports them.
    pub fn from_providers<S: AsRef<str>>(providers: &[S]) -> Self {
        let has = |name: &str| providers.iter().any(|p| p.as_ref() == name);
        let mut report = GpuReport {
            cuda_available: has(CUDA_PROVIDER),
            tensorrt_available: has(TENSORRT_PROVIDER),
            coreml_available: has(COREML_PROVIDER),
            directml_available: has(DIRECTML_PROVIDER),
            device_name: String::new(),
            cuda_device_count: 0,
        };
        report.device_name = report.preferred_device().to_string();
        report
    }

    /// Applies the outcome of registering CUDA on a session. Provider listing only says CUDA
    /// support was built in; a device is counted only once registration succeeded, and a failed
    /// registration withdraws CUDA from the report.
    pub fn with_cuda_registration(mut self, registered: bool) -> Self {
        if self.cuda_available {
            if registered {
                self.cuda_device_count = 1;
            } else {
                self.cuda_available = false;
            }
        }
        self.device_name = self.preferred_device().to_string();
        self
    }

    /// The report given when no inference runtime is linked in.
    pub fn runtime_not_found() -> Self {
        GpuReport {
            device_name: "ONNX Runtime not found".to_string(),
            ..Default::default()
        }
    }

    fn preferred_device(&self) -> &'static str {
        if self.tensorrt_available {
            "NVIDIA GPU (TensorRT)"
        } else if self.cuda_available {
            "NVIDIA GPU (CUDA)"
        } else if self.coreml_available {
            "Apple Neural Engine (CoreML)"
        } else if self.directml_available {
            "GPU (DirectML)"
        } else {
            "CPU only"
        }
    }
}

/// Comma separated provider list. Never empty: the CPU provider is always reported.
pub fn providers_string<S: AsRef<str>>(providers: &[S]) -> String {
    let joined = providers
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| !p.is_empty())
        .unique()
        .join(",");
    if joined.is_empty() {
        CPU_PROVIDER.to_string()
    } else {
        joined
    }
}

/// Execution providers usable in this process, GPU providers first.
#[cfg(feature = "onnxruntime")]
pub fn available_providers() -> Vec<String> {
    use ort::execution_providers::{
        CUDAExecutionProvider, CoreMLExecutionProvider, DirectMLExecutionProvider,
        ExecutionProvider, TensorRTExecutionProvider,
    };

    fn query(name: &str, provider: &dyn ExecutionProvider) -> Option<String> {
        match provider.is_available() {
            Ok(true) => Some(name.to_string()),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!(provider = name, error = %e, "could not query execution provider");
                None
            }
        }
    }

    let candidates: [(&str, &dyn ExecutionProvider); 4] = [
        (TENSORRT_PROVIDER, &TensorRTExecutionProvider::default()),
        (CUDA_PROVIDER, &CUDAExecutionProvider::default()),
        (COREML_PROVIDER, &CoreMLExecutionProvider::default()),
        (DIRECTML_PROVIDER, &DirectMLExecutionProvider::default()),
    ];
    let mut providers: Vec<String> = candidates
        .iter()
        .filter_map(|(name, provider)| query(name, *provider))
        .collect();
    providers.push(CPU_PROVIDER.to_string());
    providers
}

#[cfg(not(feature = "onnxruntime"))]
pub fn available_providers() -> Vec<String> {
    vec![CPU_PROVIDER.to_string()]
}

#[cfg(feature = "onnxruntime")]
pub fn gpu_report() -> GpuReport {
    let report = GpuReport::from_providers(&available_providers());
    if report.cuda_available {
        report.with_cuda_registration(cuda_registers())
    } else {
        report
    }
}

/// Registers CUDA on a throwaway session builder.
#[cfg(feature = "onnxruntime")]
fn cuda_registers() -> bool {
    use ort::execution_providers::{CUDAExecutionProvider, ExecutionProvider};
    use ort::session::Session;

    let mut builder = match Session::builder() {
        Ok(builder) => builder,
        Err(e) => {
            tracing::warn!(error = %e, "could not create session options for CUDA check");
            return false;
        }
    };
    match CUDAExecutionProvider::default().register(&mut builder) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "CUDA execution provider is built in but cannot be registered");
            false
        }
    }
}

#[cfg(not(feature = "onnxruntime"))]
pub fn gpu_report() -> GpuReport {
    GpuReport::runtime_not_found()
}

/// True when CUDA inference can be requested.
pub fn is_gpu_available() -> bool {
    gpu_report().cuda_available
}
