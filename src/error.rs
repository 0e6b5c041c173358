use thiserror::Error;

/// Numeric error codes shared with C callers.
///
/// The numbering is part of the ABI and must never be reordered.
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    Ok = 0,
    Unknown = 1,
    NotInitialized = 2,
    InvalidArgument = 3,
    AllocationFailed = 4,
    RuntimeFailure = 5,
    RuntimeNotFound = 6,
}

/// Every failure the detection pipeline can report.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    #[error("inference runtime failure: {0}")]
    RuntimeFailure(String),
    #[error("ONNX Runtime not found")]
    RuntimeNotFound,
    #[error("runtime not initialized")]
    NotInitialized,
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl DetectError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DetectError::InvalidArgument(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            DetectError::InvalidArgument(_) | DetectError::Config(_) => ErrorCode::InvalidArgument,
            DetectError::AllocationFailed(_) => ErrorCode::AllocationFailed,
            DetectError::RuntimeFailure(_) => ErrorCode::RuntimeFailure,
            DetectError::RuntimeNotFound => ErrorCode::RuntimeNotFound,
            DetectError::NotInitialized => ErrorCode::NotInitialized,
            DetectError::Io(_) => ErrorCode::Unknown,
        }
    }
}

#[cfg(feature = "onnxruntime")]
impl From<ort::Error> for DetectError {
    fn from(err: ort::Error) -> Self {
        tracing::error!(error = %err, "ONNX Runtime call failed");
        DetectError::RuntimeFailure(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DetectError>;
