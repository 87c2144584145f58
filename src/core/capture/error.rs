use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Region is empty after clamping")]
    EmptyRegion,
    #[error("OCR engine load failed: {0}")]
    EngineLoad(String),
    #[error("Text recognition failed: {0}")]
    Recognition(String),
    #[error("OCR timed out after {0}ms")]
    Timeout(u64),
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
