//! 自动拍摄检测引擎
//!
//! Frame → region analyzers → heuristic classifier → (optional) OCR →
//! stability state machine → capture signal.

pub mod analyzer;
pub mod classifier;
pub mod config;
pub mod error;
pub mod frame;
pub mod ocr;
pub mod session;
pub mod state_machine;
pub mod target;
pub mod validation;

pub use analyzer::{analyze_region, RegionScore};
pub use classifier::{DetectionResult, DetectionSource, HeuristicClassifier};
pub use config::CaptureConfig;
pub use error::CaptureError;
pub use frame::{FrameSample, PixelLayout, Region};
pub use ocr::{CommandRecognizer, OcrEngine, TextRecognizer};
pub use session::{CaptureListener, DetectionSession, SessionStats};
pub use state_machine::{CapturePhase, DetectionState, StabilityStateMachine};
pub use target::CaptureTargetType;
pub use validation::ValidationPattern;
