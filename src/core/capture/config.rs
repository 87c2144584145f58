//! 会话配置 - JSON 输入，字段缺省即用默认值

use serde::{Deserialize, Serialize};

use super::error::CaptureError;
use super::state_machine::StateConfig;
use super::target::CaptureTargetType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub target_type: CaptureTargetType,
    /// Overrides the target's own threshold
    pub confidence_threshold: Option<f32>,
    pub consecutive_detections_required: u32,
    pub detection_interval_ms: u64,
    pub countdown_ms: u64,
    pub enable_ocr: bool,
    pub ocr_timeout_ms: u64,
    pub batch_mode: bool,
    /// tesseract-compatible executable used when OCR is enabled
    pub ocr_command: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_type: CaptureTargetType::Vin,
            confidence_threshold: None,
            consecutive_detections_required: 3,
            detection_interval_ms: 500,
            countdown_ms: 3000,
            enable_ocr: false,
            ocr_timeout_ms: 3000,
            batch_mode: false,
            ocr_command: "tesseract".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn for_target(target_type: CaptureTargetType) -> Self {
        Self {
            target_type,
            ..Default::default()
        }
    }

    /// 手持拍摄，快速触发
    pub fn for_quick_capture(target_type: CaptureTargetType) -> Self {
        let state = StateConfig::for_quick_capture();
        Self {
            target_type,
            consecutive_detections_required: state.consecutive_detections_required,
            countdown_ms: state.countdown_ms,
            detection_interval_ms: 300,
            ..Default::default()
        }
    }

    /// 固定机位，要求更稳定
    pub fn for_steady_capture(target_type: CaptureTargetType) -> Self {
        let state = StateConfig::for_steady_capture();
        Self {
            target_type,
            consecutive_detections_required: state.consecutive_detections_required,
            countdown_ms: state.countdown_ms,
            detection_interval_ms: 500,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CaptureError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The threshold the session actually gates on.
    pub fn effective_threshold(&self) -> f32 {
        match self.confidence_threshold.filter(|t| !t.is_nan()) {
            Some(t) => t.clamp(0.0, 1.0),
            None => self.target_type.profile().threshold,
        }
    }

    pub fn state_config(&self) -> StateConfig {
        StateConfig {
            consecutive_detections_required: self.consecutive_detections_required,
            countdown_ms: self.countdown_ms,
            batch_mode: self.batch_mode,
        }
    }
}
