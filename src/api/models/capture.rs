use serde::{Deserialize, Serialize};

use crate::core::capture::{CaptureError, DetectionResult, DetectionSource, DetectionState, SessionStats};

/// 单次检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionInfo {
    pub detected: bool,
    pub confidence: f32,
    /// "vin" | "license_plate" | "odometer" | "document"
    pub target_type: String,
    pub rationale: String,
    pub timestamp_ms: u64,
    /// 置信度来自 OCR 校验
    pub from_ocr: bool,
    pub recognized_text: Option<String>,
}

impl From<&DetectionResult> for DetectionInfo {
    fn from(result: &DetectionResult) -> Self {
        Self {
            detected: result.detected,
            confidence: result.confidence,
            target_type: serde_json::to_value(result.target_type)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default(),
            rationale: result.rationale.clone(),
            timestamp_ms: result.timestamp_ms,
            from_ocr: result.source == DetectionSource::Ocr,
            recognized_text: result.recognized_text.clone(),
        }
    }
}

/// tick 期间产生的回调事件，按发生顺序返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptureEvent {
    Detection(DetectionInfo),
    CountdownTick { remaining_ms: u64 },
    /// 立即拍照
    Capture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureStateInfo {
    pub consecutive_hits: u32,
    pub armed: bool,
    pub countdown_remaining_ms: Option<u64>,
    pub last_result: Option<DetectionInfo>,
    pub stopped: bool,
}

impl CaptureStateInfo {
    pub fn from_state(state: &DetectionState, stopped: bool) -> Self {
        Self {
            consecutive_hits: state.consecutive_hits,
            armed: state.armed,
            countdown_remaining_ms: state.countdown_remaining_ms,
            last_result: state.last_result.as_ref().map(DetectionInfo::from),
            stopped,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStatsInfo {
    pub ticks_scored: u64,
    pub detections: u64,
    pub captures: u64,
    pub ocr_attempts: u64,
    pub ocr_fallbacks: u64,
}

impl From<SessionStats> for CaptureStatsInfo {
    fn from(stats: SessionStats) -> Self {
        Self {
            ticks_scored: stats.ticks_scored,
            detections: stats.detections,
            captures: stats.captures,
            ocr_attempts: stats.ocr_attempts,
            ocr_fallbacks: stats.ocr_fallbacks,
        }
    }
}

/// 自动拍摄 API 错误类型，FRB 友好的设计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureApiError {
    pub error_type: String,
    pub message: String,
}

impl From<CaptureError> for CaptureApiError {
    fn from(e: CaptureError) -> Self {
        let error_type = match &e {
            CaptureError::InvalidFrame(_) => "InvalidFrame",
            CaptureError::EmptyRegion => "EmptyRegion",
            CaptureError::EngineLoad(_) => "EngineLoad",
            CaptureError::Recognition(_) => "Recognition",
            CaptureError::Timeout(_) => "Timeout",
            CaptureError::Config(_) => "Config",
            CaptureError::Io(_) => "Io",
        };
        Self {
            error_type: error_type.to_string(),
            message: e.to_string(),
        }
    }
}

impl std::fmt::Display for CaptureApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.error_type, self.message)
    }
}

impl std::error::Error for CaptureApiError {}
