//! 拍摄目标类型 + 每种目标的区域 / 门限配置表
//!
//! Adding a target is a data change: one enum variant plus one `TargetProfile`.

use serde::{Deserialize, Serialize};

use super::frame::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTargetType {
    Vin,
    LicensePlate,
    Odometer,
    Document,
}

impl CaptureTargetType {
    pub const ALL: [CaptureTargetType; 4] = [
        CaptureTargetType::Vin,
        CaptureTargetType::LicensePlate,
        CaptureTargetType::Odometer,
        CaptureTargetType::Document,
    ];

    pub fn profile(self) -> &'static TargetProfile {
        match self {
            CaptureTargetType::Vin => &VIN_PROFILE,
            CaptureTargetType::LicensePlate => &PLATE_PROFILE,
            CaptureTargetType::Odometer => &ODOMETER_PROFILE,
            CaptureTargetType::Document => &DOCUMENT_PROFILE,
        }
    }
}

impl std::fmt::Display for CaptureTargetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureTargetType::Vin => write!(f, "VIN"),
            CaptureTargetType::LicensePlate => write!(f, "License plate"),
            CaptureTargetType::Odometer => write!(f, "Odometer"),
            CaptureTargetType::Document => write!(f, "Document"),
        }
    }
}

/// One of the region analyzer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Brightness,
    Contrast,
    EdgeDensity,
    /// Edge density counting vertical luma steps only
    HorizontalEdges,
    Shape,
}

impl Signal {
    pub fn label(self) -> &'static str {
        match self {
            Signal::Brightness => "Brightness",
            Signal::Contrast => "Contrast",
            Signal::EdgeDensity => "Edges",
            Signal::HorizontalEdges => "Horizontal edges",
            Signal::Shape => "Shape",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gate {
    /// value > bound
    Above(f32),
    /// lo <= value <= hi
    Within(f32, f32),
}

impl Gate {
    pub fn passes(self, value: f32) -> bool {
        match self {
            Gate::Above(bound) => value > bound,
            Gate::Within(lo, hi) => value >= lo && value <= hi,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalRule {
    pub signal: Signal,
    pub gate: Gate,
    pub weight: f32,
}

const fn rule(signal: Signal, gate: Gate, weight: f32) -> SignalRule {
    SignalRule {
        signal,
        gate,
        weight,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetProfile {
    /// Where the target is expected inside the viewfinder
    pub region: Region,
    pub rules: &'static [SignalRule],
    /// detected = confidence >= threshold
    pub threshold: f32,
    /// Minimum heuristic confidence before OCR is attempted
    pub ocr_trigger: f32,
    /// Confidence reported when OCR text matches the validation pattern
    pub ocr_confidence: f32,
}

static VIN_PROFILE: TargetProfile = TargetProfile {
    region: Region::new(0.20, 0.40, 0.80, 0.60),
    rules: &[
        rule(Signal::Brightness, Gate::Above(0.6), 0.3),
        rule(Signal::Contrast, Gate::Above(0.5), 0.3),
        rule(Signal::Shape, Gate::Above(0.5), 0.4),
    ],
    threshold: 0.75,
    ocr_trigger: 0.6,
    ocr_confidence: 0.95,
};

// ~2:1 plate framing on a landscape viewfinder
static PLATE_PROFILE: TargetProfile = TargetProfile {
    region: Region::new(0.30, 0.40, 0.70, 0.60),
    rules: &[
        rule(Signal::Contrast, Gate::Above(0.6), 0.3),
        rule(Signal::Shape, Gate::Above(0.7), 0.4),
        rule(Signal::HorizontalEdges, Gate::Above(0.15), 0.3),
    ],
    threshold: 0.80,
    ocr_trigger: 0.65,
    ocr_confidence: 0.92,
};

static ODOMETER_PROFILE: TargetProfile = TargetProfile {
    region: Region::new(0.35, 0.40, 0.65, 0.60),
    rules: &[
        rule(Signal::Contrast, Gate::Above(0.6), 0.5),
        rule(Signal::EdgeDensity, Gate::Above(0.15), 0.5),
    ],
    threshold: 0.75,
    ocr_trigger: 0.6,
    ocr_confidence: 0.90,
};

static DOCUMENT_PROFILE: TargetProfile = TargetProfile {
    region: Region::new(0.10, 0.10, 0.90, 0.90),
    rules: &[
        rule(Signal::Brightness, Gate::Above(0.7), 0.35),
        rule(Signal::Contrast, Gate::Within(0.3, 0.8), 0.25),
        rule(Signal::Shape, Gate::Above(0.6), 0.4),
    ],
    threshold: 0.70,
    ocr_trigger: 0.6,
    ocr_confidence: 0.90,
};
