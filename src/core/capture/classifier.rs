//! 启发式分类 - 把区域分数合成为单个置信度
//!
//! Each signal rule maps its raw value to a satisfaction in [0, 1]:
//! - gate met: `0.75 + 0.25 * margin`, so every met gate contributes >= 0.75
//! - gate missed: at most `MISSED_GATE_CEILING`, which is below every threshold
//!
//! With all gates met the confidence is the weighted mean of the satisfactions,
//! otherwise it is the weakest satisfaction. The result is monotonic in every
//! signal and a frame with a missed gate can never be detected.

use super::analyzer::RegionScore;
use super::target::{CaptureTargetType, Gate, SignalRule};

const MET_GATE_FLOOR: f32 = 0.75;
const MISSED_GATE_CEILING: f32 = 0.68;
/// Distance outside a `Gate::Within` band at which satisfaction reaches 0
const RANGE_FALLOFF: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    Heuristic,
    Ocr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub detected: bool,
    pub confidence: f32,
    pub target_type: CaptureTargetType,
    pub rationale: String,
    pub timestamp_ms: u64,
    pub source: DetectionSource,
    /// Validated OCR text, when the OCR pass matched
    pub recognized_text: Option<String>,
}

impl DetectionResult {
    /// A negative result for a tick that could not be scored.
    pub fn miss(target_type: CaptureTargetType, rationale: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            detected: false,
            confidence: 0.0,
            target_type,
            rationale: rationale.into(),
            timestamp_ms,
            source: DetectionSource::Heuristic,
            recognized_text: None,
        }
    }
}

pub struct HeuristicClassifier {
    target: CaptureTargetType,
    threshold: f32,
}

impl HeuristicClassifier {
    pub fn new(target: CaptureTargetType) -> Self {
        Self {
            target,
            threshold: target.profile().threshold,
        }
    }

    /// Overrides the per-target threshold (clamped into [0, 1]).
    pub fn with_threshold(target: CaptureTargetType, threshold: Option<f32>) -> Self {
        let mut classifier = Self::new(target);
        if let Some(t) = threshold.filter(|t| !t.is_nan()) {
            classifier.threshold = t.clamp(0.0, 1.0);
        }
        classifier
    }

    pub fn target(&self) -> CaptureTargetType {
        self.target
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn classify(&self, score: &RegionScore, timestamp_ms: u64) -> DetectionResult {
        let rules = self.target.profile().rules;
        let confidence = combine(score, rules);

        DetectionResult {
            detected: confidence >= self.threshold,
            confidence,
            target_type: self.target,
            rationale: rationale(score, rules),
            timestamp_ms,
            source: DetectionSource::Heuristic,
            recognized_text: None,
        }
    }
}

fn combine(score: &RegionScore, rules: &[SignalRule]) -> f32 {
    if rules.is_empty() {
        return 0.0;
    }

    let mut all_met = true;
    let mut weakest = f32::MAX;
    let mut weighted = 0.0f32;
    let mut total_weight = 0.0f32;

    for rule in rules {
        let value = sanitize(score.value(rule.signal));
        all_met &= rule.gate.passes(value);

        let s = satisfaction(rule.gate, value);
        weakest = weakest.min(s);
        weighted += s * rule.weight;
        total_weight += rule.weight;
    }

    let confidence = if !all_met {
        weakest
    } else if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    };
    confidence.clamp(0.0, 1.0)
}

fn satisfaction(gate: Gate, value: f32) -> f32 {
    match gate {
        Gate::Above(bound) => {
            if value > bound {
                let headroom = 1.0 - bound;
                let margin = if headroom > 0.0 {
                    ((value - bound) / headroom).min(1.0)
                } else {
                    1.0
                };
                MET_GATE_FLOOR + (1.0 - MET_GATE_FLOOR) * margin
            } else if bound > 0.0 {
                MISSED_GATE_CEILING * (value / bound).max(0.0)
            } else {
                0.0
            }
        }
        Gate::Within(lo, hi) => {
            if value >= lo && value <= hi {
                let half = (hi - lo) / 2.0;
                let centered = if half > 0.0 {
                    1.0 - ((value - (lo + half)).abs() / half).min(1.0)
                } else {
                    1.0
                };
                MET_GATE_FLOOR + (1.0 - MET_GATE_FLOOR) * centered
            } else {
                let distance = if value < lo { lo - value } else { value - hi };
                MISSED_GATE_CEILING * (1.0 - distance / RANGE_FALLOFF).max(0.0)
            }
        }
    }
}

fn sanitize(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// e.g. "Brightness: 0.71, Contrast: 0.68, Shape: 0.89"
fn rationale(score: &RegionScore, rules: &[SignalRule]) -> String {
    rules
        .iter()
        .map(|r| format!("{}: {:.2}", r.signal.label(), score.value(r.signal)))
        .collect::<Vec<_>>()
        .join(", ")
}
