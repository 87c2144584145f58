//! OCR 文本校验 - 每种拍摄目标的字符规则

use once_cell::sync::Lazy;
use regex::Regex;

use super::target::CaptureTargetType;

/// 17 characters, no I / O / Q, not glued to other alphanumerics
static VIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Z0-9])([A-HJ-NPR-Z0-9]{17})(?:[^A-Z0-9]|$)").expect("valid VIN pattern")
});
static PLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z0-9]{2,8}").expect("valid plate pattern"));
static DIGIT_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid digit pattern"));

const PLATE_MIN_LEN: usize = 4;
const ODOMETER_DIGITS: std::ops::RangeInclusive<usize> = 5..=7;
const ODOMETER_RANGE: std::ops::RangeInclusive<u32> = 1_000..=999_999;
const DOCUMENT_MIN_WORDS: usize = 5;
const DOCUMENT_MIN_WORD_LEN: usize = 3;

/// Read-only text rule attached to a capture target.
#[derive(Clone, Copy)]
pub struct ValidationPattern {
    pub description: &'static str,
    matcher: fn(&str) -> Option<String>,
}

impl ValidationPattern {
    pub fn for_target(target: CaptureTargetType) -> Self {
        match target {
            CaptureTargetType::Vin => Self {
                description: "17 chars from [A-HJ-NPR-Z0-9]",
                matcher: match_vin,
            },
            CaptureTargetType::LicensePlate => Self {
                description: "alphanumeric run of 4-8 chars",
                matcher: match_plate,
            },
            CaptureTargetType::Odometer => Self {
                description: "5-7 digit reading within 1000..=999999",
                matcher: match_odometer,
            },
            CaptureTargetType::Document => Self {
                description: "at least 5 words longer than 2 chars",
                matcher: match_document,
            },
        }
    }

    /// Returns the normalized text that satisfied the rule.
    pub fn validate(&self, text: &str) -> Option<String> {
        (self.matcher)(text)
    }
}

impl std::fmt::Debug for ValidationPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationPattern")
            .field("description", &self.description)
            .finish()
    }
}

fn match_vin(text: &str) -> Option<String> {
    let upper = text.to_uppercase();
    // OCR often splits a VIN into groups
    let compact: String = upper.chars().filter(|c| !c.is_whitespace()).collect();

    let found = [upper.as_str(), compact.as_str()].into_iter().find_map(|candidate| {
        VIN_RE
            .captures(candidate)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    });
    found
}

fn match_plate(text: &str) -> Option<String> {
    let compact: String = text
        .to_uppercase()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-' && *c != '·')
        .collect();

    PLATE_RE
        .find_iter(&compact)
        .map(|m| m.as_str())
        .max_by_key(|run| run.len())
        .filter(|run| run.len() >= PLATE_MIN_LEN)
        .map(str::to_string)
}

fn match_odometer(text: &str) -> Option<String> {
    // thousands separators
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();

    DIGIT_RUN_RE.find_iter(&cleaned).find_map(|m| {
        let digits = m.as_str();
        if !ODOMETER_DIGITS.contains(&digits.len()) {
            return None;
        }
        let value: u32 = digits.parse().ok()?;
        ODOMETER_RANGE.contains(&value).then(|| value.to_string())
    })
}

fn match_document(text: &str) -> Option<String> {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| w.chars().count() >= DOCUMENT_MIN_WORD_LEN)
        .collect();

    (words.len() >= DOCUMENT_MIN_WORDS).then(|| words.join(" "))
}
