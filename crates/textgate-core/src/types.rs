//! Core types for textgate

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Detector parameters as sent by the caller: registry name to either a
/// single function identifier, an ordered list of identifiers, or a map
/// from identifier to an argument object.
///
/// `serde_json` is built with `preserve_order`, so map-form parameters
/// iterate in the order the caller wrote them.
pub type DetectorParams = serde_json::Map<String, serde_json::Value>;

/// Inbound request headers, lower-cased names to UTF-8 values.
pub type RequestHeaders = HashMap<String, String>;

/// A piece of supporting evidence attached to a detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence name (e.g. the signal or feature that fired)
    pub name: String,

    /// Optional evidence value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Optional score associated with this evidence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Nested supporting evidence
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<Evidence>,
}

impl Evidence {
    /// Create a named evidence entry with no value or score
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            score: None,
            evidence: Vec::new(),
        }
    }
}

/// One flagged span within one content item.
///
/// `start` and `end` are half-open character offsets into the source text;
/// `0 <= start <= end <= text.chars().count()` always holds for results
/// produced by the built-in registries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Start character offset of the flagged region
    pub start: usize,

    /// End character offset (exclusive) of the flagged region
    pub end: usize,

    /// The flagged substring, or the full text for whole-content detections
    pub text: String,

    /// Taxonomy category (e.g. "pii", "file_type")
    pub detection_type: String,

    /// Specific label within the category (e.g. "email_address")
    pub detection: String,

    /// Detector-defined score, typically a probability or 0/1
    pub score: f64,

    /// Supporting evidence, possibly empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidences: Vec<Evidence>,

    /// Open key-value map for detector-specific extras
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl DetectionResult {
    /// Create a detection covering an explicit character span
    pub fn span(
        start: usize,
        end: usize,
        text: impl Into<String>,
        detection_type: impl Into<String>,
        detection: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            detection_type: detection_type.into(),
            detection: detection.into(),
            score,
            evidences: Vec::new(),
            metadata: None,
        }
    }

    /// Create a detection covering the whole input text
    pub fn whole_text(
        text: &str,
        detection_type: impl Into<String>,
        detection: impl Into<String>,
        score: f64,
    ) -> Self {
        Self::span(0, text.chars().count(), text, detection_type, detection, score)
    }
}

/// Batch analysis request for `POST /api/v1/text/contents`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentAnalysisRequest {
    /// Text items to analyze, order preserved in the response
    pub contents: Vec<String>,

    /// Requested detectors, keyed by registry name
    #[serde(default)]
    pub detector_params: DetectorParams,
}

/// Batch analysis response: one detection list per content item, aligned
/// 1:1 with the request's `contents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentsAnalysisResponse {
    pub root: Vec<Vec<DetectionResult>>,
}
