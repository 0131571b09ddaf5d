//! Regex detector registry
//!
//! Fixed table of builtin PII pattern detectors plus a catch-all: any
//! requested identifier not in the table is compiled as a literal regular
//! expression and searched against the content directly.

use crate::instrumented::InstrumentedDetector;
use crate::registry::{requested_functions, DetectorRegistry, FunctionDoc};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use textgate_core::{DetectionResult, DetectorParams, Error, RequestHeaders, Result};
use textgate_telemetry::InstrumentSet;

pub const REGISTRY_NAME: &str = "regex";

/// Placeholder identifier used to document the literal-pattern catch-all
/// on `/registry`; requesting it literally is a no-op.
pub const CUSTOM_REGEX_PLACEHOLDER: &str = "$CUSTOM_REGEX";

/// Fixed instrument label for literal patterns, so arbitrary user regexes
/// do not explode metric-label cardinality.
const CUSTOM_REGEX_LABEL: &str = "custom_regex";

struct BuiltinPattern {
    name: &'static str,
    doc: &'static str,
    detection_type: &'static str,
    detection: &'static str,
    pattern: Regex,
    validate: Option<fn(&str) -> bool>,
}

// Card-number forms for the major networks: grouped with a consistent
// dash or space separator, or unseparated 13-16 digit runs.
const CREDIT_CARD_PATTERN: &str = r"(?x)
\b(?:
    (?:4\d{3}|5[1-5]\d{2}|6(?:011|5\d{2})|35\d{2})(?:-\d{4}){3}
  | (?:4\d{3}|5[1-5]\d{2}|6(?:011|5\d{2})|35\d{2})(?:[ ]\d{4}){3}
  | 3[47]\d{2}-\d{6}-\d{5}
  | 3[47]\d{2}[ ]\d{6}[ ]\d{5}
  | 3(?:0[0-5]|[68]\d)\d-\d{6}-\d{4}
  | 3(?:0[0-5]|[68]\d)\d[ ]\d{6}[ ]\d{4}
  | 4\d{15}
  | 4\d{12}
  | 5[1-5]\d{14}
  | 3[47]\d{13}
  | 6(?:011|5\d{2})\d{12}
  | 3(?:0[0-5]|[68]\d)\d{11}
  | (?:2131|1800)\d{11}
  | 35\d{14}
)\b";

static BUILTIN_PATTERNS: Lazy<Vec<BuiltinPattern>> = Lazy::new(|| {
    vec![
        BuiltinPattern {
            name: "credit-card",
            doc: "Detect credit card numbers in the text contents",
            detection_type: "pii",
            detection: "credit_card",
            pattern: Regex::new(CREDIT_CARD_PATTERN).expect("builtin credit card pattern"),
            validate: Some(luhn_checksum),
        },
        BuiltinPattern {
            name: "email",
            doc: "Detect email addresses in the text contents",
            detection_type: "pii",
            detection: "email_address",
            pattern: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
                .expect("builtin email pattern"),
            validate: None,
        },
        BuiltinPattern {
            name: "ipv4",
            doc: "Detect IPv4 addresses in the text contents",
            detection_type: "pii",
            detection: "ipv4",
            pattern: Regex::new(
                r"\b(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)(?:\.(?:25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)){3}\b",
            )
            .expect("builtin ipv4 pattern"),
            validate: None,
        },
        BuiltinPattern {
            name: "ipv6",
            doc: "Detect IPv6 addresses in the text contents",
            detection_type: "pii",
            detection: "ipv6",
            pattern: Regex::new(r"\b(?i:[0-9a-f]{1,4}:){7}(?i:[0-9a-f]{1,4})\b")
                .expect("builtin ipv6 pattern"),
            validate: None,
        },
        BuiltinPattern {
            name: "us-phone-number",
            doc: "Detect US phone numbers in the text contents",
            detection_type: "pii",
            detection: "us-phone-number",
            pattern: Regex::new(r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)|\d{3})[-.\s]+\d{3}[-.\s]?\d{4}\b")
                .expect("builtin phone pattern"),
            validate: None,
        },
        BuiltinPattern {
            name: "us-social-security-number",
            doc: "Detect social security numbers in the text contents",
            detection_type: "pii",
            detection: "social_security_number",
            pattern: Regex::new(r"\b\d{3}[- ]\d{2}[- ]\d{4}\b").expect("builtin ssn pattern"),
            validate: None,
        },
        BuiltinPattern {
            name: "uk-post-code",
            doc: "Detect UK post codes in the text contents",
            detection_type: "pii",
            detection: "uk-post-code",
            pattern: Regex::new(r"\b([A-Z]{1,2}[0-9][0-9A-Z]? ?[0-9][A-Z]{2})\b")
                .expect("builtin uk post code pattern"),
            validate: None,
        },
    ]
});

fn builtin(name: &str) -> Option<&'static BuiltinPattern> {
    BUILTIN_PATTERNS.iter().find(|b| b.name == name)
}

/// Luhn checksum over the digits of a coarse pattern match, filtering
/// well-formed-but-invalid card numbers.
fn luhn_checksum(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 || digits.len() > 16 {
        return false;
    }

    let checksum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(idx, &digit)| {
            if idx % 2 == 1 {
                let doubled = digit * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                digit
            }
        })
        .sum();

    checksum % 10 == 0
}

/// Collect every non-overlapping match as a detection with character-offset
/// spans; `text` is the exact matched substring.
fn pattern_detections(
    pattern: &Regex,
    content: &str,
    detection_type: &str,
    detection: &str,
    validate: Option<fn(&str) -> bool>,
) -> Vec<DetectionResult> {
    let mut detections = Vec::new();
    for mat in pattern.find_iter(content) {
        if let Some(validate) = validate {
            if !validate(mat.as_str()) {
                continue;
            }
        }
        let start = content[..mat.start()].chars().count();
        let end = start + mat.as_str().chars().count();
        detections.push(DetectionResult::span(
            start,
            end,
            mat.as_str(),
            detection_type,
            detection,
            1.0,
        ));
    }
    detections
}

/// Registry of builtin pattern detectors and literal user regexes
pub struct RegexDetectorRegistry {
    base: InstrumentedDetector,
}

impl RegexDetectorRegistry {
    pub fn new(instruments: InstrumentSet) -> Self {
        let base = InstrumentedDetector::new(REGISTRY_NAME, instruments);
        for builtin in BUILTIN_PATTERNS.iter() {
            base.instruments().ensure_series(REGISTRY_NAME, builtin.name);
        }
        base.instruments()
            .ensure_series(REGISTRY_NAME, CUSTOM_REGEX_LABEL);
        Self { base }
    }
}

#[async_trait]
impl DetectorRegistry for RegexDetectorRegistry {
    fn registry_name(&self) -> &str {
        REGISTRY_NAME
    }

    async fn handle_request(
        &self,
        content: &str,
        all_params: &DetectorParams,
        _headers: &RequestHeaders,
    ) -> Result<Vec<DetectionResult>> {
        let mut detections = Vec::new();
        for requested in requested_functions(all_params, REGISTRY_NAME) {
            if requested.name == CUSTOM_REGEX_PLACEHOLDER {
                continue;
            }

            let found = match builtin(&requested.name) {
                Some(builtin) => {
                    let outcome = self.base.runtimed(builtin.name, || {
                        Ok(pattern_detections(
                            &builtin.pattern,
                            content,
                            builtin.detection_type,
                            builtin.detection,
                            builtin.validate,
                        ))
                    });
                    match outcome {
                        Ok(found) => {
                            self.base.record_outcome(builtin.name, !found.is_empty());
                            found
                        }
                        Err(error) => {
                            return Err(self.base.fail_with_internal_error(
                                builtin.name,
                                &error,
                                true,
                            ))
                        }
                    }
                }
                None => {
                    // anything unrecognized is a literal pattern, compiled
                    // inside the instrumented region so a malformed regex
                    // surfaces as an internal error
                    let outcome = self.base.runtimed(CUSTOM_REGEX_LABEL, || {
                        let pattern = Regex::new(&requested.name).map_err(|error| {
                            Error::internal(format!(
                                "failed to compile custom regex {:?}: {error}",
                                requested.name
                            ))
                        })?;
                        Ok(pattern_detections(
                            &pattern,
                            content,
                            "regex",
                            "custom-regex",
                            None,
                        ))
                    });
                    match outcome {
                        Ok(found) => {
                            self.base
                                .record_outcome(CUSTOM_REGEX_LABEL, !found.is_empty());
                            found
                        }
                        Err(error) => {
                            return Err(self.base.fail_with_internal_error(
                                CUSTOM_REGEX_LABEL,
                                &error,
                                true,
                            ))
                        }
                    }
                }
            };
            detections.extend(found);
        }
        Ok(detections)
    }

    fn functions(&self) -> Vec<FunctionDoc> {
        let mut docs: Vec<FunctionDoc> = BUILTIN_PATTERNS
            .iter()
            .map(|b| FunctionDoc::new(b.name, b.doc))
            .collect();
        docs.push(FunctionDoc::new(
            CUSTOM_REGEX_PLACEHOLDER,
            "Replace $CUSTOM_REGEX with a custom regex to define your own regex detector",
        ));
        docs
    }
}
