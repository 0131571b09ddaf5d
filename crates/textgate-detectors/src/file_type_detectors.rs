//! File-type detector registry
//!
//! Well-formedness checks for JSON/YAML/XML plus schema-validated
//! variants, where the schema travels embedded in the requested identifier
//! after a `<type>-with-schema:` prefix. Prefix dispatch runs before exact
//! lookup, and instrumentation uses the fixed prefix as the label so the
//! embedded schema cannot explode metric-label cardinality.

use crate::instrumented::InstrumentedDetector;
use crate::registry::{requested_functions, DetectorRegistry, FunctionDoc};
use crate::xsd;
use async_trait::async_trait;
use jsonschema::JSONSchema;
use textgate_core::{DetectionResult, DetectorParams, Error, RequestHeaders, Result};
use textgate_telemetry::InstrumentSet;

pub const REGISTRY_NAME: &str = "file_type";

const JSON_SCHEMA_PREFIX: &str = "json-with-schema";
const YAML_SCHEMA_PREFIX: &str = "yaml-with-schema";
const XML_SCHEMA_PREFIX: &str = "xml-with-schema";

fn flag(content: &str, detection: &str) -> DetectionResult {
    DetectionResult::whole_text(content, "file_type", detection, 1.0)
}

/// Detect if the text contents is not valid JSON
fn check_json(content: &str) -> Option<DetectionResult> {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(_) => None,
        Err(_) => Some(flag(content, "invalid_json")),
    }
}

/// Detect if the text contents is not valid YAML
fn check_yaml(content: &str) -> Option<DetectionResult> {
    match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(_) => None,
        Err(_) => Some(flag(content, "invalid_yaml")),
    }
}

/// Detect if the text contents is not valid XML
fn check_xml(content: &str) -> Option<DetectionResult> {
    match roxmltree::Document::parse(content) {
        Ok(_) => None,
        Err(_) => Some(flag(content, "invalid_xml")),
    }
}

/// Validate `data` against a JSON schema supplied as text.
///
/// Order matters: the schema must itself be valid JSON (`invalid_schema`
/// otherwise); a schema that is valid JSON but not a valid JSON Schema is
/// a detector failure, not a detection.
fn validate_against_json_schema(
    content: &str,
    data: &serde_json::Value,
    schema: &str,
    mismatch: &str,
) -> Result<Option<DetectionResult>> {
    let schema_data: serde_json::Value = match serde_json::from_str(schema) {
        Ok(data) => data,
        Err(_) => return Ok(Some(flag(content, "invalid_schema"))),
    };

    let compiled = JSONSchema::compile(&schema_data)
        .map_err(|error| Error::internal(format!("failed to compile JSON schema: {error}")))?;

    if compiled.is_valid(data) {
        Ok(None)
    } else {
        Ok(Some(flag(content, mismatch)))
    }
}

/// Detect if the text contents does not satisfy a provided JSON schema
fn check_json_schema(content: &str, schema: &str) -> Result<Option<DetectionResult>> {
    let data: serde_json::Value = match serde_json::from_str(content) {
        Ok(data) => data,
        Err(_) => return Ok(Some(flag(content, "invalid_json"))),
    };
    validate_against_json_schema(content, &data, schema, "json_schema_mismatch")
}

/// Detect if the text contents does not satisfy a provided schema.
/// YAML is validated against a JSON schema.
fn check_yaml_schema(content: &str, schema: &str) -> Result<Option<DetectionResult>> {
    let data: serde_json::Value = match serde_yaml::from_str(content) {
        Ok(data) => data,
        Err(_) => return Ok(Some(flag(content, "invalid_yaml"))),
    };
    validate_against_json_schema(content, &data, schema, "yaml_schema_mismatch")
}

/// Detect if the text contents does not satisfy a provided XML Schema (XSD)
fn check_xml_schema(content: &str, schema: &str) -> Result<Option<DetectionResult>> {
    if let Some(detection) = check_xml(content) {
        return Ok(Some(detection));
    }

    let compiled = match xsd::Schema::parse(schema) {
        Ok(compiled) => compiled,
        Err(_) => return Ok(Some(flag(content, "invalid_xml_schema"))),
    };

    match compiled.validate_str(content) {
        Ok(()) => Ok(None),
        Err(_) => Ok(Some(flag(content, "xml_schema_mismatch"))),
    }
}

/// Registry of file-format well-formedness and schema checks
pub struct FileTypeDetectorRegistry {
    base: InstrumentedDetector,
}

impl FileTypeDetectorRegistry {
    pub fn new(instruments: InstrumentSet) -> Self {
        let base = InstrumentedDetector::new(REGISTRY_NAME, instruments);
        for name in [
            "json",
            "yaml",
            "xml",
            JSON_SCHEMA_PREFIX,
            YAML_SCHEMA_PREFIX,
            XML_SCHEMA_PREFIX,
        ] {
            base.instruments().ensure_series(REGISTRY_NAME, name);
        }
        Self { base }
    }

    fn run_check(
        &self,
        label: &str,
        check: impl FnOnce() -> Result<Option<DetectionResult>>,
    ) -> Result<Option<DetectionResult>> {
        match self.base.runtimed(label, check) {
            Ok(result) => {
                self.base.record_outcome(label, result.is_some());
                Ok(result)
            }
            Err(error) => Err(self.base.fail_with_internal_error(label, &error, true)),
        }
    }
}

#[async_trait]
impl DetectorRegistry for FileTypeDetectorRegistry {
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
            let name = requested.name.as_str();

            // prefix dispatch first: the embedded schema makes each
            // identifier unique, so schema variants are not table entries
            let result = if let Some(schema) = name.strip_prefix("json-with-schema:") {
                self.run_check(JSON_SCHEMA_PREFIX, || check_json_schema(content, schema))?
            } else if let Some(schema) = name.strip_prefix("yaml-with-schema:") {
                self.run_check(YAML_SCHEMA_PREFIX, || check_yaml_schema(content, schema))?
            } else if let Some(schema) = name.strip_prefix("xml-with-schema:") {
                self.run_check(XML_SCHEMA_PREFIX, || check_xml_schema(content, schema))?
            } else {
                match name {
                    "json" => self.run_check("json", || Ok(check_json(content)))?,
                    "yaml" => self.run_check("yaml", || Ok(check_yaml(content)))?,
                    "xml" => self.run_check("xml", || Ok(check_xml(content)))?,
                    other => {
                        return Err(Error::caller(format!("Unrecognized file type: {other}")));
                    }
                }
            };

            detections.extend(result);
        }
        Ok(detections)
    }

    fn functions(&self) -> Vec<FunctionDoc> {
        vec![
            FunctionDoc::new("json", "Detect if the text contents is not valid JSON"),
            FunctionDoc::new("yaml", "Detect if the text contents is not valid YAML"),
            FunctionDoc::new("xml", "Detect if the text contents is not valid XML"),
            FunctionDoc::new(
                "json-with-schema:$SCHEMA",
                "Detect if the text contents does not satisfy a provided JSON schema. To specify a schema, replace $SCHEMA with a JSON schema.",
            ),
            FunctionDoc::new(
                "yaml-with-schema:$SCHEMA",
                "Detect if the text contents does not satisfy a provided schema. To specify a schema, replace $SCHEMA with a JSON schema. That's not a typo, you validate YAML with a JSON schema!",
            ),
            FunctionDoc::new(
                "xml-with-schema:$SCHEMA",
                "Detect if the text contents does not satisfy a provided XML schema. To specify a schema, replace $SCHEMA with an XML Schema Definition (XSD)",
            ),
        ]
    }
}
