//! Conversion of script return values into detection results
//!
//! A custom function may return a boolean, a detection-shaped map, or any
//! falsy value meaning "no detection". Everything else is a coding error
//! in the user's script, reported as an internal detector error naming the
//! offending type.

use rhai::Dynamic;
use textgate_core::{DetectionResult, Error, Result};

/// Convert a custom function's return value.
///
/// - Falsy values (unit, `false`, `0`, `0.0`, empty string/map/array) mean
///   no detection
/// - `true` synthesizes a whole-text detection named after the function
///   with score 1.0
/// - A map is deserialized into a [`DetectionResult`] directly; a map that
///   does not match the field set is an error
/// - Any other value is an unsupported-type error
pub fn into_detection(
    result: Dynamic,
    function_name: &str,
    text: &str,
) -> Result<Option<DetectionResult>> {
    if result.is_unit() {
        return Ok(None);
    }

    let type_name = result.type_name();

    if let Some(flag) = result.clone().try_cast::<bool>() {
        return Ok(flag.then(|| DetectionResult::whole_text(text, function_name, function_name, 1.0)));
    }

    if let Some(map) = result.clone().try_cast::<rhai::Map>() {
        if map.is_empty() {
            return Ok(None);
        }
        let detection: DetectionResult = rhai::serde::from_dynamic(&result).map_err(|error| {
            Error::internal(format!(
                "failed to build a detection from the {function_name} response: {error}"
            ))
        })?;
        return Ok(Some(detection));
    }

    if let Some(value) = result.clone().try_cast::<rhai::ImmutableString>() {
        if value.is_empty() {
            return Ok(None);
        }
    } else if let Some(value) = result.clone().try_cast::<rhai::Array>() {
        if value.is_empty() {
            return Ok(None);
        }
    } else if let Some(value) = result.clone().try_cast::<i64>() {
        if value == 0 {
            return Ok(None);
        }
    } else if let Some(value) = result.try_cast::<f64>() {
        if value == 0.0 {
            return Ok(None);
        }
    }

    Err(Error::internal(format!(
        "Unsupported result type for custom detector function {function_name}, \
         must be bool or a detection map, got: {type_name}"
    )))
}
