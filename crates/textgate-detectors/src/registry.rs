//! Detector registry contract and request-parameter normalization

use async_trait::async_trait;
use textgate_core::{DetectionResult, DetectorParams, RequestHeaders, Result};

/// Name and documentation for one registered detector function, exposed
/// read-only for the `/registry` introspection endpoint.
#[derive(Debug, Clone)]
pub struct FunctionDoc {
    pub name: String,
    pub doc: String,
}

impl FunctionDoc {
    pub fn new(name: impl Into<String>, doc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: doc.into(),
        }
    }
}

/// One requested detector function, as normalized from `detector_params`.
///
/// `args` carries the per-function argument object when the caller used
/// the map form; registries that do not support per-function arguments
/// ignore it.
#[derive(Debug, Clone)]
pub struct RequestedFunction {
    pub name: String,
    pub args: Option<serde_json::Map<String, serde_json::Value>>,
}

impl RequestedFunction {
    fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: None,
        }
    }
}

/// Normalize `all_params[registry_name]` to an ordered list of requested
/// functions.
///
/// A string wraps to a singleton; an array passes its string items through
/// in order; an object contributes its keys in order, with object-valued
/// entries as per-function arguments. Absence or any other shape yields an
/// empty list, never an error.
pub fn requested_functions(all_params: &DetectorParams, registry_name: &str) -> Vec<RequestedFunction> {
    match all_params.get(registry_name) {
        Some(serde_json::Value::String(name)) => vec![RequestedFunction::plain(name)],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(RequestedFunction::plain)
            .collect(),
        Some(serde_json::Value::Object(map)) => map
            .iter()
            .map(|(name, value)| RequestedFunction {
                name: name.clone(),
                args: value.as_object().cloned(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Contract implemented by each detector family.
///
/// A registry owns a named set of detector functions plus the logic to
/// select and invoke them from the request's `detector_params`. Batching
/// across content items happens one level up, in
/// [`DetectorSet`](crate::dispatch::DetectorSet).
#[async_trait]
pub trait DetectorRegistry: Send + Sync {
    /// The registry's key inside `detector_params` (e.g. `"regex"`)
    fn registry_name(&self) -> &str;

    /// Run this registry's requested functions against one content item.
    ///
    /// Reads only its own key in `all_params`; absence of that key yields
    /// an empty result. Instruments are updated for every function
    /// attempted, win or lose.
    async fn handle_request(
        &self,
        content: &str,
        all_params: &DetectorParams,
        headers: &RequestHeaders,
    ) -> Result<Vec<DetectionResult>>;

    /// Registered function names and documentation, for introspection
    fn functions(&self) -> Vec<FunctionDoc>;
}
