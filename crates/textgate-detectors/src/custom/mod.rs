//! Custom-code detector registry
//!
//! Lets an operator supply a script of simple `fn name(text)` detector
//! functions, loaded through a static security gate and exposed behind
//! the same registry contract as the fixed tables. Scripts can declare
//! auxiliary metrics and mark functions for non-blocking background
//! execution via the injected registration utilities.

pub mod loader;
pub mod sandbox;
pub mod worker;
pub mod wrapper;

use crate::instrumented::InstrumentedDetector;
use crate::registry::{requested_functions, DetectorRegistry, FunctionDoc};
use async_trait::async_trait;
use loader::{CustomModule, FunctionMeta};
use rhai::Dynamic;
use std::path::Path;
use std::sync::Arc;
use std::sync::OnceLock;
use textgate_core::{DetectionResult, DetectorParams, Error, RequestHeaders, Result};
use textgate_telemetry::InstrumentSet;
use worker::WorkerPool;

pub const REGISTRY_NAME: &str = "custom";

/// Registry of sandbox-loaded user detector functions.
///
/// The function table is immutable after construction; reloading edited
/// script code means constructing a new registry. Dropping the registry
/// shuts down its background worker pool.
pub struct CustomDetectorRegistry {
    base: InstrumentedDetector,
    module: CustomModule,
    pool: OnceLock<WorkerPool>,
}

impl std::fmt::Debug for CustomDetectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomDetectorRegistry")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

impl CustomDetectorRegistry {
    /// Load the registry from a script file on disk
    pub fn from_file(path: impl AsRef<Path>, instruments: InstrumentSet) -> Result<Self> {
        let module = loader::load_module(path, &instruments)?;
        Ok(Self {
            base: InstrumentedDetector::new(REGISTRY_NAME, instruments),
            module,
            pool: OnceLock::new(),
        })
    }

    /// Load the registry from script source text
    pub fn from_source(source: &str, instruments: InstrumentSet) -> Result<Self> {
        let module = loader::load_module_from_source(source, &instruments)?;
        Ok(Self {
            base: InstrumentedDetector::new(REGISTRY_NAME, instruments),
            module,
            pool: OnceLock::new(),
        })
    }

    // the pool exists only once a non-blocking function is first called
    fn pool(&self) -> &WorkerPool {
        self.pool.get_or_init(|| WorkerPool::new(num_cpus::get()))
    }

    fn invoke(
        &self,
        meta: &FunctionMeta,
        content: &str,
        headers: Option<&RequestHeaders>,
        kwargs: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<Option<DetectionResult>> {
        let args = build_args(meta, content, headers, kwargs)?;

        if let Some(default) = self.module.non_blocking.get(&meta.name) {
            let engine = Arc::clone(&self.module.engine);
            let ast = Arc::clone(&self.module.ast);
            let name = meta.name.clone();
            self.pool().submit(move || {
                let mut scope = rhai::Scope::new();
                if let Err(error) = engine.call_fn::<Dynamic>(&mut scope, &ast, &name, args) {
                    tracing::error!(
                        function = %name,
                        error = %error,
                        "exception in non-blocking custom detector"
                    );
                }
            });
            // the caller sees the declared default immediately; the real
            // outcome lands in the background, uncorrelated with it
            return wrapper::into_detection(default.clone(), &meta.name, content);
        }

        let mut scope = rhai::Scope::new();
        let result = self
            .module
            .engine
            .call_fn::<Dynamic>(&mut scope, &self.module.ast, &meta.name, args)
            .map_err(|error| {
                Error::internal(format!(
                    "custom detector function {} failed: {error}",
                    meta.name
                ))
            })?;
        wrapper::into_detection(result, &meta.name, content)
    }
}

#[async_trait]
impl DetectorRegistry for CustomDetectorRegistry {
    fn registry_name(&self) -> &str {
        REGISTRY_NAME
    }

    async fn handle_request(
        &self,
        content: &str,
        all_params: &DetectorParams,
        headers: &RequestHeaders,
    ) -> Result<Vec<DetectionResult>> {
        let mut detections = Vec::new();
        for requested in requested_functions(all_params, REGISTRY_NAME) {
            let Some(meta) = self.module.functions.get(&requested.name) else {
                return Err(Error::caller(format!(
                    "Unrecognized custom function: {}",
                    requested.name
                )));
            };

            let function_headers = meta.wants_headers.then_some(headers);
            let function_kwargs = if meta.wants_kwargs {
                requested.args.as_ref()
            } else {
                None
            };

            let outcome = self.base.runtimed(&meta.name, || {
                self.invoke(meta, content, function_headers, function_kwargs)
            });
            match outcome {
                Ok(result) => {
                    let is_detection = result.is_some();
                    self.base.record_outcome(&meta.name, is_detection);
                    if let Some(detection) = result {
                        detections.push(detection);
                    }
                }
                Err(error) => {
                    return Err(self.base.fail_with_internal_error(&meta.name, &error, true));
                }
            }
        }
        Ok(detections)
    }

    fn functions(&self) -> Vec<FunctionDoc> {
        self.module
            .functions()
            .values()
            .map(|meta| FunctionDoc::new(&meta.name, &meta.doc))
            .collect()
    }
}

fn build_args(
    meta: &FunctionMeta,
    content: &str,
    headers: Option<&RequestHeaders>,
    kwargs: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<Vec<Dynamic>> {
    let mut args = Vec::with_capacity(meta.params.len());
    for param in &meta.params {
        match param.as_str() {
            "headers" => args.push(Dynamic::from(headers_map(headers))),
            "kwargs" => args.push(kwargs_value(kwargs)?),
            _ => args.push(Dynamic::from(content.to_string())),
        }
    }
    Ok(args)
}

fn headers_map(headers: Option<&RequestHeaders>) -> rhai::Map {
    let mut map = rhai::Map::new();
    if let Some(headers) = headers {
        for (name, value) in headers {
            map.insert(name.clone().into(), value.clone().into());
        }
    }
    map
}

// scripted functions have fixed arity: a function that opts in to kwargs
// receives an empty map when the caller supplied no argument object
fn kwargs_value(
    kwargs: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<Dynamic> {
    match kwargs {
        Some(map) => rhai::serde::to_dynamic(serde_json::Value::Object(map.clone()))
            .map_err(|error| Error::internal(format!("failed to convert kwargs: {error}"))),
        None => Ok(Dynamic::from(rhai::Map::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    const SAMPLE_SCRIPT: &str = r#"
declare_counter("background_runs", "Times the background detector body actually ran");
non_blocking("audit_everything", false);

/// Flags text longer than one hundred characters.
fn over_100_characters(text) {
    text.len > 100
}

/// Flags the forbidden word, reporting its exact position.
fn contains_word(text) {
    let position = text.index_of("apple");
    if position >= 0 {
        #{
            start: position,
            end: position + 5,
            text: text,
            detection_type: "content_check",
            detection: "forbidden_word: apple",
            score: 1.0
        }
    } else {
        #{}
    }
}

fn function_that_needs_headers(text, headers) {
    headers["magic-key"] != "123"
}

fn contains_given_word(text, kwargs) {
    text.contains(kwargs["word"])
}

fn throws_error(text) {
    if text == "illegal" {
        true
    } else if text == "error" {
        throw "deliberate failure";
    } else {
        false
    }
}

fn audit_everything(text) {
    increment_counter("background_runs");
    true
}
"#;

    fn registry() -> (CustomDetectorRegistry, InstrumentSet) {
        let instruments = InstrumentSet::new();
        let registry = CustomDetectorRegistry::from_source(SAMPLE_SCRIPT, instruments.clone()).unwrap();
        (registry, instruments)
    }

    fn params(value: serde_json::Value) -> DetectorParams {
        value.as_object().unwrap().clone()
    }

    async fn run(
        registry: &CustomDetectorRegistry,
        content: &str,
        value: serde_json::Value,
        headers: &RequestHeaders,
    ) -> Result<Vec<DetectionResult>> {
        registry.handle_request(content, &params(value), headers).await
    }

    #[tokio::test]
    async fn map_returning_function_flags_with_position() {
        let (registry, _) = registry();
        let detections = run(
            &registry,
            "What is an apple?",
            json!({"custom": ["contains_word"]}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].start, 11);
        assert_eq!(detections[0].end, 16);
        assert_eq!(detections[0].text, "What is an apple?");
        assert_eq!(detections[0].detection_type, "content_check");
    }

    #[tokio::test]
    async fn no_match_means_no_detection() {
        let (registry, _) = registry();
        let detections = run(
            &registry,
            "What is a banana?",
            json!({"custom": ["contains_word"]}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn bool_returning_function_flags_whole_text() {
        let (registry, _) = registry();
        let long_text = "x".repeat(150);
        let detections = run(
            &registry,
            &long_text,
            json!({"custom": ["over_100_characters"]}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].detection, "over_100_characters");
        assert_eq!(detections[0].end, 150);
        assert_eq!(detections[0].score, 1.0);
    }

    #[tokio::test]
    async fn headers_reach_only_functions_that_declare_them() {
        let (registry, _) = registry();
        let mut headers = RequestHeaders::new();
        headers.insert("magic-key".to_string(), "123".to_string());

        let detections = run(
            &registry,
            "hello",
            json!({"custom": ["function_that_needs_headers"]}),
            &headers,
        )
        .await
        .unwrap();
        assert!(detections.is_empty());

        headers.insert("magic-key".to_string(), "wrong".to_string());
        let detections = run(
            &registry,
            "hello",
            json!({"custom": ["function_that_needs_headers"]}),
            &headers,
        )
        .await
        .unwrap();
        assert_eq!(detections.len(), 1);

        // a function without a headers parameter still works with headers present
        let detections = run(
            &registry,
            "short",
            json!({"custom": ["over_100_characters"]}),
            &headers,
        )
        .await
        .unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn kwargs_flow_through_the_map_form() {
        let (registry, _) = registry();

        let detections = run(
            &registry,
            "there is an apple here",
            json!({"custom": {"contains_given_word": {"word": "apple"}}}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();
        assert_eq!(detections.len(), 1);

        let detections = run(
            &registry,
            "there is an apple here",
            json!({"custom": {"contains_given_word": {"word": "zebra"}}}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn unknown_function_is_a_caller_error() {
        let (registry, _) = registry();
        let result = run(
            &registry,
            "anything",
            json!({"custom": ["abc"]}),
            &RequestHeaders::new(),
        )
        .await;
        match result {
            Err(Error::Caller(message)) => {
                assert!(message.contains("Unrecognized custom function: abc"));
            }
            other => panic!("expected caller error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn script_errors_become_internal_errors_with_instrumentation() {
        let (registry, instruments) = registry();

        for _ in 0..5 {
            run(&registry, "fine", json!({"custom": ["throws_error"]}), &RequestHeaders::new())
                .await
                .unwrap();
        }
        for _ in 0..3 {
            run(&registry, "illegal", json!({"custom": ["throws_error"]}), &RequestHeaders::new())
                .await
                .unwrap();
        }
        for _ in 0..2 {
            let result = run(
                &registry,
                "error",
                json!({"custom": ["throws_error"]}),
                &RequestHeaders::new(),
            )
            .await;
            assert!(matches!(result, Err(Error::InternalDetector { .. })));
        }

        let snapshot = instruments.snapshot(REGISTRY_NAME, "throws_error").unwrap();
        assert_eq!(snapshot.requests, 10);
        assert_eq!(snapshot.detections, 3);
        assert_eq!(snapshot.errors, 2);
    }

    #[tokio::test]
    async fn non_blocking_returns_default_and_runs_in_background() {
        let (registry, instruments) = registry();

        // the real body returns true and bumps a counter; the caller sees
        // the declared default (false -> no detection) immediately
        for _ in 0..4 {
            let detections = run(
                &registry,
                "anything",
                json!({"custom": ["audit_everything"]}),
                &RequestHeaders::new(),
            )
            .await
            .unwrap();
            assert!(detections.is_empty());
        }

        let snapshot = instruments.snapshot(REGISTRY_NAME, "audit_everything").unwrap();
        assert_eq!(snapshot.requests, 4);
        assert_eq!(snapshot.detections, 0);

        // bounded wait for the background executions to land
        let mut value = 0;
        for _ in 0..200 {
            value = instruments.counter_value("background_runs").unwrap_or(0);
            if value == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(value, 4);
    }

    #[tokio::test]
    async fn reload_is_a_new_registry_from_current_contents() {
        let instruments = InstrumentSet::new();
        let file = tempfile::NamedTempFile::new().unwrap();

        std::fs::write(file.path(), "fn first(text) { false }\n").unwrap();
        let registry = CustomDetectorRegistry::from_file(file.path(), instruments.clone()).unwrap();
        assert!(registry.module.functions().contains_key("first"));

        std::fs::write(file.path(), "fn second(text) { false }\n").unwrap();
        let reloaded = CustomDetectorRegistry::from_file(file.path(), instruments.clone()).unwrap();
        assert!(!reloaded.module.functions().contains_key("first"));
        assert!(reloaded.module.functions().contains_key("second"));
    }

    #[tokio::test]
    async fn unsafe_file_never_constructs_a_registry() {
        let instruments = InstrumentSet::new();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "import \"os\" as os;\nfn evil(text) { eval(text) }\n",
        )
        .unwrap();

        let error = CustomDetectorRegistry::from_file(file.path(), instruments).unwrap_err();
        match error {
            Error::UnsafeCode(issues) => {
                assert!(issues.iter().any(|i| i.contains("Forbidden import: os")));
                assert!(issues.iter().any(|i| i.contains("Forbidden function call: eval")));
            }
            other => panic!("expected unsafe-code error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_params_for_other_registries_are_ignored() {
        let (registry, _) = registry();
        let detections = run(
            &registry,
            "anything",
            json!({"regex": ["email"]}),
            &RequestHeaders::new(),
        )
        .await
        .unwrap();
        assert!(detections.is_empty());
    }
}
