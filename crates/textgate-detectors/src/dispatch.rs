//! Request dispatcher
//!
//! Fans a batch of content items out to the selected registries and
//! aggregates the per-item detections. Stateless: every request runs
//! against the live, already-constructed registries.

use crate::registry::DetectorRegistry;
use std::sync::Arc;
use textgate_core::{ContentAnalysisRequest, DetectionResult, Error, RequestHeaders, Result};

/// Ordered collection of live detector registries.
///
/// Iteration order is construction order, which fixes the deterministic
/// ordering of detections within one content item: registry order first,
/// then requested-function order within each registry.
pub struct DetectorSet {
    registries: Vec<Arc<dyn DetectorRegistry>>,
}

impl DetectorSet {
    pub fn new() -> Self {
        Self {
            registries: Vec::new(),
        }
    }

    /// Add a registry; its `registry_name` becomes live for dispatch
    pub fn register(&mut self, registry: Arc<dyn DetectorRegistry>) {
        self.registries.push(registry);
    }

    /// Look up a live registry by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn DetectorRegistry>> {
        self.registries
            .iter()
            .find(|registry| registry.registry_name() == name)
    }

    /// All live registries, in dispatch order
    pub fn registries(&self) -> &[Arc<dyn DetectorRegistry>] {
        &self.registries
    }

    /// Process a batch request: validate the requested kinds, then run
    /// each content item through each requested registry, concatenating
    /// detections per item.
    ///
    /// Any unknown registry kind fails the whole request up front; no
    /// partial processing happens.
    pub async fn analyze(
        &self,
        request: &ContentAnalysisRequest,
        headers: &RequestHeaders,
    ) -> Result<Vec<Vec<DetectionResult>>> {
        if request.contents.is_empty() {
            return Err(Error::caller("contents must contain at least one item"));
        }

        for kind in request.detector_params.keys() {
            if self.get(kind).is_none() {
                return Err(Error::caller(format!("Detector {kind} not found")));
            }
        }

        let mut results = Vec::with_capacity(request.contents.len());
        for content in &request.contents {
            let mut item_detections = Vec::new();
            for registry in &self.registries {
                if request.detector_params.contains_key(registry.registry_name()) {
                    let detections = registry
                        .handle_request(content, &request.detector_params, headers)
                        .await?;
                    item_detections.extend(detections);
                }
            }
            results.push(item_detections);
        }
        Ok(results)
    }
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self::new()
    }
}
