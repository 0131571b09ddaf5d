//! Instrumented detector base
//!
//! Supplies the counter-update logic, the scoped runtime timer, and the
//! standard internal-error-to-response translation shared by every
//! registry.

use std::time::Instant;
use textgate_core::{Error, Result};
use textgate_telemetry::InstrumentSet;

/// Per-registry instrumentation base.
///
/// Owns the registry's name and a handle to the shared instrument set;
/// registries embed one and route every function attempt through it.
pub struct InstrumentedDetector {
    registry_name: String,
    instruments: InstrumentSet,
}

impl InstrumentedDetector {
    pub fn new(registry_name: impl Into<String>, instruments: InstrumentSet) -> Self {
        Self {
            registry_name: registry_name.into(),
            instruments,
        }
    }

    pub fn registry_name(&self) -> &str {
        &self.registry_name
    }

    pub fn instruments(&self) -> &InstrumentSet {
        &self.instruments
    }

    /// Run `f`, adding its elapsed wall-clock time to the runtime counter
    /// for `(registry, function_name)`.
    ///
    /// Elapsed time is committed only when `f` returns `Ok`; a failed call
    /// propagates its error and contributes nothing to the runtime total
    /// (it still counts as a request and an error via
    /// [`fail_with_internal_error`](Self::fail_with_internal_error)).
    pub fn runtimed<T>(&self, function_name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let start = Instant::now();
        let value = f()?;
        self.instruments
            .record_runtime(&self.registry_name, function_name, start.elapsed());
        Ok(value)
    }

    /// Record one completed call: increments the request counter, makes
    /// the error/runtime/detection series exist zero-valued, and
    /// increments the detection counter when `is_detection`.
    pub fn record_outcome(&self, function_name: &str, is_detection: bool) {
        self.instruments
            .ensure_series(&self.registry_name, function_name);
        self.instruments
            .record_request(&self.registry_name, function_name);
        if is_detection {
            self.instruments
                .record_detection(&self.registry_name, function_name);
        }
    }

    /// Increment the error counter for `(registry, function_name)`
    pub fn record_error(&self, function_name: &str) {
        self.instruments
            .record_error(&self.registry_name, function_name);
    }

    /// Translate an uncaught detector failure into the uniform internal
    /// error: logs the full detail, increments the error counter (and the
    /// request counter when `count_request`), and returns the generic
    /// caller-visible error. The underlying detail never reaches the
    /// caller.
    pub fn fail_with_internal_error(
        &self,
        function_name: &str,
        error: &dyn std::fmt::Display,
        count_request: bool,
    ) -> Error {
        tracing::error!(
            registry = %self.registry_name,
            function = %function_name,
            error = %error,
            "detector function failed"
        );
        self.record_error(function_name);
        if count_request {
            self.instruments
                .record_request(&self.registry_name, function_name);
        }
        Error::internal_detector(&self.registry_name, function_name)
    }
}
