//! Instrument registry for per-detector-function counters
//!
//! One `InstrumentSet` is constructed at process start and shared by
//! reference across every detector registry. Series are created zero-valued
//! the first time a label pair is touched, so "requests seen: 0" is
//! distinguishable from "series never existed" on the metrics surface.

use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Prefix for every metric family rendered by [`InstrumentSet`]
pub const METRIC_PREFIX: &str = "textgate_guardrails";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SeriesKey {
    kind: String,
    name: String,
}

#[derive(Default)]
struct Series {
    requests: AtomicU64,
    errors: AtomicU64,
    detections: AtomicU64,
    runtime_us: AtomicU64,
}

struct CustomCounter {
    help: String,
    value: AtomicU64,
}

struct Inner {
    series: RwLock<IndexMap<SeriesKey, Arc<Series>>>,
    custom: RwLock<IndexMap<String, Arc<CustomCounter>>>,
}

/// Shared registry of per-function instruments.
///
/// Cloning is cheap; clones share the same underlying counters. All
/// mutation is a single atomic increment, safe under concurrent requests.
#[derive(Clone)]
pub struct InstrumentSet {
    inner: Arc<Inner>,
}

impl InstrumentSet {
    /// Create a new, empty instrument set
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                series: RwLock::new(IndexMap::new()),
                custom: RwLock::new(IndexMap::new()),
            }),
        }
    }

    fn series_for(&self, kind: &str, name: &str) -> Arc<Series> {
        {
            let series = self.inner.series.read();
            if let Some(existing) = series.get(&SeriesKey {
                kind: kind.to_string(),
                name: name.to_string(),
            }) {
                return Arc::clone(existing);
            }
        }
        let mut series = self.inner.series.write();
        Arc::clone(
            series
                .entry(SeriesKey {
                    kind: kind.to_string(),
                    name: name.to_string(),
                })
                .or_default(),
        )
    }

    /// Make the full counter family for `(kind, name)` exist, zero-valued.
    ///
    /// Called unconditionally when a function is registered, so every
    /// registered detector is visible on `/metrics` before its first call.
    pub fn ensure_series(&self, kind: &str, name: &str) {
        let _ = self.series_for(kind, name);
    }

    /// Increment the request counter for `(kind, name)`
    pub fn record_request(&self, kind: &str, name: &str) {
        self.series_for(kind, name)
            .requests
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the error counter for `(kind, name)`
    pub fn record_error(&self, kind: &str, name: &str) {
        self.series_for(kind, name)
            .errors
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the detection counter for `(kind, name)`
    pub fn record_detection(&self, kind: &str, name: &str) {
        self.series_for(kind, name)
            .detections
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Add elapsed wall-clock time to the runtime counter for `(kind, name)`
    pub fn record_runtime(&self, kind: &str, name: &str, elapsed: Duration) {
        self.series_for(kind, name)
            .runtime_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Declare a user counter to be rendered alongside the detector series.
    ///
    /// Declaring the same name twice keeps the first help text.
    pub fn declare_counter(&self, name: &str, help: &str) {
        let mut custom = self.inner.custom.write();
        custom.entry(name.to_string()).or_insert_with(|| {
            Arc::new(CustomCounter {
                help: help.to_string(),
                value: AtomicU64::new(0),
            })
        });
    }

    /// Increment a user counter, creating it on first use if undeclared
    pub fn increment_counter(&self, name: &str, amount: u64) {
        {
            let custom = self.inner.custom.read();
            if let Some(counter) = custom.get(name) {
                counter.value.fetch_add(amount, Ordering::Relaxed);
                return;
            }
        }
        tracing::warn!(counter = name, "incrementing undeclared custom counter");
        self.declare_counter(name, "");
        self.increment_counter(name, amount);
    }

    /// Read back a user counter's current value, if it exists
    pub fn counter_value(&self, name: &str) -> Option<u64> {
        self.inner
            .custom
            .read()
            .get(name)
            .map(|counter| counter.value.load(Ordering::Relaxed))
    }

    /// Current values and derived rates for `(kind, name)`, if the series exists
    pub fn snapshot(&self, kind: &str, name: &str) -> Option<SeriesSnapshot> {
        let series = self.inner.series.read();
        let series = series.get(&SeriesKey {
            kind: kind.to_string(),
            name: name.to_string(),
        })?;
        Some(SeriesSnapshot::from_series(kind, name, series))
    }

    fn snapshots(&self) -> Vec<SeriesSnapshot> {
        self.inner
            .series
            .read()
            .iter()
            .map(|(key, series)| SeriesSnapshot::from_series(&key.kind, &key.name, series))
            .collect()
    }

    /// Render the whole set in Prometheus exposition format.
    ///
    /// Four counter families per label pair, three derived rate gauges,
    /// then any user-declared counters.
    pub fn render_prometheus(&self) -> String {
        let snapshots = self.snapshots();
        let mut out = String::new();

        render_counter_family(
            &mut out,
            "requests_total",
            "Number of requests per detector function",
            &snapshots,
            |s| s.requests as f64,
        );
        render_counter_family(
            &mut out,
            "errors_total",
            "Number of errors per detector function",
            &snapshots,
            |s| s.errors as f64,
        );
        render_counter_family(
            &mut out,
            "detections_total",
            "Number of detections per detector function",
            &snapshots,
            |s| s.detections as f64,
        );
        render_counter_family(
            &mut out,
            "runtime_total",
            "Total runtime of a detector function in seconds; the induced latency of this guardrail",
            &snapshots,
            |s| s.runtime_seconds,
        );

        render_gauge_family(
            &mut out,
            "detection_rate",
            "Fraction of requests that produced a detection",
            &snapshots,
            |s| s.detection_rate,
        );
        render_gauge_family(
            &mut out,
            "error_rate",
            "Fraction of requests that raised an internal error",
            &snapshots,
            |s| s.error_rate,
        );
        render_gauge_family(
            &mut out,
            "pass_rate",
            "Fraction of requests that passed cleanly",
            &snapshots,
            |s| s.pass_rate,
        );

        for (name, counter) in self.inner.custom.read().iter() {
            if !counter.help.is_empty() {
                let _ = writeln!(out, "# HELP {name} {}", counter.help);
            }
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {}", counter.value.load(Ordering::Relaxed));
        }

        out
    }
}

impl Default for InstrumentSet {
    fn default() -> Self {
        Self::new()
    }
}

fn render_counter_family(
    out: &mut String,
    suffix: &str,
    help: &str,
    snapshots: &[SeriesSnapshot],
    value: impl Fn(&SeriesSnapshot) -> f64,
) {
    render_family(out, suffix, "counter", help, snapshots, value);
}

fn render_gauge_family(
    out: &mut String,
    suffix: &str,
    help: &str,
    snapshots: &[SeriesSnapshot],
    value: impl Fn(&SeriesSnapshot) -> f64,
) {
    render_family(out, suffix, "gauge", help, snapshots, value);
}

fn render_family(
    out: &mut String,
    suffix: &str,
    kind: &str,
    help: &str,
    snapshots: &[SeriesSnapshot],
    value: impl Fn(&SeriesSnapshot) -> f64,
) {
    let _ = writeln!(out, "# HELP {METRIC_PREFIX}_{suffix} {help}");
    let _ = writeln!(out, "# TYPE {METRIC_PREFIX}_{suffix} {kind}");
    for snapshot in snapshots {
        let _ = writeln!(
            out,
            "{METRIC_PREFIX}_{suffix}{{detector_kind=\"{}\",detector_name=\"{}\"}} {}",
            snapshot.detector_kind,
            snapshot.detector_name,
            value(snapshot),
        );
    }
}

/// Point-in-time values for one `(detector_kind, detector_name)` series
#[derive(Debug, Clone)]
pub struct SeriesSnapshot {
    pub detector_kind: String,
    pub detector_name: String,
    pub requests: u64,
    pub errors: u64,
    pub detections: u64,
    pub runtime_seconds: f64,
    pub detection_rate: f64,
    pub error_rate: f64,
    pub pass_rate: f64,
}

impl SeriesSnapshot {
    fn from_series(kind: &str, name: &str, series: &Series) -> Self {
        let requests = series.requests.load(Ordering::Relaxed);
        let errors = series.errors.load(Ordering::Relaxed);
        let detections = series.detections.load(Ordering::Relaxed);
        let runtime_us = series.runtime_us.load(Ordering::Relaxed);

        let (detection_rate, error_rate, pass_rate) = if requests == 0 {
            (0.0, 0.0, 0.0)
        } else {
            let requests_f = requests as f64;
            (
                detections as f64 / requests_f,
                errors as f64 / requests_f,
                (requests_f - detections as f64 - errors as f64) / requests_f,
            )
        };

        Self {
            detector_kind: kind.to_string(),
            detector_name: name.to_string(),
            requests,
            errors,
            detections,
            runtime_seconds: runtime_us as f64 / 1_000_000.0,
            detection_rate,
            error_rate,
            pass_rate,
        }
    }
}
