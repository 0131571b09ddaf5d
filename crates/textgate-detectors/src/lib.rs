//! textgate Detectors
//!
//! The detector dispatch and instrumentation framework:
//! - `DetectorRegistry`, the polymorphic contract each detector family
//!   implements, plus the shared request-parameter normalization
//! - `InstrumentedDetector`, the base supplying runtime timing, outcome
//!   recording, and uniform internal-error translation
//! - The regex and file-type registries (fixed function tables) and the
//!   custom registry (sandboxed, script-loaded functions)
//! - `DetectorSet`, the request dispatcher that fans a batch of content
//!   out to the selected registries and aggregates the results

pub mod custom;
pub mod dispatch;
pub mod file_type_detectors;
pub mod instrumented;
pub mod registry;
pub mod regex_detectors;
pub mod xsd;

pub use custom::CustomDetectorRegistry;
pub use dispatch::DetectorSet;
pub use file_type_detectors::FileTypeDetectorRegistry;
pub use instrumented::InstrumentedDetector;
pub use registry::{requested_functions, DetectorRegistry, FunctionDoc, RequestedFunction};
pub use regex_detectors::RegexDetectorRegistry;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::custom::CustomDetectorRegistry;
    pub use crate::dispatch::DetectorSet;
    pub use crate::file_type_detectors::FileTypeDetectorRegistry;
    pub use crate::registry::{DetectorRegistry, FunctionDoc};
    pub use crate::regex_detectors::RegexDetectorRegistry;
}
