//! Application state construction

use crate::config::GatewayConfig;
use std::path::Path;
use std::sync::Arc;
use textgate_core::Result;
use textgate_detectors::{
    CustomDetectorRegistry, DetectorSet, FileTypeDetectorRegistry, RegexDetectorRegistry,
};
use textgate_telemetry::InstrumentSet;
use tracing::{info, warn};

/// Shared application state: the live registries and the instrument set
#[derive(Clone)]
pub struct AppState {
    pub detectors: Arc<DetectorSet>,
    pub instruments: InstrumentSet,
}

/// Construct the instrument set and every configured registry.
///
/// The fixed registries always load; the custom registry loads when its
/// script file exists, and a script failing the security gate fails
/// startup rather than serving without it.
pub fn build_state(config: &GatewayConfig) -> Result<AppState> {
    let instruments = InstrumentSet::new();
    let mut detectors = DetectorSet::new();

    detectors.register(Arc::new(RegexDetectorRegistry::new(instruments.clone())));
    detectors.register(Arc::new(FileTypeDetectorRegistry::new(instruments.clone())));

    match &config.detectors.custom_detectors_path {
        Some(path) if Path::new(path).exists() => {
            let registry = CustomDetectorRegistry::from_file(path, instruments.clone())?;
            info!(path = %path, "custom detector registry loaded");
            detectors.register(Arc::new(registry));
        }
        Some(path) => {
            warn!(path = %path, "custom detectors file not found, custom registry disabled");
        }
        None => {}
    }

    info!(
        registries = detectors.registries().len(),
        "detector registries initialized"
    );

    Ok(AppState {
        detectors: Arc::new(detectors),
        instruments,
    })
}
