//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Gateway configuration, loaded from YAML with CLI overrides
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Detector registry configuration
    #[serde(default)]
    pub detectors: DetectorConfig,
}

impl GatewayConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &crate::Cli) -> anyhow::Result<Self> {
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        if let Some(listen) = &cli.listen {
            config.listen = listen.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if let Some(path) = &cli.custom_detectors {
            config.detectors.custom_detectors_path = Some(path.clone());
        }

        Ok(config)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            detectors: DetectorConfig::default(),
        }
    }
}

/// Detector registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Path to the custom detectors script. The custom registry is
    /// skipped (with a warning) when the file does not exist.
    #[serde(default = "default_custom_detectors_path")]
    pub custom_detectors_path: Option<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            custom_detectors_path: default_custom_detectors_path(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_custom_detectors_path() -> Option<String> {
    Some("custom_detectors/custom_detectors.rhai".to_string())
}
