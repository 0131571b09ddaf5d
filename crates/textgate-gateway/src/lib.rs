//! textgate Gateway
//!
//! HTTP surface for the detector registries: the content-analysis
//! endpoint, registry introspection, the Prometheus metrics payload, and
//! server configuration.

use clap::Parser;

pub mod app;
pub mod config;
pub mod routes;

pub use app::{build_state, AppState};
pub use config::GatewayConfig;
pub use routes::create_router;

/// Command-line interface for the gateway binary
#[derive(Parser, Debug)]
#[command(name = "textgate-gateway")]
#[command(about = "textgate content-safety detector gateway", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long)]
    pub port: Option<u16>,

    /// Custom detectors script path
    #[arg(long, env = "TEXTGATE_CUSTOM_DETECTORS")]
    pub custom_detectors: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
