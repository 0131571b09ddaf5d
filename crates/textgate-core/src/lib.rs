//! textgate Core
//!
//! Core types, traits, and utilities shared across textgate components.
//!
//! This crate provides:
//! - The uniform detection record (`DetectionResult`) and its evidence type
//! - Request/response contracts for the content-analysis endpoint
//! - Error types and result handling for the whole detector taxonomy

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    ContentAnalysisRequest, ContentsAnalysisResponse, DetectionResult, DetectorParams, Evidence,
    RequestHeaders,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        ContentAnalysisRequest, ContentsAnalysisResponse, DetectionResult, DetectorParams,
        Evidence, RequestHeaders,
    };
}
