//! Error types for textgate

/// Result type alias using textgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for textgate operations.
///
/// The taxonomy matters to callers: `Caller` maps to a 400-equivalent
/// response naming the offending identifier, `InternalDetector` maps to a
/// 500-equivalent response with a deliberately generic message (full
/// detail goes to the logs only), and `UnsafeCode` fails registry
/// construction before anything registers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller supplied an unknown identifier or malformed parameters
    #[error("{0}")]
    Caller(String),

    /// A detector function's own logic failed; detail is in the logs
    #[error("Internal detector error in {registry}/{function}: check detector logs")]
    InternalDetector {
        registry: String,
        function: String,
    },

    /// Static-analysis violations found in user-supplied detector code
    #[error("Unsafe code detected in custom detectors:\n{}", .0.join("\n"))]
    UnsafeCode(Vec<String>),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new caller error (400-equivalent)
    pub fn caller(msg: impl Into<String>) -> Self {
        Self::Caller(msg.into())
    }

    /// Create a new internal detector error (500-equivalent)
    pub fn internal_detector(registry: impl Into<String>, function: impl Into<String>) -> Self {
        Self::InternalDetector {
            registry: registry.into(),
            function: function.into(),
        }
    }

    /// Create a new unsafe-code load error from the violation list
    pub fn unsafe_code(violations: Vec<String>) -> Self {
        Self::UnsafeCode(violations)
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is the caller's fault (400) rather than ours (500)
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Self::Caller(_))
    }
}
