//! Error types for the justification job.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Remote gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Request to {endpoint} failed: {reason}")]
    Request {
        endpoint: &'static str,
        reason: String,
    },

    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    #[error("Invalid response from {endpoint}: {reason}")]
    Decode {
        endpoint: &'static str,
        reason: String,
    },
}

impl GatewayError {
    /// Whether the remote side refused our credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Status { status: 401 | 403, .. })
    }
}

/// Run-level failures. Everything else is contained per entry or per group.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Failed to fetch flagged positions: {0}")]
    FlaggedPositions(#[source] GatewayError),
}

/// Result type alias for the job.
pub type Result<T> = std::result::Result<T, Error>;
