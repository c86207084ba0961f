//! Error types for Stagecast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StagecastError>;

#[derive(Error, Debug)]
pub enum StagecastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Credential vault error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StagecastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            StagecastError::InvalidInput(_) => 3,
            StagecastError::Platform(PlatformError::NeedsReauth(_)) => 2,
            StagecastError::Platform(_) => 1,
            StagecastError::Crypto(_) => 1,
            StagecastError::Config(_) => 1,
            StagecastError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Errors from the credential vault (encrypt/decrypt layer)
///
/// All variants are non-retryable: a crypto failure is never resolved by
/// trying again with the same inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Empty input: secret or ciphertext must not be empty")]
    EmptyInput,

    #[error("Encryption key misconfigured: {0}")]
    KeyMisconfigured(String),

    #[error("Ciphertext truncated: decoded blob shorter than nonce + auth tag")]
    Truncated,

    #[error("Authentication failed: wrong key, corrupted data, or tampering")]
    AuthenticationFailed,
}

/// Errors from the token-refresh and publish layers
///
/// The transient/permanent split drives retry policy: `Timeout` and
/// `Transient` are eligible for retry, everything else terminates the
/// attempt immediately.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Platform credentials not configured: {0}")]
    MissingCredentials(String),

    #[error("Token response missing required tokens: {0}")]
    MissingTokens(String),

    #[error("Re-authorization required: {0}")]
    NeedsReauth(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Transient platform error: {0}")]
    Transient(String),

    #[error("Permanent platform error: {0}")]
    Permanent(String),
}

impl PlatformError {
    /// Whether retrying this error may resolve it
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Timeout(_) | PlatformError::Transient(_))
    }

    /// Whether the stored refresh grant is no longer usable
    pub fn needs_reauth(&self) -> bool {
        matches!(self, PlatformError::NeedsReauth(_))
    }

    /// Classify an HTTP status from a token-refresh or publish endpoint
    ///
    /// 5xx and 429 are transient; 400/401 mean the grant itself was
    /// rejected; any other 4xx is a permanent, non-reauth failure.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match status {
            429 => PlatformError::Transient(format!("HTTP 429: {}", detail)),
            500..=599 => PlatformError::Transient(format!("HTTP {}: {}", status, detail)),
            400 | 401 => PlatformError::NeedsReauth(format!("HTTP {}: {}", status, detail)),
            _ => PlatformError::Permanent(format!("HTTP {}: {}", status, detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = StagecastError::InvalidInput("No platform targeted".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_needs_reauth() {
        let error = StagecastError::Platform(PlatformError::NeedsReauth(
            "refresh grant rejected".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        let transient = StagecastError::Platform(PlatformError::Transient("503".to_string()));
        let permanent = StagecastError::Platform(PlatformError::Permanent("404".to_string()));
        let timeout = StagecastError::Platform(PlatformError::Timeout("10s".to_string()));
        assert_eq!(transient.exit_code(), 1);
        assert_eq!(permanent.exit_code(), 1);
        assert_eq!(timeout.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_crypto_error() {
        let error = StagecastError::Crypto(CryptoError::AuthenticationFailed);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = StagecastError::Config(ConfigError::MissingVar(
            "STAGECAST_ENCRYPTION_KEY".to_string(),
        ));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_is_transient_classification() {
        assert!(PlatformError::Timeout("10s elapsed".to_string()).is_transient());
        assert!(PlatformError::Transient("HTTP 503".to_string()).is_transient());
        assert!(!PlatformError::NeedsReauth("HTTP 401".to_string()).is_transient());
        assert!(!PlatformError::Permanent("HTTP 404".to_string()).is_transient());
        assert!(!PlatformError::MissingCredentials("mastodon".to_string()).is_transient());
        assert!(!PlatformError::MissingTokens("no access_token".to_string()).is_transient());
    }

    #[test]
    fn test_from_status_transient() {
        assert!(PlatformError::from_status(503, "unavailable").is_transient());
        assert!(PlatformError::from_status(500, "server error").is_transient());
        assert!(PlatformError::from_status(429, "rate limited").is_transient());
    }

    #[test]
    fn test_from_status_needs_reauth() {
        assert!(PlatformError::from_status(400, "invalid_grant").needs_reauth());
        assert!(PlatformError::from_status(401, "unauthorized").needs_reauth());
    }

    #[test]
    fn test_from_status_permanent_without_reauth() {
        let err = PlatformError::from_status(403, "forbidden");
        assert!(!err.is_transient());
        assert!(!err.needs_reauth());
        assert!(matches!(err, PlatformError::Permanent(_)));
    }

    #[test]
    fn test_error_message_formatting_missing_tokens() {
        let error = PlatformError::MissingTokens("access_token absent".to_string());
        let message = format!("{}", error);
        assert!(message.contains("missing required tokens"));
    }

    #[test]
    fn test_error_message_formatting_crypto() {
        assert_eq!(
            format!("{}", CryptoError::EmptyInput),
            "Empty input: secret or ciphertext must not be empty"
        );
        assert!(format!("{}", CryptoError::Truncated).contains("nonce + auth tag"));
        assert!(format!("{}", CryptoError::AuthenticationFailed).contains("tampering"));
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Transient("HTTP 502".to_string());
        let error: StagecastError = platform_error.into();
        assert!(matches!(error, StagecastError::Platform(_)));
    }

    #[test]
    fn test_error_conversion_from_crypto_error() {
        let error: StagecastError = CryptoError::Truncated.into();
        assert!(matches!(error, StagecastError::Crypto(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        // Clone is required by the retry loops
        let original = PlatformError::Transient("HTTP 503".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_err() -> Result<()> {
            Err(StagecastError::InvalidInput("test".to_string()))
        }
        assert!(returns_err().is_err());
    }
}
