//! Centralized Error Handling Module
//!
//! Every failure carries a unique code so log lines can be grepped and
//! counted. Codes follow the pattern CATEGORY_SPECIFIC_ERROR:
//! - FETCH_xxx: reaching a holder/supply count
//! - DISCOVERY_xxx: enumerating candidate addresses
//! - STORE_xxx: the token registry
//! - CFG_xxx: process configuration

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new AppError
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create AppError with source error
    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// Error category
    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    /// Whether this error ends the whole cycle instead of a single address
    pub fn is_cycle_fatal(&self) -> bool {
        self.code.is_cycle_fatal()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Fetch,
    Discovery,
    Persistence,
    Config,
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // Fetch Errors
    // ============================================
    /// Network call failed (connect, HTTP status, RPC error)
    FetchNetwork,
    /// Call exceeded the per-call timeout
    FetchTimeout,
    /// Address has no deployed or queryable contract
    FetchNoContract,
    /// Response body did not match the expected schema
    FetchInvalidResponse,
    /// Provider throttled the call (HTTP 429 or RPC -32005)
    FetchRateLimited,

    // ============================================
    // Discovery Errors
    // ============================================
    /// Candidate listing or block scan failed
    DiscoveryFailed,
    /// Discovery exceeded the per-call timeout
    DiscoveryTimeout,

    // ============================================
    // Persistence Errors
    // ============================================
    /// Store cannot be reached at all
    StoreUnavailable,
    /// A single read or write failed
    StoreOpFailed,
    /// A stored row could not be decoded
    StoreCorruptRecord,

    // ============================================
    // Configuration Errors
    // ============================================
    /// Missing environment variable
    ConfigMissingEnv,
    /// Invalid configuration value
    ConfigInvalidValue,
}

impl ErrorCode {
    /// Get string representation of error code
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchNetwork => "FETCH_NETWORK",
            Self::FetchTimeout => "FETCH_TIMEOUT",
            Self::FetchNoContract => "FETCH_NO_CONTRACT",
            Self::FetchInvalidResponse => "FETCH_INVALID_RESPONSE",
            Self::FetchRateLimited => "FETCH_RATE_LIMITED",

            Self::DiscoveryFailed => "DISCOVERY_FAILED",
            Self::DiscoveryTimeout => "DISCOVERY_TIMEOUT",

            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::StoreOpFailed => "STORE_OP_FAILED",
            Self::StoreCorruptRecord => "STORE_CORRUPT_RECORD",

            Self::ConfigMissingEnv => "CFG_MISSING_ENV",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FetchNetwork
            | Self::FetchTimeout
            | Self::FetchNoContract
            | Self::FetchInvalidResponse
            | Self::FetchRateLimited => ErrorKind::Fetch,
            Self::DiscoveryFailed | Self::DiscoveryTimeout => ErrorKind::Discovery,
            Self::StoreUnavailable | Self::StoreOpFailed | Self::StoreCorruptRecord => {
                ErrorKind::Persistence
            }
            Self::ConfigMissingEnv | Self::ConfigInvalidValue => ErrorKind::Config,
        }
    }

    /// Discovery failures and an unreachable store abort the cycle;
    /// everything else is scoped to one address.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(
            self,
            Self::DiscoveryFailed | Self::DiscoveryTimeout | Self::StoreUnavailable
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn fetch_network(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchNetwork, msg)
    }

    pub fn fetch_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchTimeout, msg)
    }

    pub fn no_contract(address: &str) -> Self {
        Self::new(
            ErrorCode::FetchNoContract,
            format!("No queryable contract at {}", address),
        )
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchInvalidResponse, msg)
    }

    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::FetchRateLimited, msg)
    }

    pub fn discovery_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DiscoveryFailed, msg)
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreUnavailable, msg)
    }

    pub fn corrupt_record(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreCorruptRecord, msg)
    }

    pub fn invalid_config(key: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {:?}", key, value),
        )
    }

    pub fn missing_env(key: &str) -> Self {
        Self::new(
            ErrorCode::ConfigMissingEnv,
            format!("Missing environment variable: {}", key),
        )
    }

    /// Re-tag an error with a different code, keeping the message.
    /// Discovery uses this to lift fetch-level failures to cycle level.
    pub fn recode(self, code: ErrorCode) -> Self {
        Self { code, ..self }
    }
}

// ============================================
// Result type alias
// ============================================

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::FetchTimeout, "Request timeout")
        } else if err.is_decode() {
            Self::with_source(ErrorCode::FetchInvalidResponse, "Response decode failed", err)
        } else {
            Self::with_source(ErrorCode::FetchNetwork, "Request failed", err)
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::FetchInvalidResponse, "JSON parse error", err)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ffi::ErrorCode as SqliteCode;

        let unavailable = matches!(
            &err,
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    SqliteCode::CannotOpen | SqliteCode::NotADatabase | SqliteCode::PermissionDenied
                )
        );
        if unavailable {
            Self::with_source(ErrorCode::StoreUnavailable, "SQLite unavailable", err)
        } else {
            Self::with_source(ErrorCode::StoreOpFailed, "SQLite error", err)
        }
    }
}
