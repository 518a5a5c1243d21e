//! Constants Module - Single Source of Truth
//!
//! Defaults and fixed values shared across the crate. Anything an
//! operator may want to change lives in `PulseConfig` instead, seeded
//! from these values.

// ============================================
// APPLICATION CONSTANTS
// ============================================

/// Application name
pub const APP_NAME: &str = "TokenPulse";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// User-Agent for HTTP requests
pub const USER_AGENT: &str = concat!("TokenPulse/", env!("CARGO_PKG_VERSION"));

// ============================================
// ENDPOINT DEFAULTS (BSC)
// ============================================

/// Block-explorer API base URL
pub const DEFAULT_EXPLORER_URL: &str = "https://api.bscscan.com";

/// Public BSC JSON-RPC endpoint
pub const DEFAULT_RPC_URL: &str = "https://bsc-dataseed.binance.org";

/// SQLite database file
pub const DEFAULT_DB_PATH: &str = "token_pulse.db";

// ============================================
// POLLING DEFAULTS
// ============================================

/// Seconds between cycles
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Signal threshold in basis points (500 = 5%)
pub const DEFAULT_THRESHOLD_BPS: u64 = 500;

/// Outbound fetches per second (0 disables the limiter)
pub const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 5;

/// Upper bound for any single outbound call
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Most blocks the block-scan discovery walks in one cycle
pub const DEFAULT_MAX_BLOCKS_PER_SCAN: u64 = 20;

// ============================================
// ARITHMETIC
// ============================================

/// Basis points per whole (100% = 10_000 bps)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Percent values are computed at this scale before conversion to f64
pub const PERCENT_SCALE: u64 = 1_000_000;

// ============================================
// HELPERS
// ============================================

/// Hide the tail of an API-keyed URL before it reaches the logs.
/// Handles `/v2/<key>` style paths and `apikey=` query parameters.
pub fn mask_url(url: &str) -> String {
    if let Some((head, _)) = url.split_once("/v2/") {
        return format!("{}/v2/***HIDDEN***", head);
    }
    if let Some(idx) = url.find("apikey=") {
        let (head, rest) = url.split_at(idx + "apikey=".len());
        let tail = rest.find('&').map(|i| &rest[i..]).unwrap_or("");
        return format!("{}***HIDDEN***{}", head, tail);
    }
    url.to_string()
}
