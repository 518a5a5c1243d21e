//! Configuration module for Token Pulse
//!
//! One value object built at startup and handed to the scheduler.
//! Defaults come from utils/constants.rs, overrides from `PULSE_*`
//! environment variables.

use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{
    mask_url, BPS_DENOMINATOR, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_DB_PATH, DEFAULT_EXPLORER_URL,
    DEFAULT_MAX_BLOCKS_PER_SCAN, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RATE_LIMIT_PER_SEC,
    DEFAULT_RPC_URL, DEFAULT_THRESHOLD_BPS,
};

/// Where candidate addresses come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMode {
    /// Explorer "all tokens" listing
    Listing,
    /// Transfer calls in recent blocks
    BlockScan,
}

impl FromStr for DiscoveryMode {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "listing" => Ok(Self::Listing),
            "block-scan" | "block_scan" | "blockscan" => Ok(Self::BlockScan),
            other => Err(AppError::invalid_config("PULSE_DISCOVERY", other)),
        }
    }
}

/// What number is tracked per token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountSource {
    /// Holder count from the explorer
    Holders,
    /// `totalSupply()` from the contract
    TotalSupply,
}

impl CountSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Holders => "holders",
            Self::TotalSupply => "total supply",
        }
    }
}

impl FromStr for CountSource {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "holders" => Ok(Self::Holders),
            "total-supply" | "total_supply" | "supply" => Ok(Self::TotalSupply),
            other => Err(AppError::invalid_config("PULSE_COUNT_SOURCE", other)),
        }
    }
}

/// Registry backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite { path: String },
    Memory,
}

/// Configuration for Token Pulse
#[derive(Debug, Clone)]
pub struct PulseConfig {
    /// Block-explorer API base URL
    pub explorer_url: String,
    /// Explorer API key (only `getabi` needs it)
    pub explorer_api_key: Option<String>,
    /// Node JSON-RPC URL
    pub rpc_url: String,
    /// Secondary node tried when the primary fails
    pub rpc_fallback_url: Option<String>,
    pub discovery: DiscoveryMode,
    pub count_source: CountSource,
    pub store: StoreBackend,
    /// Time between cycle starts
    pub poll_interval: Duration,
    /// Signal threshold in basis points (500 = 5%)
    pub threshold_bps: u64,
    /// Fetches per second; `None` disables the limiter
    pub rate_limit_per_sec: Option<u32>,
    /// Upper bound for every outbound call
    pub call_timeout: Duration,
    /// Most blocks scanned per cycle in block-scan mode
    pub max_blocks_per_scan: u64,
    /// Check the published ABI for `totalSupply` before calling it
    pub verify_abi: bool,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            explorer_url: DEFAULT_EXPLORER_URL.to_string(),
            explorer_api_key: None,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            rpc_fallback_url: None,
            discovery: DiscoveryMode::Listing,
            count_source: CountSource::Holders,
            store: StoreBackend::Sqlite {
                path: DEFAULT_DB_PATH.to_string(),
            },
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            threshold_bps: DEFAULT_THRESHOLD_BPS,
            rate_limit_per_sec: Some(DEFAULT_RATE_LIMIT_PER_SEC),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            max_blocks_per_scan: DEFAULT_MAX_BLOCKS_PER_SCAN,
            verify_abi: false,
        }
    }
}

impl PulseConfig {
    /// Build from the process environment
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("PULSE_EXPLORER_URL") {
            config.explorer_url = url.trim_end_matches('/').to_string();
        }
        config.explorer_api_key = get("PULSE_EXPLORER_API_KEY");
        if let Some(url) = get("PULSE_RPC_URL") {
            config.rpc_url = url;
        }
        config.rpc_fallback_url = get("PULSE_RPC_FALLBACK_URL");

        if let Some(mode) = get("PULSE_DISCOVERY") {
            config.discovery = mode.parse()?;
        }
        if let Some(source) = get("PULSE_COUNT_SOURCE") {
            config.count_source = source.parse()?;
        }

        match get("PULSE_STORE").map(|s| s.trim().to_lowercase()).as_deref() {
            None | Some("sqlite") => {
                if let Some(path) = get("PULSE_DB_PATH") {
                    config.store = StoreBackend::Sqlite { path };
                }
            }
            Some("memory") => config.store = StoreBackend::Memory,
            Some(other) => return Err(AppError::invalid_config("PULSE_STORE", other)),
        }

        if let Some(v) = get("PULSE_POLL_INTERVAL_SECS") {
            config.poll_interval = Duration::from_secs(parse_num("PULSE_POLL_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("PULSE_THRESHOLD_PERCENT") {
            config.threshold_bps = percent_to_bps(&v)?;
        }
        if let Some(v) = get("PULSE_RATE_LIMIT_PER_SEC") {
            let n: u32 = parse_num("PULSE_RATE_LIMIT_PER_SEC", &v)?;
            config.rate_limit_per_sec = (n > 0).then_some(n);
        }
        if let Some(v) = get("PULSE_CALL_TIMEOUT_SECS") {
            config.call_timeout = Duration::from_secs(parse_num("PULSE_CALL_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("PULSE_MAX_BLOCKS_PER_SCAN") {
            config.max_blocks_per_scan = parse_num("PULSE_MAX_BLOCKS_PER_SCAN", &v)?;
        }
        if let Some(v) = get("PULSE_VERIFY_ABI") {
            config.verify_abi = match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                other => return Err(AppError::invalid_config("PULSE_VERIFY_ABI", other)),
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the scheduler cannot run with
    pub fn validate(&self) -> AppResult<()> {
        if self.poll_interval.is_zero() {
            return Err(AppError::invalid_config("PULSE_POLL_INTERVAL_SECS", "0"));
        }
        if self.call_timeout.is_zero() {
            return Err(AppError::invalid_config("PULSE_CALL_TIMEOUT_SECS", "0"));
        }
        if self.max_blocks_per_scan == 0 {
            return Err(AppError::invalid_config("PULSE_MAX_BLOCKS_PER_SCAN", "0"));
        }
        if self.verify_abi && self.explorer_api_key.is_none() {
            return Err(AppError::missing_env("PULSE_EXPLORER_API_KEY"));
        }
        Ok(())
    }

    /// Threshold as a percentage, for display
    pub fn threshold_percent(&self) -> f64 {
        self.threshold_bps as f64 * 100.0 / BPS_DENOMINATOR as f64
    }

    /// Log the effective configuration (keys hidden)
    pub fn log_summary(&self) {
        info!("⚙️  Discovery: {:?} | Count: {}", self.discovery, self.count_source.as_str());
        info!("🌐 Explorer: {} | RPC: {}", self.explorer_url, mask_url(&self.rpc_url));
        info!(
            "⏱️  Interval: {:?} | Threshold: {:.2}% | Timeout: {:?}",
            self.poll_interval,
            self.threshold_percent(),
            self.call_timeout
        );
        match self.rate_limit_per_sec {
            Some(n) => info!("🚦 Rate limit: {} fetches/s", n),
            None => info!("🚦 Rate limit: disabled"),
        }
        match &self.store {
            StoreBackend::Sqlite { path } => info!("💾 Store: sqlite ({})", path),
            StoreBackend::Memory => info!("💾 Store: in-memory (not durable)"),
        }
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> AppResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AppError::invalid_config(key, value))
}

/// "5" -> 500, "2.5" -> 250
fn percent_to_bps(value: &str) -> AppResult<u64> {
    let pct: f64 = parse_num("PULSE_THRESHOLD_PERCENT", value)?;
    if !pct.is_finite() || pct < 0.0 {
        return Err(AppError::invalid_config("PULSE_THRESHOLD_PERCENT", value));
    }
    Ok((pct * 100.0).round() as u64)
}
