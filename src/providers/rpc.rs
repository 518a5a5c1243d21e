//! RPC Client Module - Node JSON-RPC over HTTP
//!
//! 1. Primary endpoint with optional fallback (one attempt each)
//! 2. User-Agent header, gzip responses
//! 3. API keys masked in every log line
//!
//! No retry loop: a failed call is reported and the scheduler tries
//! again on the next tick.

use alloy_rpc_types::Block;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{mask_url, USER_AGENT as USER_AGENT_CONST};

/// RPC Provider with fallback support
#[derive(Clone)]
pub struct RpcProvider {
    /// Primary RPC URL
    primary_url: String,
    /// Fallback RPC URL
    fallback_url: Option<String>,
    /// HTTP client with custom headers (gzip enabled)
    client: reqwest::Client,
}

impl RpcProvider {
    pub fn new(
        primary_url: impl Into<String>,
        fallback_url: Option<String>,
        timeout: Duration,
    ) -> AppResult<Self> {
        Ok(Self {
            primary_url: primary_url.into(),
            fallback_url,
            client: Self::build_client(timeout)?,
        })
    }

    /// Build HTTP client with custom headers
    fn build_client(timeout: Duration) -> AppResult<reqwest::Client> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip"));

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::fetch_network(format!("Failed to build HTTP client: {}", e)))
    }

    /// Execute JSON-RPC call, trying the fallback if the primary fails
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> AppResult<T> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let primary_err = match self.execute_call(&self.primary_url, &payload).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if let Some(ref fallback) = self.fallback_url {
            warn!("⚠️ Primary RPC failed for {}: {}, trying fallback", method, primary_err);
            return self.execute_call(fallback, &payload).await;
        }

        Err(primary_err)
    }

    /// Execute single RPC call
    async fn execute_call<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> AppResult<T> {
        debug!("📡 {} -> {}", payload["method"], mask_url(url));

        let response = self.client.post(url).json(payload).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("🚦 RPC throttled by {} (HTTP 429)", mask_url(url));
            return Err(AppError::rate_limited("Rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(AppError::fetch_network(format!("HTTP error: {}", status)));
        }

        let json: RpcResponse<T> = response.json().await?;

        if let Some(error) = json.error {
            return Err(error.into_app_error(url));
        }

        json.result
            .ok_or_else(|| AppError::invalid_response("No result in response"))
    }

    /// Latest block number (`eth_blockNumber`)
    pub async fn block_number(&self) -> AppResult<u64> {
        let raw: String = self.call("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&raw)
    }

    /// Block with full transaction bodies (`eth_getBlockByNumber(n, true)`)
    pub async fn block_with_transactions(&self, number: u64) -> AppResult<Block> {
        let params = serde_json::json!([format!("0x{:x}", number), true]);
        self.call::<Option<Block>>("eth_getBlockByNumber", params)
            .await?
            .ok_or_else(|| AppError::invalid_response(format!("Block {} not found", number)))
    }

    /// Execute eth_call against the latest state
    pub async fn eth_call(&self, to: &str, data: &str) -> AppResult<String> {
        let params = serde_json::json!([{ "to": to, "data": data }, "latest"]);
        self.call::<String>("eth_call", params).await
    }

    /// Get bytecode
    pub async fn get_code(&self, address: &str) -> AppResult<String> {
        let params = serde_json::json!([address, "latest"]);
        self.call::<String>("eth_getCode", params).await
    }

    /// Get RPC URL (masked for logging)
    pub fn masked_url(&self) -> String {
        mask_url(&self.primary_url)
    }
}

/// Parse a hex JSON-RPC quantity such as `0x1b4`
pub fn parse_quantity(raw: &str) -> AppResult<u64> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| AppError::invalid_response(format!("Quantity without 0x prefix: {}", raw)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| AppError::invalid_response(format!("Bad quantity: {}", raw)))
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC error structure
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    /// Check if this is a rate limit error (code -32005 or the message says so)
    pub fn is_rate_limit(&self) -> bool {
        self.code == -32005 || self.message.to_lowercase().contains("rate limit")
    }

    fn into_app_error(self, url: &str) -> AppError {
        let msg = format!("RPC error: {} (code: {})", self.message, self.code);
        if self.is_rate_limit() {
            warn!("🚦 RPC throttled by {}: {}", mask_url(url), self.message);
            AppError::rate_limited(msg)
        } else {
            AppError::fetch_network(msg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::ErrorCode;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert!(parse_quantity("1b4").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_response_with_error() {
        let body = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"rate limit exceeded"}}"#;
        let parsed: RpcResponse<String> = serde_json::from_str(body).unwrap();
        assert!(parsed.result.is_none());
        assert!(parsed.error.unwrap().is_rate_limit());
    }

    #[test]
    fn test_rpc_error_codes() {
        let throttled = RpcError {
            code: -32005,
            message: "limit exceeded".to_string(),
        };
        assert_eq!(
            throttled.into_app_error("http://node").code,
            ErrorCode::FetchRateLimited
        );

        let reverted = RpcError {
            code: 3,
            message: "execution reverted".to_string(),
        };
        assert_eq!(reverted.into_app_error("http://node").code, ErrorCode::FetchNetwork);
    }

    #[test]
    fn test_response_with_result() {
        let body = r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#;
        let parsed: RpcResponse<String> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.result.as_deref(), Some("0x10"));
    }

    #[test]
    fn test_masked_url() {
        let provider = RpcProvider::new(
            "https://bsc-mainnet.g.alchemy.com/v2/secret",
            None,
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!provider.masked_url().contains("secret"));
    }
}
