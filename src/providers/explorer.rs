//! Block-Explorer API Client
//!
//! Endpoints used:
//! - `GET /api/v1/tokens`                  -> `[{ "address": "0x.." }, ..]`
//! - `GET /api/v1/token/{address}`         -> `{ "data": { "holders": N } }`
//! - `GET /api?module=contract&action=getabi&address=..&apikey=..`
//!                                         -> `{ "status", "message", "result": "<abi json>" }`
//!
//! Every body is decoded into an explicit schema. A missing or malformed
//! field is an error, never a default value.

use alloy_primitives::U256;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::errors::{AppError, AppResult};
use crate::utils::constants::{mask_url, USER_AGENT as USER_AGENT_CONST};

/// One entry of the token listing
#[derive(Debug, Clone, Deserialize)]
pub struct ListedToken {
    pub address: String,
}

/// `/api/v1/token/{address}` body
#[derive(Debug, Deserialize)]
pub struct TokenInfoResponse {
    pub data: TokenInfoData,
}

#[derive(Debug, Deserialize)]
pub struct TokenInfoData {
    pub holders: CountField,
}

/// Explorers disagree on whether big counts are numbers or strings
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CountField {
    Number(u64),
    Text(String),
}

impl CountField {
    pub fn to_u256(&self) -> AppResult<U256> {
        match self {
            CountField::Number(n) => Ok(U256::from(*n)),
            CountField::Text(s) => s
                .trim()
                .parse::<U256>()
                .map_err(|_| AppError::invalid_response(format!("Count is not an integer: {:?}", s))),
        }
    }
}

/// Etherscan-style envelope used by `getabi`
#[derive(Debug, Deserialize)]
pub struct AbiResponse {
    pub status: String,
    pub message: String,
    pub result: String,
}

/// Single ABI item; only the fields needed to find functions
#[derive(Debug, Clone, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// True when the ABI declares a function with this name
pub fn abi_has_function(abi: &[AbiEntry], name: &str) -> bool {
    abi.iter()
        .any(|e| e.kind == "function" && e.name.as_deref() == Some(name))
}

/// Explorer API client
#[derive(Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ExplorerClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_CONST));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| AppError::fetch_network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> AppResult<T> {
        debug!("🔍 Explorer GET {}", mask_url(url));

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("🚦 Explorer throttled (HTTP 429)");
            return Err(AppError::rate_limited("Explorer rate limited (HTTP 429)"));
        }
        if !status.is_success() {
            return Err(AppError::fetch_network(format!("Explorer API error: {}", status)));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Every token the explorer lists
    pub async fn list_tokens(&self) -> AppResult<Vec<ListedToken>> {
        let url = format!("{}/api/v1/tokens", self.base_url);
        let tokens: Vec<ListedToken> = self.get_json(&url).await?;
        info!("📋 Explorer: {} tokens listed", tokens.len());
        Ok(tokens)
    }

    /// Current holder count for one token
    pub async fn holder_count(&self, address: &str) -> AppResult<U256> {
        let url = format!("{}/api/v1/token/{}", self.base_url, address);
        let info: TokenInfoResponse = self.get_json(&url).await?;
        info.data.holders.to_u256()
    }

    /// Published contract ABI
    pub async fn contract_abi(&self, address: &str) -> AppResult<Vec<AbiEntry>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::missing_env("PULSE_EXPLORER_API_KEY"))?;
        let url = format!(
            "{}/api?module=contract&action=getabi&address={}&apikey={}",
            self.base_url, address, key
        );
        let response: AbiResponse = self.get_json(&url).await?;
        parse_abi_response(address, response)
    }
}

/// Unwrap the `getabi` envelope. Status "0" means unverified or unknown.
pub fn parse_abi_response(address: &str, response: AbiResponse) -> AppResult<Vec<AbiEntry>> {
    if response.status != "1" {
        debug!("getabi {} -> {}: {}", address, response.message, response.result);
        return Err(AppError::no_contract(address));
    }
    Ok(serde_json::from_str(&response.result)?)
}
