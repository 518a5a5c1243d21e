//! Holder/Supply Fetcher
//!
//! `fetch_count(address)` behind one trait, two sources:
//! - `HolderCountFetcher`: explorer holder count
//! - `SupplyFetcher`: `totalSupply()` through the node

use alloy_primitives::U256;
use async_trait::async_trait;
use tracing::debug;

use crate::models::errors::{AppError, AppResult};
use crate::providers::{abi_has_function, ExplorerClient, RpcProvider};
use crate::utils::decoder::TransferDecoder;

#[async_trait]
pub trait CountFetcher: Send + Sync {
    /// Current count for `address`. Any failure is scoped to this address.
    async fn fetch_count(&self, address: &str) -> AppResult<U256>;

    /// What the count means, for log lines
    fn describe(&self) -> &'static str;
}

/// Holder count from the explorer
pub struct HolderCountFetcher {
    explorer: ExplorerClient,
}

impl HolderCountFetcher {
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

#[async_trait]
impl CountFetcher for HolderCountFetcher {
    async fn fetch_count(&self, address: &str) -> AppResult<U256> {
        let holders = self.explorer.holder_count(address).await?;
        debug!("👥 {} holders: {}", address, holders);
        Ok(holders)
    }

    fn describe(&self) -> &'static str {
        "holders"
    }
}

/// Total supply read from the token contract
pub struct SupplyFetcher {
    rpc: RpcProvider,
    /// When set, the published ABI must declare `totalSupply`
    abi_check: Option<ExplorerClient>,
}

impl SupplyFetcher {
    pub fn new(rpc: RpcProvider) -> Self {
        Self { rpc, abi_check: None }
    }

    pub fn with_abi_check(mut self, explorer: ExplorerClient) -> Self {
        self.abi_check = Some(explorer);
        self
    }
}

/// `eth_getCode` returns "0x" for accounts without code
pub fn has_code(code: &str) -> bool {
    let digits = code.strip_prefix("0x").unwrap_or(code);
    !digits.is_empty() && digits.chars().any(|c| c != '0')
}

#[async_trait]
impl CountFetcher for SupplyFetcher {
    async fn fetch_count(&self, address: &str) -> AppResult<U256> {
        let code = self.rpc.get_code(address).await?;
        if !has_code(&code) {
            return Err(AppError::no_contract(address));
        }

        if let Some(ref explorer) = self.abi_check {
            let abi = explorer.contract_abi(address).await?;
            if !abi_has_function(&abi, "totalSupply") {
                return Err(AppError::no_contract(address));
            }
        }

        let raw = self
            .rpc
            .eth_call(address, &TransferDecoder::total_supply_calldata())
            .await?;
        let supply = TransferDecoder::decode_total_supply(&raw)?;
        debug!("🪙 {} totalSupply: {}", address, supply);
        Ok(supply)
    }

    fn describe(&self) -> &'static str {
        "total supply"
    }
}
