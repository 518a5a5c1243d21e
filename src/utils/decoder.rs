//! Calldata helpers
//! Recognizes ERC-20 transfer calls and encodes/decodes `totalSupply()`

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::{sol, SolCall};
use std::str::FromStr;

use crate::models::errors::{AppError, AppResult};

// ERC-20 function signatures
sol! {
    function transfer(address to, uint256 amount) external returns (bool);

    function transferFrom(address from, address to, uint256 amount) external returns (bool);

    function totalSupply() external view returns (uint256);
}

/// Selectors that mark a transaction as a token transfer
pub const TRANSFER_SELECTORS: [[u8; 4]; 2] = [transferCall::SELECTOR, transferFromCall::SELECTOR];

/// Decoder for ERC-20 calldata
pub struct TransferDecoder;

impl TransferDecoder {
    /// True when calldata starts with a known transfer selector
    pub fn is_transfer_call(calldata: &[u8]) -> bool {
        if calldata.len() < 4 {
            return false;
        }
        TRANSFER_SELECTORS.iter().any(|sel| calldata[..4] == sel[..])
    }

    /// `0x`-prefixed calldata for `totalSupply()`
    pub fn total_supply_calldata() -> String {
        format!("0x{}", hex::encode(totalSupplyCall {}.abi_encode()))
    }

    /// Decode the `eth_call` return value of `totalSupply()`
    pub fn decode_total_supply(raw: &str) -> AppResult<U256> {
        let bytes = Bytes::from_str(raw)
            .map_err(|e| AppError::invalid_response(format!("Bad hex in eth_call result: {}", e)))?;
        if bytes.is_empty() {
            return Err(AppError::invalid_response("Empty totalSupply() result"));
        }
        let ret = totalSupplyCall::abi_decode_returns(&bytes, false)
            .map_err(|e| AppError::invalid_response(format!("Bad totalSupply() result: {}", e)))?;
        Ok(ret._0)
    }
}

/// Parse and lowercase a contract address (`0x` + 40 hex digits).
/// Returns None for anything else.
pub fn normalize_address(raw: &str) -> Option<String> {
    let addr = Address::from_str(raw.trim()).ok()?;
    Some(format!("0x{}", hex::encode(addr.as_slice())))
}
