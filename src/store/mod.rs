//! Token Registry
//!
//! Last observed count per contract address. The address itself is the
//! key; `upsert` never creates a second row for the same address.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryRegistry;
pub use sqlite::SqliteRegistry;

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::models::errors::AppResult;
use crate::models::types::TokenRecord;

#[async_trait]
pub trait TokenRegistry: Send + Sync {
    /// Absent addresses are `Ok(None)`, not an error
    async fn find(&self, address: &str) -> AppResult<Option<TokenRecord>>;

    /// Insert or overwrite the count for `address`
    async fn upsert(&self, address: &str, count: U256) -> AppResult<()>;

    /// Number of tracked tokens
    async fn len(&self) -> AppResult<usize>;
}

/// Lowercase key used by every backend
#[inline]
pub(crate) fn registry_key(address: &str) -> String {
    address.trim().to_lowercase()
}
