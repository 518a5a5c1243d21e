//! Discovery Source
//!
//! Produces the candidate addresses for one cycle. Output is lowercase,
//! deduplicated, in order of first appearance.
//!
//! `BlockScanDiscovery` keeps a high-water mark so transfers landing
//! between polls are not missed: each scan covers every block after the
//! last one scanned, capped at `max_blocks` per cycle. The mark only
//! moves after every block in the range was read.

use alloy_primitives::Address;
use alloy_rpc_types::TransactionTrait;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::errors::{AppResult, ErrorCode};
use crate::providers::{ExplorerClient, RpcProvider};
use crate::utils::decoder::{normalize_address, TransferDecoder};

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover(&self) -> AppResult<Vec<String>>;

    fn name(&self) -> &'static str;
}

/// Keep the first occurrence of each address
fn dedup_in_order<I: IntoIterator<Item = String>>(addresses: I) -> Vec<String> {
    let mut seen = HashSet::new();
    addresses
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect()
}

// ============================================
// LISTING STRATEGY
// ============================================

/// Every token the explorer lists
pub struct ListingDiscovery {
    explorer: ExplorerClient,
}

impl ListingDiscovery {
    pub fn new(explorer: ExplorerClient) -> Self {
        Self { explorer }
    }
}

/// Normalize listed addresses, dropping malformed ones
pub fn listed_addresses<'a, I: IntoIterator<Item = &'a str>>(raw: I) -> Vec<String> {
    let normalized = raw.into_iter().filter_map(|a| {
        let addr = normalize_address(a);
        if addr.is_none() {
            warn!("⚠️ Skipping malformed listed address {:?}", a);
        }
        addr
    });
    dedup_in_order(normalized)
}

#[async_trait]
impl Discovery for ListingDiscovery {
    async fn discover(&self) -> AppResult<Vec<String>> {
        let tokens = self
            .explorer
            .list_tokens()
            .await
            .map_err(|e| e.recode(ErrorCode::DiscoveryFailed))?;
        Ok(listed_addresses(tokens.iter().map(|t| t.address.as_str())))
    }

    fn name(&self) -> &'static str {
        "listing"
    }
}

// ============================================
// BLOCK-SCAN STRATEGY
// ============================================

/// Chain access needed by the block scan
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current chain head
    async fn latest_block(&self) -> AppResult<u64>;

    /// Token contracts receiving transfer calls in block `number`
    async fn transfer_targets_in(&self, number: u64) -> AppResult<Vec<String>>;
}

#[async_trait]
impl BlockSource for RpcProvider {
    async fn latest_block(&self) -> AppResult<u64> {
        self.block_number().await
    }

    async fn transfer_targets_in(&self, number: u64) -> AppResult<Vec<String>> {
        let block = self.block_with_transactions(number).await?;
        let txs = block.transactions.as_transactions().unwrap_or_default();
        Ok(transfer_targets(txs.iter().map(|tx| {
            (TransactionTrait::to(tx), &TransactionTrait::input(tx)[..])
        })))
    }
}

/// Recipients of transfer calls in recent blocks
pub struct BlockScanDiscovery {
    source: Box<dyn BlockSource>,
    max_blocks: u64,
    /// Last block fully scanned
    last_scanned: Mutex<Option<u64>>,
}

impl BlockScanDiscovery {
    pub fn new(source: impl BlockSource + 'static, max_blocks: u64) -> Self {
        Self {
            source: Box::new(source),
            max_blocks: max_blocks.max(1),
            last_scanned: Mutex::new(None),
        }
    }

    pub fn last_scanned(&self) -> Option<u64> {
        match self.last_scanned.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_last_scanned(&self, block: u64) {
        match self.last_scanned.lock() {
            Ok(mut guard) => *guard = Some(block),
            Err(poisoned) => *poisoned.into_inner() = Some(block),
        }
    }
}

/// Inclusive block range to scan given the mark and the chain head
pub fn scan_range(last_scanned: Option<u64>, latest: u64, max_blocks: u64) -> Option<(u64, u64)> {
    let from = match last_scanned {
        None => latest,
        Some(last) if last >= latest => return None,
        Some(last) => last + 1,
    };
    let capped_from = from.max(latest.saturating_sub(max_blocks.saturating_sub(1)));
    Some((capped_from, latest))
}

/// Destination of every transaction whose calldata is a token transfer
pub fn transfer_targets<'a, I>(txs: I) -> Vec<String>
where
    I: IntoIterator<Item = (Option<Address>, &'a [u8])>,
{
    let targets = txs.into_iter().filter_map(|(to, input)| match to {
        Some(to) if TransferDecoder::is_transfer_call(input) => {
            Some(format!("0x{}", hex::encode(to.as_slice())))
        }
        _ => None,
    });
    dedup_in_order(targets)
}

#[async_trait]
impl Discovery for BlockScanDiscovery {
    async fn discover(&self) -> AppResult<Vec<String>> {
        let latest = self
            .source
            .latest_block()
            .await
            .map_err(|e| e.recode(ErrorCode::DiscoveryFailed))?;

        let (from, to) = match scan_range(self.last_scanned(), latest, self.max_blocks) {
            Some(range) => range,
            None => {
                debug!("⛓️ No new blocks since {}", latest);
                return Ok(Vec::new());
            }
        };
        if let Some(last) = self.last_scanned() {
            let skipped = from.saturating_sub(last + 1);
            if skipped > 0 {
                warn!("⚠️ Block scan fell behind, skipping {} blocks before {}", skipped, from);
            }
        }

        let mut targets = Vec::new();
        for number in from..=to {
            let found = self
                .source
                .transfer_targets_in(number)
                .await
                .map_err(|e| e.recode(ErrorCode::DiscoveryFailed))?;
            targets.extend(found);
        }

        self.set_last_scanned(to);
        let targets = dedup_in_order(targets);
        info!("⛓️ Scanned blocks {}..={}: {} token contracts", from, to, targets.len());
        Ok(targets)
    }

    fn name(&self) -> &'static str {
        "block-scan"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::errors::AppError;
    use std::collections::HashMap;
    use std::str::FromStr;
    use std::sync::Arc;

    const TOKEN_A: &str = "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82";
    const TOKEN_B: &str = "0x55d398326f99059ff775485246999027b3197955";

    fn transfer_input() -> Vec<u8> {
        let mut input = vec![0xa9, 0x05, 0x9c, 0xbb];
        input.extend_from_slice(&[0u8; 64]);
        input
    }

    #[test]
    fn test_transfer_targets_filters_and_dedups() {
        let a = Address::from_str(TOKEN_A).unwrap();
        let b = Address::from_str(TOKEN_B).unwrap();
        let transfer = transfer_input();
        let approve = vec![0x09, 0x5e, 0xa7, 0xb3];

        let txs: Vec<(Option<Address>, &[u8])> = vec![
            (Some(a), transfer.as_slice()),
            (Some(b), approve.as_slice()),
            (None, transfer.as_slice()), // contract creation
            (Some(a), transfer.as_slice()),
            (Some(b), &[][..]), // plain value transfer
        ];
        assert_eq!(transfer_targets(txs), vec![TOKEN_A.to_string()]);
    }

    #[test]
    fn test_listed_addresses() {
        let raw = [
            "0x0E09FABB73BD3ADE0A17ECC321FD13A19E81CE82",
            "garbage",
            TOKEN_A,
            TOKEN_B,
        ];
        assert_eq!(
            listed_addresses(raw),
            vec![TOKEN_A.to_string(), TOKEN_B.to_string()]
        );
    }

    #[test]
    fn test_scan_range_first_scan_is_latest_only() {
        assert_eq!(scan_range(None, 100, 20), Some((100, 100)));
    }

    #[test]
    fn test_scan_range_covers_gap() {
        assert_eq!(scan_range(Some(95), 100, 20), Some((96, 100)));
    }

    #[test]
    fn test_scan_range_caps_backlog() {
        assert_eq!(scan_range(Some(10), 100, 20), Some((81, 100)));
    }

    #[test]
    fn test_scan_range_nothing_new() {
        assert_eq!(scan_range(Some(100), 100, 20), None);
        assert_eq!(scan_range(Some(101), 100, 20), None);
    }

    /// Scripted chain: head height, per-block targets, failing blocks
    #[derive(Default)]
    struct ScriptedBlocks {
        latest: Mutex<u64>,
        targets: HashMap<u64, Vec<String>>,
        failing: HashSet<u64>,
        fetched: Mutex<Vec<u64>>,
    }

    impl ScriptedBlocks {
        fn at(latest: u64) -> Self {
            Self {
                latest: Mutex::new(latest),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl BlockSource for Arc<ScriptedBlocks> {
        async fn latest_block(&self) -> AppResult<u64> {
            Ok(*self.latest.lock().unwrap())
        }

        async fn transfer_targets_in(&self, number: u64) -> AppResult<Vec<String>> {
            self.fetched.lock().unwrap().push(number);
            if self.failing.contains(&number) {
                return Err(AppError::fetch_network(format!("block {} unavailable", number)));
            }
            Ok(self.targets.get(&number).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_first_scan_reads_latest_block_only() {
        let mut blocks = ScriptedBlocks::at(100);
        blocks.targets.insert(100, vec![TOKEN_A.to_string()]);
        let blocks = Arc::new(blocks);
        let discovery = BlockScanDiscovery::new(blocks.clone(), 20);

        assert_eq!(discovery.discover().await.unwrap(), vec![TOKEN_A.to_string()]);
        assert_eq!(*blocks.fetched.lock().unwrap(), vec![100]);
        assert_eq!(discovery.last_scanned(), Some(100));
    }

    #[tokio::test]
    async fn test_scan_covers_every_block_since_mark() {
        let mut blocks = ScriptedBlocks::at(100);
        blocks.targets.insert(101, vec![TOKEN_A.to_string()]);
        blocks.targets.insert(103, vec![TOKEN_B.to_string(), TOKEN_A.to_string()]);
        let blocks = Arc::new(blocks);
        let discovery = BlockScanDiscovery::new(blocks.clone(), 20);
        discovery.discover().await.unwrap();

        *blocks.latest.lock().unwrap() = 103;
        let found = discovery.discover().await.unwrap();

        assert_eq!(found, vec![TOKEN_A.to_string(), TOKEN_B.to_string()]);
        assert_eq!(*blocks.fetched.lock().unwrap(), vec![100, 101, 102, 103]);
        assert_eq!(discovery.last_scanned(), Some(103));
    }

    #[tokio::test]
    async fn test_failed_block_keeps_mark() {
        let mut blocks = ScriptedBlocks::at(95);
        blocks.failing.insert(98);
        let blocks = Arc::new(blocks);
        let discovery = BlockScanDiscovery::new(blocks.clone(), 20);
        discovery.discover().await.unwrap();
        assert_eq!(discovery.last_scanned(), Some(95));

        *blocks.latest.lock().unwrap() = 100;
        let err = discovery.discover().await.unwrap_err();

        assert_eq!(err.code, ErrorCode::DiscoveryFailed);
        assert_eq!(discovery.last_scanned(), Some(95));
        // 99 and 100 never reached
        assert_eq!(*blocks.fetched.lock().unwrap(), vec![95, 96, 97, 98]);
    }

    #[tokio::test]
    async fn test_backlog_beyond_cap_is_skipped() {
        let blocks = Arc::new(ScriptedBlocks::at(10));
        let discovery = BlockScanDiscovery::new(blocks.clone(), 5);
        discovery.discover().await.unwrap();

        *blocks.latest.lock().unwrap() = 100;
        discovery.discover().await.unwrap();

        assert_eq!(*blocks.fetched.lock().unwrap(), vec![10, 96, 97, 98, 99, 100]);
        assert_eq!(discovery.last_scanned(), Some(100));
    }

    #[tokio::test]
    async fn test_no_new_blocks() {
        let blocks = Arc::new(ScriptedBlocks::at(50));
        let discovery = BlockScanDiscovery::new(blocks.clone(), 5);
        discovery.discover().await.unwrap();

        assert!(discovery.discover().await.unwrap().is_empty());
        assert_eq!(*blocks.fetched.lock().unwrap(), vec![50]);
    }

    #[tokio::test]
    async fn test_head_failure_is_discovery_failure() {
        struct DeadNode;

        #[async_trait]
        impl BlockSource for DeadNode {
            async fn latest_block(&self) -> AppResult<u64> {
                Err(AppError::fetch_timeout("eth_blockNumber"))
            }

            async fn transfer_targets_in(&self, _number: u64) -> AppResult<Vec<String>> {
                unreachable!()
            }
        }

        let discovery = BlockScanDiscovery::new(DeadNode, 5);
        let err = discovery.discover().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DiscoveryFailed);
        assert_eq!(discovery.last_scanned(), None);
    }
}
