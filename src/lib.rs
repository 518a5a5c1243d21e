//! Token Pulse Library
//!
//! Polls token contracts on a fixed interval and raises a signal when a
//! token's holder count (or total supply) grows past a threshold since
//! the previous observation.
//!
//! - `core`: discovery, fetchers, evaluator, scheduler
//! - `providers`: explorer REST client, node JSON-RPC
//! - `store`: token registry (SQLite or in-memory)

pub mod core;
pub mod models;
pub mod providers;
pub mod store;
pub mod utils;

pub use crate::core::{
    BlockScanDiscovery, BlockSource, CountFetcher, Discovery, HolderCountFetcher, ListingDiscovery,
    LogSignalHandler, PollScheduler, SignalEvaluator, SignalHandler, SupplyFetcher,
};
pub use models::{
    AppError, AppResult, CountSource, CycleReport, DiscoveryMode, ErrorCode, Evaluation,
    PulseConfig, PulseStats, SchedulerState, Signal, StoreBackend, TokenRecord,
};
pub use providers::{ExplorerClient, RpcProvider};
pub use store::{MemoryRegistry, SqliteRegistry, TokenRegistry};
pub use utils::{RateLimitConfig, TokenBucket};
