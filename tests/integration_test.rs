//! Integration tests for Token Pulse
//!
//! The scheduler runs against scripted discovery/fetch sources and the
//! in-memory registry, so no network is involved.

use alloy_primitives::U256;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use token_pulse::{
    AppError, AppResult, CountFetcher, Discovery, MemoryRegistry, PollScheduler, PulseConfig,
    RateLimitConfig, SchedulerState, Signal, SignalHandler, StoreBackend, TokenBucket,
    TokenRecord, TokenRegistry,
};
use tokio::sync::watch;

const TOKEN_A: &str = "0x0e09fabb73bd3ade0a17ecc321fd13a19e81ce82";
const TOKEN_B: &str = "0x55d398326f99059ff775485246999027b3197955";

struct ScriptedDiscovery {
    addresses: Vec<String>,
    delay: Duration,
    fail: bool,
}

impl ScriptedDiscovery {
    fn of(addresses: &[&str]) -> Self {
        Self {
            addresses: addresses.iter().map(|a| a.to_string()).collect(),
            delay: Duration::ZERO,
            fail: false,
        }
    }
}

#[async_trait]
impl Discovery for ScriptedDiscovery {
    async fn discover(&self) -> AppResult<Vec<String>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AppError::discovery_failed("listing endpoint returned 502"));
        }
        Ok(self.addresses.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[derive(Default)]
struct ScriptedFetcher {
    counts: Mutex<HashMap<String, u64>>,
    failing: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
}

impl ScriptedFetcher {
    fn set(&self, address: &str, count: u64) {
        self.counts.lock().unwrap().insert(address.to_string(), count);
    }

    fn fail(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    fn hang(&self, address: &str) {
        self.hanging.lock().unwrap().insert(address.to_string());
    }
}

#[async_trait]
impl CountFetcher for ScriptedFetcher {
    async fn fetch_count(&self, address: &str) -> AppResult<U256> {
        let hangs = self.hanging.lock().unwrap().contains(address);
        if hangs {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        let fails = self.failing.lock().unwrap().contains(address);
        if fails {
            return Err(AppError::fetch_network("connection reset"));
        }
        let count = self.counts.lock().unwrap().get(address).copied();
        count
            .map(U256::from)
            .ok_or_else(|| AppError::no_contract(address))
    }

    fn describe(&self) -> &'static str {
        "holders"
    }
}

#[derive(Default)]
struct RecordingHandler {
    seen: Mutex<Vec<Signal>>,
}

impl SignalHandler for RecordingHandler {
    fn on_signal(&self, signal: &Signal) {
        self.seen.lock().unwrap().push(signal.clone());
    }
}

/// Registry whose backend is gone
struct DownRegistry;

#[async_trait]
impl TokenRegistry for DownRegistry {
    async fn find(&self, _address: &str) -> AppResult<Option<TokenRecord>> {
        Err(AppError::store_unavailable("connection refused"))
    }

    async fn upsert(&self, _address: &str, _count: U256) -> AppResult<()> {
        Err(AppError::store_unavailable("connection refused"))
    }

    async fn len(&self) -> AppResult<usize> {
        Err(AppError::store_unavailable("connection refused"))
    }
}

fn test_config() -> PulseConfig {
    PulseConfig {
        store: StoreBackend::Memory,
        poll_interval: Duration::from_millis(20),
        rate_limit_per_sec: None,
        call_timeout: Duration::from_secs(1),
        ..PulseConfig::default()
    }
}

struct Harness {
    scheduler: PollScheduler,
    fetcher: Arc<ScriptedFetcher>,
    registry: MemoryRegistry,
    handler: Arc<RecordingHandler>,
}

fn harness(discovery: ScriptedDiscovery) -> Harness {
    let fetcher = Arc::new(ScriptedFetcher::default());
    let registry = MemoryRegistry::new();
    let handler = Arc::new(RecordingHandler::default());
    let scheduler = PollScheduler::new(
        &test_config(),
        Arc::new(discovery),
        fetcher.clone(),
        Arc::new(registry.clone()),
    )
    .with_signal_handler(handler.clone());
    Harness {
        scheduler,
        fetcher,
        registry,
        handler,
    }
}

async fn stored(registry: &MemoryRegistry, address: &str) -> Option<U256> {
    registry.find(address).await.unwrap().map(|r| r.last_count)
}

#[tokio::test]
async fn test_first_observation_seeds_without_signal() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.fetcher.set(TOKEN_A, 1000);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.seeded, 1);
    assert!(report.signals.is_empty());
    assert_eq!(stored(&h.registry, TOKEN_A).await, Some(U256::from(1000u64)));
    assert!(h.handler.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_growth_past_threshold_signals() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.registry.upsert(TOKEN_A, U256::from(100u64)).await.unwrap();
    h.fetcher.set(TOKEN_A, 106);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.updated, 1);
    assert_eq!(report.signals.len(), 1);
    let signal = &report.signals[0];
    assert_eq!(signal.contract_address, TOKEN_A);
    assert_eq!(signal.percent_change, Some(6.0));
    assert_eq!(stored(&h.registry, TOKEN_A).await, Some(U256::from(106u64)));
    assert_eq!(h.handler.seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_growth_below_threshold_updates_quietly() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.registry.upsert(TOKEN_A, U256::from(100u64)).await.unwrap();
    h.fetcher.set(TOKEN_A, 104);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.updated, 1);
    assert!(report.signals.is_empty());
    assert_eq!(stored(&h.registry, TOKEN_A).await, Some(U256::from(104u64)));
}

#[tokio::test]
async fn test_comparison_is_against_previous_cycle() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.fetcher.set(TOKEN_A, 100);
    h.scheduler.run_cycle().await.unwrap();

    // +4% then +4% again: never 5% over the immediately preceding value
    h.fetcher.set(TOKEN_A, 104);
    assert!(h.scheduler.run_cycle().await.unwrap().signals.is_empty());
    h.fetcher.set(TOKEN_A, 108);
    assert!(h.scheduler.run_cycle().await.unwrap().signals.is_empty());

    h.fetcher.set(TOKEN_A, 120);
    assert_eq!(h.scheduler.run_cycle().await.unwrap().signals.len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A, TOKEN_B]));
    h.registry.upsert(TOKEN_A, U256::from(100u64)).await.unwrap();
    h.fetcher.fail(TOKEN_A);
    h.fetcher.set(TOKEN_B, 500);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert!(!report.failed());
    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.seeded, 1);
    // A keeps its previous count
    assert_eq!(stored(&h.registry, TOKEN_A).await, Some(U256::from(100u64)));
    assert_eq!(stored(&h.registry, TOKEN_B).await, Some(U256::from(500u64)));
}

#[tokio::test(start_paused = true)]
async fn test_hung_fetch_times_out_and_cycle_continues() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A, TOKEN_B]));
    h.fetcher.hang(TOKEN_A);
    h.fetcher.set(TOKEN_B, 42);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert_eq!(report.fetch_failures, 1);
    assert_eq!(stored(&h.registry, TOKEN_A).await, None);
    assert_eq!(stored(&h.registry, TOKEN_B).await, Some(U256::from(42u64)));
}

#[tokio::test]
async fn test_empty_rate_limiter_skips_addresses() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A, TOKEN_B]));
    let scheduler = h.scheduler.with_rate_limiter(Some(TokenBucket::new(RateLimitConfig {
        capacity: 0,
        refill_amount: 0,
        refill_every: Duration::from_secs(60),
    })));
    h.fetcher.set(TOKEN_A, 10);
    h.fetcher.set(TOKEN_B, 20);

    let report = scheduler.run_cycle().await.unwrap();

    assert!(!report.failed());
    assert_eq!(report.discovered, 2);
    assert_eq!(report.rate_limited, 2);
    assert_eq!(report.processed(), 0);
    assert_eq!(h.registry.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_rate_limiter_budget_is_per_cycle_burst() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A, TOKEN_B]));
    let scheduler = h.scheduler.with_rate_limiter(Some(TokenBucket::new(RateLimitConfig {
        capacity: 1,
        refill_amount: 1,
        refill_every: Duration::from_secs(3600),
    })));
    h.fetcher.set(TOKEN_A, 10);
    h.fetcher.set(TOKEN_B, 20);

    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(report.seeded, 1);
    assert_eq!(report.rate_limited, 1);
    assert_eq!(stored(&h.registry, TOKEN_B).await, None);
}

#[tokio::test]
async fn test_discovery_failure_fails_cycle() {
    let mut discovery = ScriptedDiscovery::of(&[TOKEN_A]);
    discovery.fail = true;
    let h = harness(discovery);
    h.fetcher.set(TOKEN_A, 10);

    let report = h.scheduler.run_cycle().await.unwrap();

    assert!(report.failed());
    assert!(report.error.as_deref().unwrap().contains("DISCOVERY_FAILED"));
    assert_eq!(report.processed(), 0);
    assert_eq!(h.scheduler.stats().cycles_failed, 1);
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_unavailable_store_aborts_cycle() {
    let fetcher = Arc::new(ScriptedFetcher::default());
    fetcher.set(TOKEN_A, 10);
    let scheduler = PollScheduler::new(
        &test_config(),
        Arc::new(ScriptedDiscovery::of(&[TOKEN_A, TOKEN_B])),
        fetcher,
        Arc::new(DownRegistry),
    );

    let report = scheduler.run_cycle().await.unwrap();

    assert!(report.failed());
    assert!(report.error.as_deref().unwrap().contains("STORE_UNAVAILABLE"));
    assert_eq!(report.store_failures, 0);
}

#[tokio::test]
async fn test_overlapping_cycle_is_skipped() {
    let mut discovery = ScriptedDiscovery::of(&[TOKEN_A]);
    discovery.delay = Duration::from_millis(100);
    let h = harness(discovery);
    h.fetcher.set(TOKEN_A, 10);

    let (first, second) = tokio::join!(h.scheduler.run_cycle(), h.scheduler.run_cycle());

    assert!(first.is_some());
    assert!(second.is_none());
    assert_eq!(h.scheduler.stats().cycles_skipped, 1);
    assert_eq!(h.scheduler.state(), SchedulerState::Idle);
}

#[tokio::test]
async fn test_duplicate_addresses_keep_one_record() {
    let upper = TOKEN_A.to_uppercase().replacen("0X", "0x", 1);
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.registry.upsert(&upper, U256::from(7u64)).await.unwrap();
    h.registry.upsert(TOKEN_A, U256::from(7u64)).await.unwrap();

    assert_eq!(h.registry.len().await.unwrap(), 1);
    assert_eq!(h.registry.records()[0].contract_address, TOKEN_A);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness(ScriptedDiscovery::of(&[TOKEN_A]));
    h.fetcher.set(TOKEN_A, 10);
    let scheduler = Arc::new(h.scheduler);

    let (tx, rx) = watch::channel(false);
    let runner = {
        let scheduler = scheduler.clone();
        tokio::spawn(async move { scheduler.run(rx).await })
    };

    tokio::time::sleep(Duration::from_millis(70)).await;
    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("scheduler did not stop")
        .unwrap();

    let stats = scheduler.stats();
    assert!(stats.cycles_run >= 1);
    assert_eq!(stats.tokens_seeded, 1);
    assert_eq!(scheduler.state(), SchedulerState::Idle);
}
