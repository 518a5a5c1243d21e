//! Poll Scheduler
//! Drives discover -> (lookup -> fetch -> evaluate -> persist) on a timer
//!
//! Cycles never overlap. A tick that comes due while a cycle is still
//! running is dropped (`MissedTickBehavior::Skip`), and a direct
//! `run_cycle` call during a running cycle returns `None`. Addresses
//! inside a cycle are handled one at a time.

use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::discovery::Discovery;
use super::evaluator::SignalEvaluator;
use super::fetcher::CountFetcher;
use crate::models::config::PulseConfig;
use crate::models::errors::{AppError, AppResult, ErrorCode, ErrorKind};
use crate::models::types::{CycleReport, PulseStats, SchedulerState, Signal};
use crate::store::TokenRegistry;
use crate::utils::rate_limit::{RateLimitConfig, TokenBucket};

/// Receives growth signals. Buying would hook in here.
pub trait SignalHandler: Send + Sync {
    fn on_signal(&self, signal: &Signal);
}

/// Default handler: one log line per signal
pub struct LogSignalHandler;

impl SignalHandler for LogSignalHandler {
    fn on_signal(&self, signal: &Signal) {
        info!("🚀 {}", signal.summary());
    }
}

/// Per-address result
enum AddressOutcome {
    Seeded,
    Updated(Option<Signal>),
}

/// Thread-safe statistics
#[derive(Default)]
struct SchedulerStats {
    cycles_run: AtomicU64,
    cycles_skipped: AtomicU64,
    cycles_failed: AtomicU64,
    tokens_seeded: AtomicU64,
    tokens_updated: AtomicU64,
    signals: AtomicU64,
    fetch_failures: AtomicU64,
}

/// Clears the running flag however the cycle ends
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollScheduler {
    discovery: Arc<dyn Discovery>,
    fetcher: Arc<dyn CountFetcher>,
    registry: Arc<dyn TokenRegistry>,
    evaluator: SignalEvaluator,
    limiter: Option<TokenBucket>,
    handler: Arc<dyn SignalHandler>,
    poll_interval: Duration,
    call_timeout: Duration,
    discovery_timeout: Duration,
    running: AtomicBool,
    stats: SchedulerStats,
}

impl PollScheduler {
    pub fn new(
        config: &PulseConfig,
        discovery: Arc<dyn Discovery>,
        fetcher: Arc<dyn CountFetcher>,
        registry: Arc<dyn TokenRegistry>,
    ) -> Self {
        // block scans issue one call per block plus the head lookup
        let discovery_calls = config.max_blocks_per_scan.saturating_add(1).min(u32::MAX as u64) as u32;
        Self {
            discovery,
            fetcher,
            registry,
            evaluator: SignalEvaluator::new(config.threshold_bps),
            limiter: config
                .rate_limit_per_sec
                .map(|n| TokenBucket::new(RateLimitConfig::per_second(n))),
            handler: Arc::new(LogSignalHandler),
            poll_interval: config.poll_interval,
            call_timeout: config.call_timeout,
            discovery_timeout: config.call_timeout.saturating_mul(discovery_calls),
            running: AtomicBool::new(false),
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_signal_handler(mut self, handler: Arc<dyn SignalHandler>) -> Self {
        self.handler = handler;
        self
    }

    /// Replace (or remove) the limiter built from the config
    pub fn with_rate_limiter(mut self, limiter: Option<TokenBucket>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped).
    /// A cycle in flight when shutdown arrives runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "🚀 Polling every {:?} ({} discovery, {} counts, threshold {} bps)",
            self.poll_interval,
            self.discovery.name(),
            self.fetcher.describe(),
            self.evaluator.threshold_bps()
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("🛑 Scheduler stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Run one cycle now. `None` if another cycle is still running.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.stats.cycles_skipped.fetch_add(1, Ordering::Relaxed);
            warn!("⏭️ Previous cycle still running, skipping tick");
            return None;
        }
        let _guard = RunningGuard(&self.running);

        let start = Instant::now();
        let mut report = CycleReport::default();

        if let Err(e) = self.execute_cycle(&mut report).await {
            error!("❌ Cycle aborted: {}", e);
            report.error = Some(e.to_string());
            self.stats.cycles_failed.fetch_add(1, Ordering::Relaxed);
        }
        report.duration = start.elapsed();

        self.stats.cycles_run.fetch_add(1, Ordering::Relaxed);
        self.stats.tokens_seeded.fetch_add(report.seeded as u64, Ordering::Relaxed);
        self.stats.tokens_updated.fetch_add(report.updated as u64, Ordering::Relaxed);
        self.stats.signals.fetch_add(report.signals.len() as u64, Ordering::Relaxed);
        self.stats.fetch_failures.fetch_add(report.fetch_failures as u64, Ordering::Relaxed);

        info!("📊 Cycle | {}", report.summary());
        Some(report)
    }

    async fn execute_cycle(&self, report: &mut CycleReport) -> AppResult<()> {
        let addresses = timed(
            self.discovery_timeout,
            ErrorCode::DiscoveryTimeout,
            "discovery",
            self.discovery.discover(),
        )
        .await?;
        report.discovered = addresses.len();

        for (idx, address) in addresses.iter().enumerate() {
            if let Some(ref limiter) = self.limiter {
                if !limiter.try_acquire() {
                    report.rate_limited = addresses.len() - idx;
                    info!("🚦 Rate limit reached, {} addresses left for next tick", report.rate_limited);
                    break;
                }
            }

            match self.process_address(address).await {
                Ok(AddressOutcome::Seeded) => report.seeded += 1,
                Ok(AddressOutcome::Updated(signal)) => {
                    report.updated += 1;
                    if let Some(signal) = signal {
                        self.handler.on_signal(&signal);
                        report.signals.push(signal);
                    }
                }
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => {
                    if e.kind() == ErrorKind::Fetch {
                        report.fetch_failures += 1;
                    } else {
                        report.store_failures += 1;
                    }
                    warn!("⚠️ Skipping {} this tick: {}", address, e);
                }
            }
        }

        Ok(())
    }

    /// lookup -> fetch -> evaluate -> persist for one address.
    /// The signal is only returned once the new count is stored, so a
    /// failed write cannot fire the same signal twice.
    async fn process_address(&self, address: &str) -> AppResult<AddressOutcome> {
        let existing = timed(
            self.call_timeout,
            ErrorCode::StoreUnavailable,
            "registry lookup",
            self.registry.find(address),
        )
        .await?;

        let current = timed(
            self.call_timeout,
            ErrorCode::FetchTimeout,
            "count fetch",
            self.fetcher.fetch_count(address),
        )
        .await?;

        let outcome = match existing {
            None => {
                debug!("🆕 {} seeded with {} {}", address, current, self.fetcher.describe());
                AddressOutcome::Seeded
            }
            Some(record) => {
                let eval = self.evaluator.evaluate(record.last_count, current);
                debug!(
                    "🔎 {} {} → {} ({:?}%)",
                    address, record.last_count, current, eval.percent_change
                );
                let signal = eval.should_signal.then(|| Signal {
                    contract_address: address.to_string(),
                    previous: record.last_count,
                    current,
                    percent_change: eval.percent_change,
                    observed_at: Utc::now(),
                });
                AddressOutcome::Updated(signal)
            }
        };

        timed(
            self.call_timeout,
            ErrorCode::StoreOpFailed,
            "registry upsert",
            self.registry.upsert(address, current),
        )
        .await?;

        Ok(outcome)
    }

    /// Get current statistics
    pub fn stats(&self) -> PulseStats {
        PulseStats {
            cycles_run: self.stats.cycles_run.load(Ordering::Relaxed),
            cycles_skipped: self.stats.cycles_skipped.load(Ordering::Relaxed),
            cycles_failed: self.stats.cycles_failed.load(Ordering::Relaxed),
            tokens_seeded: self.stats.tokens_seeded.load(Ordering::Relaxed),
            tokens_updated: self.stats.tokens_updated.load(Ordering::Relaxed),
            signals: self.stats.signals.load(Ordering::Relaxed),
            fetch_failures: self.stats.fetch_failures.load(Ordering::Relaxed),
        }
    }
}

/// Bound a call; on expiry report `code`
async fn timed<T, F>(limit: Duration, code: ErrorCode, what: &str, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::new(
            code,
            format!("{} timed out after {:?}", what, limit),
        )),
    }
}
