//! Type definitions for Token Pulse
//! Core data structures shared by the registry, evaluator and scheduler

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Last observation of one token contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Lowercase `0x` address, unique key
    pub contract_address: String,
    /// Holder count or total supply, whichever the deployment tracks
    pub last_count: U256,
    pub updated_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(contract_address: impl Into<String>, last_count: U256) -> Self {
        Self {
            contract_address: contract_address.into(),
            last_count,
            updated_at: Utc::now(),
        }
    }
}

/// Outcome of comparing two consecutive counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    /// `(current - previous) / previous * 100`; None when previous is zero
    pub percent_change: Option<f64>,
    pub should_signal: bool,
}

/// Growth signal for one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub contract_address: String,
    pub previous: U256,
    pub current: U256,
    /// None means growth from zero
    pub percent_change: Option<f64>,
    pub observed_at: DateTime<Utc>,
}

impl Signal {
    pub fn summary(&self) -> String {
        match self.percent_change {
            Some(pct) => format!(
                "Signal triggered: {} count increased by {:.2}% ({} → {})",
                self.contract_address, pct, self.previous, self.current
            ),
            None => format!(
                "Signal triggered: {} count grew from zero to {}",
                self.contract_address, self.current
            ),
        }
    }
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,
    /// Processing a cycle
    Running,
}

/// What happened during one cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Addresses returned by discovery
    pub discovered: usize,
    /// New records created (first observation, no signal)
    pub seeded: usize,
    /// Existing records updated
    pub updated: usize,
    pub signals: Vec<Signal>,
    pub fetch_failures: usize,
    pub store_failures: usize,
    /// Addresses left for the next tick because the limiter ran dry
    pub rate_limited: usize,
    /// Cycle-level failure that ended the cycle early
    pub error: Option<String>,
    pub duration: Duration,
}

impl CycleReport {
    /// Addresses that made it all the way to the registry
    pub fn processed(&self) -> usize {
        self.seeded + self.updated
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn summary(&self) -> String {
        format!(
            "Discovered: {} | Seeded: {} | Updated: {} | Signals: {} | Fetch errors: {} | Store errors: {} | Rate limited: {} | {}ms",
            self.discovered,
            self.seeded,
            self.updated,
            self.signals.len(),
            self.fetch_failures,
            self.store_failures,
            self.rate_limited,
            self.duration.as_millis()
        )
    }
}

/// Lifetime totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PulseStats {
    pub cycles_run: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub tokens_seeded: u64,
    pub tokens_updated: u64,
    pub signals: u64,
    pub fetch_failures: u64,
}
