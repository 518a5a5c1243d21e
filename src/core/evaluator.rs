//! Signal Evaluator
//!
//! Compares a fresh count to the stored one. The signal decision is made
//! in exact integer arithmetic:
//!
//! ```text
//! (current - previous) * 10_000 >= threshold_bps * previous
//! ```
//!
//! which is `(current - previous) / previous * 100 >= threshold%` without
//! rounding. The reported percentage is a display value only.
//!
//! When `previous` is zero the ratio is undefined. Any growth from zero
//! signals (percentage `None`); zero to zero does not.

use alloy_primitives::{U256, U512};

use crate::models::types::Evaluation;
use crate::utils::constants::{BPS_DENOMINATOR, PERCENT_SCALE};

#[derive(Debug, Clone, Copy)]
pub struct SignalEvaluator {
    threshold_bps: u64,
}

impl SignalEvaluator {
    pub fn new(threshold_bps: u64) -> Self {
        Self { threshold_bps }
    }

    pub fn threshold_bps(&self) -> u64 {
        self.threshold_bps
    }

    pub fn evaluate(&self, previous: U256, current: U256) -> Evaluation {
        if previous.is_zero() {
            return if current.is_zero() {
                Evaluation {
                    percent_change: Some(0.0),
                    should_signal: self.threshold_bps == 0,
                }
            } else {
                Evaluation {
                    percent_change: None,
                    should_signal: true,
                }
            };
        }

        if current < previous {
            let drop = previous - current;
            return Evaluation {
                percent_change: Some(-scaled_percent(drop, previous)),
                should_signal: false,
            };
        }

        let growth = current - previous;
        Evaluation {
            percent_change: Some(scaled_percent(growth, previous)),
            should_signal: self.meets_threshold(growth, previous),
        }
    }

    /// Both products are taken in 512 bits, so neither side can overflow
    fn meets_threshold(&self, growth: U256, previous: U256) -> bool {
        let lhs = U512::from(growth) * U512::from(BPS_DENOMINATOR);
        let rhs = U512::from(previous) * U512::from(self.threshold_bps);
        lhs >= rhs
    }
}

/// `delta / base * 100` as f64, via integer math at PERCENT_SCALE
fn scaled_percent(delta: U256, base: U256) -> f64 {
    let numer = U512::from(delta) * U512::from(100u64) * U512::from(PERCENT_SCALE);
    let scaled = numer / U512::from(base);
    limbs_to_f64(scaled.as_limbs()) / PERCENT_SCALE as f64
}

/// Lossy conversion for display; limbs are little-endian
fn limbs_to_f64(limbs: &[u64]) -> f64 {
    const LIMB: f64 = 18_446_744_073_709_551_616.0; // 2^64
    limbs
        .iter()
        .rev()
        .fold(0.0, |acc, &limb| acc * LIMB + limb as f64)
}
