//! Core Module - Polling Pipeline
//!
//! Discovery, count fetching, growth evaluation and the scheduler that
//! ties them together.

pub mod discovery;
pub mod evaluator;
pub mod fetcher;
pub mod scheduler;

pub use discovery::*;
pub use evaluator::*;
pub use fetcher::*;
pub use scheduler::*;
