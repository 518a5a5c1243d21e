//! Utils Module - Helper Functions & Shared Utilities

pub mod constants;
pub mod decoder;
pub mod rate_limit;

pub use constants::*;
pub use decoder::*;
pub use rate_limit::*;
