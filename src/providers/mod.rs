//! Providers Module - External Data Sources
//!
//! Block explorer REST API and node JSON-RPC.

pub mod explorer;
pub mod rpc;

pub use explorer::*;
pub use rpc::*;
