pub mod domain;
pub mod evm;
mod settlement_config;

pub use domain::*;
pub use settlement_config::*;

#[cfg(any(test, feature = "testing"))]
pub use domain::MockLedgerClient;
