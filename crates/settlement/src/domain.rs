mod ledger_client;
mod settlement_mode;
mod settlement_service;
mod wallet_directory;

pub use ledger_client::*;
pub use settlement_mode::*;
pub use settlement_service::*;
pub use wallet_directory::*;
