//! EVM JSON-RPC adapter for an ERC-20 style reward token
//!
//! Transactions are built and signed locally (legacy format with EIP-155
//! replay protection) and pushed with `eth_sendRawTransaction`, so the node
//! never needs to hold the owner key.

mod abi;
mod json_rpc_ledger_client;
mod nonce_manager;
mod signer;

pub use abi::{format_address, parse_address};
pub use json_rpc_ledger_client::*;
pub use signer::*;
