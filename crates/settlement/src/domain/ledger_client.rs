use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("ledger node rejected {method}: {message} (code {code})")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },

    #[error("ledger transport error: {0}")]
    Transport(String),

    #[error("unexpected ledger response: {0}")]
    InvalidResponse(String),

    #[error("ledger call timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("token contract unavailable: {0}")]
    ContractUnavailable(String),
}

/// A transfer of `amount` smallest token units from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: u128,
}

/// Trait for the external token ledger
///
/// Implementations talk to a live node; every method may fail for
/// transport or node-side reasons. Policies for those failures belong to
/// the caller, not to the client.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Estimate the cost, in gas units, of executing `request`
    async fn estimate_transfer_cost(&self, request: &TransferRequest) -> LedgerResult<u64>;

    /// Submit `request` with an upper bound of `gas_limit` and return the transaction id
    async fn submit_transfer(&self, request: &TransferRequest, gas_limit: u64)
    -> LedgerResult<String>;

    /// Balance of `address` in smallest token units
    async fn balance_of(&self, address: &str) -> LedgerResult<u128>;

    /// Verify the token contract is usable before a batch of reads
    async fn ensure_contract(&self) -> LedgerResult<()>;
}
