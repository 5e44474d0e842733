use crate::domain::LedgerClient;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Everything needed to reward sensors on a live ledger
#[derive(Clone)]
pub struct LedgerSettlement {
    pub client: Arc<dyn LedgerClient>,
    /// Address that funds rewards and signs transfers
    pub owner_address: String,
    /// Reward per persisted event, in smallest token units
    pub reward_amount: u128,
    /// Scale used to report balances in whole tokens
    pub token_decimals: u32,
    /// Upper bound for each individual ledger call
    pub call_timeout: Duration,
}

impl fmt::Debug for LedgerSettlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSettlement")
            .field("owner_address", &self.owner_address)
            .field("reward_amount", &self.reward_amount)
            .field("token_decimals", &self.token_decimals)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Settlement state decided once at startup
///
/// There is no transition between the two variants at runtime. `Disabled`
/// is demo mode: no ledger call is ever made and balances read as zero.
#[derive(Debug, Clone)]
pub enum SettlementMode {
    Disabled,
    Enabled(LedgerSettlement),
}

impl SettlementMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, SettlementMode::Enabled(_))
    }
}
