use crate::domain::{
    LedgerError, LedgerResult, LedgerSettlement, SettlementMode, TransferRequest, WalletDirectory,
};
use common::domain::SensorRewarder;
use futures::future::join_all;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Gas units added on top of a successful estimate
pub const GAS_SAFETY_MARGIN: u64 = 5_000;

/// Gas limit used when estimation fails
pub const FALLBACK_GAS_LIMIT: u64 = 100_000;

/// Where the gas limit of a submitted transfer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasSource {
    Estimated,
    Fallback,
}

/// Result of one reward attempt
///
/// Never an error: every failure below has already been logged and mapped
/// to its fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    Disabled,
    UnmappedSensor,
    Submitted {
        transaction_id: String,
        gas_limit: u64,
        gas_source: GasSource,
    },
    SubmitFailed,
}

/// Token balance of one wallet directory entry, in whole tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub sensor_id: String,
    pub address: String,
    pub balance: Decimal,
}

/// Domain service that rewards sensors and reports their balances
///
/// Both the wallet directory and the mode are fixed at construction, so the
/// service is cheap to clone into detached settlement tasks.
#[derive(Clone)]
pub struct SettlementService {
    directory: Arc<WalletDirectory>,
    mode: Arc<SettlementMode>,
}

impl SettlementService {
    pub fn new(directory: WalletDirectory, mode: SettlementMode) -> Self {
        Self {
            directory: Arc::new(directory),
            mode: Arc::new(mode),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.mode.is_enabled()
    }

    pub fn directory(&self) -> &WalletDirectory {
        &self.directory
    }

    /// Reward `sensor_id` for one persisted event and wait for the outcome
    #[instrument(skip(self))]
    pub async fn reward_sensor(&self, sensor_id: &str) -> SettlementOutcome {
        let SettlementMode::Enabled(ledger) = self.mode.as_ref() else {
            return SettlementOutcome::Disabled;
        };

        let Some(address) = self.directory.resolve(sensor_id) else {
            debug!(sensor_id = %sensor_id, "no wallet mapped for sensor, skipping reward");
            return SettlementOutcome::UnmappedSensor;
        };

        let request = TransferRequest {
            from: ledger.owner_address.clone(),
            to: address.to_string(),
            amount: ledger.reward_amount,
        };

        // 1. Estimation is advisory; any failure falls back to the fixed ceiling
        let (gas_limit, gas_source) = match with_timeout(
            ledger.call_timeout,
            ledger.client.estimate_transfer_cost(&request),
        )
        .await
        {
            Ok(estimate) => (
                estimate.saturating_add(GAS_SAFETY_MARGIN),
                GasSource::Estimated,
            ),
            Err(e) => {
                warn!(
                    sensor_id = %sensor_id,
                    error = %e,
                    fallback_gas_limit = FALLBACK_GAS_LIMIT,
                    "gas estimation failed, using fallback limit"
                );
                (FALLBACK_GAS_LIMIT, GasSource::Fallback)
            }
        };

        // 2. Submit; failures are logged and dropped
        match with_timeout(
            ledger.call_timeout,
            ledger.client.submit_transfer(&request, gas_limit),
        )
        .await
        {
            Ok(transaction_id) => {
                info!(
                    sensor_id = %sensor_id,
                    to = %request.to,
                    amount = %request.amount,
                    gas_limit,
                    transaction_id = %transaction_id,
                    "reward transfer submitted"
                );
                SettlementOutcome::Submitted {
                    transaction_id,
                    gas_limit,
                    gas_source,
                }
            }
            Err(e) => {
                error!(
                    sensor_id = %sensor_id,
                    to = %request.to,
                    gas_limit,
                    error = %e,
                    "reward transfer failed"
                );
                SettlementOutcome::SubmitFailed
            }
        }
    }

    /// One balance row per wallet directory entry, in directory order
    ///
    /// Never fails. Demo mode, a contract that cannot be used, and
    /// individual read failures all report a zero balance.
    #[instrument(skip(self), fields(entry_count = self.directory.len()))]
    pub async fn get_balances(&self) -> Vec<BalanceRecord> {
        if self.directory.is_empty() {
            return Vec::new();
        }

        let SettlementMode::Enabled(ledger) = self.mode.as_ref() else {
            return self.zero_balances();
        };

        if let Err(e) = with_timeout(ledger.call_timeout, ledger.client.ensure_contract()).await {
            error!(error = %e, "token contract unavailable, reporting zero balances");
            return self.zero_balances();
        }

        let reads = self
            .directory
            .entries()
            .iter()
            .map(|entry| self.read_balance(ledger, &entry.sensor_id, &entry.address));

        join_all(reads).await
    }

    async fn read_balance(
        &self,
        ledger: &LedgerSettlement,
        sensor_id: &str,
        address: &str,
    ) -> BalanceRecord {
        let balance = match with_timeout(ledger.call_timeout, ledger.client.balance_of(address))
            .await
        {
            Ok(raw) => to_whole_tokens(raw, ledger.token_decimals).unwrap_or_else(|| {
                warn!(
                    sensor_id = %sensor_id,
                    raw_balance = %raw,
                    token_decimals = ledger.token_decimals,
                    "balance cannot be represented, reporting zero"
                );
                Decimal::ZERO
            }),
            Err(e) => {
                warn!(
                    sensor_id = %sensor_id,
                    address = %address,
                    error = %e,
                    "balance read failed, reporting zero"
                );
                Decimal::ZERO
            }
        };

        BalanceRecord {
            sensor_id: sensor_id.to_string(),
            address: address.to_string(),
            balance,
        }
    }

    fn zero_balances(&self) -> Vec<BalanceRecord> {
        self.directory
            .entries()
            .iter()
            .map(|entry| BalanceRecord {
                sensor_id: entry.sensor_id.clone(),
                address: entry.address.clone(),
                balance: Decimal::ZERO,
            })
            .collect()
    }
}

impl SensorRewarder for SettlementService {
    fn settle(&self, sensor_id: &str) {
        if !self.mode.is_enabled() {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(sensor_id = %sensor_id, "no async runtime available, reward dropped");
            return;
        };

        let service = self.clone();
        let sensor_id = sensor_id.to_string();
        let span = info_span!("settle_reward", sensor_id = %sensor_id);

        // Detached: nobody observes the outcome
        drop(handle.spawn(
            async move {
                service.reward_sensor(&sensor_id).await;
            }
            .instrument(span),
        ));
    }
}

async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = LedgerResult<T>>,
) -> LedgerResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| LedgerError::Timeout(limit))?
}

/// Largest mantissa a `Decimal` can hold (96 bits)
const DECIMAL_MAX_MANTISSA: u128 = (1 << 96) - 1;
const DECIMAL_MAX_SCALE: u32 = 28;

/// Scale a raw smallest-unit amount down to whole tokens
///
/// Amounts too wide for a `Decimal` lose their least significant fractional
/// digits. `None` only when the whole-token part itself does not fit.
fn to_whole_tokens(raw: u128, decimals: u32) -> Option<Decimal> {
    let mut mantissa = raw;
    let mut scale = decimals;

    while scale > 0 && (scale > DECIMAL_MAX_SCALE || mantissa > DECIMAL_MAX_MANTISSA) {
        if mantissa == 0 {
            return Some(Decimal::ZERO);
        }
        mantissa /= 10;
        scale -= 1;
    }

    let mantissa = i128::try_from(mantissa).ok()?;
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .ok()
        .map(|balance| balance.normalize())
}
