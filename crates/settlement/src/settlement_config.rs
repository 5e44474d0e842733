use crate::domain::{LedgerSettlement, SettlementMode};
use crate::evm::{JsonRpcLedgerClient, TransactionSigner};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Ledger settings as read from configuration
#[derive(Debug, Clone, Default)]
pub struct SettlementConfig {
    pub rpc_url: Option<String>,
    pub owner_private_key: Option<String>,
    pub contract_address: Option<String>,
    /// Whole tokens paid per persisted event
    pub reward_per_message: u64,
    pub token_decimals: u32,
    /// Bound for each ledger call; must be positive when settlement is enabled
    pub call_timeout_secs: u64,
}

struct LedgerCredentials<'a> {
    rpc_url: &'a str,
    owner_private_key: &'a str,
    contract_address: &'a str,
}

impl SettlementConfig {
    fn credentials(&self) -> Option<LedgerCredentials<'_>> {
        Some(LedgerCredentials {
            rpc_url: non_blank(&self.rpc_url)?,
            owner_private_key: non_blank(&self.owner_private_key)?,
            contract_address: non_blank(&self.contract_address)?,
        })
    }

    /// Reward per event in smallest token units
    pub fn reward_amount(&self) -> Result<u128> {
        10u128
            .checked_pow(self.token_decimals)
            .and_then(|scale| scale.checked_mul(u128::from(self.reward_per_message)))
            .with_context(|| {
                format!(
                    "reward of {} tokens with {} decimals overflows",
                    self.reward_per_message, self.token_decimals
                )
            })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Decide the settlement mode for this process
///
/// Missing endpoint, key or contract is not an error: the process runs in
/// demo mode. Values that are present but unusable are.
pub fn build_settlement_mode(config: &SettlementConfig) -> Result<SettlementMode> {
    let Some(credentials) = config.credentials() else {
        warn!("ledger endpoint, owner key or contract address missing, running in demo mode");
        return Ok(SettlementMode::Disabled);
    };

    if config.call_timeout_secs == 0 {
        anyhow::bail!("ledger call timeout must be at least one second");
    }

    let reward_amount = config.reward_amount()?;
    let call_timeout = Duration::from_secs(config.call_timeout_secs);

    let signer = TransactionSigner::from_hex(credentials.owner_private_key)
        .context("invalid ledger owner private key")?;
    let owner_address = signer.address().to_string();

    let client = JsonRpcLedgerClient::new(
        credentials.rpc_url,
        credentials.contract_address,
        signer,
        call_timeout,
    )
    .context("failed to create ledger client")?;

    info!(
        rpc_url = %credentials.rpc_url,
        contract = %client.contract_address(),
        owner = %owner_address,
        reward_amount = %reward_amount,
        "ledger settlement enabled"
    );

    Ok(SettlementMode::Enabled(LedgerSettlement {
        client: Arc::new(client),
        owner_address,
        reward_amount,
        token_decimals: config.token_decimals,
        call_timeout,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> SettlementConfig {
        SettlementConfig {
            rpc_url: Some("http://127.0.0.1:8545".to_string()),
            owner_private_key: Some(
                "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318".to_string(),
            ),
            contract_address: Some("0x00000000000000000000000000000000000000c0".to_string()),
            reward_per_message: 1,
            token_decimals: 18,
            call_timeout_secs: 15,
        }
    }

    #[test]
    fn test_missing_any_credential_is_demo_mode() {
        let cases = [
            SettlementConfig {
                rpc_url: None,
                ..complete()
            },
            SettlementConfig {
                owner_private_key: Some("   ".to_string()),
                ..complete()
            },
            SettlementConfig {
                contract_address: Some(String::new()),
                ..complete()
            },
        ];

        for config in cases {
            let mode = build_settlement_mode(&config).unwrap();
            assert!(!mode.is_enabled());
        }
    }

    #[test]
    fn test_complete_credentials_enable_settlement() {
        let mode = build_settlement_mode(&complete()).unwrap();

        match mode {
            SettlementMode::Enabled(ledger) => {
                assert_eq!(
                    ledger.owner_address,
                    "0x2c7536e3605d9c16a7a3d7b1898e529396a65c23"
                );
                assert_eq!(ledger.reward_amount, 1_000_000_000_000_000_000);
                assert_eq!(ledger.token_decimals, 18);
                assert_eq!(ledger.call_timeout, Duration::from_secs(15));
            }
            SettlementMode::Disabled => panic!("expected settlement to be enabled"),
        }
    }

    #[test]
    fn test_unusable_key_is_startup_error() {
        let config = SettlementConfig {
            owner_private_key: Some("0xdeadbeef".to_string()),
            ..complete()
        };

        assert!(build_settlement_mode(&config).is_err());
    }

    #[test]
    fn test_zero_call_timeout_is_startup_error() {
        let config = SettlementConfig {
            call_timeout_secs: 0,
            ..complete()
        };

        let error = build_settlement_mode(&config).unwrap_err();

        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_zero_call_timeout_is_ignored_in_demo_mode() {
        let config = SettlementConfig {
            rpc_url: None,
            call_timeout_secs: 0,
            ..complete()
        };

        let mode = build_settlement_mode(&config).unwrap();

        assert!(!mode.is_enabled());
    }

    #[test]
    fn test_reward_amount_scaling() {
        let config = SettlementConfig {
            reward_per_message: 3,
            token_decimals: 6,
            ..complete()
        };
        assert_eq!(config.reward_amount().unwrap(), 3_000_000);

        let overflow = SettlementConfig {
            reward_per_message: u64::MAX,
            token_decimals: 38,
            ..complete()
        };
        assert!(overflow.reward_amount().is_err());
    }
}
