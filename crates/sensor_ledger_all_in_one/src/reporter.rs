use aggregation::AggregationService;
use settlement::SettlementService;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

/// Rows written by one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSummary {
    pub dashboard_rows: usize,
    pub balance_rows: usize,
}

/// Periodically logs the dashboard and the wallet balances
pub struct DashboardReporter {
    aggregation: Arc<AggregationService>,
    settlement: SettlementService,
    interval: Duration,
}

impl DashboardReporter {
    pub fn new(
        aggregation: Arc<AggregationService>,
        settlement: SettlementService,
        interval: Duration,
    ) -> Self {
        Self {
            aggregation,
            settlement,
            interval,
        }
    }

    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => {
                    info!("dashboard reporter stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.report_once().await;
                }
            }
        }
    }

    /// Log one dashboard and balance snapshot; read failures are logged
    #[instrument(name = "dashboard_report", skip(self))]
    pub async fn report_once(&self) -> ReportSummary {
        let dashboard_rows = match self.aggregation.dashboard().await {
            Ok(entries) => {
                for entry in &entries {
                    info!(
                        sensor_id = %entry.sensor_id,
                        event_type = %entry.event_type,
                        last_value = entry.last_value,
                        last_timestamp_ms = entry.last_timestamp_ms,
                        average_of_last_n = entry.average_of_last_n,
                        "dashboard"
                    );
                }
                entries.len()
            }
            Err(e) => {
                error!(error = %e, "failed to read dashboard");
                0
            }
        };

        let balances = self.settlement.get_balances().await;
        for record in &balances {
            info!(
                sensor_id = %record.sensor_id,
                address = %record.address,
                balance = %record.balance,
                settlement_enabled = self.settlement.is_enabled(),
                "balance"
            );
        }

        ReportSummary {
            dashboard_rows,
            balance_rows: balances.len(),
        }
    }
}
