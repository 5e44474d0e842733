mod config;
mod reporter;

use aggregation::AggregationService;
use common::clickhouse::{ClickHouseClient, ClickHouseTelemetryEventRepository};
use common::domain::{InMemoryTelemetryEventRepository, TelemetryEventRepository};
use common::telemetry::{TelemetryProviders, init_telemetry, shutdown_telemetry};
use crate::config::{ServiceConfig, StoreBackend};
use ingestion_worker::IngestionWorker;
use reporter::DashboardReporter;
use sensor_runner::Runner;
use settlement::{SettlementService, WalletDirectory, build_settlement_mode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_config = match config.telemetry_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Invalid telemetry configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&telemetry_config)
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {:#}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        store_backend = %config.store_backend,
        "Starting sensor-ledger service"
    );
    debug!("Configuration: {:?}", config);

    let repository = match create_repository(&config).await {
        Ok(repository) => repository,
        Err(e) => {
            error!("Failed to initialize telemetry store: {:#}", e);
            std::process::exit(1);
        }
    };

    let settlement = match create_settlement_service(&config) {
        Ok(service) => service,
        Err(e) => {
            error!("Failed to initialize settlement: {:#}", e);
            std::process::exit(1);
        }
    };

    let ingestion_worker = IngestionWorker::new(
        Arc::clone(&repository),
        Arc::new(settlement.clone()),
        config.mqtt_subscriber_config(),
    );
    let aggregation = Arc::new(AggregationService::new(Arc::clone(&repository)));

    let mut runner = Runner::new()
        .with_named_process("ingestion_worker", ingestion_worker.into_runner_process());

    if config.dashboard_report_interval_secs > 0 {
        let reporter = DashboardReporter::new(
            aggregation,
            settlement,
            Duration::from_secs(config.dashboard_report_interval_secs),
        );
        runner = runner.with_app_process("dashboard_reporter", move |ctx| reporter.run(ctx));
    }

    let result = runner
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;

    if let Err(e) = result {
        error!("Application exiting with error: {:#}", e);
        std::process::exit(1);
    }
    info!("Application exiting normally");
}

async fn create_repository(
    config: &ServiceConfig,
) -> anyhow::Result<Arc<dyn TelemetryEventRepository>> {
    match config.store_backend()? {
        StoreBackend::Memory => {
            info!("using in-memory telemetry store; events are lost on restart");
            Ok(Arc::new(InMemoryTelemetryEventRepository::new()))
        }
        StoreBackend::ClickHouse => {
            let client = ClickHouseClient::new(&config.clickhouse_config());
            client.ping().await?;

            let repository =
                ClickHouseTelemetryEventRepository::new(client, config.clickhouse_table.clone());
            repository.migrate().await?;

            info!(
                url = %config.clickhouse_url,
                database = %config.clickhouse_database,
                table = %config.clickhouse_table,
                "connected to ClickHouse"
            );
            Ok(Arc::new(repository))
        }
    }
}

fn create_settlement_service(config: &ServiceConfig) -> anyhow::Result<SettlementService> {
    let directory = WalletDirectory::parse(&config.sensor_wallets);
    let mode = build_settlement_mode(&config.settlement_config())?;

    info!(
        wallet_count = directory.len(),
        settlement_enabled = mode.is_enabled(),
        "settlement initialized"
    );

    Ok(SettlementService::new(directory, mode))
}
