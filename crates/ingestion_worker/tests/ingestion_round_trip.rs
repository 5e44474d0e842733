use aggregation::{AggregationService, EventQuery, SortColumn, SortDirection};
use async_trait::async_trait;
use common::domain::{InMemoryTelemetryEventRepository, SensorRewarder, TelemetryEventRepository};
use ingestion_worker::{IngestionOutcome, IngestionService};
use settlement::{
    LedgerClient, LedgerError, LedgerResult, LedgerSettlement, SettlementMode, SettlementService,
    TransferRequest, WalletDirectory,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ledger that fails every estimate and records every submitted transfer
struct CountingLedger {
    estimates: AtomicUsize,
    submitted: mpsc::UnboundedSender<(TransferRequest, u64)>,
}

#[async_trait]
impl LedgerClient for CountingLedger {
    async fn estimate_transfer_cost(&self, _request: &TransferRequest) -> LedgerResult<u64> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::Transport("estimation disabled on this node".to_string()))
    }

    async fn submit_transfer(
        &self,
        request: &TransferRequest,
        gas_limit: u64,
    ) -> LedgerResult<String> {
        let _ = self.submitted.send((request.clone(), gas_limit));
        Ok(format!("0x{:064x}", 1))
    }

    async fn balance_of(&self, _address: &str) -> LedgerResult<u128> {
        Ok(0)
    }

    async fn ensure_contract(&self) -> LedgerResult<()> {
        Ok(())
    }
}

struct Harness {
    repository: Arc<InMemoryTelemetryEventRepository>,
    ingestion: IngestionService,
    aggregation: AggregationService,
    ledger: Arc<CountingLedger>,
    submitted: mpsc::UnboundedReceiver<(TransferRequest, u64)>,
}

fn harness() -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let ledger = Arc::new(CountingLedger {
        estimates: AtomicUsize::new(0),
        submitted: tx,
    });

    // light1 has a blank address and is therefore unmapped
    let directory = WalletDirectory::from_entries([
        ("temperature1", "0x0000000000000000000000000000000000000001"),
        ("light1", "  "),
    ]);
    let mode = SettlementMode::Enabled(LedgerSettlement {
        client: ledger.clone(),
        owner_address: "0x00000000000000000000000000000000000000aa".to_string(),
        reward_amount: 1_000_000_000_000_000_000,
        token_decimals: 18,
        call_timeout: Duration::from_secs(2),
    });
    let rewarder: Arc<dyn SensorRewarder> = Arc::new(SettlementService::new(directory, mode));

    let repository = Arc::new(InMemoryTelemetryEventRepository::new());
    let ingestion = IngestionService::new(repository.clone(), rewarder);
    let aggregation = AggregationService::new(repository.clone());

    Harness {
        repository,
        ingestion,
        aggregation,
        ledger,
        submitted: rx,
    }
}

#[tokio::test]
async fn test_ingested_event_round_trips_through_query() {
    let mut h = harness();
    let payload = br#"{"SensorId":"temperature1","Type":"temperature","Value":21.375,"Timestamp":9007199254740993}"#;

    let outcome = h.ingestion.ingest_payload(payload).await;

    assert_eq!(
        outcome,
        IngestionOutcome::Persisted {
            settlement_requested: true
        }
    );

    let events = h
        .aggregation
        .query(EventQuery {
            event_type: Some("temperature".to_string()),
            sensor_id_contains: Some("Temperature1".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sensor_id, "temperature1");
    assert_eq!(events[0].event_type, "temperature");
    assert_eq!(events[0].value, 21.375);
    assert_eq!(events[0].timestamp_ms, 9_007_199_254_740_993);

    // Estimation fails on this ledger, so the transfer uses the fallback limit
    let (request, gas_limit) = tokio::time::timeout(Duration::from_secs(5), h.submitted.recv())
        .await
        .expect("settlement should submit")
        .expect("channel open");
    assert_eq!(request.to, "0x0000000000000000000000000000000000000001");
    assert_eq!(gas_limit, 100_000);
    assert_eq!(h.ledger.estimates.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_and_unmapped_payloads_never_reach_ledger() {
    let mut h = harness();

    let outcomes = [
        h.ingestion.ingest_payload(b"{\"SensorId\":").await,
        h.ingestion.ingest_payload(b"null").await,
        h.ingestion
            .ingest_payload(br#"{"SensorId":"light1","Type":"light","Value":300,"Timestamp":1}"#)
            .await,
        h.ingestion
            .ingest_payload(br#"{"SensorId":"","Type":"light","Value":310,"Timestamp":2}"#)
            .await,
    ];

    assert_eq!(outcomes[0], IngestionOutcome::Discarded);
    assert_eq!(outcomes[1], IngestionOutcome::Discarded);
    assert_eq!(h.repository.len().await, 2);

    let dashboard = h.aggregation.dashboard().await.unwrap();
    assert_eq!(dashboard.len(), 2);

    // Give any detached task a chance to run
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.submitted.try_recv().is_err());
    assert_eq!(h.ledger.estimates.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_persistence_order_follows_delivery_order() {
    let h = harness();

    for (i, value) in [5.0, 1.0, 3.0].into_iter().enumerate() {
        let payload = format!(
            r#"{{"SensorId":"energy1","Type":"energy","Value":{},"Timestamp":{}}}"#,
            value, i
        );
        h.ingestion.ingest_payload(payload.as_bytes()).await;
    }

    let stored = h.repository.find(Default::default()).await.unwrap();
    let values: Vec<f64> = stored.iter().map(|e| e.value).collect();
    assert_eq!(values, vec![5.0, 1.0, 3.0]);

    let sorted = h
        .aggregation
        .query(EventQuery {
            sort_column: SortColumn::Value,
            sort_direction: SortDirection::Ascending,
            ..Default::default()
        })
        .await
        .unwrap();
    let values: Vec<f64> = sorted.iter().map(|e| e.value).collect();
    assert_eq!(values, vec![1.0, 3.0, 5.0]);
}
