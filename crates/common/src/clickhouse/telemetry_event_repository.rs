use crate::clickhouse::ClickHouseClient;
use crate::domain::{
    DomainError, DomainResult, FindEventsRepoInput, LatestEventsRepoInput, TelemetryEvent,
    TelemetryEventRepository,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use clickhouse::sql::Identifier;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

const CREATE_TELEMETRY_EVENTS: &str =
    include_str!("../../migrations/clickhouse/001_create_telemetry_events.sql");

#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct TelemetryEventRow {
    pub sensor_id: String,
    pub event_type: String,
    pub value: f64,
    pub timestamp_ms: i64,
    #[serde(with = "clickhouse::serde::chrono::datetime64::millis")]
    pub ingested_at: DateTime<Utc>,
}

impl From<&TelemetryEvent> for TelemetryEventRow {
    fn from(event: &TelemetryEvent) -> Self {
        TelemetryEventRow {
            sensor_id: event.sensor_id.clone(),
            event_type: event.event_type.clone(),
            value: event.value,
            timestamp_ms: event.timestamp_ms,
            ingested_at: Utc::now(),
        }
    }
}

impl From<TelemetryEventRow> for TelemetryEvent {
    fn from(row: TelemetryEventRow) -> Self {
        TelemetryEvent {
            sensor_id: row.sensor_id,
            event_type: row.event_type,
            value: row.value,
            timestamp_ms: row.timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Row, Deserialize)]
struct SensorIdRow {
    sensor_id: String,
}

/// ClickHouse implementation of TelemetryEventRepository
///
/// Every insert is a standalone INSERT statement so the caller learns the
/// outcome before it decides whether to settle the event.
#[derive(Clone)]
pub struct ClickHouseTelemetryEventRepository {
    client: ClickHouseClient,
    table: String,
}

impl ClickHouseTelemetryEventRepository {
    pub fn new(client: ClickHouseClient, table: String) -> Self {
        Self { client, table }
    }

    /// Create the events table if it does not exist yet
    pub async fn migrate(&self) -> anyhow::Result<()> {
        if !is_valid_table_name(&self.table) {
            anyhow::bail!("invalid ClickHouse table name: {}", self.table);
        }

        let ddl = CREATE_TELEMETRY_EVENTS.replace("{table}", &self.table);
        self.client
            .get_client()
            .query(&ddl)
            .execute()
            .await
            .with_context(|| format!("failed to create table {}", self.table))?;

        info!(table = %self.table, "telemetry event table ready");
        Ok(())
    }
}

/// Plain table names only; the database comes from the client.
///
/// Reads bind the name as a single quoted identifier, so a `db.table` form
/// would be looked up as one table named `db.table`.
fn is_valid_table_name(table: &str) -> bool {
    !table.is_empty() && table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[async_trait]
impl TelemetryEventRepository for ClickHouseTelemetryEventRepository {
    async fn insert(&self, event: &TelemetryEvent) -> DomainResult<()> {
        let row = TelemetryEventRow::from(event);

        let mut insert = self
            .client
            .get_client()
            .insert::<TelemetryEventRow>(&self.table)
            .await
            .map_err(|e| {
                error!("failed to create ClickHouse insert: {}", e);
                DomainError::RepositoryError(e.into())
            })?;

        insert.write(&row).await.map_err(|e| {
            error!("failed to write row to ClickHouse: {}", e);
            DomainError::RepositoryError(e.into())
        })?;

        insert.end().await.map_err(|e| {
            error!("failed to finalize ClickHouse insert: {}", e);
            DomainError::RepositoryError(e.into())
        })?;

        debug!(sensor_id = %event.sensor_id, table = %self.table, "stored telemetry event");
        Ok(())
    }

    async fn find(&self, input: FindEventsRepoInput) -> DomainResult<Vec<TelemetryEvent>> {
        let client = self.client.get_client();
        let query = match &input.event_type {
            Some(event_type) => client
                .query("SELECT ?fields FROM ? WHERE event_type = ? ORDER BY ingested_at")
                .bind(Identifier(&self.table))
                .bind(event_type.as_str()),
            None => client
                .query("SELECT ?fields FROM ? ORDER BY ingested_at")
                .bind(Identifier(&self.table)),
        };

        let rows = query
            .fetch_all::<TelemetryEventRow>()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        debug!(row_count = rows.len(), event_type = ?input.event_type, "fetched telemetry events");
        Ok(rows.into_iter().map(TelemetryEvent::from).collect())
    }

    async fn distinct_sensor_ids(&self) -> DomainResult<Vec<String>> {
        let rows = self
            .client
            .get_client()
            .query("SELECT DISTINCT sensor_id FROM ? ORDER BY sensor_id")
            .bind(Identifier(&self.table))
            .fetch_all::<SensorIdRow>()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.into_iter().map(|row| row.sensor_id).collect())
    }

    async fn latest_for_sensor(
        &self,
        input: LatestEventsRepoInput,
    ) -> DomainResult<Vec<TelemetryEvent>> {
        let rows = self
            .client
            .get_client()
            .query("SELECT ?fields FROM ? WHERE sensor_id = ? ORDER BY timestamp_ms DESC LIMIT ?")
            .bind(Identifier(&self.table))
            .bind(input.sensor_id.as_str())
            .bind(input.limit as u64)
            .fetch_all::<TelemetryEventRow>()
            .await
            .map_err(|e| DomainError::RepositoryError(e.into()))?;

        Ok(rows.into_iter().map(TelemetryEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_to_row_conversion() {
        let event = TelemetryEvent::new("air-quality3", "air-quality", 41.25, 1_735_689_600_001);

        let row = TelemetryEventRow::from(&event);

        assert_eq!(row.sensor_id, "air-quality3");
        assert_eq!(row.event_type, "air-quality");
        assert_eq!(row.value, 41.25);
        assert_eq!(row.timestamp_ms, 1_735_689_600_001);
    }

    #[test]
    fn test_row_to_domain_conversion_is_exact() {
        let row = TelemetryEventRow {
            sensor_id: "energy1".to_string(),
            event_type: "energy".to_string(),
            value: 0.1 + 0.2,
            timestamp_ms: i64::MAX,
            ingested_at: Utc::now(),
        };

        let event = TelemetryEvent::from(row);

        assert_eq!(event.value, 0.1 + 0.2);
        assert_eq!(event.timestamp_ms, i64::MAX);
    }

    #[test]
    fn test_migration_has_table_placeholder() {
        assert!(CREATE_TELEMETRY_EVENTS.contains("{table}"));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("telemetry_events"));
        assert!(is_valid_table_name("Events2"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("sensors.telemetry_events"));
        assert!(!is_valid_table_name("`telemetry_events`"));
        assert!(!is_valid_table_name("events; DROP TABLE x"));
    }

    #[tokio::test]
    async fn test_migrate_rejects_qualified_table_name() {
        // Arrange
        let client = ClickHouseClient::new(&crate::clickhouse::ClickHouseConfig {
            url: "http://127.0.0.1:1".to_string(),
            database: "sensors".to_string(),
            username: "default".to_string(),
            password: String::new(),
        });
        let repository = ClickHouseTelemetryEventRepository::new(
            client,
            "sensors.telemetry_events".to_string(),
        );

        // Act
        let result = repository.migrate().await;

        // Assert
        let error = result.unwrap_err();
        assert!(error.to_string().contains("invalid ClickHouse table name"));
    }
}
