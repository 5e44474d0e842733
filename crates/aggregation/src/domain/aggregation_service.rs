use crate::domain::EventQuery;
use common::domain::{
    DomainResult, FindEventsRepoInput, LatestEventsRepoInput, TelemetryEvent,
    TelemetryEventRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Number of most recent events averaged per sensor on the dashboard
pub const DASHBOARD_WINDOW: usize = 100;

/// Latest reading and rolling average for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEntry {
    pub sensor_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub last_value: f64,
    pub last_timestamp_ms: i64,
    pub average_of_last_n: f64,
}

impl DashboardEntry {
    /// Summarize a newest-first window; `None` when the window is empty
    fn from_window(sensor_id: String, window: &[TelemetryEvent]) -> Option<Self> {
        let latest = window.first()?;
        let average = window.iter().map(|event| event.value).sum::<f64>() / window.len() as f64;

        Some(Self {
            sensor_id,
            event_type: latest.event_type.clone(),
            last_value: latest.value,
            last_timestamp_ms: latest.timestamp_ms,
            average_of_last_n: average,
        })
    }
}

/// Read-only query surface over stored telemetry events
pub struct AggregationService {
    repository: Arc<dyn TelemetryEventRepository>,
}

impl AggregationService {
    pub fn new(repository: Arc<dyn TelemetryEventRepository>) -> Self {
        Self { repository }
    }

    /// Filter then sort stored events
    ///
    /// The type filter is pushed down to the store; the sensor id and time
    /// filters and the sort run here.
    #[instrument(skip(self), fields(sort_column = ?query.sort_column, sort_direction = ?query.sort_direction))]
    pub async fn query(&self, query: EventQuery) -> DomainResult<Vec<TelemetryEvent>> {
        let events = self
            .repository
            .find(FindEventsRepoInput {
                event_type: query.type_filter(),
            })
            .await?;

        let fetched = events.len();
        let events = query.apply(events);

        debug!(fetched, returned = events.len(), "event query completed");
        Ok(events)
    }

    /// One entry per sensor that has at least one stored event
    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> DomainResult<Vec<DashboardEntry>> {
        let sensor_ids = self.repository.distinct_sensor_ids().await?;
        let mut entries = Vec::with_capacity(sensor_ids.len());

        for sensor_id in sensor_ids {
            let window = self
                .repository
                .latest_for_sensor(LatestEventsRepoInput {
                    sensor_id: sensor_id.clone(),
                    limit: DASHBOARD_WINDOW,
                })
                .await?;

            match DashboardEntry::from_window(sensor_id, &window) {
                Some(entry) => entries.push(entry),
                None => debug!("sensor has no events in window, skipping"),
            }
        }

        Ok(entries)
    }
}
