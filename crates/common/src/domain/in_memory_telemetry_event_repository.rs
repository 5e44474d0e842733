use crate::domain::{
    DomainResult, FindEventsRepoInput, LatestEventsRepoInput, TelemetryEvent,
    TelemetryEventRepository,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory implementation of TelemetryEventRepository backed by an append-only Vec
///
/// Ordering guarantees:
/// - `find` returns events in insertion order
/// - `distinct_sensor_ids` returns ids in first-seen order
/// - `latest_for_sensor` sorts by timestamp descending; events sharing a
///   timestamp keep insertion order (earlier-inserted first)
#[derive(Clone)]
pub struct InMemoryTelemetryEventRepository {
    events: Arc<RwLock<Vec<TelemetryEvent>>>,
}

impl InMemoryTelemetryEventRepository {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for InMemoryTelemetryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryEventRepository for InMemoryTelemetryEventRepository {
    async fn insert(&self, event: &TelemetryEvent) -> DomainResult<()> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn find(&self, input: FindEventsRepoInput) -> DomainResult<Vec<TelemetryEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|event| match &input.event_type {
                Some(event_type) => &event.event_type == event_type,
                None => true,
            })
            .cloned()
            .collect())
    }

    async fn distinct_sensor_ids(&self) -> DomainResult<Vec<String>> {
        let events = self.events.read().await;
        let mut ids: Vec<String> = Vec::new();
        for event in events.iter() {
            if !ids.contains(&event.sensor_id) {
                ids.push(event.sensor_id.clone());
            }
        }
        Ok(ids)
    }

    async fn latest_for_sensor(
        &self,
        input: LatestEventsRepoInput,
    ) -> DomainResult<Vec<TelemetryEvent>> {
        let events = self.events.read().await;
        let mut matching: Vec<TelemetryEvent> = events
            .iter()
            .filter(|event| event.sensor_id == input.sensor_id)
            .cloned()
            .collect();

        // sort_by is stable, so equal timestamps stay in insertion order
        matching.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
        matching.truncate(input.limit);

        Ok(matching)
    }
}
