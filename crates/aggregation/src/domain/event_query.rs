use common::domain::TelemetryEvent;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    SensorId,
    Type,
    Value,
    #[default]
    Timestamp,
}

impl SortColumn {
    /// Case-insensitive; anything unknown sorts by timestamp
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("sensorid") => SortColumn::SensorId,
            Some("type") => SortColumn::Type,
            Some("value") => SortColumn::Value,
            _ => SortColumn::Timestamp,
        }
    }

    fn compare(self, a: &TelemetryEvent, b: &TelemetryEvent) -> Ordering {
        match self {
            SortColumn::SensorId => a.sensor_id.cmp(&b.sensor_id),
            SortColumn::Type => a.event_type.cmp(&b.event_type),
            SortColumn::Value => a.value.total_cmp(&b.value),
            SortColumn::Timestamp => a.timestamp_ms.cmp(&b.timestamp_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    /// `desc` in any case is descending, any other value ascending, absent descending
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None => SortDirection::Descending,
            Some(value) if value.trim().eq_ignore_ascii_case("desc") => SortDirection::Descending,
            Some(_) => SortDirection::Ascending,
        }
    }
}

/// Read query over stored events
///
/// Filters hold the raw caller-supplied text. Blank strings mean "no
/// filter", and timestamps that do not parse as integer epoch milliseconds
/// are ignored instead of rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub sort_column: SortColumn,
    pub sort_direction: SortDirection,
    pub sensor_id_contains: Option<String>,
    pub timestamp_before: Option<String>,
    pub timestamp_after: Option<String>,
}

impl EventQuery {
    /// Type filter for the store, `None` when blank
    pub fn type_filter(&self) -> Option<String> {
        non_blank(self.event_type.as_deref()).map(str::to_string)
    }

    pub fn before_ms(&self) -> Option<i64> {
        parse_timestamp(self.timestamp_before.as_deref())
    }

    pub fn after_ms(&self) -> Option<i64> {
        parse_timestamp(self.timestamp_after.as_deref())
    }

    /// Drop events that fail the in-memory filters and sort the rest
    pub(crate) fn apply(&self, mut events: Vec<TelemetryEvent>) -> Vec<TelemetryEvent> {
        let needle = non_blank(self.sensor_id_contains.as_deref()).map(str::to_lowercase);
        let before = self.before_ms();
        let after = self.after_ms();

        events.retain(|event| {
            needle
                .as_deref()
                .is_none_or(|needle| event.sensor_id.to_lowercase().contains(needle))
                && before.is_none_or(|before| event.timestamp_ms < before)
                && after.is_none_or(|after| event.timestamp_ms > after)
        });

        let column = self.sort_column;
        match self.sort_direction {
            SortDirection::Ascending => events.sort_by(|a, b| column.compare(a, b)),
            SortDirection::Descending => events.sort_by(|a, b| column.compare(b, a)),
        }

        events
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_timestamp(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
}
