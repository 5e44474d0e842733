/// Parsed telemetry topic: `sensors/{type}` or `sensors/{type}/{sensor_id}`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub sensor_type: String,
    pub sensor_id: Option<String>,
}

const TOPIC_ROOT: &str = "sensors";

/// Parse a telemetry topic
///
/// Returns `None` for topics outside the `sensors/` tree. The topic only
/// labels the message; the payload stays authoritative.
///
/// # Examples
/// ```
/// use ingestion_worker::mqtt::parse_topic;
///
/// let parsed = parse_topic("sensors/temperature/temperature1").unwrap();
/// assert_eq!(parsed.sensor_type, "temperature");
/// assert_eq!(parsed.sensor_id.as_deref(), Some("temperature1"));
/// ```
pub fn parse_topic(topic: &str) -> Option<ParsedTopic> {
    let mut parts = topic.split('/');

    if parts.next()? != TOPIC_ROOT {
        return None;
    }

    let sensor_type = parts.next().map(str::trim).filter(|t| !t.is_empty())?;
    let sensor_id = match parts.next().map(str::trim) {
        Some(id) if !id.is_empty() => Some(id.to_string()),
        Some(_) => return None,
        None => None,
    };

    if parts.next().is_some() {
        return None;
    }

    Some(ParsedTopic {
        sensor_type: sensor_type.to_string(),
        sensor_id,
    })
}
