use common::domain::TelemetryEvent;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("payload is empty")]
    Empty,

    #[error("malformed telemetry payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one raw transport payload into a telemetry event
///
/// The payload must be a JSON object carrying all four fields. `null`,
/// arrays, scalars, invalid UTF-8 and mistyped fields are rejected.
pub fn decode_telemetry_event(payload: &[u8]) -> Result<TelemetryEvent, PayloadError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(PayloadError::Empty);
    }

    Ok(serde_json::from_slice(payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_generator_payload() {
        let payload =
            br#"{"SensorId":"temperature1","Type":"temperature","Value":21.5,"Timestamp":1735689600000}"#;

        let event = decode_telemetry_event(payload).unwrap();

        assert_eq!(
            event,
            TelemetryEvent::new("temperature1", "temperature", 21.5, 1_735_689_600_000)
        );
    }

    #[test]
    fn test_decode_camel_case_payload() {
        let payload =
            br#"{"sensorId":"light2","type":"light","value":300,"timestampMs":1735689600123}"#;

        let event = decode_telemetry_event(payload).unwrap();

        assert_eq!(event.sensor_id, "light2");
        assert_eq!(event.value, 300.0);
        assert_eq!(event.timestamp_ms, 1_735_689_600_123);
    }

    #[test]
    fn test_empty_sensor_id_is_well_formed() {
        let payload = br#"{"sensorId":"","type":"energy","value":1.0,"timestamp":1}"#;

        let event = decode_telemetry_event(payload).unwrap();

        assert!(event.sensor_id.is_empty());
    }

    #[test]
    fn test_rejects_malformed_payloads() {
        let cases: [&[u8]; 8] = [
            b"",
            b"   ",
            b"null",
            b"[1,2,3]",
            b"{not json",
            br#"{"sensorId":"a","type":"t","value":"hot","timestamp":1}"#,
            br#"{"sensorId":"a","type":"t","value":1.0,"timestamp":1.5}"#,
            br#"{"sensorId":"a","type":"t","value":1.0}"#,
        ];

        for payload in cases {
            assert!(
                decode_telemetry_event(payload).is_err(),
                "payload {:?} should be rejected",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let payload = b"{\"sensorId\":\"\xff\xfe\",\"type\":\"t\",\"value\":1,\"timestamp\":1}";

        assert!(matches!(
            decode_telemetry_event(payload),
            Err(PayloadError::Malformed(_))
        ));
    }
}
