//! Datagram decoding for the relay protocol.
//!
//! Every inbound datagram is decoded exactly once into an [`Inbound`]
//! variant before any handler sees it. Reports and acknowledgments share the
//! report port and are told apart by the `type` field:
//!
//! ```text
//! {"type": "ACK", ...}      -> Inbound::Acknowledgment
//! {"type": <anything else>} -> Inbound::Report
//! {...no type...}           -> Inbound::Report
//! ```
//!
//! # Error Handling
//!
//! [`ParseError`] only describes malformed bytes. Whether a well-formed
//! message makes sense in the current relay state is decided by the
//! dispatcher.

use serde_json::Value;
use thiserror::Error;

use super::{constants::*, messages::*};

/// Errors that can occur when decoding a datagram.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Payload is not UTF-8 text
    #[error("datagram is not valid UTF-8")]
    InvalidUtf8,
    /// Payload is not JSON, or not the expected JSON shape
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// Datagram on the acknowledgment port without `"type": "ACK"`
    #[error("expected an ACK datagram, got type {0:?}")]
    NotAnAcknowledgment(Option<String>),
}

fn parse_value(data: &[u8]) -> Result<Value, ParseError> {
    let text = std::str::from_utf8(data).map_err(|_| ParseError::InvalidUtf8)?;
    Ok(serde_json::from_str(text)?)
}

fn message_type(value: &Value) -> Option<String> {
    value.get(TYPE_FIELD)?.as_str().map(str::to_string)
}

/// Decode a datagram received on the report port.
///
/// # Examples
///
/// ```rust
/// # use rsu_relay::relay::protocol::parse;
/// let data = br#"{"type":"ACK","car2_id":"CAR_02"}"#;
/// let message = parse(data)?;
/// // Returns Inbound::Acknowledgment(AcknowledgmentReport { car2_id: "CAR_02", .. })
/// # Ok::<(), rsu_relay::relay::protocol::ParseError>(())
/// ```
pub fn parse(data: &[u8]) -> Result<Inbound, ParseError> {
    let value = parse_value(data)?;

    if message_type(&value).as_deref() == Some(TYPE_ACK) {
        return Ok(Inbound::Acknowledgment(serde_json::from_value(value)?));
    }

    let mut report: EmergencyReport = serde_json::from_value(value)?;
    report.dedup_hops();
    report.strip_relay_fields();
    Ok(Inbound::Report(report))
}

/// Decode a datagram received on the acknowledgment port.
///
/// Only `"type": "ACK"` datagrams are accepted there.
pub fn parse_acknowledgment(data: &[u8]) -> Result<AcknowledgmentReport, ParseError> {
    let value = parse_value(data)?;
    let kind = message_type(&value);

    if kind.as_deref() != Some(TYPE_ACK) {
        return Err(ParseError::NotAnAcknowledgment(kind));
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_report_without_type() {
        let data = br#"{"vehicle_id":"CAR_01","issue":"Accident","latitude":28.6,"longitude":77.2,
            "timestamp":"10:00:00","hop_trace":["CAR_01","RSU_1"],
            "rsu_environment":{"temperature":31.5,"humidity":40.0},
            "environment_status":"Low Visibility"}"#;

        let Inbound::Report(report) = parse(data).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(report.vehicle_id, "CAR_01");
        assert_eq!(report.issue, IssueCategory::Accident);
        assert_eq!(report.latitude, 28.6);
        assert_eq!(report.hop_trace, vec!["CAR_01", "RSU_1"]);
        assert_eq!(report.rsu_environment.temperature, Some(31.5));
        assert_eq!(report.rsu_environment.light_level, None);
        assert_eq!(report.environment_status, EnvironmentStatus::LowVisibility);
    }

    #[test]
    fn test_parse_report_with_other_type_is_still_a_report() {
        let data = br#"{"type":"SOMETHING","vehicle_id":"CAR_09"}"#;
        assert!(matches!(parse(data), Ok(Inbound::Report(r)) if r.vehicle_id == "CAR_09"));
    }

    #[test]
    fn test_parse_report_defaults_missing_fields() {
        let Inbound::Report(report) = parse(b"{}").unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(report.vehicle_id, "");
        assert_eq!(report.issue, IssueCategory::GeneralBreakdown);
        assert_eq!(report.environment_status, EnvironmentStatus::Unknown);
        assert!(report.hop_trace.is_empty());
        assert_eq!(report.rsu_environment, EnvironmentReading::default());
    }

    #[test]
    fn test_parse_report_keeps_unknown_fields() {
        let data = br#"{"vehicle_id":"CAR_01","rsu_id":"RSU_1","rsu_rssi":-61,"extra":{"a":1}}"#;
        let Inbound::Report(report) = parse(data).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(report.vehicle_id, "CAR_01");
        assert_eq!(report.extra["rsu_id"], "RSU_1");
        assert_eq!(report.extra["rsu_rssi"], -61);
        assert_eq!(report.extra["extra"]["a"], 1);
        assert!(!report.extra.contains_key("vehicle_id"));
    }

    #[test]
    fn test_parse_report_treats_null_as_missing() {
        let data = br#"{"vehicle_id":"CAR_01","issue":null,"raw_description":null,
            "latitude":null,"longitude":77.2,"timestamp":null,"hop_trace":null,
            "rsu_environment":null,"environment_status":null}"#;

        let Inbound::Report(report) = parse(data).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(report.vehicle_id, "CAR_01");
        assert_eq!(report.issue, IssueCategory::GeneralBreakdown);
        assert_eq!(report.raw_description, "");
        assert_eq!(report.latitude, 0.0);
        assert_eq!(report.longitude, 77.2);
        assert_eq!(report.timestamp, "");
        assert!(report.hop_trace.is_empty());
        assert_eq!(report.rsu_environment, EnvironmentReading::default());
        assert_eq!(report.environment_status, EnvironmentStatus::Unknown);
        assert!(report.extra.is_empty());
    }

    #[test]
    fn test_parse_ack_treats_null_as_missing() {
        let data = br#"{"type":"ACK","car2_id":null,"car2_latitude":null,
            "car2_longitude":77.21,"accident_vehicle":null}"#;

        let ack = parse_acknowledgment(data).unwrap();
        assert_eq!(ack.car2_id, DEFAULT_RESPONDER_ID);
        assert_eq!(ack.car2_latitude, 0.0);
        assert_eq!(ack.car2_longitude, 77.21);
        assert_eq!(ack.accident_vehicle, None);
    }

    #[test]
    fn test_parse_report_dedups_hop_trace() {
        let data = br#"{"hop_trace":["CAR_01","RSU_1","CAR_01","RELAY","RSU_1"]}"#;
        let Inbound::Report(report) = parse(data).unwrap() else {
            panic!("expected a report");
        };
        assert_eq!(report.hop_trace, vec!["CAR_01", "RSU_1", "RELAY"]);
    }

    #[test]
    fn test_parse_ack_on_report_port() {
        let data = br#"{"type":"ACK","car2_id":"CAR_07","car2_latitude":28.61,
            "car2_longitude":77.21,"accident_vehicle":"CAR_01","ack_timestamp":"10:01:00",
            "eta_minutes":3.2}"#;

        let Inbound::Acknowledgment(ack) = parse(data).unwrap() else {
            panic!("expected an acknowledgment");
        };
        assert_eq!(ack.car2_id, "CAR_07");
        assert_eq!(ack.car2_latitude, 28.61);
        assert_eq!(ack.accident_vehicle.as_deref(), Some("CAR_01"));
    }

    #[test]
    fn test_parse_ack_defaults_responder_id() {
        let ack = parse_acknowledgment(br#"{"type":"ACK"}"#).unwrap();
        assert_eq!(ack.car2_id, DEFAULT_RESPONDER_ID);
        assert_eq!(ack.car2_latitude, 0.0);
        assert_eq!(ack.car2_longitude, 0.0);
        assert_eq!(ack.accident_vehicle, None);
    }

    #[test]
    fn test_ack_port_rejects_reports() {
        let err = parse_acknowledgment(br#"{"vehicle_id":"CAR_01"}"#).unwrap_err();
        assert!(matches!(err, ParseError::NotAnAcknowledgment(None)));

        let err = parse_acknowledgment(br#"{"type":"EMERGENCY"}"#).unwrap_err();
        assert!(matches!(err, ParseError::NotAnAcknowledgment(Some(t)) if t == "EMERGENCY"));
    }

    #[test]
    fn test_parse_malformed_datagrams() {
        assert!(matches!(parse(b"\xff\xfe\x00"), Err(ParseError::InvalidUtf8)));
        assert!(matches!(parse(b"not json at all"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(parse(b"[1, 2, 3]"), Err(ParseError::InvalidJson(_))));
        assert!(matches!(parse(b""), Err(ParseError::InvalidJson(_))));
        assert!(matches!(
            parse(br#"{"latitude":"north"}"#),
            Err(ParseError::InvalidJson(_))
        ));
    }
}
