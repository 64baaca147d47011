//! Typed wire messages exchanged by the relay.
//!
//! Inbound shapes are lenient: missing or `null` fields fall back to
//! defaults. Unknown report fields are carried through to the sinks untouched. Outbound shapes that share a sink are modelled
//! as internally tagged enums so the `type` discriminator comes from the
//! variant rather than from hand-built maps.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::constants::{
    DEFAULT_RESPONDER_ID, MAPS_LINK_PREFIX, TYPE_CAR2_ACK, TYPE_EMERGENCY, TYPE_EMERGENCY_ALERT,
    TYPE_HELP_COMING, TYPE_TPMS_UPDATE,
};

/// Fields the relay itself adds to a forwarded report. A report that loops
/// back into the relay must not carry stale copies of them as extras.
const RELAY_FIELDS: [&str; 3] = ["tpms_data", "relay_timestamp", "type"];

/// Deserialize `null` the same way as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_responder<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?
        .unwrap_or_else(|| DEFAULT_RESPONDER_ID.to_string()))
}

/// Classified emergency category chosen by the reporting console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IssueCategory {
    FlatTire,
    BatteryFailure,
    EngineProblem,
    Accident,
    VehicleFire,
    #[default]
    GeneralBreakdown,
}

impl IssueCategory {
    pub fn label(self) -> &'static str {
        match self {
            IssueCategory::FlatTire => "Flat Tire",
            IssueCategory::BatteryFailure => "Battery Failure",
            IssueCategory::EngineProblem => "Engine Problem",
            IssueCategory::Accident => "Accident",
            IssueCategory::VehicleFire => "Vehicle Fire",
            IssueCategory::GeneralBreakdown => "General Breakdown",
        }
    }

    /// Keyword classification of free text, first match wins.
    pub fn classify(text: &str) -> Self {
        let text = text.to_lowercase();
        if text.contains("tire") {
            IssueCategory::FlatTire
        } else if text.contains("battery") || text.contains("not starting") {
            IssueCategory::BatteryFailure
        } else if text.contains("smoke") || text.contains("engine") {
            IssueCategory::EngineProblem
        } else if text.contains("accident") || text.contains("crash") || text.contains("collision") {
            IssueCategory::Accident
        } else if text.contains("fire") {
            IssueCategory::VehicleFire
        } else {
            IssueCategory::GeneralBreakdown
        }
    }
}

impl From<String> for IssueCategory {
    fn from(label: String) -> Self {
        match squash(&label).as_str() {
            "flattire" => IssueCategory::FlatTire,
            "batteryfailure" => IssueCategory::BatteryFailure,
            "engineproblem" => IssueCategory::EngineProblem,
            "accident" => IssueCategory::Accident,
            "vehiclefire" => IssueCategory::VehicleFire,
            "generalbreakdown" => IssueCategory::GeneralBreakdown,
            _ => IssueCategory::classify(&label),
        }
    }
}

impl From<IssueCategory> for String {
    fn from(issue: IssueCategory) -> Self {
        issue.label().to_string()
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Environment label computed by the roadside unit and passed through as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvironmentStatus {
    Normal,
    LowVisibility,
    Fire,
    #[default]
    Unknown,
}

impl EnvironmentStatus {
    pub fn label(self) -> &'static str {
        match self {
            EnvironmentStatus::Normal => "Normal",
            EnvironmentStatus::LowVisibility => "Low Visibility",
            EnvironmentStatus::Fire => "Fire",
            EnvironmentStatus::Unknown => "Unknown",
        }
    }
}

impl From<String> for EnvironmentStatus {
    fn from(label: String) -> Self {
        match squash(&label).as_str() {
            "normal" => EnvironmentStatus::Normal,
            "lowvisibility" => EnvironmentStatus::LowVisibility,
            "fire" => EnvironmentStatus::Fire,
            _ => EnvironmentStatus::Unknown,
        }
    }
}

impl From<EnvironmentStatus> for String {
    fn from(status: EnvironmentStatus) -> Self {
        status.label().to_string()
    }
}

fn squash(label: &str) -> String {
    label
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Roadside environment sensors attached upstream of the relay.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentReading {
    /// Degrees Celsius
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Relative humidity in percent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub light_level: Option<f64>,
}

/// Emergency raised by a driver console and forwarded by the roadside unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyReport {
    #[serde(deserialize_with = "null_as_default")]
    pub vehicle_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub issue: IssueCategory,
    #[serde(deserialize_with = "null_as_default")]
    pub raw_description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub latitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub longitude: f64,
    /// Opaque, usually `HH:MM:SS` local time from the reporting console
    #[serde(deserialize_with = "null_as_default")]
    pub timestamp: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hop_trace: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub rsu_environment: EnvironmentReading,
    #[serde(deserialize_with = "null_as_default")]
    pub environment_status: EnvironmentStatus,
    /// Upstream fields the relay does not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EmergencyReport {
    /// Append `hop` unless the trace already contains it.
    ///
    /// Returns `true` if the trace changed.
    pub fn append_hop(&mut self, hop: &str) -> bool {
        if self.hop_trace.iter().any(|h| h == hop) {
            return false;
        }
        self.hop_trace.push(hop.to_string());
        true
    }

    /// Drop repeated hop identifiers, keeping the first occurrence of each.
    pub fn dedup_hops(&mut self) {
        let mut seen = Vec::with_capacity(self.hop_trace.len());
        self.hop_trace.retain(|hop| {
            if seen.contains(hop) {
                false
            } else {
                seen.push(hop.clone());
                true
            }
        });
    }

    /// Drop extras that would collide with fields the relay adds itself.
    pub fn strip_relay_fields(&mut self) {
        for field in RELAY_FIELDS {
            self.extra.remove(field);
        }
    }

    pub fn maps_link(&self) -> String {
        format!("{}{},{}", MAPS_LINK_PREFIX, self.latitude, self.longitude)
    }
}

/// Wheel positions reported by the tire-pressure monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Wheel {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Wheel {
    pub const ALL: [Wheel; 4] = [
        Wheel::FrontLeft,
        Wheel::FrontRight,
        Wheel::RearLeft,
        Wheel::RearRight,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Wheel::FrontLeft => "FL",
            Wheel::FrontRight => "FR",
            Wheel::RearLeft => "RL",
            Wheel::RearRight => "RR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TireStatus {
    Low,
    High,
    Ok,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TireReading {
    pub pressure_psi: f64,
    pub temperature_c: f64,
    pub status: TireStatus,
}

/// One reading per wheel, keyed `FL`/`FR`/`RL`/`RR` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TpmsSnapshot {
    #[serde(rename = "FL")]
    pub front_left: TireReading,
    #[serde(rename = "FR")]
    pub front_right: TireReading,
    #[serde(rename = "RL")]
    pub rear_left: TireReading,
    #[serde(rename = "RR")]
    pub rear_right: TireReading,
}

impl TpmsSnapshot {
    pub fn from_fn(mut reading: impl FnMut(Wheel) -> TireReading) -> Self {
        Self {
            front_left: reading(Wheel::FrontLeft),
            front_right: reading(Wheel::FrontRight),
            rear_left: reading(Wheel::RearLeft),
            rear_right: reading(Wheel::RearRight),
        }
    }

    pub fn get(&self, wheel: Wheel) -> &TireReading {
        match wheel {
            Wheel::FrontLeft => &self.front_left,
            Wheel::FrontRight => &self.front_right,
            Wheel::RearLeft => &self.rear_left,
            Wheel::RearRight => &self.rear_right,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Wheel, &TireReading)> {
        Wheel::ALL.into_iter().map(move |wheel| (wheel, self.get(wheel)))
    }
}

/// Report as forwarded to the responder: the inbound report plus relay data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedReport {
    #[serde(flatten)]
    pub report: EmergencyReport,
    pub tpms_data: TpmsSnapshot,
    pub relay_timestamp: String,
}

/// Acknowledgment sent by a responder vehicle that agreed to help.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AcknowledgmentReport {
    #[serde(deserialize_with = "null_as_default_responder")]
    pub car2_id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub car2_latitude: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub car2_longitude: f64,
    /// Vehicle the responder believes it is helping
    pub accident_vehicle: Option<String>,
    pub ack_timestamp: Option<String>,
}

impl Default for AcknowledgmentReport {
    fn default() -> Self {
        Self {
            car2_id: DEFAULT_RESPONDER_ID.to_string(),
            car2_latitude: 0.0,
            car2_longitude: 0.0,
            accident_vehicle: None,
            ack_timestamp: None,
        }
    }
}

/// A decoded inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Report(EmergencyReport),
    Acknowledgment(AcknowledgmentReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HospitalAlert {
    pub vehicle_id: String,
    pub issue: IssueCategory,
    pub raw_description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
    pub environment_status: EnvironmentStatus,
    pub maps_link: String,
    pub relay_timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HospitalMessage {
    #[serde(rename = "EMERGENCY_ALERT")]
    EmergencyAlert(HospitalAlert),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardMessage {
    #[serde(rename = "EMERGENCY")]
    Emergency {
        data: EnrichedReport,
        sensor_data: EnvironmentReading,
        tpms_data: TpmsSnapshot,
        environment_status: EnvironmentStatus,
        timestamp: String,
    },
    #[serde(rename = "TPMS_UPDATE")]
    TpmsUpdate {
        tpms_data: TpmsSnapshot,
        timestamp: String,
    },
    #[serde(rename = "CAR2_ACK")]
    ResponderAck {
        car2_id: String,
        car2_latitude: f64,
        car2_longitude: f64,
        eta_minutes: f64,
        distance_km: f64,
        ack_timestamp: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReporterMessage {
    #[serde(rename = "HELP_COMING")]
    HelpComing {
        helper_id: String,
        eta_minutes: f64,
        distance_km: f64,
        timestamp: String,
    },
}

/// Downstream sinks the relay fans out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Responder,
    Hospital,
    Dashboard,
    Reporter,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Route::Responder => "responder",
            Route::Hospital => "hospital",
            Route::Dashboard => "dashboard",
            Route::Reporter => "reporter",
        };
        f.write_str(name)
    }
}

/// A message addressed to one sink.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Responder(EnrichedReport),
    Hospital(HospitalMessage),
    Dashboard(DashboardMessage),
    Reporter(ReporterMessage),
}

impl Outbound {
    pub fn route(&self) -> Route {
        match self {
            Outbound::Responder(_) => Route::Responder,
            Outbound::Hospital(_) => Route::Hospital,
            Outbound::Dashboard(_) => Route::Dashboard,
            Outbound::Reporter(_) => Route::Reporter,
        }
    }

    /// Value of the `type` field this message is sent with, if any.
    pub fn message_type(&self) -> Option<&'static str> {
        match self {
            Outbound::Responder(_) => None,
            Outbound::Hospital(HospitalMessage::EmergencyAlert(_)) => Some(TYPE_EMERGENCY_ALERT),
            Outbound::Dashboard(DashboardMessage::Emergency { .. }) => Some(TYPE_EMERGENCY),
            Outbound::Dashboard(DashboardMessage::TpmsUpdate { .. }) => Some(TYPE_TPMS_UPDATE),
            Outbound::Dashboard(DashboardMessage::ResponderAck { .. }) => Some(TYPE_CAR2_ACK),
            Outbound::Reporter(ReporterMessage::HelpComing { .. }) => Some(TYPE_HELP_COMING),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        match self {
            Outbound::Responder(msg) => serde_json::to_vec(msg),
            Outbound::Hospital(msg) => serde_json::to_vec(msg),
            Outbound::Dashboard(msg) => serde_json::to_vec(msg),
            Outbound::Reporter(msg) => serde_json::to_vec(msg),
        }
    }
}
