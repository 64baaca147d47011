//! Wire constants for the roadside relay protocol.
//!
//! Every datagram is a UTF-8 JSON object. Messages that need to be told apart
//! on a shared port carry a `type` discriminator holding one of the tags below.

/// Default port for inbound emergency reports (Console->Relay)
pub const DEFAULT_REPORT_PORT: u16 = 5005;

/// Acknowledgments arrive on `report port + ACK_PORT_OFFSET` (Responder->Relay)
pub const ACK_PORT_OFFSET: u16 = 10;

/// Enriched report for the responder console (Relay->Responder)
pub const DEFAULT_RESPONDER_PORT: u16 = 5006;

/// Emergency alert for the hospital console (Relay->Hospital)
pub const DEFAULT_HOSPITAL_PORT: u16 = 5007;

/// Emergency, telemetry and acknowledgment updates (Relay->Dashboard)
pub const DEFAULT_DASHBOARD_PORT: u16 = 5008;

/// "Help is coming" status for the reporting console (Relay->Reporter)
pub const DEFAULT_REPORTER_PORT: u16 = 5009;

/// Name of the discriminator field
pub const TYPE_FIELD: &str = "type";

/// Responder acknowledgment (Responder->Relay)
pub const TYPE_ACK: &str = "ACK";

/// Hospital alert (Relay->Hospital)
pub const TYPE_EMERGENCY_ALERT: &str = "EMERGENCY_ALERT";

/// Dashboard emergency (Relay->Dashboard)
pub const TYPE_EMERGENCY: &str = "EMERGENCY";

/// Dashboard telemetry refresh (Relay->Dashboard)
pub const TYPE_TPMS_UPDATE: &str = "TPMS_UPDATE";

/// Dashboard responder status (Relay->Dashboard)
pub const TYPE_CAR2_ACK: &str = "CAR2_ACK";

/// Reporter status (Relay->Reporter)
pub const TYPE_HELP_COMING: &str = "HELP_COMING";

/// Identifier the relay appends to every hop trace it forwards
pub const DEFAULT_HOP_ID: &str = "RELAY";

/// Responder id used when an acknowledgment omits `car2_id`
pub const DEFAULT_RESPONDER_ID: &str = "CAR_02";

/// Assumed responder travel speed for ETA estimates
pub const DEFAULT_RESPONDER_SPEED_KMH: f64 = 40.0;

/// Seconds between unsolicited telemetry pushes to the dashboard
pub const DEFAULT_TELEMETRY_INTERVAL_SECS: u64 = 3;

/// Largest datagram the listeners will read
pub const DEFAULT_MAX_DATAGRAM_BYTES: usize = 4096;

/// Prefix of the map link handed to the hospital
pub const MAPS_LINK_PREFIX: &str = "https://www.google.com/maps?q=";
