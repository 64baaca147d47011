//! Emergency routing and acknowledgment correlation.
//!
//! ```text
//!            report                 ack                    report
//!   Idle ───────────► EmergencyActive ───► ResponderEnRoute ───────► EmergencyActive
//!                          ▲   │                 │  ack
//!                          └───┘ report          └──┘
//! ```
//!
//! A report always replaces the active emergency. An acknowledgment is
//! always correlated with whatever emergency is active at the time it
//! arrives; with none active it is rejected.
//!
//! The relay stamps RFC 3339 local time. Reporting consoles usually send a
//! bare `HH:MM:SS` local time of day, which [`reported_at`] places on the
//! most recent matching instant at or before the relay stamp.

use std::net::SocketAddr;

use chrono::{DateTime, Local, NaiveTime, SecondsFormat, TimeDelta};
use log::{debug, info, warn};

use super::error::HubError;
use super::protocol::{
    AcknowledgmentReport, DashboardMessage, EmergencyReport, EnrichedReport, HospitalAlert,
    HospitalMessage, Inbound, Outbound, ReporterMessage, parse, parse_acknowledgment,
};
use super::state::StateStore;
use super::tpms::SharedSynthesizer;
use super::transport::{Delivery, Transport};

/// Current local time as stamped into outbound messages.
pub fn relay_timestamp() -> String {
    format_timestamp(&Local::now())
}

fn format_timestamp(at: &DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Console time-of-day format
const CONSOLE_TIME_FORMAT: &str = "%H:%M:%S";

/// Resolve a report's own `timestamp` against the moment the relay
/// received it.
///
/// Accepts RFC 3339 or a console `HH:MM:SS`. A time of day is taken on the
/// receive date, or the day before if that would put it after `received`.
pub fn reported_at(timestamp: &str, received: &DateTime<Local>) -> Option<DateTime<Local>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(at.with_timezone(&Local));
    }

    let time = NaiveTime::parse_from_str(timestamp, CONSOLE_TIME_FORMAT).ok()?;
    let at = received
        .date_naive()
        .and_time(time)
        .and_local_timezone(Local)
        .earliest()?;

    if at > *received {
        Some(at - TimeDelta::days(1))
    } else {
        Some(at)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Identifier appended to forwarded hop traces
    pub hop_id: String,
    /// Assumed responder speed for ETA estimates
    pub responder_speed_kmh: f64,
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    settings: DispatchSettings,
    store: StateStore,
    synthesizer: SharedSynthesizer,
    transport: Transport,
}

impl Dispatcher {
    pub fn new(
        settings: DispatchSettings,
        store: StateStore,
        synthesizer: SharedSynthesizer,
        transport: Transport,
    ) -> Self {
        Self {
            settings,
            store,
            synthesizer,
            transport,
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Classify and handle a datagram from the report port.
    pub async fn handle_datagram(&self, data: &[u8], from: SocketAddr) -> Result<Delivery, HubError> {
        match parse(data)? {
            Inbound::Report(report) => self.handle_report(report, from).await,
            Inbound::Acknowledgment(ack) => self.handle_acknowledgment(ack, from).await,
        }
    }

    /// Handle a datagram from the acknowledgment port.
    pub async fn handle_ack_datagram(
        &self,
        data: &[u8],
        from: SocketAddr,
    ) -> Result<Delivery, HubError> {
        let ack = parse_acknowledgment(data)?;
        self.handle_acknowledgment(ack, from).await
    }

    /// Enrich a report, make it the active emergency and fan it out to the
    /// responder, hospital and dashboard sinks, in that order.
    pub async fn handle_report(
        &self,
        mut report: EmergencyReport,
        from: SocketAddr,
    ) -> Result<Delivery, HubError> {
        report.append_hop(&self.settings.hop_id);

        let received = Local::now();
        let (enriched, previous) = self
            .store
            .record_emergency(&self.synthesizer, |tpms_data| EnrichedReport {
                report,
                tpms_data,
                relay_timestamp: format_timestamp(&received),
            })
            .await;

        match reported_at(&enriched.report.timestamp, &received) {
            Some(at) => debug!(
                "Report from {} relayed {} ms after it was raised",
                enriched.report.vehicle_id,
                (received - at).num_milliseconds()
            ),
            None => debug!(
                "Report from {} has unrecognised timestamp {:?}",
                enriched.report.vehicle_id, enriched.report.timestamp
            ),
        }

        info!(
            "Emergency from {} via {}: {} at ({}, {}), hops {:?} (was {:?})",
            enriched.report.vehicle_id,
            from,
            enriched.report.issue,
            enriched.report.latitude,
            enriched.report.longitude,
            enriched.report.hop_trace,
            previous,
        );

        let hospital = HospitalMessage::EmergencyAlert(hospital_alert(&enriched));
        let dashboard = DashboardMessage::Emergency {
            sensor_data: enriched.report.rsu_environment.clone(),
            tpms_data: enriched.tpms_data,
            environment_status: enriched.report.environment_status,
            timestamp: relay_timestamp(),
            data: enriched.clone(),
        };

        let messages = [
            Outbound::Responder(enriched),
            Outbound::Hospital(hospital),
            Outbound::Dashboard(dashboard),
        ];
        Ok(self.transport.fan_out(&messages).await)
    }

    /// Correlate an acknowledgment with the active emergency and tell the
    /// dashboard and the reporting vehicle that help is on the way.
    pub async fn handle_acknowledgment(
        &self,
        ack: AcknowledgmentReport,
        from: SocketAddr,
    ) -> Result<Delivery, HubError> {
        let correlation = self
            .store
            .correlate(ack, self.settings.responder_speed_kmh)
            .await?;
        let eta = correlation.eta;
        let responder = &eta.acknowledgment;

        if let Some(vehicle) = responder.accident_vehicle.as_deref() {
            if vehicle != correlation.emergency_vehicle {
                warn!(
                    "{} acknowledged {} but the active emergency is {}; correlated with the active one",
                    responder.car2_id, vehicle, correlation.emergency_vehicle,
                );
            }
        }

        info!(
            "{} via {} is {} km from {}, ETA {} min",
            responder.car2_id, from, eta.distance_km, correlation.emergency_vehicle, eta.eta_minutes,
        );

        let now = relay_timestamp();
        let messages = [
            Outbound::Dashboard(DashboardMessage::ResponderAck {
                car2_id: responder.car2_id.clone(),
                car2_latitude: responder.car2_latitude,
                car2_longitude: responder.car2_longitude,
                eta_minutes: eta.eta_minutes,
                distance_km: eta.distance_km,
                ack_timestamp: now.clone(),
            }),
            Outbound::Reporter(ReporterMessage::HelpComing {
                helper_id: responder.car2_id.clone(),
                eta_minutes: eta.eta_minutes,
                distance_km: eta.distance_km,
                timestamp: now,
            }),
        ];
        Ok(self.transport.fan_out(&messages).await)
    }
}

fn hospital_alert(enriched: &EnrichedReport) -> HospitalAlert {
    let report = &enriched.report;
    HospitalAlert {
        vehicle_id: report.vehicle_id.clone(),
        issue: report.issue,
        raw_description: report.raw_description.clone(),
        latitude: report.latitude,
        longitude: report.longitude,
        timestamp: report.timestamp.clone(),
        environment_status: report.environment_status,
        maps_link: report.maps_link(),
        relay_timestamp: enriched.relay_timestamp.clone(),
    }
}
