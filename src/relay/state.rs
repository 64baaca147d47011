//! Latest-state cache shared by the listeners and the broadcaster.
//!
//! The whole record sits behind a single mutex. Updates that touch several
//! fields (a new emergency, an acknowledgment correlation) happen inside one
//! critical section, so readers never see an emergency from one event paired
//! with telemetry or an ETA from another.
//!
//! Telemetry is generated while the store lock is held, so the recorded
//! snapshot only ever moves forward in tick order. Lock order is always
//! store first, then synthesizer.

use std::sync::Arc;

use tokio::sync::Mutex;

use super::error::HubError;
use super::geo::{distance_km, eta_minutes, round_to};
use super::protocol::{
    AcknowledgmentReport, EnrichedReport, EnvironmentReading, EnvironmentStatus, TpmsSnapshot,
};
use super::tpms::SharedSynthesizer;

/// Where the relay is in the emergency lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPhase {
    /// No emergency recorded yet
    #[default]
    Idle,
    /// An emergency is recorded but nobody has acknowledged it
    EmergencyActive,
    /// A responder acknowledged the recorded emergency
    ResponderEnRoute,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentSnapshot {
    pub reading: EnvironmentReading,
    pub status: EnvironmentStatus,
}

/// Result of correlating an acknowledgment with the active emergency.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponderEta {
    pub acknowledgment: AcknowledgmentReport,
    /// Kilometres, two decimals
    pub distance_km: f64,
    /// Minutes, one decimal
    pub eta_minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LatestState {
    pub phase: DispatchPhase,
    pub environment: Option<EnvironmentSnapshot>,
    pub telemetry: Option<TpmsSnapshot>,
    pub emergency: Option<EnrichedReport>,
    pub responder: Option<ResponderEta>,
}

/// What [`StateStore::correlate`] hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub eta: ResponderEta,
    /// Vehicle id of the emergency the ETA was computed against
    pub emergency_vehicle: String,
}

#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<Mutex<LatestState>>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consistent copy of every field.
    pub async fn snapshot(&self) -> LatestState {
        self.inner.lock().await.clone()
    }

    pub async fn phase(&self) -> DispatchPhase {
        self.inner.lock().await.phase
    }

    pub async fn environment(&self) -> Option<EnvironmentSnapshot> {
        self.inner.lock().await.environment.clone()
    }

    pub async fn telemetry(&self) -> Option<TpmsSnapshot> {
        self.inner.lock().await.telemetry
    }

    pub async fn emergency(&self) -> Option<EnrichedReport> {
        self.inner.lock().await.emergency.clone()
    }

    pub async fn responder(&self) -> Option<ResponderEta> {
        self.inner.lock().await.responder.clone()
    }

    /// Generate the next telemetry snapshot and record it as the latest.
    pub async fn refresh_telemetry(&self, synthesizer: &SharedSynthesizer) -> TpmsSnapshot {
        let mut state = self.inner.lock().await;
        let telemetry = synthesizer.lock().await.next_snapshot();
        state.telemetry = Some(telemetry);
        telemetry
    }

    /// Build the enriched report from a fresh telemetry snapshot and make it
    /// the active emergency, together with its environment and telemetry.
    /// Any previous responder record belongs to the replaced emergency and is
    /// dropped.
    ///
    /// Returns the recorded report and the phase the relay was in before.
    pub async fn record_emergency<F>(
        &self,
        synthesizer: &SharedSynthesizer,
        enrich: F,
    ) -> (EnrichedReport, DispatchPhase)
    where
        F: FnOnce(TpmsSnapshot) -> EnrichedReport,
    {
        let mut state = self.inner.lock().await;
        let report = enrich(synthesizer.lock().await.next_snapshot());
        let previous = state.phase;

        state.environment = Some(EnvironmentSnapshot {
            reading: report.report.rsu_environment.clone(),
            status: report.report.environment_status,
        });
        state.telemetry = Some(report.tpms_data);
        state.emergency = Some(report.clone());
        state.responder = None;
        state.phase = DispatchPhase::EmergencyActive;

        (report, previous)
    }

    /// Compute distance and ETA from the responder to the active emergency
    /// and record them, all under one lock.
    pub async fn correlate(
        &self,
        acknowledgment: AcknowledgmentReport,
        speed_kmh: f64,
    ) -> Result<Correlation, HubError> {
        let mut state = self.inner.lock().await;

        let Some(emergency) = state.emergency.as_ref() else {
            return Err(HubError::NoActiveEmergency {
                responder: acknowledgment.car2_id,
            });
        };

        let (lat, lon) = (acknowledgment.car2_latitude, acknowledgment.car2_longitude);
        let target = &emergency.report;
        let emergency_vehicle = target.vehicle_id.clone();

        let eta = ResponderEta {
            distance_km: round_to(distance_km(lat, lon, target.latitude, target.longitude), 2),
            eta_minutes: eta_minutes(lat, lon, target.latitude, target.longitude, speed_kmh),
            acknowledgment,
        };

        state.responder = Some(eta.clone());
        state.phase = DispatchPhase::ResponderEnRoute;

        Ok(Correlation {
            eta,
            emergency_vehicle,
        })
    }
}
