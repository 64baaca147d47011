use std::time::Duration;

use log::{debug, info};
use tokio::time::{self, Instant, MissedTickBehavior};

use super::dispatcher::relay_timestamp;
use super::protocol::{DashboardMessage, Outbound, TireStatus};
use super::state::StateStore;
use super::tpms::SharedSynthesizer;
use super::transport::{Delivery, Transport};

/// Pushes fresh tire telemetry to the dashboard on a fixed cadence,
/// independent of emergency traffic.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    period: Duration,
    store: StateStore,
    synthesizer: SharedSynthesizer,
    transport: Transport,
}

impl Broadcaster {
    pub fn new(
        period: Duration,
        store: StateStore,
        synthesizer: SharedSynthesizer,
        transport: Transport,
    ) -> Self {
        Self {
            period,
            store,
            synthesizer,
            transport,
        }
    }

    /// Generate, record and publish one telemetry update.
    pub async fn tick(&self) -> Delivery {
        let tpms_data = self.store.refresh_telemetry(&self.synthesizer).await;

        for (wheel, reading) in tpms_data.iter() {
            if reading.status != TireStatus::Ok {
                debug!(
                    "Tire {} {:?} at {} psi",
                    wheel.code(),
                    reading.status,
                    reading.pressure_psi
                );
            }
        }

        let update = Outbound::Dashboard(DashboardMessage::TpmsUpdate {
            tpms_data,
            timestamp: relay_timestamp(),
        });
        self.transport.fan_out(&[update]).await
    }

    /// Run forever. The first update goes out one period after start.
    pub async fn run(self) {
        info!("Telemetry broadcast every {:?}", self.period);

        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let delivery = self.tick().await;
            debug!("Telemetry update delivered: {}", delivery.is_complete());
        }
    }
}
