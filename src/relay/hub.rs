use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use log::{error, info, warn};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HubConfig;

use super::broadcaster::Broadcaster;
use super::dispatcher::{DispatchSettings, Dispatcher};
use super::protocol::DashboardMessage;
use super::state::StateStore;
use super::tpms::TpmsSynthesizer;
use super::transport::Transport;

/// First pause after a failed receive; doubles per consecutive failure
const RECV_BACKOFF_MIN: Duration = Duration::from_millis(10);
const RECV_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Pause before retrying after `consecutive_errors` failed receives in a row.
fn recv_backoff(consecutive_errors: u32) -> Duration {
    let doublings = consecutive_errors.saturating_sub(1).min(16);
    RECV_BACKOFF_MIN
        .saturating_mul(1 << doublings)
        .min(RECV_BACKOFF_MAX)
}

/// Which inbound port a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Port {
    /// Reports, plus acknowledgments tagged `"type": "ACK"`
    Report,
    /// Acknowledgments only
    Ack,
}

/// The relay process: two UDP listeners and a telemetry broadcaster sharing
/// one state store.
pub struct RelayHub {
    report_socket: UdpSocket,
    ack_socket: UdpSocket,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
    transport: Transport,
    max_datagram_bytes: usize,
}

impl RelayHub {
    pub async fn bind(config: &HubConfig) -> io::Result<Self> {
        let report_socket = UdpSocket::bind(config.report_addr()).await?;
        let ack_socket = UdpSocket::bind(config.ack_addr()).await?;
        let transport = Transport::bind(config.listen.bind_ip, config.sinks.addrs()).await?;

        let store = StateStore::new();
        let synthesizer = TpmsSynthesizer::shared();
        let settings = DispatchSettings {
            hop_id: config.relay.hop_id.clone(),
            responder_speed_kmh: config.relay.responder_speed_kmh,
        };

        let dispatcher = Dispatcher::new(
            settings,
            store.clone(),
            synthesizer.clone(),
            transport.clone(),
        );
        let broadcaster = Broadcaster::new(
            Duration::from_secs(config.relay.telemetry_interval_secs),
            store,
            synthesizer,
            transport.clone(),
        );

        Ok(Self {
            report_socket,
            ack_socket,
            dispatcher,
            broadcaster,
            transport,
            max_datagram_bytes: config.relay.max_datagram_bytes,
        })
    }

    pub fn report_addr(&self) -> io::Result<SocketAddr> {
        self.report_socket.local_addr()
    }

    pub fn ack_addr(&self) -> io::Result<SocketAddr> {
        self.ack_socket.local_addr()
    }

    pub fn store(&self) -> StateStore {
        self.dispatcher.store().clone()
    }

    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardMessage> {
        self.transport.subscribe_dashboard()
    }

    /// Serve until the process is stopped. Individual datagrams may fail;
    /// the hub itself never does.
    pub async fn run(self) {
        info!("Reports on {:?}", self.report_socket.local_addr());
        info!("Acknowledgments on {:?}", self.ack_socket.local_addr());

        let sinks = self.transport.sinks();
        info!(
            "Responder {}, hospital {}, dashboard {}, reporter {}",
            sinks.responder, sinks.hospital, sinks.dashboard, sinks.reporter
        );

        let ack_listener = tokio::spawn(listen(
            self.ack_socket,
            Port::Ack,
            self.dispatcher.clone(),
            self.max_datagram_bytes,
        ));
        let report_listener = tokio::spawn(listen(
            self.report_socket,
            Port::Report,
            self.dispatcher,
            self.max_datagram_bytes,
        ));
        let broadcaster = tokio::spawn(self.broadcaster.run());

        // None of these return on their own; reaching here means a task panicked
        tokio::select! {
            result = report_listener => error!("Report listener stopped: {:?}", result),
            result = ack_listener => error!("Acknowledgment listener stopped: {:?}", result),
            result = broadcaster => error!("Telemetry broadcaster stopped: {:?}", result),
        }
    }
}

/// Receive loop for one port.
///
/// Datagrams are handled one at a time in arrival order, so a later report
/// always ends up as the active emergency.
async fn listen(socket: UdpSocket, port: Port, dispatcher: Dispatcher, max_datagram_bytes: usize) {
    let mut buf = vec![0u8; max_datagram_bytes];
    let mut consecutive_errors = 0u32;

    loop {
        let (len, from) = match socket.recv_from(&mut buf).await {
            Ok(received) => {
                consecutive_errors = 0;
                received
            }
            Err(e) => {
                consecutive_errors = consecutive_errors.saturating_add(1);
                let pause = recv_backoff(consecutive_errors);
                error!(
                    "{:?} port receive error ({} in a row), retrying in {:?}: {}",
                    port, consecutive_errors, pause, e
                );
                time::sleep(pause).await;
                continue;
            }
        };

        let data = &buf[..len];
        let result = match port {
            Port::Report => dispatcher.handle_datagram(data, from).await,
            Port::Ack => dispatcher.handle_ack_datagram(data, from).await,
        };

        match result {
            Ok(delivery) if delivery.is_complete() => {
                info!("Datagram from {} relayed to {:?}", from, delivery.sent)
            }
            Ok(delivery) => warn!(
                "Datagram from {} relayed to {:?}, failed for {:?}",
                from, delivery.sent, delivery.failed
            ),
            Err(e) => warn!("Dropped datagram from {} on {:?} port: {}", from, port, e),
        }
    }
}
