//! Outbound delivery.
//!
//! Delivery is at-most-once: every message is one UDP datagram, sent once,
//! never retried, never confirmed. A failed send is reported to the caller
//! and the remaining messages of a fan-out still go out.
//!
//! Dashboard-bound messages are additionally published on an in-process
//! broadcast feed while anyone is subscribed. Publishing never waits on
//! subscribers.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::{debug, warn};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use super::error::HubError;
use super::protocol::{DashboardMessage, Outbound, Route};

/// Messages a slow feed subscriber may fall behind before it starts lagging
pub const DASHBOARD_FEED_CAPACITY: usize = 64;

/// Where each downstream sink listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkAddrs {
    pub responder: SocketAddr,
    pub hospital: SocketAddr,
    pub dashboard: SocketAddr,
    pub reporter: SocketAddr,
}

impl SinkAddrs {
    pub fn addr(&self, route: Route) -> SocketAddr {
        match route {
            Route::Responder => self.responder,
            Route::Hospital => self.hospital,
            Route::Dashboard => self.dashboard,
            Route::Reporter => self.reporter,
        }
    }
}

/// Routes that accepted or rejected their datagram during a fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub sent: Vec<Route>,
    pub failed: Vec<Route>,
}

impl Delivery {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Transport {
    socket: Arc<UdpSocket>,
    sinks: SinkAddrs,
    dashboard_feed: broadcast::Sender<DashboardMessage>,
}

impl Transport {
    /// Bind an ephemeral outbound socket on `bind_ip`.
    pub async fn bind(bind_ip: IpAddr, sinks: SinkAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?;
        let (dashboard_feed, _) = broadcast::channel(DASHBOARD_FEED_CAPACITY);

        Ok(Self {
            socket: Arc::new(socket),
            sinks,
            dashboard_feed,
        })
    }

    pub fn sinks(&self) -> &SinkAddrs {
        &self.sinks
    }

    pub fn subscribe_dashboard(&self) -> broadcast::Receiver<DashboardMessage> {
        self.dashboard_feed.subscribe()
    }

    /// Send one message to its sink.
    pub async fn send(&self, message: &Outbound) -> Result<usize, HubError> {
        let route = message.route();
        let addr = self.sinks.addr(route);
        let bytes = message.to_bytes()?;

        if let Outbound::Dashboard(msg) = message {
            if self.dashboard_feed.receiver_count() > 0 {
                // Every receiver may drop between the check and the send
                let _ = self.dashboard_feed.send(msg.clone());
            }
        }

        let sent = self
            .socket
            .send_to(&bytes, addr)
            .await
            .map_err(|source| HubError::Send {
                route,
                addr,
                source,
            })?;

        debug!(
            "Sent {} bytes ({}) to {} sink at {}",
            sent,
            message.message_type().unwrap_or("report"),
            route,
            addr
        );
        Ok(sent)
    }

    /// Send every message in order, best effort.
    pub async fn fan_out(&self, messages: &[Outbound]) -> Delivery {
        let mut delivery = Delivery::default();

        for message in messages {
            let route = message.route();
            match self.send(message).await {
                Ok(_) => delivery.sent.push(route),
                Err(e) => {
                    warn!("{}", e);
                    delivery.failed.push(route);
                }
            }
        }

        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::protocol::{
        EnrichedReport, ReporterMessage, TireReading, TireStatus, TpmsSnapshot,
    };
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::time::timeout;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn create_test_sink() -> (UdpSocket, SocketAddr) {
        let socket = UdpSocket::bind((LOCALHOST, 0)).await.unwrap();
        let addr = socket.local_addr().unwrap();
        (socket, addr)
    }

    async fn recv_json(socket: &UdpSocket) -> serde_json::Value {
        let mut buf = [0u8; 4096];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("timed out waiting for datagram")
            .unwrap();
        serde_json::from_slice(&buf[..len]).unwrap()
    }

    fn create_test_tpms() -> TpmsSnapshot {
        TpmsSnapshot::from_fn(|_| TireReading {
            pressure_psi: 30.0,
            temperature_c: 30.0,
            status: TireStatus::Ok,
        })
    }

    fn create_test_update() -> DashboardMessage {
        DashboardMessage::TpmsUpdate {
            tpms_data: create_test_tpms(),
            timestamp: "t".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_routes_by_message_kind() {
        let (dashboard, dashboard_addr) = create_test_sink().await;
        let (reporter, reporter_addr) = create_test_sink().await;
        let sinks = SinkAddrs {
            responder: dashboard_addr,
            hospital: dashboard_addr,
            dashboard: dashboard_addr,
            reporter: reporter_addr,
        };
        let transport = Transport::bind(LOCALHOST, sinks).await.unwrap();

        let help = Outbound::Reporter(ReporterMessage::HelpComing {
            helper_id: "CAR_02".to_string(),
            eta_minutes: 1.0,
            distance_km: 0.5,
            timestamp: "t".to_string(),
        });
        tokio_test::assert_ok!(transport.send(&help).await);
        tokio_test::assert_ok!(transport.send(&Outbound::Dashboard(create_test_update())).await);

        assert_eq!(recv_json(&reporter).await["type"], "HELP_COMING");
        assert_eq!(recv_json(&dashboard).await["type"], "TPMS_UPDATE");
    }

    #[tokio::test]
    async fn test_dashboard_messages_are_mirrored_to_feed() {
        let (_dashboard, dashboard_addr) = create_test_sink().await;
        let sinks = SinkAddrs {
            responder: dashboard_addr,
            hospital: dashboard_addr,
            dashboard: dashboard_addr,
            reporter: dashboard_addr,
        };
        let transport = Transport::bind(LOCALHOST, sinks).await.unwrap();
        let mut feed = transport.subscribe_dashboard();

        transport.send(&Outbound::Dashboard(create_test_update())).await.unwrap();

        assert_eq!(feed.recv().await.unwrap(), create_test_update());
    }

    #[tokio::test]
    async fn test_dashboard_send_without_subscribers() {
        let (dashboard, dashboard_addr) = create_test_sink().await;
        let sinks = SinkAddrs {
            responder: dashboard_addr,
            hospital: dashboard_addr,
            dashboard: dashboard_addr,
            reporter: dashboard_addr,
        };
        let transport = Transport::bind(LOCALHOST, sinks).await.unwrap();

        // A subscriber that went away leaves nobody listening on the feed
        drop(transport.subscribe_dashboard());
        assert_eq!(transport.dashboard_feed.receiver_count(), 0);

        tokio_test::assert_ok!(transport.send(&Outbound::Dashboard(create_test_update())).await);
        assert_eq!(recv_json(&dashboard).await["type"], "TPMS_UPDATE");

        // Late subscribers only see what is sent after they join
        let mut feed = transport.subscribe_dashboard();
        assert!(feed.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fan_out_continues_after_failure() {
        let (sink, sink_addr) = create_test_sink().await;
        // An IPv6 destination cannot be reached from an IPv4 socket
        let unreachable: SocketAddr = "[::1]:9".parse().unwrap();
        let sinks = SinkAddrs {
            responder: unreachable,
            hospital: sink_addr,
            dashboard: sink_addr,
            reporter: sink_addr,
        };
        let transport = Transport::bind(LOCALHOST, sinks).await.unwrap();

        let messages = [
            Outbound::Reporter(ReporterMessage::HelpComing {
                helper_id: "CAR_02".to_string(),
                eta_minutes: 1.0,
                distance_km: 0.5,
                timestamp: "t".to_string(),
            }),
            Outbound::Responder(EnrichedReport {
                report: Default::default(),
                tpms_data: create_test_tpms(),
                relay_timestamp: "t".to_string(),
            }),
            Outbound::Dashboard(create_test_update()),
        ];

        let delivery = transport.fan_out(&messages).await;
        assert_eq!(delivery.sent, vec![Route::Reporter, Route::Dashboard]);
        assert_eq!(delivery.failed, vec![Route::Responder]);
        assert!(!delivery.is_complete());

        assert_eq!(recv_json(&sink).await["type"], "HELP_COMING");
        assert_eq!(recv_json(&sink).await["type"], "TPMS_UPDATE");
    }
}
