//! Relay configuration.
//!
//! Read once at startup from a TOML file. Every key is optional; a missing
//! file means the built-in defaults, which match a single-laptop deployment
//! where every console runs on localhost.
//!
//! ```toml
//! [listen]
//! bind_ip = "0.0.0.0"
//! base_port = 5005        # acknowledgments on base_port + 10 unless ack_port is set
//!
//! [sinks]
//! responder = "127.0.0.1:5006"
//! hospital = "127.0.0.1:5007"
//! dashboard = "192.168.137.161:5008"
//! reporter = "192.168.137.161:5009"
//!
//! [relay]
//! hop_id = "RELAY"
//! responder_speed_kmh = 40.0
//! telemetry_interval_secs = 3
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result, bail};
use log::info;
use serde::Deserialize;

use crate::relay::protocol::{
    ACK_PORT_OFFSET, DEFAULT_DASHBOARD_PORT, DEFAULT_HOP_ID, DEFAULT_HOSPITAL_PORT,
    DEFAULT_MAX_DATAGRAM_BYTES, DEFAULT_REPORT_PORT, DEFAULT_REPORTER_PORT,
    DEFAULT_RESPONDER_PORT, DEFAULT_RESPONDER_SPEED_KMH, DEFAULT_TELEMETRY_INTERVAL_SECS,
};
use crate::relay::transport::SinkAddrs;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubConfig {
    pub listen: ListenConfig,
    pub sinks: SinksConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    pub bind_ip: IpAddr,
    pub base_port: u16,
    pub ack_port: Option<u16>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            base_port: DEFAULT_REPORT_PORT,
            ack_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SinksConfig {
    pub responder: SocketAddr,
    pub hospital: SocketAddr,
    pub dashboard: SocketAddr,
    pub reporter: SocketAddr,
}

impl Default for SinksConfig {
    fn default() -> Self {
        let local = |port| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
        Self {
            responder: local(DEFAULT_RESPONDER_PORT),
            hospital: local(DEFAULT_HOSPITAL_PORT),
            dashboard: local(DEFAULT_DASHBOARD_PORT),
            reporter: local(DEFAULT_REPORTER_PORT),
        }
    }
}

impl SinksConfig {
    pub fn addrs(&self) -> SinkAddrs {
        SinkAddrs {
            responder: self.responder,
            hospital: self.hospital,
            dashboard: self.dashboard,
            reporter: self.reporter,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    pub hop_id: String,
    pub responder_speed_kmh: f64,
    pub telemetry_interval_secs: u64,
    pub max_datagram_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            hop_id: DEFAULT_HOP_ID.to_string(),
            responder_speed_kmh: DEFAULT_RESPONDER_SPEED_KMH,
            telemetry_interval_secs: DEFAULT_TELEMETRY_INTERVAL_SECS,
            max_datagram_bytes: DEFAULT_MAX_DATAGRAM_BYTES,
        }
    }
}

impl HubConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Load from `path` if it exists, otherwise use the defaults.
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let config = Self::load(path)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn ack_port(&self) -> u16 {
        self.listen
            .ack_port
            .unwrap_or_else(|| self.listen.base_port.saturating_add(ACK_PORT_OFFSET))
    }

    pub fn report_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen.bind_ip, self.listen.base_port)
    }

    pub fn ack_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen.bind_ip, self.ack_port())
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.listen.base_port != 0 && self.listen.base_port == self.ack_port() {
            bail!("report and acknowledgment ports are both {}", self.ack_port());
        }
        if self.relay.hop_id.trim().is_empty() {
            bail!("relay.hop_id must not be empty");
        }
        if self.relay.telemetry_interval_secs == 0 {
            bail!("relay.telemetry_interval_secs must be at least 1");
        }
        if self.relay.max_datagram_bytes == 0 {
            bail!("relay.max_datagram_bytes must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_ports() {
        let config = HubConfig::default();
        assert_eq!(config.listen.base_port, 5005);
        assert_eq!(config.ack_port(), 5015);
        assert_eq!(config.sinks.responder.port(), 5006);
        assert_eq!(config.sinks.hospital.port(), 5007);
        assert_eq!(config.sinks.dashboard.port(), 5008);
        assert_eq!(config.sinks.reporter.port(), 5009);
        assert_eq!(config.relay.hop_id, "RELAY");
        assert_eq!(config.relay.responder_speed_kmh, 40.0);
        assert_eq!(config.relay.telemetry_interval_secs, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: HubConfig = toml::from_str("").unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: HubConfig = toml::from_str(
            r#"
            [listen]
            base_port = 6000

            [sinks]
            dashboard = "192.168.137.161:5008"
            "#,
        )
        .unwrap();

        assert_eq!(config.listen.base_port, 6000);
        assert_eq!(config.ack_port(), 6010);
        assert_eq!(config.sinks.dashboard, "192.168.137.161:5008".parse().unwrap());
        assert_eq!(config.sinks.hospital.port(), 5007);
        assert_eq!(config.relay, RelayConfig::default());
    }

    #[test]
    fn test_explicit_ack_port() {
        let config: HubConfig = toml::from_str("[listen]\nbase_port = 0\nack_port = 0\n").unwrap();
        assert_eq!(config.ack_port(), 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(toml::from_str::<HubConfig>("[relay]\nhop = \"X\"\n").is_err());
        assert!(toml::from_str::<HubConfig>("[listen]\nbase_port = \"x\"\n").is_err());
    }

    #[test]
    fn test_validate_rejects_unusable_values() {
        let mut config = HubConfig::default();
        config.listen.ack_port = Some(5005);
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.relay.telemetry_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = HubConfig::default();
        config.relay.hop_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = HubConfig::load_or_default("does/not/exist/relay.toml").unwrap();
        assert_eq!(config, HubConfig::default());
    }

    #[test]
    fn test_shipped_config_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/relay.toml");
        let config = HubConfig::load(path).unwrap();
        assert!(config.validate().is_ok());
    }
}
