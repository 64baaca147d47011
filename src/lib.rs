//! Roadside emergency relay.
//!
//! Receives emergency reports and responder acknowledgments over UDP,
//! enriches reports with tire telemetry, and fans them out to the responder,
//! hospital, dashboard and reporting consoles.

pub mod config;
pub mod relay;
