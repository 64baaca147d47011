pub mod broadcaster;
pub mod dispatcher;
pub mod error;
pub mod geo;
pub mod hub;
pub mod protocol;
pub mod state;
pub mod tpms;
pub mod transport;


// Re-exports for convenience
pub use error::HubError;
pub use hub::RelayHub;
