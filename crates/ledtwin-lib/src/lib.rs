//! LedTwin — an 8-LED status strip kept in sync with an IoT hub device twin.

pub mod config;
pub mod display;
pub mod error;
pub mod hub;
pub mod led;
pub mod methods;
pub mod reconnect;
pub mod render;
pub mod session;
pub mod shutdown;
pub mod telemetry;
pub mod twin;

pub use error::LedtwinError;
