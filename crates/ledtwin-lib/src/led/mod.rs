//! LED strip state — color type, registry, status indicators.

mod color;
mod indicators;
mod registry;

pub use color::{Rgb, format_color, parse_color};
pub use indicators::{mark_message_sent, show_connect_failure, show_connected, show_connecting};
pub use registry::{LED_COUNT, Led, LedRegistry, SharedRegistry};
