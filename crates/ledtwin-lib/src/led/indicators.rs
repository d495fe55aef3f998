//! Status indicators — registry patterns shown during the session lifecycle.

use super::color::Rgb;
use super::registry::{LED_COUNT, LedRegistry};

/// Blue sweep while the hub connection is being established.
pub fn show_connecting(registry: &mut LedRegistry) {
    registry.set_all_leds_color(Rgb::BLUE);
    registry.start_scrolling();
}

/// Connection established: stop the sweep and turn everything off.
pub fn show_connected(registry: &mut LedRegistry) {
    registry.set_all_leds_off();
}

/// Connection abandoned: first LED blinks red.
pub fn show_connect_failure(registry: &mut LedRegistry) {
    registry.set_all_leds_off();
    registry.set_led(0, true, Rgb::RED, true);
}

/// Telemetry message `n` was sent: LED `n % 8` blinks green.
pub fn mark_message_sent(registry: &mut LedRegistry, n: usize) {
    registry.set_led(n % LED_COUNT, true, Rgb::GREEN, true);
}
