//! LED registry — authoritative state of the 8-LED strip and the scroll flag.
//!
//! The registry is plain data with no I/O. Rendering and twin
//! synchronization are the caller's job. Tasks share it through
//! [`SharedRegistry`], a cloneable handle created once per device session.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use super::color::Rgb;

/// Number of LEDs on the strip.
pub const LED_COUNT: usize = 8;

/// State of one LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Led {
    /// Lit (`true`) or unlit.
    pub status: bool,
    /// Whether a lit LED should oscillate.
    pub blink: bool,
    pub color: Rgb,
}

impl Default for Led {
    fn default() -> Self {
        Led {
            status: false,
            blink: false,
            color: Rgb::WHITE,
        }
    }
}

/// The 8 LEDs plus the global scrolling flag.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedRegistry {
    leds: [Led; LED_COUNT],
    scrolling: bool,
}

/// Panics on an out-of-range index.
fn check_index(index: usize) {
    assert!(
        index < LED_COUNT,
        "LED index {index} out of range (0..{LED_COUNT})"
    );
}

impl LedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn led(&self, index: usize) -> &Led {
        check_index(index);
        &self.leds[index]
    }

    pub fn leds(&self) -> &[Led; LED_COUNT] {
        &self.leds
    }

    pub fn is_scrolling(&self) -> bool {
        self.scrolling
    }

    pub fn set_color(&mut self, index: usize, color: Rgb) {
        check_index(index);
        self.leds[index].color = color;
    }

    pub fn set_status(&mut self, index: usize, on: bool) {
        check_index(index);
        self.leds[index].status = on;
    }

    pub fn set_blink(&mut self, index: usize, on: bool) {
        check_index(index);
        self.leds[index].blink = on;
    }

    /// Write all four attributes of one LED in a single update.
    pub fn set_led(&mut self, index: usize, status: bool, color: Rgb, blink: bool) {
        check_index(index);
        self.leds[index] = Led {
            status,
            blink,
            color,
        };
    }

    pub fn set_all_leds_color(&mut self, color: Rgb) {
        for led in &mut self.leds {
            led.color = color;
        }
    }

    /// Turn every LED off and stop scrolling. Colors and blink flags are kept.
    pub fn set_all_leds_off(&mut self) {
        self.scrolling = false;
        for led in &mut self.leds {
            led.status = false;
        }
    }

    pub fn start_scrolling(&mut self) {
        self.scrolling = true;
    }

    pub fn stop_scrolling(&mut self) {
        self.scrolling = false;
    }
}

/// Cloneable handle to a registry shared between the render threads, the hub
/// listeners and the foreground console.
///
/// Every access goes through one mutex, so a closure passed to [`update`]
/// is never observed half-applied by a render tick.
///
/// [`update`]: SharedRegistry::update
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<Mutex<LedRegistry>>,
}

impl SharedRegistry {
    pub fn new(registry: LedRegistry) -> Self {
        SharedRegistry {
            inner: Arc::new(Mutex::new(registry)),
        }
    }

    /// Lock the registry. A poisoned lock is recovered since the state is plain data.
    pub fn lock(&self) -> MutexGuard<'_, LedRegistry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a mutation under the lock and return its result.
    pub fn update<R>(&self, f: impl FnOnce(&mut LedRegistry) -> R) -> R {
        f(&mut self.lock())
    }

    /// Read from the registry under the lock.
    pub fn read<R>(&self, f: impl FnOnce(&LedRegistry) -> R) -> R {
        f(&self.lock())
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> LedRegistry {
        self.lock().clone()
    }
}
