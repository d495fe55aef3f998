//! Render scheduler — turns registry state into display frames.
//!
//! Two loops run on their own threads:
//!
//! - the **steady** loop renders every LED's effective lit state on a fixed
//!   tick, toggling blinking LEDs each tick;
//! - the **scroll** loop sweeps a single lit pixel across the strip while the
//!   registry's `scrolling` flag is set.
//!
//! Each frame is produced while holding the registry lock and then the
//! display lock (always in that order), so frames from the two loops never
//! interleave and never observe a half-applied registry write.
//!
//! [`SteadyRenderer`] and [`scroll_frame`] hold the frame logic and take no
//! locks, so they are tested directly against a [`MockDisplay`].
//!
//! [`MockDisplay`]: crate::display::mock::MockDisplay

use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::display::DisplaySink;
use crate::led::{LED_COUNT, Led, LedRegistry, Rgb, SharedRegistry};
use crate::shutdown::ShutdownToken;

pub const DEFAULT_STEADY_TICK: Duration = Duration::from_millis(500);
pub const DEFAULT_SCROLL_STEP: Duration = Duration::from_millis(50);
pub const DEFAULT_SCROLL_IDLE: Duration = Duration::from_millis(500);

/// Loop intervals for the render scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderTimings {
    /// Interval between steady-state frames.
    pub steady_tick: Duration,
    /// Delay between scroll positions.
    pub scroll_step: Duration,
    /// Poll interval of the scroll loop while not scrolling.
    pub scroll_idle: Duration,
}

impl Default for RenderTimings {
    fn default() -> Self {
        Self {
            steady_tick: DEFAULT_STEADY_TICK,
            scroll_step: DEFAULT_SCROLL_STEP,
            scroll_idle: DEFAULT_SCROLL_IDLE,
        }
    }
}

/// Per-LED lit state of the previous steady frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlinkPhase {
    lit: [bool; LED_COUNT],
}

impl BlinkPhase {
    /// Start from each LED's stored status.
    pub fn from_registry(registry: &LedRegistry) -> Self {
        Self {
            lit: registry.leds().map(|led| led.status),
        }
    }

    /// Whether LED `index` was lit in the previous frame.
    pub fn is_lit(&self, index: usize) -> bool {
        self.lit[index]
    }

    pub fn lit(&self) -> [bool; LED_COUNT] {
        self.lit
    }

    /// Compute the next frame's lit states and remember them.
    ///
    /// A lit blinking LED flips relative to the previous frame; every other
    /// LED simply follows its status.
    pub fn advance(&mut self, leds: &[Led; LED_COUNT]) -> [bool; LED_COUNT] {
        for (lit, led) in self.lit.iter_mut().zip(leds) {
            *lit = if led.status && led.blink {
                !*lit
            } else {
                led.status
            };
        }
        self.lit
    }
}

/// Result of one steady tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was shown with these LEDs lit.
    Rendered { lit: [bool; LED_COUNT] },
    /// The registry was scrolling; nothing was computed or written.
    Skipped,
}

/// Steady-state frame logic, decoupled from locking and timing.
#[derive(Debug, Clone)]
pub struct SteadyRenderer {
    phase: BlinkPhase,
}

impl SteadyRenderer {
    pub fn new(registry: &LedRegistry) -> Self {
        Self {
            phase: BlinkPhase::from_registry(registry),
        }
    }

    pub fn phase(&self) -> &BlinkPhase {
        &self.phase
    }

    /// Render one steady frame unless the registry is scrolling.
    pub fn tick<D: DisplaySink + ?Sized>(
        &mut self,
        registry: &LedRegistry,
        display: &mut D,
    ) -> TickOutcome {
        if registry.is_scrolling() {
            return TickOutcome::Skipped;
        }
        let lit = self.phase.advance(registry.leds());
        let pixels = registry
            .leds()
            .iter()
            .enumerate()
            .filter(|&(i, _)| lit[i])
            .map(|(i, led)| (i, led.color));
        draw(display, pixels);
        TickOutcome::Rendered { lit }
    }
}

/// Show only pixel `index` in its stored color.
pub fn scroll_frame<D: DisplaySink + ?Sized>(registry: &LedRegistry, index: usize, display: &mut D) {
    draw(display, [(index, registry.led(index).color)]);
}

/// Show an empty frame.
pub fn blank_frame<D: DisplaySink + ?Sized>(display: &mut D) {
    draw(display, std::iter::empty());
}

fn draw<D: DisplaySink + ?Sized>(display: &mut D, pixels: impl IntoIterator<Item = (usize, Rgb)>) {
    display.clear();
    for (index, color) in pixels {
        display.set_pixel(index, color);
    }
    if let Err(e) = display.show() {
        log::warn!("[render] display show failed: {e}");
    }
}

fn lock_display<D>(display: &Mutex<D>) -> MutexGuard<'_, D> {
    display.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f` holding the registry lock, then the display lock.
fn with_frame<D, R>(
    registry: &SharedRegistry,
    display: &Mutex<D>,
    f: impl FnOnce(&LedRegistry, &mut D) -> R,
) -> R {
    let reg = registry.lock();
    let mut display = lock_display(display);
    f(&*reg, &mut *display)
}

fn run_steady_loop<D: DisplaySink>(
    registry: &SharedRegistry,
    display: &Mutex<D>,
    tick: Duration,
    token: &ShutdownToken,
) {
    let mut renderer = registry.read(SteadyRenderer::new);
    while token.sleep(tick) {
        with_frame(registry, display, |reg, d| renderer.tick(reg, d));
    }
    log::debug!("[render] steady loop stopped");
}

fn run_scroll_loop<D: DisplaySink>(
    registry: &SharedRegistry,
    display: &Mutex<D>,
    timings: RenderTimings,
    token: &ShutdownToken,
) {
    while !token.is_cancelled() {
        if !registry.read(LedRegistry::is_scrolling) {
            if !token.sleep(timings.scroll_idle) {
                break;
            }
            continue;
        }
        for index in 0..LED_COUNT {
            let drawn = with_frame(registry, display, |reg, d| {
                if !reg.is_scrolling() {
                    return false;
                }
                scroll_frame(reg, index, d);
                true
            });
            if !drawn || !token.sleep(timings.scroll_step) {
                break;
            }
        }
        with_frame(registry, display, |_, d| blank_frame(d));
    }
    log::debug!("[render] scroll loop stopped");
}

/// Owns the two render threads.
pub struct RenderScheduler<D: DisplaySink + 'static> {
    display: Arc<Mutex<D>>,
    token: ShutdownToken,
    handles: Vec<JoinHandle<()>>,
}

impl<D: DisplaySink + 'static> RenderScheduler<D> {
    /// Start the steady and scroll loops.
    ///
    /// Both stop when `token` is cancelled.
    pub fn spawn(
        registry: SharedRegistry,
        display: Arc<Mutex<D>>,
        timings: RenderTimings,
        token: ShutdownToken,
    ) -> io::Result<Self> {
        let mut scheduler = Self {
            display: Arc::clone(&display),
            token: token.clone(),
            handles: Vec::with_capacity(2),
        };

        let (reg, disp, tok) = (registry.clone(), Arc::clone(&display), token.clone());
        let steady = thread::Builder::new()
            .name("render-steady".into())
            .spawn(move || run_steady_loop(&reg, &disp, timings.steady_tick, &tok));
        scheduler.push(steady)?;

        let scroll = thread::Builder::new()
            .name("render-scroll".into())
            .spawn(move || run_scroll_loop(&registry, &display, timings, &token));
        scheduler.push(scroll)?;

        log::info!(
            "[render] started (steady {:?}, scroll step {:?})",
            timings.steady_tick,
            timings.scroll_step
        );
        Ok(scheduler)
    }

    // On spawn failure the already-running loop is stopped before returning.
    fn push(&mut self, handle: io::Result<JoinHandle<()>>) -> io::Result<()> {
        match handle {
            Ok(h) => {
                self.handles.push(h);
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    /// The display shared with the render threads.
    pub fn display(&self) -> &Arc<Mutex<D>> {
        &self.display
    }

    fn stop(&mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                log::warn!("[render] render thread panicked");
            }
        }
    }

    /// Cancel and join both loops, then leave the display blank.
    pub fn shutdown(mut self) {
        self.stop();
        blank_frame(&mut *lock_display(&self.display));
        log::info!("[render] stopped");
    }
}
