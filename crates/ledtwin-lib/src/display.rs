//! Display sink — the four raster primitives the renderer relies on.

use crate::led::{LED_COUNT, Rgb};

/// A pixel strip the render scheduler writes to.
///
/// `clear` and `set_pixel` only touch a pending buffer; nothing becomes
/// visible until `show`.
pub trait DisplaySink: Send {
    /// Turn every pixel in the pending buffer off.
    fn clear(&mut self);
    fn set_pixel(&mut self, index: usize, color: Rgb);
    /// Push the pending buffer to the physical (or simulated) strip.
    fn show(&mut self) -> std::io::Result<()>;
    /// Global brightness, `0.0..=1.0`.
    fn set_brightness(&mut self, level: f32);
}

/// One shown frame: `Some(color)` for lit pixels.
pub type Frame = [Option<Rgb>; LED_COUNT];

/// In-memory display for unit and integration tests.
///
/// Always compiled (zero runtime cost), hidden from public docs.
#[doc(hidden)]
pub mod mock {
    use super::*;

    /// A recorded display call.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum DisplayOp {
        Clear,
        SetPixel(usize, Rgb),
        Show,
        SetBrightness(f32),
    }

    /// Records every call and every frame passed to `show`.
    #[derive(Debug, Default)]
    pub struct MockDisplay {
        pending: Frame,
        /// All calls in order.
        pub ops: Vec<DisplayOp>,
        /// Frames captured at each `show`.
        pub frames: Vec<Frame>,
        pub brightness: Option<f32>,
        /// If true, `show` returns an error (the frame is still recorded).
        pub fail_show: bool,
    }

    impl MockDisplay {
        pub fn new() -> Self {
            Self::default()
        }

        /// The most recently shown frame.
        pub fn last_frame(&self) -> Option<&Frame> {
            self.frames.last()
        }

        /// Number of `show` calls so far.
        pub fn show_count(&self) -> usize {
            self.frames.len()
        }
    }

    impl DisplaySink for MockDisplay {
        fn clear(&mut self) {
            self.pending = [None; LED_COUNT];
            self.ops.push(DisplayOp::Clear);
        }

        fn set_pixel(&mut self, index: usize, color: Rgb) {
            if let Some(slot) = self.pending.get_mut(index) {
                *slot = Some(color);
            }
            self.ops.push(DisplayOp::SetPixel(index, color));
        }

        fn show(&mut self) -> std::io::Result<()> {
            self.ops.push(DisplayOp::Show);
            self.frames.push(self.pending);
            if self.fail_show {
                return Err(std::io::Error::other("mock: show failure injected"));
            }
            Ok(())
        }

        fn set_brightness(&mut self, level: f32) {
            self.brightness = Some(level);
            self.ops.push(DisplayOp::SetBrightness(level));
        }
    }
}
