//! Terminal display sink — draws the strip as a row of ANSI color blocks.

use std::io::{self, Write};

use ledtwin_lib::display::{DisplaySink, Frame};
use ledtwin_lib::led::{LED_COUNT, Rgb};

const LIT: &str = "\u{25CF}";
const UNLIT: &str = "\u{00B7}";

/// Renders each shown frame on a single, redrawn terminal line.
///
/// Frames identical to the previous one are not redrawn, so blinking
/// produces one write per toggle rather than one per tick. Brightness is
/// recorded but not applied to terminal colors.
pub struct TerminalDisplay<W: Write + Send> {
    out: W,
    pending: Frame,
    shown: Option<Frame>,
    brightness: f32,
}

impl TerminalDisplay<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            pending: [None; LED_COUNT],
            shown: None,
            brightness: 1.0,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

/// One frame as an ANSI string (no line control).
pub fn render_line(frame: &Frame) -> String {
    let mut line = String::from("[");
    for pixel in frame {
        match pixel {
            Some(Rgb { r, g, b }) => line.push_str(&format!("\x1b[38;2;{r};{g};{b}m{LIT}\x1b[0m")),
            None => line.push_str(UNLIT),
        }
    }
    line.push(']');
    line
}

impl<W: Write + Send> DisplaySink for TerminalDisplay<W> {
    fn clear(&mut self) {
        self.pending = [None; LED_COUNT];
    }

    fn set_pixel(&mut self, index: usize, color: Rgb) {
        if let Some(slot) = self.pending.get_mut(index) {
            *slot = Some(color);
        }
    }

    fn show(&mut self) -> io::Result<()> {
        if self.shown == Some(self.pending) {
            return Ok(());
        }
        write!(self.out, "\r{}\x1b[K", render_line(&self.pending))?;
        self.out.flush()?;
        self.shown = Some(self.pending);
        Ok(())
    }

    fn set_brightness(&mut self, level: f32) {
        self.brightness = level.clamp(0.0, 1.0);
        log::info!("[display] brightness {:.0}%", self.brightness * 100.0);
    }
}
