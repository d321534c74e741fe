//! Mouse input for dropping pieces.
//!
//! Moves are smoothed over several small steps so the game registers the
//! cursor travelling; clicks are press, hold, release with configurable
//! pauses around them. Every pause goes through the interrupt monitor.

use rand::Rng;
use std::time::Duration;

use crate::automation::interrupt::InterruptMonitor;
use crate::error::EngineError;
use crate::platform::{MouseButton, SharedDesktop, WindowId};

/// Minimum number of intermediate positions in a smoothed move.
const MIN_MOVE_STEPS: u32 = 6;

/// Nominal time per move step.
const MOVE_STEP_MS: u64 = 10;

/// Pauses around one click.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClickTiming {
    pub before: Duration,
    pub hold: Duration,
    pub after: Duration,
}

pub struct MouseDriver {
    desktop: SharedDesktop,
}

impl MouseDriver {
    pub fn new(desktop: SharedDesktop) -> Self {
        Self { desktop }
    }

    /// Number of steps a move of `duration` is split into.
    pub fn move_steps(duration: Duration) -> u32 {
        let steps = (duration.as_millis() as u64 / MOVE_STEP_MS).min(u32::MAX as u64) as u32;
        steps.max(MIN_MOVE_STEPS)
    }

    /// Moves the cursor from where it is to `target` over `duration`.
    ///
    /// The endpoint is offset by up to `jitter_px` in each axis, and each
    /// intermediate point is jittered the same way.
    pub fn glide_to(
        &self,
        target: (i32, i32),
        duration: Duration,
        jitter_px: u32,
        monitor: &InterruptMonitor,
        quantum: Duration,
    ) -> Result<(i32, i32), EngineError> {
        monitor.checkpoint()?;
        let (sx, sy) = self.desktop.cursor_position().map_err(input_err)?;
        let (ex, ey) = (target.0 + jitter(jitter_px), target.1 + jitter(jitter_px));

        let steps = Self::move_steps(duration);
        let step_delay = duration / steps;
        for i in 1..=steps {
            monitor.checkpoint()?;
            let t = i as f32 / steps as f32;
            let (mut x, mut y) = (
                sx + ((ex - sx) as f32 * t).round() as i32,
                sy + ((ey - sy) as f32 * t).round() as i32,
            );
            if i < steps {
                x += jitter(jitter_px);
                y += jitter(jitter_px);
            }
            self.desktop.move_cursor(x, y).map_err(input_err)?;
            monitor.sleep(step_delay, quantum)?;
        }
        Ok((ex, ey))
    }

    /// Brings the game to the foreground so the input reaches it.
    pub fn focus(&self, window: WindowId, monitor: &InterruptMonitor) -> Result<(), EngineError> {
        monitor.checkpoint()?;
        self.desktop.focus(window).map_err(input_err)
    }

    /// Jumps straight to `point`, used for parking the cursor.
    pub fn jump_to(
        &self,
        point: (i32, i32),
        monitor: &InterruptMonitor,
    ) -> Result<(), EngineError> {
        monitor.checkpoint()?;
        self.desktop.move_cursor(point.0, point.1).map_err(input_err)
    }

    /// Press, hold, release. A stop during the hold still releases the
    /// button before reporting the interruption.
    pub fn click(
        &self,
        button: MouseButton,
        timing: ClickTiming,
        monitor: &InterruptMonitor,
        quantum: Duration,
    ) -> Result<(), EngineError> {
        monitor.sleep(timing.before, quantum)?;
        monitor.checkpoint()?;
        self.desktop.press(button).map_err(input_err)?;

        let held = monitor.sleep(timing.hold, quantum);
        let released = self.desktop.release(button).map_err(input_err);
        if held.is_err() {
            crate::log(&format!("Stop requested while holding {:?} button; released", button));
        }
        held?;
        released?;

        monitor.sleep(timing.after, quantum)
    }
}

fn jitter(px: u32) -> i32 {
    if px == 0 {
        return 0;
    }
    let px = px.min(i32::MAX as u32) as i32;
    rand::thread_rng().gen_range(-px..=px)
}

fn input_err(e: anyhow::Error) -> EngineError {
    EngineError::Input(e.to_string())
}
