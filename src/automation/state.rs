//! Drop Controller state machine.
//!
//! One cycle runs Detecting → Validating → Targeting → Executing → Settling
//! and loops back to Detecting. Every state checks the interrupt monitor
//! first; a stop anywhere ends in `Interrupted` without issuing further
//! input. Failures that survive their retry budget end in `Stopped`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::automation::config::{ConfigStore, DelayProfile, Param, ProfileView};
use crate::automation::input::{ClickTiming, MouseDriver};
use crate::automation::interrupt::InterruptMonitor;
use crate::automation::placement::{self, Placement, PlacementStrategy};
use crate::automation::queue::{CycleResult, DropState, EventKind, EventSink};
use crate::automation::retry::RetryPolicy;
use crate::capture::{find_policy, Frame, FrameCapturer, TitleMatch, WindowHandle, WindowLocator};
use crate::error::{ConfigError, EngineError};
use crate::platform::{MouseButton, SharedDesktop};
use crate::recognition::{DetectedPair, PairKey, PieceKind, Recognizers};

/// Extra wait added per failed validation attempt.
const VALIDATION_BACKOFF: Duration = Duration::from_millis(100);

/// Drop Controller context: collaborators plus the state of the current
/// cycle.
pub struct DropController {
    locator: WindowLocator,
    capturer: FrameCapturer,
    recognizers: Arc<Recognizers>,
    strategy: Box<dyn PlacementStrategy>,
    mouse: MouseDriver,
    config: Arc<ConfigStore>,
    monitor: InterruptMonitor,
    events: EventSink,

    state: DropState,
    /// Profile snapshot for the current cycle.
    profile: Arc<DelayProfile>,
    window: Option<WindowHandle>,
    pair: Option<DetectedPair>,
    pair_key: Option<PairKey>,
    placement: Option<Placement>,
    last_drop: Option<Instant>,
    drops: u64,
    finished: Option<CycleResult>,
}

impl DropController {
    pub fn new(
        desktop: SharedDesktop,
        recognizers: Arc<Recognizers>,
        config: Arc<ConfigStore>,
        title_match: TitleMatch,
        monitor: InterruptMonitor,
        events: EventSink,
    ) -> Result<Self, ConfigError> {
        let strategy = placement::from_config(&recognizers.layout.placement)?;
        let profile = config.snapshot();
        Ok(Self {
            locator: WindowLocator::new(desktop.clone(), title_match)?,
            capturer: FrameCapturer::new(desktop.clone()),
            recognizers,
            strategy,
            mouse: MouseDriver::new(desktop),
            config,
            monitor,
            events,
            state: DropState::Idle,
            profile,
            window: None,
            pair: None,
            pair_key: None,
            placement: None,
            last_drop: None,
            drops: 0,
            finished: None,
        })
    }

    pub fn state(&self) -> DropState {
        self.state
    }

    /// Pieces dropped so far in this run.
    pub fn drops(&self) -> u64 {
        self.drops
    }

    /// Runs cycles until a stop request or a failure ends the run.
    pub fn run(&mut self) -> CycleResult {
        crate::log(&format!(
            "Automation started with {} placement (Esc or Ctrl+Shift+Q to stop)",
            self.strategy.name()
        ));
        loop {
            if let Some(result) = self.step() {
                if result != CycleResult::Dropped {
                    return result;
                }
            }
        }
    }

    /// Advances the state machine by one state.
    ///
    /// Returns the cycle result when a cycle ends: `Dropped` after
    /// Settling, or the terminal result once the run is over.
    pub fn step(&mut self) -> Option<CycleResult> {
        if let Some(result) = &self.finished {
            return Some(result.clone());
        }
        if let Err(e) = self.monitor.checkpoint() {
            return Some(self.finish(e));
        }

        let outcome = match self.state {
            DropState::Idle => self.begin(),
            DropState::Detecting => self.detect(),
            DropState::Validating => self.validate(),
            DropState::Targeting => self.target(),
            DropState::Executing => self.execute(),
            DropState::Settling => self.settle(),
            DropState::Stopped | DropState::Interrupted => Ok(None),
        };
        match outcome {
            Ok(result) => result,
            Err(e) => Some(self.finish(e)),
        }
    }

    fn view(&self) -> ProfileView<'_> {
        self.profile.view(self.pair_key.as_ref())
    }

    fn transition(&mut self, next: DropState) {
        if next != self.state {
            crate::log(&format!("Drop {}: {}", self.drops + 1, next));
            self.state = next;
            self.events.send(EventKind::StateChanged(next));
        }
    }

    /// Ends the run, mapping the error onto a cycle result.
    fn finish(&mut self, err: EngineError) -> CycleResult {
        let result = match &err {
            EngineError::Interrupted => CycleResult::Interrupted,
            EngineError::WindowNotFound(_) | EngineError::Input(_) => CycleResult::WindowLost,
            EngineError::ValidationFailed(_) => CycleResult::ValidationFailed,
            EngineError::DetectionFailed(_)
            | EngineError::Capture(_)
            | EngineError::Recognizer(_) => CycleResult::DetectionFailed,
        };

        match &err {
            EngineError::Interrupted => crate::log(&format!(
                "Automation stopped during {} after {} drops",
                self.state, self.drops
            )),
            _ => crate::log(&format!(
                "Automation failed during {}: {} ({})",
                self.state, err, result
            )),
        }

        let terminal = if result == CycleResult::Interrupted {
            DropState::Interrupted
        } else {
            DropState::Stopped
        };
        self.transition(terminal);
        self.events.send(EventKind::CycleFinished(result.clone()));
        self.finished = Some(result.clone());
        result
    }

    /// Current window handle, re-acquired if it went stale.
    fn refresh_window(&mut self) -> Result<WindowHandle, EngineError> {
        let view = self.view();
        let policy = find_policy(&view);
        let quantum = view.quantum();
        let handle = match &self.window {
            Some(handle) => self
                .locator
                .revalidate(handle, &policy, &self.monitor, quantum)?,
            None => self.locator.find(&policy, &self.monitor, quantum)?,
        };
        self.window = Some(handle.clone());
        Ok(handle)
    }

    fn capture_window(&mut self) -> Result<Frame, EngineError> {
        let handle = self.refresh_window()?;
        self.capturer.capture(&handle.rect)
    }

    /// Detection budget: `validation_max_attempts` tries spaced by
    /// `validation_retry_delay_ms`.
    fn detection_policy(&self) -> RetryPolicy {
        let view = self.view();
        RetryPolicy::new(
            view.count(Param::ValidationMaxAttempts),
            view.ms(Param::ValidationRetryDelayMs),
        )
    }

    /// Reads the spawn again; anything short of a window or recognizer
    /// fault counts as a validation failure.
    fn reread_pair(&mut self) -> Result<DetectedPair, EngineError> {
        let frame = match self.capture_window() {
            Err(EngineError::Capture(msg)) => return Err(EngineError::ValidationFailed(msg)),
            other => other?,
        };
        match self.recognizers.piece.detect_pair(&frame) {
            Err(EngineError::DetectionFailed(msg)) => Err(EngineError::ValidationFailed(msg)),
            other => other,
        }
    }

    /// After a flip the spawn must still hold the same two pieces, in
    /// whatever orientation the flip left them.
    fn confirm_flip(&mut self, expected: &DetectedPair) -> Result<(), EngineError> {
        let (policy, quantum) = {
            let view = self.view();
            (
                RetryPolicy::new(
                    view.count(Param::ValidationMaxAttempts),
                    view.ms(Param::ValidationRetryDelayMs),
                ),
                view.quantum(),
            )
        };
        let wanted = piece_set(expected);
        let monitor = self.monitor.clone();
        policy.run_while(
            "Flip check",
            &monitor,
            quantum,
            |e| matches!(e, EngineError::ValidationFailed(_)),
            |_| {
                let seen = self.reread_pair()?;
                if piece_set(&seen) == wanted {
                    Ok(())
                } else {
                    Err(EngineError::ValidationFailed(format!(
                        "after flip expected {} and {}, saw {}",
                        expected.pivot, expected.partner, seen
                    )))
                }
            },
        )
    }

    fn begin(&mut self) -> Result<Option<CycleResult>, EngineError> {
        self.profile = self.config.snapshot();
        self.refresh_window()?;
        self.transition(DropState::Detecting);
        Ok(None)
    }

    fn detect(&mut self) -> Result<Option<CycleResult>, EngineError> {
        self.pair = None;
        self.pair_key = None;
        self.placement = None;

        let policy = self.detection_policy();
        let quantum = self.view().quantum();
        let monitor = self.monitor.clone();
        let pair = policy.run("Pair detection", &monitor, quantum, |_| {
            let frame = self.capture_window()?;
            self.recognizers.piece.detect_pair(&frame)
        })?;

        crate::log(&format!("Detected {}", pair));
        self.pair_key = Some(pair.key());
        self.pair = Some(pair);
        self.transition(DropState::Validating);
        Ok(None)
    }

    fn validate(&mut self) -> Result<Option<CycleResult>, EngineError> {
        let expected = self
            .pair
            .clone()
            .ok_or_else(|| EngineError::DetectionFailed("no pair to validate".to_string()))?;

        let (park_delay, initial_delay, policy, quantum) = {
            let view = self.view();
            (
                view.ms(Param::ValidationMouseParkDelayMs),
                view.ms(Param::ValidationInitialDelayMs),
                RetryPolicy::new(
                    view.count(Param::ValidationMaxAttempts),
                    view.ms(Param::ValidationRetryDelayMs),
                )
                .with_backoff(VALIDATION_BACKOFF),
                view.quantum(),
            )
        };

        let handle = self.refresh_window()?;
        if let Some(point) = self.recognizers.layout.parking_point(&handle.rect) {
            self.mouse.jump_to(point, &self.monitor)?;
            self.monitor.sleep(park_delay, quantum)?;
        }
        self.monitor.sleep(initial_delay, quantum)?;

        let monitor = self.monitor.clone();
        policy.run_while(
            "Pair validation",
            &monitor,
            quantum,
            |e| matches!(e, EngineError::ValidationFailed(_)),
            |_| {
                let seen = self.reread_pair()?;
                if seen == expected {
                    Ok(())
                } else {
                    Err(EngineError::ValidationFailed(format!(
                        "expected {}, saw {}",
                        expected, seen
                    )))
                }
            },
        )?;

        self.transition(DropState::Targeting);
        Ok(None)
    }

    fn target(&mut self) -> Result<Option<CycleResult>, EngineError> {
        let policy = self.detection_policy();
        let quantum = self.view().quantum();
        let monitor = self.monitor.clone();
        let board = policy.run("Board read", &monitor, quantum, |_| {
            let frame = self.capture_window()?;
            self.recognizers.board.detect_board(&frame)
        })?;

        let pair = self
            .pair
            .as_ref()
            .ok_or_else(|| EngineError::DetectionFailed("no pair to place".to_string()))?;
        if board.unknown_count() > 0 {
            crate::log(&format!(
                "Board read with {} unrecognised cells",
                board.unknown_count()
            ));
        }
        let chosen = self.strategy.choose(pair, &board);
        crate::log(&format!(
            "Target column {} (width {}){}",
            chosen.column,
            chosen.width,
            if chosen.flip { ", flipped" } else { "" }
        ));

        self.placement = Some(chosen);
        self.transition(DropState::Executing);
        Ok(None)
    }

    fn execute(&mut self) -> Result<Option<CycleResult>, EngineError> {
        let placement = self
            .placement
            .ok_or_else(|| EngineError::DetectionFailed("no target chosen".to_string()))?;
        let pair = self
            .pair
            .clone()
            .ok_or_else(|| EngineError::DetectionFailed("no pair to place".to_string()))?;

        let view = self.view();
        let quantum = view.quantum();
        let interval = view.ms(Param::AutoLoopIntervalMs);
        let move_duration = view.ms(Param::MouseMoveDurationMs);
        let jitter = view.count(Param::MouseJitterPx);
        let flip = ClickTiming {
            before: view.ms(Param::PreRightClickSleepMs),
            hold: view.ms(Param::RightClickHoldMs),
            after: view.ms(Param::FlipClickDelayMs),
        };
        let place = ClickTiming {
            before: view.ms(Param::PreLeftClickSleepMs),
            hold: view.ms(Param::LeftClickHoldMs),
            after: view.ms(Param::PostLeftClickSleepMs),
        };

        if let Some(last) = self.last_drop {
            let since = last.elapsed();
            if since < interval {
                self.monitor.sleep(interval - since, quantum)?;
            }
        }

        let handle = self.refresh_window()?;
        let target = self.recognizers.layout.drop_point(
            &handle.rect,
            placement.column,
            placement.width,
        );

        self.mouse.focus(handle.id, &self.monitor)?;
        self.mouse
            .glide_to(target, move_duration, jitter, &self.monitor, quantum)?;
        if placement.flip {
            self.mouse
                .click(MouseButton::Right, flip, &self.monitor, quantum)?;
            self.confirm_flip(&pair)?;
        }
        self.mouse
            .click(MouseButton::Left, place, &self.monitor, quantum)?;

        self.last_drop = Some(Instant::now());
        self.drops += 1;
        self.transition(DropState::Settling);
        Ok(None)
    }

    fn settle(&mut self) -> Result<Option<CycleResult>, EngineError> {
        let view = self.view();
        let quantum = view.quantum();
        let post_drop = view.ms(Param::PostDropSleepMs);
        let rescan = view.ms(Param::RescanAfterDropDelayMs);

        self.monitor.sleep(post_drop, quantum)?;
        self.monitor.sleep(rescan, quantum)?;

        crate::log(&format!("Drop {} complete", self.drops));
        self.events
            .send(EventKind::CycleFinished(CycleResult::Dropped));

        // Next cycle sees any settings change made meanwhile.
        self.profile = self.config.snapshot();
        self.transition(DropState::Detecting);
        Ok(Some(CycleResult::Dropped))
    }
}

/// The two kinds of a pair, order ignored.
fn piece_set(pair: &DetectedPair) -> [&PieceKind; 2] {
    let mut kinds = [&pair.pivot, &pair.partner];
    kinds.sort();
    kinds
}
