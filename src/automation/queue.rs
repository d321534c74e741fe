//! Event queue from the automation worker to whoever drives the engine.
//!
//! Uses a std::sync::mpsc channel. The worker sends state changes and cycle
//! results; the front end drains them at its own pace.

use chrono::{DateTime, Local};
use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Drop Controller states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropState {
    Idle,
    Detecting,
    Validating,
    Targeting,
    Executing,
    Settling,
    Stopped,
    Interrupted,
}

impl fmt::Display for DropState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropState::Idle => write!(f, "Idle"),
            DropState::Detecting => write!(f, "Detecting pair"),
            DropState::Validating => write!(f, "Validating pair"),
            DropState::Targeting => write!(f, "Choosing column"),
            DropState::Executing => write!(f, "Dropping"),
            DropState::Settling => write!(f, "Settling"),
            DropState::Stopped => write!(f, "Stopped"),
            DropState::Interrupted => write!(f, "Interrupted"),
        }
    }
}

/// Outcome of one drop cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleResult {
    Dropped,
    Interrupted,
    DetectionFailed,
    ValidationFailed,
    WindowLost,
}

impl fmt::Display for CycleResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleResult::Dropped => write!(f, "Dropped"),
            CycleResult::Interrupted => write!(f, "Interrupted"),
            CycleResult::DetectionFailed => write!(f, "Detection failed"),
            CycleResult::ValidationFailed => write!(f, "Validation failed"),
            CycleResult::WindowLost => write!(f, "Window lost"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    StateChanged(DropState),
    /// One cycle ended.
    CycleFinished(CycleResult),
    /// The worker exited; carries the result that ended the run.
    RunFinished(CycleResult),
}

/// An event tagged with the run that produced it.
#[derive(Clone, Debug)]
pub struct EngineEvent {
    /// Run number, starting at 1 for the first `Engine::start`.
    pub run: u64,
    pub kind: EventKind,
    pub at: DateTime<Local>,
}

impl EngineEvent {
    pub fn new(run: u64, kind: EventKind) -> Self {
        Self {
            run,
            kind,
            at: Local::now(),
        }
    }
}

/// Sending half bound to one run. Send failures are ignored: nobody
/// listening is not an error for the worker.
#[derive(Clone, Debug)]
pub struct EventSink {
    run: u64,
    sender: Sender<EngineEvent>,
}

impl EventSink {
    pub fn new(run: u64, sender: Sender<EngineEvent>) -> Self {
        Self { run, sender }
    }

    pub fn send(&self, kind: EventKind) {
        let _ = self.sender.send(EngineEvent::new(self.run, kind));
    }
}

/// Creates a new event queue.
///
/// The channel is unbounded; events queue up if the reader is slow.
pub fn create_event_queue() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    channel()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_arrive_in_order_with_run_tag() {
        let (sender, receiver) = create_event_queue();
        let sink = EventSink::new(3, sender);

        sink.send(EventKind::StateChanged(DropState::Detecting));
        sink.send(EventKind::CycleFinished(CycleResult::Dropped));

        let first = receiver.recv().unwrap();
        assert_eq!(first.run, 3);
        assert_eq!(first.kind, EventKind::StateChanged(DropState::Detecting));
        let second = receiver.recv().unwrap();
        assert_eq!(second.kind, EventKind::CycleFinished(CycleResult::Dropped));
        assert!(second.at >= first.at);
    }

    #[test]
    fn test_send_without_listener_is_silent() {
        let (sender, receiver) = create_event_queue();
        drop(receiver);
        EventSink::new(1, sender).send(EventKind::RunFinished(CycleResult::Interrupted));
    }

    #[test]
    fn test_display() {
        assert_eq!(DropState::Executing.to_string(), "Dropping");
        assert_eq!(CycleResult::WindowLost.to_string(), "Window lost");
    }
}
