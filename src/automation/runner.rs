//! Automation runner - owns the worker thread for the Drop Controller.
//!
//! At most one worker runs at a time. Starting while a run is active stops
//! and joins the old worker before the new one is spawned, so events from
//! two runs never interleave.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::automation::config::ConfigStore;
use crate::automation::interrupt::InterruptMonitor;
use crate::automation::queue::{create_event_queue, CycleResult, EngineEvent, EventKind, EventSink};
use crate::automation::state::DropController;
use crate::capture::TitleMatch;
use crate::platform::SharedDesktop;
use crate::recognition::Recognizers;

struct Worker {
    run: u64,
    handle: JoinHandle<CycleResult>,
}

pub struct Engine {
    desktop: SharedDesktop,
    recognizers: Arc<Recognizers>,
    config: Arc<ConfigStore>,
    title_match: TitleMatch,
    monitor: InterruptMonitor,
    sender: Sender<EngineEvent>,
    receiver: Mutex<Option<Receiver<EngineEvent>>>,
    worker: Mutex<Option<Worker>>,
    runs: AtomicU64,
}

impl Engine {
    pub fn new(
        desktop: SharedDesktop,
        recognizers: Arc<Recognizers>,
        config: Arc<ConfigStore>,
        title_match: TitleMatch,
    ) -> Self {
        let probe = desktop.clone();
        let monitor = InterruptMonitor::new().with_key_probe(move || probe.stop_key_pressed());
        let (sender, receiver) = create_event_queue();
        Self {
            desktop,
            recognizers,
            config,
            title_match,
            monitor,
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            runs: AtomicU64::new(0),
        }
    }

    /// Shared timing profile, for reload/save/reset from the front end.
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    /// Stop handle for the current and future runs.
    pub fn monitor(&self) -> &InterruptMonitor {
        &self.monitor
    }

    /// Takes the event receiver. Only the first caller gets it.
    pub fn events(&self) -> Option<Receiver<EngineEvent>> {
        self.receiver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a new run and returns its number.
    ///
    /// Window acquisition happens on the worker, so this returns without
    /// waiting for the game.
    pub fn start(&self) -> Result<u64> {
        let mut worker = self.lock_worker();
        if let Some(active) = worker.take() {
            if !active.handle.is_finished() {
                crate::log(&format!("Run {} still active; stopping it first", active.run));
                self.monitor.request_stop();
            }
            join(active);
        }
        self.monitor.reset();

        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let events = EventSink::new(run, self.sender.clone());
        let mut controller = DropController::new(
            self.desktop.clone(),
            self.recognizers.clone(),
            self.config.clone(),
            self.title_match.clone(),
            self.monitor.clone(),
            events.clone(),
        )
        .context("Failed to set up the drop controller")?;

        let handle = thread::Builder::new()
            .name(format!("drop-run-{}", run))
            .spawn(move || {
                let result = controller.run();
                crate::log(&format!(
                    "Run {} finished after {} drops: {}",
                    run,
                    controller.drops(),
                    result
                ));
                events.send(EventKind::RunFinished(result.clone()));
                result
            })
            .context("Failed to spawn automation thread")?;

        crate::log(&format!("Run {} started", run));
        *worker = Some(Worker { run, handle });
        Ok(run)
    }

    /// Requests the active run to stop. Does not wait for it.
    pub fn stop(&self) {
        if self.is_running() {
            crate::log("Stop requested");
        }
        self.monitor.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.lock_worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Blocks until the active run ends; `None` if nothing was running or
    /// the worker panicked.
    pub fn wait(&self) -> Option<CycleResult> {
        let active = self.lock_worker().take()?;
        join(active)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.monitor.request_stop();
        if let Some(active) = self.lock_worker().take() {
            join(active);
        }
    }
}

fn join(worker: Worker) -> Option<CycleResult> {
    match worker.handle.join() {
        Ok(result) => Some(result),
        Err(e) => {
            crate::log(&format!("Run {} thread panicked: {:?}", worker.run, e));
            None
        }
    }
}
