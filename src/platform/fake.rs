//! Scripted desktop for tests: one game window, a painted client frame and
//! a recorder for every input event the engine sends.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Desktop, MouseButton, Rect, WindowId, WindowInfo};
use crate::automation::InterruptMonitor;

pub const GAME_WINDOW: WindowId = WindowId(0x1001);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Move(i32, i32),
    Down(MouseButton),
    Up(MouseButton),
    Focus,
}

pub struct FakeDesktop {
    windows: Mutex<Vec<(WindowInfo, Rect)>>,
    frame: Mutex<RgbaImage>,
    cursor: Mutex<(i32, i32)>,
    events: Mutex<Vec<InputEvent>>,
    grabs: AtomicUsize,
    list_calls: AtomicUsize,
    failing_grabs: AtomicUsize,
    vanish_after_grabs: Mutex<Option<usize>>,
    later_frame: Mutex<Option<(usize, RgbaImage)>>,
    stop_after_moves: Mutex<Option<(usize, InterruptMonitor)>>,
}

impl FakeDesktop {
    /// A desktop with the game window at `client` showing `frame`.
    pub fn with_game(client: Rect, frame: RgbaImage) -> Self {
        let info = WindowInfo {
            id: GAME_WINDOW,
            title: "The Legend of Pirates Online [BETA]".to_string(),
            class_name: "Panda".to_string(),
            process_name: "tlopo.exe".to_string(),
        };
        Self {
            windows: Mutex::new(vec![(info, client)]),
            frame: Mutex::new(frame),
            cursor: Mutex::new((0, 0)),
            events: Mutex::new(Vec::new()),
            grabs: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            failing_grabs: AtomicUsize::new(0),
            vanish_after_grabs: Mutex::new(None),
            later_frame: Mutex::new(None),
            stop_after_moves: Mutex::new(None),
        }
    }

    /// A desktop with no matching window at all.
    pub fn empty() -> Self {
        let desktop = Self::with_game(Rect::new(0, 0, 1, 1), RgbaImage::new(1, 1));
        desktop.close_window();
        desktop
    }

    pub fn close_window(&self) {
        self.windows.lock().unwrap().clear();
    }

    /// Moves or resizes the game window's client area.
    pub fn set_client_rect(&self, client: Rect) {
        for (info, rect) in self.windows.lock().unwrap().iter_mut() {
            if info.id == GAME_WINDOW {
                *rect = client;
            }
        }
    }

    /// Adds an unrelated window in front of the game.
    pub fn add_window(&self, info: WindowInfo, client: Rect) {
        self.windows.lock().unwrap().insert(0, (info, client));
    }

    /// The window disappears once `n` grabs have been served.
    pub fn vanish_after_grabs(&self, n: usize) {
        *self.vanish_after_grabs.lock().unwrap() = Some(n);
    }

    /// Grabs after the first `n` return `frame` instead.
    pub fn swap_frame_after_grabs(&self, n: usize, frame: RgbaImage) {
        *self.later_frame.lock().unwrap() = Some((n, frame));
    }

    /// The next `n` grabs fail as if the window were minimized.
    pub fn fail_next_grabs(&self, n: usize) {
        self.failing_grabs.store(n, Ordering::SeqCst);
    }

    /// Requests a stop on `monitor` as soon as the `n`th cursor move lands.
    pub fn stop_after_moves(&self, n: usize, monitor: InterruptMonitor) {
        *self.stop_after_moves.lock().unwrap() = Some((n, monitor));
    }

    pub fn events(&self) -> Vec<InputEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: InputEvent) {
        let moves = {
            let mut events = self.events.lock().unwrap();
            events.push(event);
            events
                .iter()
                .filter(|e| matches!(e, InputEvent::Move(..)))
                .count()
        };
        if let InputEvent::Move(..) = event {
            if let Some((n, monitor)) = self.stop_after_moves.lock().unwrap().as_ref() {
                if moves >= *n {
                    monitor.request_stop();
                }
            }
        }
    }
}

impl Desktop for FakeDesktop {
    fn list_windows(&self) -> Vec<WindowInfo> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .iter()
            .map(|(info, _)| info.clone())
            .collect()
    }

    fn client_rect(&self, id: WindowId) -> Option<Rect> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(_, rect)| *rect)
    }

    fn screen_bounds(&self) -> Rect {
        Rect::new(0, 0, 1920, 1080)
    }

    fn grab(&self, _rect: &Rect) -> Result<RgbaImage> {
        let served = self.grabs.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = *self.vanish_after_grabs.lock().unwrap() {
            if served >= limit {
                self.close_window();
            }
        }
        if self
            .failing_grabs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("window is minimized"));
        }
        if let Some((after, frame)) = self.later_frame.lock().unwrap().as_ref() {
            if served > *after {
                return Ok(frame.clone());
            }
        }
        Ok(self.frame.lock().unwrap().clone())
    }

    fn cursor_position(&self) -> Result<(i32, i32)> {
        Ok(*self.cursor.lock().unwrap())
    }

    fn move_cursor(&self, x: i32, y: i32) -> Result<()> {
        *self.cursor.lock().unwrap() = (x, y);
        self.record(InputEvent::Move(x, y));
        Ok(())
    }

    fn press(&self, button: MouseButton) -> Result<()> {
        self.record(InputEvent::Down(button));
        Ok(())
    }

    fn release(&self, button: MouseButton) -> Result<()> {
        self.record(InputEvent::Up(button));
        Ok(())
    }

    fn focus(&self, _id: WindowId) -> Result<()> {
        self.record(InputEvent::Focus);
        Ok(())
    }
}
