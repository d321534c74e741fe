//! Desktop backend seam.
//!
//! The engine talks to the operating system only through [`Desktop`]:
//! window enumeration, client geometry, pixel grabs and mouse input.
//! `win32` is the real backend; `fake` scripts a desktop for tests.

#[cfg(test)]
pub mod fake;
#[cfg(windows)]
pub mod win32;

use anyhow::Result;
use image::RgbaImage;
use std::sync::Arc;

/// Opaque OS window identifier (an HWND on Windows).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowId(pub usize);

/// A rectangle in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True if the two rectangles share at least one pixel.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// What the desktop reports about one top-level window.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub title: String,
    pub class_name: String,
    /// Executable file name of the owning process, e.g. `tlopo.exe`.
    pub process_name: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

/// Operating system services used by the automation engine.
pub trait Desktop: Send + Sync {
    /// Visible, titled top-level windows in Z order.
    fn list_windows(&self) -> Vec<WindowInfo>;

    /// Client area of a window in screen coordinates, or `None` if the
    /// window no longer exists or is minimized.
    fn client_rect(&self, id: WindowId) -> Option<Rect>;

    /// Bounds of the whole virtual screen.
    fn screen_bounds(&self) -> Rect;

    /// Grabs the pixels of a screen rectangle.
    fn grab(&self, rect: &Rect) -> Result<RgbaImage>;

    fn cursor_position(&self) -> Result<(i32, i32)>;

    fn move_cursor(&self, x: i32, y: i32) -> Result<()>;

    fn press(&self, button: MouseButton) -> Result<()>;

    fn release(&self, button: MouseButton) -> Result<()>;

    /// Brings a window to the foreground so synthetic input reaches it.
    fn focus(&self, id: WindowId) -> Result<()>;

    /// Polls the emergency stop key.
    fn stop_key_pressed(&self) -> bool {
        false
    }
}

/// Shared handle to the desktop backend.
pub type SharedDesktop = Arc<dyn Desktop>;

/// Creates the desktop backend for the current OS.
#[cfg(windows)]
pub fn create_desktop() -> Result<SharedDesktop> {
    Ok(Arc::new(win32::Win32Desktop::new()))
}

#[cfg(not(windows))]
pub fn create_desktop() -> Result<SharedDesktop> {
    Err(anyhow::anyhow!(
        "No desktop backend for this platform; only Windows is supported"
    ))
}
