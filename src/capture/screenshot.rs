//! Frame capture of the game's client area.

use chrono::{DateTime, Local};
use image::RgbaImage;

use crate::error::EngineError;
use crate::platform::{Rect, SharedDesktop};

/// Immutable RGBA pixels of one screen rectangle.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbaImage,
    rect: Rect,
    captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbaImage, rect: Rect) -> Self {
        Self {
            image,
            rect,
            captured_at: Local::now(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Screen rectangle the pixels were taken from.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Stateless wrapper over the desktop's pixel grab.
#[derive(Clone)]
pub struct FrameCapturer {
    desktop: SharedDesktop,
}

impl FrameCapturer {
    pub fn new(desktop: SharedDesktop) -> Self {
        Self { desktop }
    }

    pub fn capture(&self, rect: &Rect) -> Result<Frame, EngineError> {
        if rect.is_empty() {
            return Err(EngineError::Capture(format!(
                "zero-sized capture rectangle {}x{}",
                rect.width, rect.height
            )));
        }
        let image = self
            .desktop
            .grab(rect)
            .map_err(|e| EngineError::Capture(e.to_string()))?;
        if image.width() == 0 || image.height() == 0 {
            return Err(EngineError::Capture("grab returned an empty image".into()));
        }
        Ok(Frame::new(image, *rect))
    }
}
