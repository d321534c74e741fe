//! Window locator: finds the game window and keeps its client rectangle
//! current.
//!
//! A window matches when its title contains one of the configured keywords
//! (case-insensitive), its class equals the configured class (if any) and
//! its owning executable is one of the configured process names (if any).

use regex::{Regex, RegexBuilder};
use std::time::Duration;

use crate::automation::config::{Param, ProfileView};
use crate::automation::interrupt::InterruptMonitor;
use crate::automation::retry::RetryPolicy;
use crate::error::{ConfigError, EngineError};
use crate::platform::{Rect, SharedDesktop, WindowId, WindowInfo};

/// Which top-level window is the game.
#[derive(Clone, Debug, PartialEq)]
pub struct TitleMatch {
    pub keywords: Vec<String>,
    pub class_name: Option<String>,
    /// Executable names, compared case-insensitively. Empty = any process.
    pub process_names: Vec<String>,
}

impl Default for TitleMatch {
    fn default() -> Self {
        Self {
            keywords: vec!["The Legend of Pirates Online".to_string(), "TLOPO".to_string()],
            class_name: None,
            process_names: vec!["tlopo.exe".to_string()],
        }
    }
}

/// A located window and its client rectangle in screen coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowHandle {
    pub id: WindowId,
    pub title: String,
    pub rect: Rect,
}

pub struct WindowLocator {
    desktop: SharedDesktop,
    title_match: TitleMatch,
    title_pattern: Regex,
}

impl WindowLocator {
    pub fn new(desktop: SharedDesktop, title_match: TitleMatch) -> Result<Self, ConfigError> {
        if title_match.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "window title match needs at least one keyword".to_string(),
            ));
        }
        let pattern = title_match
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| regex::escape(k.trim()))
            .collect::<Vec<_>>()
            .join("|");
        let title_pattern = RegexBuilder::new(&pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ConfigError::Invalid(format!("window title pattern: {}", e)))?;

        Ok(Self {
            desktop,
            title_match,
            title_pattern,
        })
    }

    pub fn matches(&self, info: &WindowInfo) -> bool {
        if !self.title_pattern.is_match(&info.title) {
            return false;
        }
        if let Some(class) = &self.title_match.class_name {
            if &info.class_name != class {
                return false;
            }
        }
        self.title_match.process_names.is_empty()
            || self
                .title_match
                .process_names
                .iter()
                .any(|p| p.eq_ignore_ascii_case(&info.process_name))
    }

    /// Finds the game window within the retry budget.
    pub fn find(
        &self,
        retry: &RetryPolicy,
        monitor: &InterruptMonitor,
        quantum: Duration,
    ) -> Result<WindowHandle, EngineError> {
        retry.run_while(
            "Window search",
            monitor,
            quantum,
            |e| matches!(e, EngineError::WindowNotFound(_)),
            |_| self.find_once(),
        )
    }

    fn find_once(&self) -> Result<WindowHandle, EngineError> {
        let candidates: Vec<WindowInfo> = self
            .desktop
            .list_windows()
            .into_iter()
            .filter(|w| self.matches(w))
            .collect();

        if candidates.is_empty() {
            return Err(EngineError::WindowNotFound(format!(
                "no window titled like {:?}. Is the game running?",
                self.title_match.keywords
            )));
        }

        let mut last_err = None;
        for info in candidates {
            match self.usable_rect(info.id) {
                Ok(rect) => {
                    crate::log(&format!(
                        "Found game window \"{}\" ({}) at ({}, {}) {}x{}",
                        info.title, info.process_name, rect.x, rect.y, rect.width, rect.height
                    ));
                    return Ok(WindowHandle {
                        id: info.id,
                        title: info.title,
                        rect,
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| EngineError::WindowNotFound("no usable window".into())))
    }

    /// Current client rectangle of a previously found window.
    pub fn rect(&self, handle: &WindowHandle) -> Result<Rect, EngineError> {
        self.usable_rect(handle.id)
    }

    fn usable_rect(&self, id: WindowId) -> Result<Rect, EngineError> {
        let rect = self.desktop.client_rect(id).ok_or_else(|| {
            EngineError::WindowNotFound("window closed or minimized".to_string())
        })?;
        if rect.is_empty() {
            return Err(EngineError::WindowNotFound(
                "window has an empty client area".to_string(),
            ));
        }
        if !rect.intersects(&self.desktop.screen_bounds()) {
            return Err(EngineError::WindowNotFound(format!(
                "window is off-screen at ({}, {})",
                rect.x, rect.y
            )));
        }
        Ok(rect)
    }

    /// Refreshes the handle's rectangle; if the window is gone, searches
    /// for it again once with the full retry budget.
    pub fn revalidate(
        &self,
        handle: &WindowHandle,
        retry: &RetryPolicy,
        monitor: &InterruptMonitor,
        quantum: Duration,
    ) -> Result<WindowHandle, EngineError> {
        monitor.checkpoint()?;
        match self.rect(handle) {
            Ok(rect) => Ok(WindowHandle {
                rect,
                ..handle.clone()
            }),
            Err(e) => {
                crate::log(&format!("Game window lost ({}), searching again", e));
                self.find(retry, monitor, quantum)
            }
        }
    }
}

/// Window search budget from the profile: linear backoff.
pub fn find_policy(view: &ProfileView) -> RetryPolicy {
    let backoff = view.ms(Param::WindowFindBackoffMs);
    RetryPolicy::new(view.count(Param::WindowFindAttempts), backoff).with_backoff(backoff)
}
