//! Potion Dropper engine
//!
//! Automates the potion-brewing puzzle: finds the game window, reads the
//! falling pair and the board from screen pixels, and clicks the pair into
//! place, cycle after cycle, until stopped.

pub mod automation;
pub mod capture;
pub mod error;
pub mod paths;
pub mod platform;
pub mod recognition;

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;

pub use automation::{Engine, EngineEvent, EventKind, InterruptMonitor};
pub use error::{ConfigError, EngineError};

/// Logs a message to both console and log file with timestamp.
pub fn log(msg: &str) {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    let line = format!("[{}] {}\n", timestamp, msg);
    print!("{}", line);
    let log_path = paths::get_logs_dir().join("potion_dropper.log");
    if let Ok(mut file) = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        let _ = file.write_all(line.as_bytes());
    }
}
