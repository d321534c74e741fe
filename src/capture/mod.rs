//! Game window discovery and frame capture.
//!
//! This module provides:
//! - Window discovery and revalidation (`WindowLocator`)
//! - Client-area pixel capture (`FrameCapturer`)

pub mod screenshot;
pub mod window;

pub use screenshot::{Frame, FrameCapturer};
pub use window::{find_policy, TitleMatch, WindowHandle, WindowLocator};
