//! Platform layer for the deferred renderer.
//!
//! - Window management via winit
//! - Vulkan surface creation via ash-window
//! - Keyboard input forwarding

mod input;
mod window;

pub use input::{HeldKeys, KeyAction, KeyCode};
pub use window::{Surface, Window, extent_of, is_zero_area};
