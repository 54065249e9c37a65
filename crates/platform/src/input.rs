//! Keyboard input.
//!
//! Key events are forwarded to the scene unchanged as down/up transitions.
//! [`HeldKeys`] tracks which keys are currently down so continuous actions
//! (camera movement) can be derived each frame.

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// A key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down(KeyCode),
    Up(KeyCode),
}

impl KeyAction {
    /// Maps a winit key event. OS auto-repeat and unidentified keys are
    /// dropped.
    pub fn from_event(event: &KeyEvent) -> Option<Self> {
        if event.repeat {
            return None;
        }
        let PhysicalKey::Code(key) = event.physical_key else {
            return None;
        };
        Some(Self::from_state(key, event.state))
    }

    pub fn from_state(key: KeyCode, state: ElementState) -> Self {
        match state {
            ElementState::Pressed => KeyAction::Down(key),
            ElementState::Released => KeyAction::Up(key),
        }
    }
}

/// Keys currently held down.
#[derive(Debug, Default, Clone)]
pub struct HeldKeys {
    pressed: HashSet<KeyCode>,
}

impl HeldKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, action: KeyAction) {
        match action {
            KeyAction::Down(key) => {
                self.pressed.insert(key);
            }
            KeyAction::Up(key) => {
                self.pressed.remove(&key);
            }
        }
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// `+1` when only `positive` is held, `-1` when only `negative` is,
    /// else `0`.
    pub fn axis(&self, positive: KeyCode, negative: KeyCode) -> i32 {
        i32::from(self.is_pressed(positive)) - i32::from(self.is_pressed(negative))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_state_maps_transitions() {
        assert_eq!(
            KeyAction::from_state(KeyCode::KeyW, ElementState::Pressed),
            KeyAction::Down(KeyCode::KeyW)
        );
        assert_eq!(
            KeyAction::from_state(KeyCode::KeyW, ElementState::Released),
            KeyAction::Up(KeyCode::KeyW)
        );
    }

    #[test]
    fn test_held_keys_track_down_and_up() {
        let mut keys = HeldKeys::new();
        keys.apply(KeyAction::Down(KeyCode::KeyA));
        assert!(keys.is_pressed(KeyCode::KeyA));
        keys.apply(KeyAction::Up(KeyCode::KeyA));
        assert!(!keys.is_pressed(KeyCode::KeyA));
    }

    #[test]
    fn test_axis_cancels_opposites() {
        let mut keys = HeldKeys::new();
        assert_eq!(keys.axis(KeyCode::KeyW, KeyCode::KeyS), 0);
        keys.apply(KeyAction::Down(KeyCode::KeyW));
        assert_eq!(keys.axis(KeyCode::KeyW, KeyCode::KeyS), 1);
        keys.apply(KeyAction::Down(KeyCode::KeyS));
        assert_eq!(keys.axis(KeyCode::KeyW, KeyCode::KeyS), 0);
        keys.apply(KeyAction::Up(KeyCode::KeyW));
        assert_eq!(keys.axis(KeyCode::KeyW, KeyCode::KeyS), -1);
    }
}
