use std::collections::HashMap;
use winit::event::{ElementState, MouseButton};
use winit::keyboard::KeyCode;

/// Keyboard and mouse state, sampled once per frame.
#[derive(Default)]
pub struct Input {
    keys_current: HashMap<KeyCode, ElementState>,
    keys_previous: HashMap<KeyCode, ElementState>,
    mouse_buttons_current: HashMap<MouseButton, ElementState>,
    mouse_delta: (f64, f64),
}

impl Input {
    pub fn handle_key_input(&mut self, key: KeyCode, state: ElementState) {
        self.keys_current.insert(key, state);
    }

    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        self.mouse_buttons_current.insert(button, state);
    }

    pub fn handle_mouse_motion(&mut self, delta: (f64, f64)) {
        self.mouse_delta.0 += delta.0;
        self.mouse_delta.1 += delta.1;
    }

    /// Call at the end of each frame.
    pub fn update(&mut self) {
        self.keys_previous = self.keys_current.clone();
        self.mouse_delta = (0.0, 0.0);
    }

    // Key state queries
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_current.get(&key) == Some(&ElementState::Pressed)
            && self.keys_previous.get(&key) != Some(&ElementState::Pressed)
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys_current.get(&key) == Some(&ElementState::Pressed)
    }

    // Mouse state queries
    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons_current.get(&button) == Some(&ElementState::Pressed)
    }

    pub fn mouse_delta(&self) -> (f64, f64) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressed_is_true_for_one_frame_only() {
        let mut input = Input::default();
        input.handle_key_input(KeyCode::F1, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::F1));
        assert!(input.is_key_down(KeyCode::F1));

        input.update();
        assert!(!input.is_key_pressed(KeyCode::F1));
        assert!(input.is_key_down(KeyCode::F1));
    }

    #[test]
    fn mouse_delta_accumulates_until_update() {
        let mut input = Input::default();
        input.handle_mouse_motion((2.0, -1.0));
        input.handle_mouse_motion((3.0, 4.0));
        assert_eq!(input.mouse_delta(), (5.0, 3.0));
        input.update();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }
}
