//! Keyboard handling
//!
//! Camera keys are read as held state every frame; the rest fire once per
//! press from the window event queue.

use glfw::Key;
use topo_engine::foundation::math::Vec3;
use topo_engine::render::camera::{FORWARD, LEFT, UP};

/// Camera step per frame in world units
pub const MOVE_STEP: f32 = 1.0;
/// Step multiplier while Shift is held
pub const FAST_MULTIPLIER: f32 = 10.0;
/// Camera yaw per frame in radians
pub const ROTATE_STEP: f32 = 0.01;

/// One-shot commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Close the window
    Quit,
    /// Re-read the geometry and converter effects from disk
    ReloadEffects,
    /// Write the normalised depth buffer to a PNG
    SaveDepthSnapshot,
}

impl Command {
    /// Command bound to a key press
    pub const fn for_key(key: Key) -> Option<Self> {
        match key {
            Key::Escape => Some(Self::Quit),
            Key::Minus | Key::KpSubtract => Some(Self::ReloadEffects),
            Key::F12 => Some(Self::SaveDepthSnapshot),
            _ => None,
        }
    }
}

/// Camera change requested by the held keys
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMotion {
    /// Camera-space translation
    pub translation: Vec3,
    /// Rotation about [`CameraMotion::axis`] in radians
    pub rotation: f32,
}

impl CameraMotion {
    /// Axis the camera turns about
    pub const fn axis() -> Vec3 {
        UP
    }

    /// Read the camera keys through `held`
    pub fn from_keys(held: impl Fn(Key) -> bool) -> Self {
        let step = if held(Key::LeftShift) || held(Key::RightShift) {
            MOVE_STEP * FAST_MULTIPLIER
        } else {
            MOVE_STEP
        };

        let mut translation = Vec3::zeros();
        for (key, direction) in [
            (Key::Up, FORWARD),
            (Key::Down, -FORWARD),
            (Key::Left, LEFT),
            (Key::Right, -LEFT),
        ] {
            if held(key) {
                translation += direction * step;
            }
        }

        let mut rotation = 0.0;
        if held(Key::Kp7) {
            rotation += ROTATE_STEP;
        }
        if held(Key::Kp9) {
            rotation -= ROTATE_STEP;
        }

        Self { translation, rotation }
    }

    /// Nothing to apply
    pub fn is_idle(&self) -> bool {
        self.translation == Vec3::zeros() && self.rotation == 0.0
    }
}
