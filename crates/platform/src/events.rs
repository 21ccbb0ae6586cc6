//! Window events reduced to what the engine loop reacts to.

pub use winit::keyboard::KeyCode;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::PhysicalKey;

/// An engine-level view of a window event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// The user asked to close the window.
    Quit,
    /// The window was minimized or fully hidden.
    Minimized,
    /// The window became visible again.
    Restored,
    KeyDown(KeyCode),
    /// The window wants a new frame.
    Redraw,
    Ignored,
}

/// Translates a winit window event.
///
/// `minimized` is the current suspend state; a non-zero resize only counts
/// as a restore when the window was minimized.
pub fn translate_window_event(event: &WindowEvent, minimized: bool) -> EngineEvent {
    match event {
        WindowEvent::CloseRequested => EngineEvent::Quit,
        WindowEvent::RedrawRequested => EngineEvent::Redraw,
        WindowEvent::Occluded(true) => EngineEvent::Minimized,
        WindowEvent::Occluded(false) => EngineEvent::Restored,
        WindowEvent::Resized(size) if size.width == 0 || size.height == 0 => {
            EngineEvent::Minimized
        }
        WindowEvent::Resized(_) if minimized => EngineEvent::Restored,
        WindowEvent::KeyboardInput { event, .. } => translate_key(event.physical_key, event.state),
        _ => EngineEvent::Ignored,
    }
}

/// Key presses become [`EngineEvent::KeyDown`]; releases are ignored.
pub fn translate_key(key: PhysicalKey, state: ElementState) -> EngineEvent {
    match (key, state) {
        (PhysicalKey::Code(code), ElementState::Pressed) => EngineEvent::KeyDown(code),
        _ => EngineEvent::Ignored,
    }
}

/// Quit and suspend flags driven by [`EngineEvent`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopControl {
    quit: bool,
    suspended: bool,
}

impl LoopControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the flags for `event`.
    pub fn apply(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Quit | EngineEvent::KeyDown(KeyCode::Escape) => self.quit = true,
            EngineEvent::Minimized => {
                if !self.suspended {
                    tracing::info!("Window minimized, rendering suspended");
                }
                self.suspended = true;
            }
            EngineEvent::Restored => {
                if self.suspended {
                    tracing::info!("Window restored, rendering resumed");
                }
                self.suspended = false;
            }
            EngineEvent::KeyDown(code) => tracing::trace!("Key pressed: {:?}", code),
            EngineEvent::Redraw | EngineEvent::Ignored => {}
        }
    }

    #[inline]
    pub fn should_quit(&self) -> bool {
        self.quit
    }

    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.suspended
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn test_close_is_quit() {
        assert_eq!(
            translate_window_event(&WindowEvent::CloseRequested, false),
            EngineEvent::Quit
        );
    }

    #[test]
    fn test_occlusion_maps_to_minimize_restore() {
        assert_eq!(
            translate_window_event(&WindowEvent::Occluded(true), false),
            EngineEvent::Minimized
        );
        assert_eq!(
            translate_window_event(&WindowEvent::Occluded(false), true),
            EngineEvent::Restored
        );
    }

    #[test]
    fn test_zero_resize_minimizes() {
        let event = WindowEvent::Resized(PhysicalSize::new(0, 0));
        assert_eq!(translate_window_event(&event, false), EngineEvent::Minimized);
    }

    #[test]
    fn test_resize_restores_only_when_minimized() {
        let event = WindowEvent::Resized(PhysicalSize::new(720, 405));
        assert_eq!(translate_window_event(&event, true), EngineEvent::Restored);
        assert_eq!(translate_window_event(&event, false), EngineEvent::Ignored);
    }

    #[test]
    fn test_translate_key() {
        assert_eq!(
            translate_key(PhysicalKey::Code(KeyCode::Escape), ElementState::Pressed),
            EngineEvent::KeyDown(KeyCode::Escape)
        );
        assert_eq!(
            translate_key(PhysicalKey::Code(KeyCode::Escape), ElementState::Released),
            EngineEvent::Ignored
        );
    }

    #[test]
    fn test_escape_quits() {
        let mut control = LoopControl::new();
        control.apply(EngineEvent::KeyDown(KeyCode::KeyW));
        assert!(!control.should_quit());
        control.apply(EngineEvent::KeyDown(KeyCode::Escape));
        assert!(control.should_quit());
    }

    #[test]
    fn test_minimize_restore_toggles_suspend() {
        let mut control = LoopControl::new();
        assert!(!control.is_suspended());

        control.apply(EngineEvent::Minimized);
        assert!(control.is_suspended());
        control.apply(EngineEvent::Minimized);
        assert!(control.is_suspended());

        control.apply(EngineEvent::Restored);
        assert!(!control.is_suspended());
        assert!(!control.should_quit());
    }
}
