//! Platform abstraction layer for the Vulkan engine.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Translation of window events into engine events
//! - Vulkan surface creation from raw window handles

mod events;
mod window;

pub use events::{EngineEvent, KeyCode, LoopControl, translate_key, translate_window_event};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
