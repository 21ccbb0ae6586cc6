//! Renderer core.
//!
//! This crate ties the RHI and the platform layer together:
//! - The frame ring and per-frame deletion queues
//! - The draw-loop state machine
//! - The Vulkan frame backend (compute background, blit, present)
//! - Engine init/cleanup and the windowed run loop

pub mod backend;
pub mod draw_loop;
mod engine;
pub mod frame;
mod runner;

pub use draw_loop::{DrawLoop, FrameGpu, FrameReport};
pub use engine::{Engine, EngineError};
pub use frame::{FrameContext, FrameRing, FrameSlot};
pub use runner::run;

/// Number of frames that may be in flight at once.
pub const FRAME_OVERLAP: usize = 2;
