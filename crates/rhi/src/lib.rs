//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Swapchain management
//! - Command buffer recording and image layout transitions
//! - Descriptor layouts and the fixed-size descriptor allocator
//! - Pipeline creation
//! - Synchronization primitives
//! - Deferred destruction through deletion queues

mod error;

pub mod command;
pub mod deletion_queue;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
