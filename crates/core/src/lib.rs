//! Core utilities for the Vulkan engine.
//!
//! This crate provides foundational types and utilities used across the engine:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration management

mod config;
mod error;
mod logging;

pub use config::{
    DescriptorConfig, EngineConfig, FrameConfig, ShaderConfig, VulkanConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging, try_init_logging};
