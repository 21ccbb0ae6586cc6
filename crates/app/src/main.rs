//! Vulkan engine entry point.
//!
//! Reads `vk_engine.toml` from the working directory (or the file named by
//! `VK_ENGINE_CONFIG`) and runs the engine until the window closes.

use std::env;
use std::path::PathBuf;

use anyhow::Result;
use tracing::info;

use renderer_core::EngineConfig;

const CONFIG_ENV: &str = "VK_ENGINE_CONFIG";
const DEFAULT_CONFIG: &str = "vk_engine.toml";

fn config_path() -> PathBuf {
    env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

fn main() -> Result<()> {
    renderer_core::init_logging();
    info!("Starting Vulkan engine");

    let config = EngineConfig::load_or_default(config_path());
    renderer_renderer::run(config)?;

    info!("Vulkan engine exited cleanly");
    Ok(())
}
