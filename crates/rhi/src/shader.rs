//! Shader module management.
//!
//! This module handles SPIR-V loading and VkShaderModule creation.
//!
//! # Overview
//!
//! - [`ShaderStage`] defines the type of shader (vertex, fragment, compute)
//! - [`Shader`] wraps VkShaderModule with stage and entry point information
//! - [`load_shader_module`] is the loader used by pipeline setup
//!
//! Loading never aborts on its own. Failures come back as [`ShaderLoadError`]
//! (and are logged as warnings); the caller decides whether they are fatal.
//! Pipeline setup escalates them into [`crate::RhiError::ShaderLoad`] with `?`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::{load_shader_module, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let gradient = load_shader_module(
//!     device.clone(),
//!     Path::new("shaders/gradient.comp.spv"),
//!     ShaderStage::Compute,
//! )?;
//! let _stage = gradient.stage_desc();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::deletion_queue::DeletionEntry;
use crate::device::Device;
use crate::pipeline::ShaderStageDesc;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Why a shader binary could not become a module.
#[derive(Error, Debug)]
pub enum ShaderLoadError {
    #[error("failed to read shader file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SPIR-V code must be 4-byte aligned, got {0} bytes")]
    Misaligned(usize),

    #[error("SPIR-V code is empty")]
    Empty,

    #[error("not a SPIR-V module (magic {0:#010x})")]
    BadMagic(u32),

    #[error("invalid entry point name: {0}")]
    InvalidEntryPoint(#[from] std::ffi::NulError),

    #[error("vkCreateShaderModule failed: {0}")]
    Creation(vk::Result),
}

/// Shader stage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reinterprets a SPIR-V byte stream as 32-bit words.
///
/// # Errors
///
/// Rejects streams that are empty, not a multiple of four bytes, or that do
/// not start with the SPIR-V magic number.
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, ShaderLoadError> {
    if bytes.is_empty() {
        return Err(ShaderLoadError::Empty);
    }
    if !bytes.len().is_multiple_of(4) {
        return Err(ShaderLoadError::Misaligned(bytes.len()));
    }

    let words: Vec<u32> = bytemuck::pod_collect_to_vec(bytes);
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(&other) => Err(ShaderLoadError::BadMagic(other)),
        None => Err(ShaderLoadError::Empty),
    }
}

/// Vulkan shader module wrapper.
pub struct Shader {
    device: Arc<Device>,
    /// Null once handed to a deletion queue.
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Loads a SPIR-V file.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> Result<Self, ShaderLoadError> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|source| ShaderLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_spirv_bytes(device, &bytes, stage, entry_point)
    }

    /// Creates a module from SPIR-V bytes.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
        entry_point: &str,
    ) -> Result<Self, ShaderLoadError> {
        let code = spirv_words(bytes)?;
        let entry_point = CString::new(entry_point)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None) }
            .map_err(ShaderLoadError::Creation)?;

        info!(
            "Created {} shader module with entry point {:?}",
            stage, entry_point
        );

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// The stage description a pipeline config stores for this module.
    pub fn stage_desc(&self) -> ShaderStageDesc {
        ShaderStageDesc {
            stage: self.stage.to_vk_stage(),
            module: self.module,
            entry_point: self.entry_point.clone(),
        }
    }

    /// Gives up ownership so the module is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::ShaderModule(std::mem::take(&mut self.module))
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if self.module == vk::ShaderModule::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

/// Loads a shader with entry point `main`, reporting failure to the caller.
///
/// A failure is logged as a warning and returned; nothing here aborts.
pub fn load_shader_module(
    device: Arc<Device>,
    path: &Path,
    stage: ShaderStage,
) -> Result<Shader, ShaderLoadError> {
    Shader::from_spirv_file(device, path, stage, "main").inspect_err(|e| {
        warn!("Failed to load {} shader {:?}: {}", stage, path, e);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_to_bytes(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_ne_bytes()).collect()
    }

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(
            ShaderStage::Compute.to_vk_stage(),
            vk::ShaderStageFlags::COMPUTE
        );
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Compute), "compute");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_valid() {
        let bytes = words_to_bytes(&[SPIRV_MAGIC, 0x0001_0600, 0, 1, 0]);
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0], SPIRV_MAGIC);
        assert_eq!(words[1], 0x0001_0600);
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        let mut bytes = words_to_bytes(&[SPIRV_MAGIC]);
        bytes.push(0);
        assert!(matches!(
            spirv_words(&bytes),
            Err(ShaderLoadError::Misaligned(5))
        ));
    }

    #[test]
    fn test_spirv_words_rejects_empty() {
        assert!(matches!(spirv_words(&[]), Err(ShaderLoadError::Empty)));
    }

    #[test]
    fn test_spirv_words_rejects_bad_magic() {
        let bytes = words_to_bytes(&[0xdead_beef, 0]);
        assert!(matches!(
            spirv_words(&bytes),
            Err(ShaderLoadError::BadMagic(0xdead_beef))
        ));
    }

    #[test]
    fn test_missing_file_error_names_path() {
        let path = Path::new("definitely/not/here.spv");
        let err = std::fs::read(path)
            .map_err(|source| ShaderLoadError::Io {
                path: path.to_path_buf(),
                source,
            })
            .unwrap_err();
        assert!(err.to_string().contains("here.spv"));
    }
}
