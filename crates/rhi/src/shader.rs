//! SPIR-V code and shader modules.
//!
//! [`SpirvCode`] is validated bytecode kept in memory, so pipelines can be
//! rebuilt after a resize without touching the disk again. [`Shader`] is a
//! short-lived `VkShaderModule` created from it for one pipeline build.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::shader::{Shader, ShaderStage, SpirvCode};
//!
//! # fn example(device: Arc<Device>) -> deferred_rhi::RhiResult<()> {
//! let code = SpirvCode::load("shaders/spirv/gbuffer.vert.spv")?;
//! let vertex = Shader::new(device, &code, ShaderStage::Vertex)?;
//! let _stage = vertex.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point used by every shader in the renderer.
const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Shader stages used by graphics pipelines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Validated SPIR-V words.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpirvCode {
    words: Vec<u32>,
}

impl SpirvCode {
    /// Reads and validates a `.spv` file.
    pub fn load(path: impl AsRef<Path>) -> RhiResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;
        debug!("Loaded {} bytes of SPIR-V from {:?}", bytes.len(), path);
        Self::from_bytes(&bytes)
    }

    /// Validates little-endian SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ShaderError`] if the length is not a multiple of
    /// four or the magic number is missing.
    pub fn from_bytes(bytes: &[u8]) -> RhiResult<Self> {
        if bytes.is_empty() || !bytes.len().is_multiple_of(4) {
            return Err(RhiError::ShaderError(format!(
                "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
                bytes.len()
            )));
        }

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        if words[0] != SPIRV_MAGIC {
            return Err(RhiError::ShaderError(format!(
                "bad SPIR-V magic number {:#010x}",
                words[0]
            )));
        }

        Ok(Self { words })
    }

    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

/// A `VkShaderModule` bound to one stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    pub fn new(device: Arc<Device>, code: &SpirvCode, stage: ShaderStage) -> RhiResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code.words());
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
    }
}
