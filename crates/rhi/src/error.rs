//! RHI-specific error types.

use thiserror::Error;

/// Kind of descriptor capacity tracked by a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Buffer,
    Image,
    Set,
}

impl std::fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Buffer => "buffer bindings",
            Self::Image => "image bindings",
            Self::Set => "descriptor sets",
        };
        f.write_str(name)
    }
}

/// RHI-specific error type.
///
/// Only `ERROR_OUT_OF_DATE_KHR` and `SUBOPTIMAL_KHR` are recoverable, and
/// those never leave the swapchain as errors. Everything here is fatal.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A required instance layer or extension is not available
    #[error("Missing required {0}")]
    MissingFeature(String),

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation or capability error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// Render pass or framebuffer creation error
    #[error("Render pass error: {0}")]
    RenderPassError(String),

    /// Texture creation or upload error
    #[error("Texture error: {0}")]
    TextureError(String),

    /// A descriptor request exceeded the pool's upfront tally
    #[error("Descriptor pool exhausted: requested {requested} {kind}, {remaining} remaining")]
    DescriptorCapacity {
        kind: DescriptorKind,
        requested: u32,
        remaining: u32,
    },

    /// Setup finished with capacity the tally declared but nothing used
    #[error("Descriptor tally mismatch: {0}")]
    DescriptorTallyMismatch(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
