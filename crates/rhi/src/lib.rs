//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin, owning wrappers over `ash` used by the deferred renderer:
//! - Instance, physical device selection and logical device
//! - Swapchain negotiation and recreation
//! - Render passes, framebuffers and attachment images
//! - Command buffer recording
//! - Buffers, textures and samplers
//! - Descriptor pools sized from an exact tally
//! - Graphics pipelines
//! - Synchronization primitives
//!
//! Every wrapper holds an `Arc<Device>`, so the logical device is destroyed
//! only after the last object created from it.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{DescriptorKind, RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
