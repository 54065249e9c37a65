//! Deferred rendering frame orchestration.
//!
//! This crate drives the deferred pipeline:
//! - The four-pass render graph (depth, geometry, lighting, final)
//! - The pipeline registry, rebuilt when passes are recreated
//! - The [`Scene`] boundary for content
//! - Per-frame acquire, submit and present sequencing with resize recovery

pub mod frame;
pub mod orchestrator;
pub mod passes;
pub mod pipelines;
pub mod scene;

pub use frame::{FrameStatus, FrameTarget, draw_frame};
pub use orchestrator::FrameOrchestrator;
pub use passes::{PassKind, RenderGraph};
pub use pipelines::{PipelineId, PipelineRegistry};
pub use scene::{Scene, SceneContext};
