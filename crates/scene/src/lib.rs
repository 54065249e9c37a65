//! Scene content for the deferred renderer.
//!
//! - A free-flying camera and its keyboard controller
//! - The shadow-casting directional light
//! - Procedural meshes and textures
//! - [`DemoScene`], the [`deferred_renderer::Scene`] rendered by the app

pub mod camera;
pub mod demo;
pub mod light;
pub mod mesh;
pub mod textures;
pub mod ubo;

pub use camera::{Camera, CameraController, Movement};
pub use demo::DemoScene;
pub use light::DirectionalLight;
pub use mesh::{GpuMesh, MeshData};
