//! The demo scene: a textured ground plane, a few boxes and a skybox, lit
//! by a shadow-casting sun.
//!
//! # Descriptor Sets
//!
//! | Set        | Buffers                 | Textures                         |
//! |------------|-------------------------|----------------------------------|
//! | scene      | view/projection         |                                  |
//! | shadow     | light space             |                                  |
//! | lighting   | light, light space      | position, normal, albedo, shadow |
//! | composite  |                         | HDR color                        |
//! | transform  | model transform         |                                  |
//! | material   | material constants      | base texture                     |
//!
//! Every model gets a transform set and every mesh a material set.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, info};

use deferred_core::config::SceneConfig;
use deferred_platform::KeyCode;
use deferred_renderer::{PassKind, PipelineId, PipelineRegistry, RenderGraph, Scene, SceneContext};
use deferred_rhi::buffer::{Buffer, BufferUsage};
use deferred_rhi::command::CommandBuffer;
use deferred_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, sampled_image_info};
use deferred_rhi::device::Device;
use deferred_rhi::pipeline::{CompareOp, CullMode, GraphicsPipelineDesc};
use deferred_rhi::sampler::{Sampler, SamplerDesc};
use deferred_rhi::shader::SpirvCode;
use deferred_rhi::texture::Texture;
use deferred_rhi::vertex::{PositionVertex, Vertex, VertexLayout};
use deferred_rhi::{RhiError, RhiResult};

use crate::camera::{Camera, CameraController};
use crate::light::DirectionalLight;
use crate::mesh::{GpuMesh, MeshData, cuboid, ground_plane, skybox_cube};
use crate::textures::{checkerboard, sky_faces};
use crate::ubo::{LightSpaceUbo, LightingUbo, MaterialUbo, TransformUbo, ViewProjUbo};

/// Edge length of generated material textures.
const MATERIAL_TEXTURE_SIZE: u32 = 64;
/// Edge length of each generated sky face.
const SKY_FACE_SIZE: u32 = 128;
/// Camera turn rate in degrees per second.
const CAMERA_TURN_SPEED: f32 = 60.0;

/// Uniform buffers bound by the scene-level sets.
const SCENE_SET_BUFFERS: u32 = 1 + 1 + 2;
/// Textures bound by the scene-level sets.
const SCENE_SET_TEXTURES: u32 = 4 + 1;
const SCENE_SET_COUNT: u32 = 4;

/// A procedural checker texture tinted by a base color.
#[derive(Clone, Debug)]
pub struct MaterialDesc {
    pub base_color: Vec4,
    pub light: [u8; 4],
    pub dark: [u8; 4],
    pub tile: u32,
}

impl MaterialDesc {
    fn pixels(&self) -> Vec<u8> {
        checkerboard(MATERIAL_TEXTURE_SIZE, self.tile, self.light, self.dark)
    }
}

/// One mesh and the material it is drawn with.
#[derive(Clone, Debug)]
pub struct MeshDesc<V> {
    pub data: MeshData<V>,
    pub material: MaterialDesc,
}

/// A named group of meshes sharing one transform.
#[derive(Clone, Debug)]
pub struct ModelDesc {
    pub name: &'static str,
    pub transform: Mat4,
    pub meshes: Vec<MeshDesc<Vertex>>,
}

/// Descriptor sets a model with `mesh_count` meshes binds: one transform
/// set plus one material set per mesh.
fn model_set_count(mesh_count: usize) -> u32 {
    1 + mesh_count as u32
}

fn demo_models() -> Vec<ModelDesc> {
    let ground = MeshDesc {
        data: ground_plane(150.0, 0.0, 12.0),
        material: MaterialDesc {
            base_color: Vec4::ONE,
            light: [120, 150, 100, 255],
            dark: [90, 115, 75, 255],
            tile: 32,
        },
    };

    // Boxes rest on the ground, so their centres sit above it (negative Y).
    let boxes = [
        (Vec3::new(-20.0, -6.0, 10.0), Vec3::splat(6.0), Vec4::new(0.9, 0.3, 0.25, 1.0)),
        (Vec3::new(10.0, -10.0, 25.0), Vec3::new(5.0, 10.0, 5.0), Vec4::new(0.3, 0.6, 0.9, 1.0)),
        (Vec3::new(25.0, -4.0, -5.0), Vec3::new(8.0, 4.0, 4.0), Vec4::new(0.95, 0.85, 0.4, 1.0)),
    ]
    .into_iter()
    .map(|(center, half_extent, base_color)| MeshDesc {
        data: cuboid(center, half_extent),
        material: MaterialDesc {
            base_color,
            light: [255; 4],
            dark: [200, 200, 200, 255],
            tile: 16,
        },
    })
    .collect();

    vec![
        ModelDesc {
            name: "ground",
            transform: Mat4::IDENTITY,
            meshes: vec![ground],
        },
        ModelDesc {
            name: "boxes",
            transform: Mat4::IDENTITY,
            meshes: boxes,
        },
    ]
}

struct GpuMaterialMesh {
    mesh: GpuMesh,
    set: vk::DescriptorSet,
    _material: Buffer,
    _texture: Texture,
}

struct GpuModel {
    transform: Buffer,
    transform_set: vk::DescriptorSet,
    meshes: Vec<GpuMaterialMesh>,
}

#[derive(Default)]
struct Layouts {
    scene: Option<DescriptorSetLayout>,
    shadow: Option<DescriptorSetLayout>,
    lighting: Option<DescriptorSetLayout>,
    composite: Option<DescriptorSetLayout>,
    transform: Option<DescriptorSetLayout>,
    material: Option<DescriptorSetLayout>,
}

fn layout_handle(layout: &Option<DescriptorSetLayout>) -> RhiResult<vk::DescriptorSetLayout> {
    layout
        .as_ref()
        .map(DescriptorSetLayout::handle)
        .ok_or_else(|| RhiError::InvalidHandle("descriptor set layout not created".to_string()))
}

struct DemoPipelines {
    depth: PipelineId,
    gbuffer: PipelineId,
    lighting: PipelineId,
    composite: PipelineId,
    skybox: PipelineId,
}

/// Everything the scene owns on the GPU.
struct GpuScene {
    view_proj: Buffer,
    lighting: Buffer,
    light_space: Buffer,

    scene_set: vk::DescriptorSet,
    shadow_set: vk::DescriptorSet,
    lighting_set: vk::DescriptorSet,
    composite_set: vk::DescriptorSet,

    skybox: GpuModel,
    models: Vec<GpuModel>,
    pipelines: DemoPipelines,

    gbuffer_sampler: Sampler,
    shadow_sampler: Sampler,
    layouts: Layouts,
}

/// Images the lighting set samples: G-buffer colors, then the shadow map.
fn lighting_images(
    graph: &RenderGraph,
    gbuffer_sampler: &Sampler,
    shadow_sampler: &Sampler,
) -> RhiResult<Vec<vk::DescriptorImageInfo>> {
    let mut images: Vec<_> = graph
        .pass(PassKind::Geometry)
        .color_views()
        .into_iter()
        .map(|view| sampled_image_info(gbuffer_sampler.handle(), view))
        .collect();
    let shadow_map = graph
        .pass(PassKind::Depth)
        .depth_view()
        .ok_or_else(|| RhiError::InvalidHandle("depth pass has no shadow map".to_string()))?;
    images.push(sampled_image_info(shadow_sampler.handle(), shadow_map));
    Ok(images)
}

/// The HDR image the composite set samples.
fn composite_images(
    graph: &RenderGraph,
    sampler: &Sampler,
) -> RhiResult<Vec<vk::DescriptorImageInfo>> {
    let hdr = graph
        .pass(PassKind::Lighting)
        .color_views()
        .first()
        .copied()
        .ok_or_else(|| RhiError::InvalidHandle("lighting pass has no HDR target".to_string()))?;
    Ok(vec![sampled_image_info(sampler.handle(), hdr)])
}

fn shader(dir: &Path, name: &str) -> RhiResult<SpirvCode> {
    SpirvCode::load(dir.join(format!("{name}.spv")))
}

/// Uploads `meshes` with their materials and allocates the model's sets.
fn upload_model<V: VertexLayout>(
    device: &Arc<Device>,
    pool: &mut DescriptorPool,
    layouts: &mut Layouts,
    name: &str,
    transform: Mat4,
    meshes: &[MeshDesc<V>],
    material_texture: impl Fn(&MaterialDesc) -> RhiResult<Texture>,
) -> RhiResult<GpuModel> {
    let transform_buffer = Buffer::new(
        device.clone(),
        BufferUsage::Uniform,
        TransformUbo::SIZE as u64,
    )?;
    transform_buffer.write(0, &TransformUbo::new(transform))?;
    let transform_set =
        pool.get_descriptor_set(&[&transform_buffer], &[], &mut layouts.transform)?;

    let meshes = meshes
        .iter()
        .map(|desc| -> RhiResult<GpuMaterialMesh> {
            let material = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                MaterialUbo::SIZE as u64,
            )?;
            material.write(0, &MaterialUbo::new(desc.material.base_color))?;
            let texture = material_texture(&desc.material)?;
            let set = pool.get_descriptor_set(
                &[&material],
                &[texture.descriptor_info()],
                &mut layouts.material,
            )?;
            Ok(GpuMaterialMesh {
                mesh: GpuMesh::upload(device, &desc.data)?,
                set,
                _material: material,
                _texture: texture,
            })
        })
        .collect::<RhiResult<Vec<_>>>()?;

    debug!("Uploaded model '{}' ({} mesh(es))", name, meshes.len());
    Ok(GpuModel {
        transform: transform_buffer,
        transform_set,
        meshes,
    })
}

fn register_pipelines(
    pipelines: &mut PipelineRegistry,
    graph: &RenderGraph,
    shader_dir: &Path,
    layouts: &Layouts,
) -> RhiResult<DemoPipelines> {
    let scene_layout = layout_handle(&layouts.scene)?;
    let shadow_layout = layout_handle(&layouts.shadow)?;
    let lighting_layout = layout_handle(&layouts.lighting)?;
    let composite_layout = layout_handle(&layouts.composite)?;
    let transform_layout = layout_handle(&layouts.transform)?;
    let material_layout = layout_handle(&layouts.material)?;

    let depth = GraphicsPipelineDesc::new("depth")
        .vertex_shader(shader(shader_dir, "depth.vert")?)
        .vertex_layout::<Vertex>()
        .set_layout(shadow_layout)
        .set_layout(transform_layout)
        .cull_mode(CullMode::None)
        .depth_bias(1.25, 1.75);

    let gbuffer = GraphicsPipelineDesc::new("gbuffer")
        .vertex_shader(shader(shader_dir, "gbuffer.vert")?)
        .fragment_shader(shader(shader_dir, "gbuffer.frag")?)
        .vertex_layout::<Vertex>()
        .set_layout(scene_layout)
        .set_layout(transform_layout)
        .set_layout(material_layout)
        .cull_mode(CullMode::None);

    let fullscreen = shader(shader_dir, "fullscreen.vert")?;
    let lighting = GraphicsPipelineDesc::new("lighting")
        .vertex_shader(fullscreen.clone())
        .fragment_shader(shader(shader_dir, "lighting.frag")?)
        .set_layout(lighting_layout)
        .cull_mode(CullMode::None)
        .depth_test_enable(false)
        .depth_write_enable(false);

    let composite = GraphicsPipelineDesc::new("composite")
        .vertex_shader(fullscreen)
        .fragment_shader(shader(shader_dir, "composite.frag")?)
        .set_layout(composite_layout)
        .cull_mode(CullMode::None)
        .depth_test_enable(false)
        .depth_write_enable(false);

    let skybox = GraphicsPipelineDesc::new("skybox")
        .vertex_shader(shader(shader_dir, "skybox.vert")?)
        .fragment_shader(shader(shader_dir, "skybox.frag")?)
        .vertex_layout::<PositionVertex>()
        .set_layout(scene_layout)
        .set_layout(transform_layout)
        .set_layout(material_layout)
        .cull_mode(CullMode::None)
        .depth_write_enable(false)
        .depth_compare_op(CompareOp::LessOrEqual);

    Ok(DemoPipelines {
        depth: pipelines.register(PassKind::Depth, depth, graph)?,
        gbuffer: pipelines.register(PassKind::Geometry, gbuffer, graph)?,
        lighting: pipelines.register(PassKind::Lighting, lighting, graph)?,
        composite: pipelines.register(PassKind::Final, composite, graph)?,
        skybox: pipelines.register(PassKind::Final, skybox, graph)?,
    })
}

/// The demo scene.
///
/// Construction is CPU-only; GPU resources are created in
/// [`Scene::prepare`].
pub struct DemoScene {
    camera: Camera,
    controller: CameraController,
    light: DirectionalLight,
    models: Vec<ModelDesc>,
    skybox: MeshDesc<PositionVertex>,
    gpu: Option<GpuScene>,
}

impl DemoScene {
    pub fn new(config: &SceneConfig) -> Self {
        let camera = Camera::overlooking(vk::Extent2D::default());
        let light = DirectionalLight::sun(camera.position(), config.space_radius);
        Self {
            controller: CameraController::new(config.camera_speed, CAMERA_TURN_SPEED),
            light,
            camera,
            models: demo_models(),
            skybox: MeshDesc {
                data: skybox_cube(),
                material: MaterialDesc {
                    base_color: Vec4::ONE,
                    light: [255; 4],
                    dark: [255; 4],
                    tile: 1,
                },
            },
            gpu: None,
        }
    }

    pub fn models(&self) -> &[ModelDesc] {
        &self.models
    }

    fn gpu(&self) -> RhiResult<&GpuScene> {
        self.gpu
            .as_ref()
            .ok_or_else(|| RhiError::InvalidHandle("demo scene used before prepare".to_string()))
    }

    /// Mesh count of every model, the skybox first.
    fn mesh_counts(&self) -> impl Iterator<Item = usize> + '_ {
        std::iter::once(1).chain(self.models.iter().map(|model| model.meshes.len()))
    }

    fn view_proj(&self) -> ViewProjUbo {
        ViewProjUbo {
            view: self.camera.view_matrix(),
            projection: self.camera.projection_matrix(),
        }
    }

    fn draw_model(
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        model: &GpuModel,
        materials: bool,
    ) {
        cmd.bind_descriptor_sets(layout, 1, &[model.transform_set]);
        for mesh in &model.meshes {
            if materials {
                cmd.bind_descriptor_sets(layout, 2, &[mesh.set]);
            }
            mesh.mesh.draw(cmd);
        }
    }
}

impl Scene for DemoScene {
    fn buffer_count(&self) -> u32 {
        // Transform plus one material buffer per mesh.
        SCENE_SET_BUFFERS + self.mesh_counts().map(model_set_count).sum::<u32>()
    }

    fn texture_count(&self) -> u32 {
        SCENE_SET_TEXTURES + self.mesh_counts().map(|count| count as u32).sum::<u32>()
    }

    fn descriptor_set_count(&self) -> u32 {
        SCENE_SET_COUNT + self.mesh_counts().map(model_set_count).sum::<u32>()
    }

    fn prepare(&mut self, ctx: SceneContext<'_>) -> RhiResult<()> {
        let SceneContext {
            device,
            pool,
            graph,
            pipelines,
            shader_dir,
            extent,
        } = ctx;
        self.camera.set_extent(extent);

        let uniform = |size: usize| Buffer::new(device.clone(), BufferUsage::Uniform, size as u64);
        let view_proj = uniform(ViewProjUbo::SIZE)?;
        let lighting = uniform(LightingUbo::SIZE)?;
        let light_space = uniform(LightSpaceUbo::SIZE)?;
        view_proj.write(0, &self.view_proj())?;
        lighting.write(0, self.light.attributes())?;
        light_space.write(0, &self.light.space_ubo())?;

        let gbuffer_sampler = Sampler::new(device.clone(), SamplerDesc::nearest_clamp())?;
        let shadow_sampler = Sampler::new(device.clone(), SamplerDesc::shadow_map())?;

        let mut layouts = Layouts::default();
        let scene_set = pool.get_descriptor_set(&[&view_proj], &[], &mut layouts.scene)?;
        let shadow_set = pool.get_descriptor_set(&[&light_space], &[], &mut layouts.shadow)?;
        let lighting_set = pool.get_descriptor_set(
            &[&lighting, &light_space],
            &lighting_images(graph, &gbuffer_sampler, &shadow_sampler)?,
            &mut layouts.lighting,
        )?;
        let composite_set = pool.get_descriptor_set(
            &[],
            &composite_images(graph, &gbuffer_sampler)?,
            &mut layouts.composite,
        )?;

        let faces = sky_faces(SKY_FACE_SIZE);
        let face_refs: Vec<&[u8]> = faces.iter().map(Vec::as_slice).collect();
        let skybox = upload_model(
            device,
            pool,
            &mut layouts,
            "skybox",
            Mat4::from_translation(self.camera.position()),
            std::slice::from_ref(&self.skybox),
            |_| {
                Texture::cube_from_rgba8(
                    device.clone(),
                    "skybox",
                    SKY_FACE_SIZE,
                    &face_refs,
                    SamplerDesc::linear_repeat(),
                )
            },
        )?;

        let material_extent = vk::Extent2D {
            width: MATERIAL_TEXTURE_SIZE,
            height: MATERIAL_TEXTURE_SIZE,
        };
        let models = self
            .models
            .iter()
            .map(|model| {
                upload_model(
                    device,
                    pool,
                    &mut layouts,
                    model.name,
                    model.transform,
                    &model.meshes,
                    |material| {
                        Texture::from_rgba8(
                            device.clone(),
                            model.name,
                            material_extent,
                            &material.pixels(),
                            SamplerDesc::linear_repeat(),
                        )
                    },
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let demo_pipelines = register_pipelines(pipelines, graph, shader_dir, &layouts)?;

        info!(
            "Demo scene prepared: {} model(s), {} pipeline(s)",
            models.len() + 1,
            pipelines.len()
        );
        self.gpu = Some(GpuScene {
            view_proj,
            lighting,
            light_space,
            scene_set,
            shadow_set,
            lighting_set,
            composite_set,
            skybox,
            models,
            pipelines: demo_pipelines,
            gbuffer_sampler,
            shadow_sampler,
            layouts,
        });
        Ok(())
    }

    fn update(&mut self, delta_secs: f32) -> RhiResult<()> {
        self.controller.update(&mut self.camera, delta_secs);
        self.light.update(self.camera.position());

        let gpu = self.gpu()?;
        gpu.view_proj.write(0, &self.view_proj())?;
        gpu.lighting.write(0, self.light.attributes())?;
        gpu.light_space.write(0, &self.light.space_ubo())?;
        gpu.skybox.transform.write(
            0,
            &TransformUbo::new(Mat4::from_translation(self.camera.position())),
        )?;
        Ok(())
    }

    fn render_depth(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()> {
        let gpu = self.gpu()?;
        let pipeline = pipelines.get(gpu.pipelines.depth)?;
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.bind_descriptor_sets(pipeline.layout(), 0, &[gpu.shadow_set]);
        for model in &gpu.models {
            Self::draw_model(cmd, pipeline.layout(), model, false);
        }
        Ok(())
    }

    fn render_geometry(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()> {
        let gpu = self.gpu()?;
        let pipeline = pipelines.get(gpu.pipelines.gbuffer)?;
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.bind_descriptor_sets(pipeline.layout(), 0, &[gpu.scene_set]);
        for model in &gpu.models {
            Self::draw_model(cmd, pipeline.layout(), model, true);
        }
        Ok(())
    }

    fn render_lighting(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()> {
        let gpu = self.gpu()?;
        let pipeline = pipelines.get(gpu.pipelines.lighting)?;
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.bind_descriptor_sets(pipeline.layout(), 0, &[gpu.lighting_set]);
        // Fullscreen triangle generated in the vertex shader.
        cmd.draw(3, 1, 0, 0);
        Ok(())
    }

    fn render_final(&self, cmd: &CommandBuffer, pipelines: &PipelineRegistry) -> RhiResult<()> {
        let gpu = self.gpu()?;

        let composite = pipelines.get(gpu.pipelines.composite)?;
        cmd.bind_graphics_pipeline(composite.handle());
        cmd.bind_descriptor_sets(composite.layout(), 0, &[gpu.composite_set]);
        cmd.draw(3, 1, 0, 0);

        // Drawn last, only where the G-buffer depth is still cleared.
        let skybox = pipelines.get(gpu.pipelines.skybox)?;
        cmd.bind_graphics_pipeline(skybox.handle());
        cmd.bind_descriptor_sets(skybox.layout(), 0, &[gpu.scene_set]);
        Self::draw_model(cmd, skybox.layout(), &gpu.skybox, true);
        Ok(())
    }

    fn resize_extent(
        &mut self,
        extent: vk::Extent2D,
        pool: &DescriptorPool,
        graph: &RenderGraph,
    ) -> RhiResult<()> {
        self.camera.set_extent(extent);
        let view_proj = self.view_proj();

        let gpu = self.gpu()?;
        gpu.view_proj.write(0, &view_proj)?;

        let lighting_layout = gpu.layouts.lighting.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("lighting set layout not created".to_string())
        })?;
        pool.update_images(
            gpu.lighting_set,
            lighting_layout,
            &lighting_images(graph, &gpu.gbuffer_sampler, &gpu.shadow_sampler)?,
        )?;

        let composite_layout = gpu.layouts.composite.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("composite set layout not created".to_string())
        })?;
        pool.update_images(
            gpu.composite_set,
            composite_layout,
            &composite_images(graph, &gpu.gbuffer_sampler)?,
        )?;

        debug!(
            "Demo scene resized to {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    fn key_down(&mut self, key: KeyCode) {
        self.controller.key_down(key);
    }

    fn key_up(&mut self, key: KeyCode) {
        self.controller.key_up(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene() -> DemoScene {
        DemoScene::new(&SceneConfig::default())
    }

    #[test]
    fn test_descriptor_tally_counts_every_binding() {
        let scene = scene();
        // Scene-level sets, then skybox (1 mesh), ground (1) and boxes (3).
        assert_eq!(scene.buffer_count(), 4 + 2 + 2 + 4);
        assert_eq!(scene.texture_count(), 5 + 1 + 1 + 3);
        assert_eq!(scene.descriptor_set_count(), 4 + 2 + 2 + 4);

        let tally = scene.descriptor_tally();
        assert_eq!(tally.buffers, 12);
        assert_eq!(tally.textures, 10);
        assert_eq!(tally.sets, 12);
    }

    #[test]
    fn test_tally_follows_mesh_count() {
        let mut scene = scene();
        let before = scene.descriptor_tally();
        let extra = scene.models[1].meshes[0].clone();
        scene.models[1].meshes.push(extra);
        let after = scene.descriptor_tally();

        assert_eq!(after.buffers, before.buffers + 1);
        assert_eq!(after.textures, before.textures + 1);
        assert_eq!(after.sets, before.sets + 1);
    }

    #[test]
    fn test_boxes_rest_on_the_ground() {
        let scene = scene();
        for mesh in &scene.models()[1].meshes {
            let bottom = mesh
                .data
                .vertices
                .iter()
                .map(|v| v.position.y)
                .fold(f32::MIN, f32::max);
            assert!(bottom.abs() < 1e-4);
        }
    }

    #[test]
    fn test_gpu_calls_fail_before_prepare() {
        let mut scene = scene();
        assert!(matches!(scene.update(0.016), Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_keys_reach_the_controller() {
        let mut scene = scene();
        scene.key_down(KeyCode::KeyW);
        assert_eq!(scene.controller.movement().forward, 1);
        scene.key_up(KeyCode::KeyW);
        assert!(scene.controller.movement().is_still());
    }
}
