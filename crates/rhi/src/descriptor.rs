//! Descriptor pools sized from an exact tally.
//!
//! Binding happens in two phases:
//!
//! 1. The scene declares how many uniform-buffer bindings, texture bindings
//!    and sets it will need as a [`DescriptorTally`], and one
//!    [`DescriptorPool`] is created with exactly that capacity.
//! 2. The scene allocates its sets with
//!    [`DescriptorPool::get_descriptor_set`]. Every request is checked
//!    against the remaining capacity before Vulkan is called, and
//!    [`DescriptorPool::verify_exhausted`] confirms nothing was left over.
//!
//! Set layouts have a fixed shape: uniform buffers at bindings `0..B`, then
//! combined image samplers at bindings `B..B+T`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use deferred_rhi::buffer::Buffer;
//! use deferred_rhi::device::Device;
//! use deferred_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorTally};
//!
//! # fn example(device: Arc<Device>, camera: &Buffer) -> deferred_rhi::RhiResult<()> {
//! let tally = DescriptorTally::new().with_buffers(1).with_sets(1);
//! let mut pool = DescriptorPool::from_tally(device, tally)?;
//!
//! let mut layout: Option<DescriptorSetLayout> = None;
//! let _set = pool.get_descriptor_set(&[camera], &[], &mut layout)?;
//! pool.verify_exhausted()?;
//! # Ok(())
//! # }
//! ```

use std::ops::{Add, AddAssign};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{DescriptorKind, RhiError, RhiResult};

/// Descriptor capacity: uniform-buffer bindings, texture bindings and sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorTally {
    pub buffers: u32,
    pub textures: u32,
    pub sets: u32,
}

impl DescriptorTally {
    pub const fn new() -> Self {
        Self {
            buffers: 0,
            textures: 0,
            sets: 0,
        }
    }

    pub const fn with_buffers(mut self, count: u32) -> Self {
        self.buffers += count;
        self
    }

    pub const fn with_textures(mut self, count: u32) -> Self {
        self.textures += count;
        self
    }

    pub const fn with_sets(mut self, count: u32) -> Self {
        self.sets += count;
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::new()
    }

    fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        [
            (vk::DescriptorType::UNIFORM_BUFFER, self.buffers),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, self.textures),
        ]
        .into_iter()
        .filter(|&(_, count)| count > 0)
        .map(|(ty, count)| vk::DescriptorPoolSize::default().ty(ty).descriptor_count(count))
        .collect()
    }
}

impl Add for DescriptorTally {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            buffers: self.buffers + rhs.buffers,
            textures: self.textures + rhs.textures,
            sets: self.sets + rhs.sets,
        }
    }
}

impl AddAssign for DescriptorTally {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::fmt::Display for DescriptorTally {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} buffer(s), {} texture(s), {} set(s)",
            self.buffers, self.textures, self.sets
        )
    }
}

/// Capacity left in a pool. Pure bookkeeping, no Vulkan calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBudget {
    capacity: DescriptorTally,
    remaining: DescriptorTally,
}

impl DescriptorBudget {
    pub fn new(capacity: DescriptorTally) -> Self {
        Self {
            capacity,
            remaining: capacity,
        }
    }

    #[inline]
    pub fn remaining(&self) -> DescriptorTally {
        self.remaining
    }

    /// Fails if one more set with `buffers` buffer and `textures` texture
    /// bindings would not fit.
    pub fn check(&self, buffers: u32, textures: u32) -> RhiResult<()> {
        let checks = [
            (DescriptorKind::Set, 1, self.remaining.sets),
            (DescriptorKind::Buffer, buffers, self.remaining.buffers),
            (DescriptorKind::Image, textures, self.remaining.textures),
        ];
        for (kind, requested, remaining) in checks {
            if requested > remaining {
                return Err(RhiError::DescriptorCapacity {
                    kind,
                    requested,
                    remaining,
                });
            }
        }
        Ok(())
    }

    /// Takes one set with `buffers` buffer and `textures` texture bindings.
    ///
    /// Nothing is taken if any kind would run out.
    pub fn reserve(&mut self, buffers: u32, textures: u32) -> RhiResult<()> {
        self.check(buffers, textures)?;
        self.remaining.sets -= 1;
        self.remaining.buffers -= buffers;
        self.remaining.textures -= textures;
        Ok(())
    }

    /// Fails unless every declared descriptor was allocated.
    pub fn verify_exhausted(&self) -> RhiResult<()> {
        if self.remaining.is_empty() {
            Ok(())
        } else {
            Err(RhiError::DescriptorTallyMismatch(format!(
                "declared {}, but {} left unallocated",
                self.capacity, self.remaining
            )))
        }
    }
}

/// Layout bindings for `buffers` uniform buffers followed by `textures`
/// combined image samplers.
pub fn layout_bindings(
    buffers: u32,
    textures: u32,
) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
    let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    let fragment = vk::ShaderStageFlags::FRAGMENT;
    (0..buffers)
        .map(|binding| DescriptorBindingBuilder::uniform_buffer(binding, stages))
        .chain((buffers..buffers + textures).map(|binding| {
            DescriptorBindingBuilder::combined_image_sampler(binding, fragment)
        }))
        .collect()
}

/// Binding counts of a set layout: uniform buffers, then textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorShape {
    pub buffers: u32,
    pub textures: u32,
}

impl DescriptorShape {
    pub fn new(buffers: usize, textures: usize) -> Self {
        Self {
            buffers: buffers as u32,
            textures: textures as u32,
        }
    }

    fn ensure_matches(self, requested: DescriptorShape) -> RhiResult<()> {
        if self == requested {
            Ok(())
        } else {
            Err(RhiError::InvalidHandle(format!(
                "descriptor layout holds {} buffer(s) and {} texture(s), got {} and {}",
                self.buffers, self.textures, requested.buffers, requested.textures
            )))
        }
    }

    fn ensure_textures(self, textures: usize) -> RhiResult<()> {
        self.ensure_matches(DescriptorShape::new(self.buffers as usize, textures))
    }
}

/// Checks a set request against an existing layout's shape, then against
/// the budget. Nothing is spent either way.
fn admit(
    budget: &DescriptorBudget,
    existing: Option<DescriptorShape>,
    requested: DescriptorShape,
) -> RhiResult<()> {
    if let Some(shape) = existing {
        shape.ensure_matches(requested)?;
    }
    budget.check(requested.buffers, requested.textures)
}

/// Descriptor set layout with the buffers-then-textures shape.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    shape: DescriptorShape,
}

impl DescriptorSetLayout {
    /// Creates a layout for `buffers` uniform buffers and `textures`
    /// combined image samplers.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(device: Arc<Device>, buffers: u32, textures: u32) -> RhiResult<Self> {
        let bindings = layout_bindings(buffers, textures);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout: {} buffer(s), {} texture(s)",
            buffers, textures
        );

        Ok(Self {
            device,
            layout,
            shape: DescriptorShape { buffers, textures },
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn shape(&self) -> DescriptorShape {
        self.shape
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool with capacity fixed by a [`DescriptorTally`].
///
/// Sets are allocated once and live as long as the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    budget: DescriptorBudget,
}

impl DescriptorPool {
    /// Creates a pool holding exactly `tally`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DescriptorTallyMismatch`] for a tally without
    /// sets, or the Vulkan error.
    pub fn from_tally(device: Arc<Device>, tally: DescriptorTally) -> RhiResult<Self> {
        if tally.sets == 0 {
            return Err(RhiError::DescriptorTallyMismatch(format!(
                "a descriptor pool needs at least one set, got {}",
                tally
            )));
        }

        let pool_sizes = tally.pool_sizes();
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(tally.sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        info!("Created descriptor pool for {}", tally);

        Ok(Self {
            device,
            pool,
            budget: DescriptorBudget::new(tally),
        })
    }

    /// Allocates and writes a set binding `buffers` then `images`.
    ///
    /// An empty `layout` slot receives a new layout of this shape; a filled
    /// slot is reused and must have the same shape.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if `layout` has another shape, or
    /// [`RhiError::DescriptorCapacity`] if the request exceeds the remaining
    /// capacity. Both are checked before anything is created or spent.
    pub fn get_descriptor_set(
        &mut self,
        buffers: &[&Buffer],
        images: &[vk::DescriptorImageInfo],
        layout: &mut Option<DescriptorSetLayout>,
    ) -> RhiResult<vk::DescriptorSet> {
        let requested = DescriptorShape::new(buffers.len(), images.len());
        admit(
            &self.budget,
            layout.as_ref().map(DescriptorSetLayout::shape),
            requested,
        )?;

        let layout = match layout {
            Some(existing) => existing,
            empty => empty.insert(DescriptorSetLayout::new(
                self.device.clone(),
                requested.buffers,
                requested.textures,
            )?),
        };

        let set_layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&set_layouts);
        let set = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)?[0] };
        self.budget.reserve(requested.buffers, requested.textures)?;

        let buffer_infos: Vec<_> = buffers
            .iter()
            .map(|buffer| buffer_info(buffer.handle(), 0, vk::WHOLE_SIZE))
            .collect();
        let mut writes: Vec<_> = buffer_infos
            .iter()
            .enumerate()
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(binding as u32)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(std::slice::from_ref(info))
            })
            .collect();
        writes.extend(image_writes(set, buffers.len() as u32, images));
        update_descriptor_sets(&self.device, &writes);

        debug!(
            "Allocated descriptor set: {} buffer(s), {} image(s)",
            buffers.len(),
            images.len()
        );
        Ok(set)
    }

    /// Rewrites the image bindings of `set` in place.
    ///
    /// The caller guarantees the set is not in use by pending GPU work.
    pub fn update_images(
        &self,
        set: vk::DescriptorSet,
        layout: &DescriptorSetLayout,
        images: &[vk::DescriptorImageInfo],
    ) -> RhiResult<()> {
        let shape = layout.shape();
        shape.ensure_textures(images.len())?;
        let writes = image_writes(set, shape.buffers, images);
        update_descriptor_sets(&self.device, &writes);
        Ok(())
    }

    /// Fails if the declared tally was larger than what was allocated.
    pub fn verify_exhausted(&self) -> RhiResult<()> {
        self.budget.verify_exhausted()
    }

    #[inline]
    pub fn remaining(&self) -> DescriptorTally {
        self.budget.remaining()
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

fn image_writes(
    set: vk::DescriptorSet,
    first_binding: u32,
    images: &[vk::DescriptorImageInfo],
) -> Vec<vk::WriteDescriptorSet<'_>> {
    images
        .iter()
        .enumerate()
        .map(|(i, info)| {
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(first_binding + i as u32)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(std::slice::from_ref(info))
        })
        .collect()
}

/// Applies descriptor writes.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Image info for a sampled image in `SHADER_READ_ONLY_OPTIMAL`.
#[inline]
pub fn sampled_image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
}

/// Single-descriptor layout bindings.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }

    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}
