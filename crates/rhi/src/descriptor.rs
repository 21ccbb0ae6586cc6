//! Descriptor set management for shader resource binding.
//!
//! This module provides:
//! - [`DescriptorLayoutBuilder`] accumulates `(binding, type)` pairs and
//!   produces an immutable [`DescriptorLayoutDesc`] snapshot
//! - [`DescriptorSetLayout`] compiles a description into a Vulkan layout
//! - [`DescriptorAllocator`] owns one fixed-capacity pool partitioned by
//!   [`PoolSizeRatio`]s and hands out sets against a layout
//!
//! # Overview
//!
//! A pool created with `max_sets` and ratios reserves
//! `floor(max_sets * ratio)` descriptors of each type. The reservation is
//! fixed for the pool's lifetime: there is no growth and sets are never
//! freed individually. [`DescriptorAllocator::reset`] reclaims every set at
//! once and [`DescriptorAllocator::destroy`] releases the pool itself. Any
//! set obtained before either call must not be used afterwards.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{
//!     DescriptorAllocator, DescriptorLayoutBuilder, DescriptorSetLayout, PoolSizeRatio,
//! };
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let mut builder = DescriptorLayoutBuilder::new();
//! builder.add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     builder.build(vk::ShaderStageFlags::COMPUTE),
//! )?;
//!
//! let ratios = [PoolSizeRatio::new(vk::DescriptorType::STORAGE_IMAGE, 1.0)];
//! let mut allocator = DescriptorAllocator::init(device.clone(), 10, &ratios)?;
//! let set = allocator.allocate(&layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::deletion_queue::{DeletionEntry, DeletionQueue};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

// =============================================================================
// Layout description
// =============================================================================

/// One binding of a descriptor set layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBinding {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl LayoutBinding {
    fn to_vk(self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

/// Immutable description of a descriptor set layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorLayoutDesc {
    pub bindings: Vec<LayoutBinding>,
    pub flags: vk::DescriptorSetLayoutCreateFlags,
}

impl DescriptorLayoutDesc {
    /// Total descriptors of `ty` one set of this layout consumes.
    pub fn descriptors_of(&self, ty: vk::DescriptorType) -> u32 {
        self.bindings
            .iter()
            .filter(|b| b.descriptor_type == ty)
            .map(|b| b.count)
            .sum()
    }

    /// Distinct descriptor types used by this layout, in binding order.
    pub fn descriptor_types(&self) -> Vec<vk::DescriptorType> {
        let mut types: Vec<vk::DescriptorType> = Vec::new();
        for b in &self.bindings {
            if !types.contains(&b.descriptor_type) {
                types.push(b.descriptor_type);
            }
        }
        types
    }
}

/// Accumulates bindings for a descriptor set layout.
///
/// Each binding holds exactly one descriptor. Stage visibility is applied at
/// [`build`](Self::build) time to every accumulated binding. Building returns
/// a snapshot, so clearing and reusing the builder never affects layouts
/// built earlier.
#[derive(Debug, Clone, Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<LayoutBinding>,
}

impl DescriptorLayoutBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a single-descriptor binding with no stage visibility yet.
    pub fn add_binding(&mut self, binding: u32, descriptor_type: vk::DescriptorType) -> &mut Self {
        self.bindings.push(LayoutBinding {
            binding,
            descriptor_type,
            count: 1,
            stages: vk::ShaderStageFlags::empty(),
        });
        self
    }

    /// Drops every accumulated binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Unions `stages` into every accumulated binding and returns the result.
    ///
    /// Calling `build` again without clearing keeps unioning, so the stage
    /// masks only ever grow.
    pub fn build(&mut self, stages: vk::ShaderStageFlags) -> DescriptorLayoutDesc {
        self.build_with_flags(stages, vk::DescriptorSetLayoutCreateFlags::empty())
    }

    /// Same as [`build`](Self::build) with explicit layout create flags.
    pub fn build_with_flags(
        &mut self,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> DescriptorLayoutDesc {
        for binding in &mut self.bindings {
            binding.stages |= stages;
        }

        DescriptorLayoutDesc {
            bindings: self.bindings.clone(),
            flags,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// =============================================================================
// DescriptorSetLayout
// =============================================================================

/// Vulkan descriptor set layout compiled from a [`DescriptorLayoutDesc`].
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    desc: DescriptorLayoutDesc,
}

impl DescriptorSetLayout {
    /// Compiles `desc` into a layout.
    ///
    /// # Errors
    ///
    /// Returns an error if `vkCreateDescriptorSetLayout` fails.
    pub fn new(device: Arc<Device>, desc: DescriptorLayoutDesc) -> RhiResult<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> =
            desc.bindings.iter().map(|b| b.to_vk()).collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&bindings)
            .flags(desc.flags);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self {
            device,
            layout,
            desc,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// The description this layout was compiled from.
    #[inline]
    pub fn desc(&self) -> &DescriptorLayoutDesc {
        &self.desc
    }

    /// Gives up ownership so the layout is released by a deletion queue.
    pub fn into_deletion(mut self) -> DeletionEntry {
        DeletionEntry::DescriptorSetLayout(std::mem::take(&mut self.layout))
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        if self.layout == vk::DescriptorSetLayout::null() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

// =============================================================================
// Pool budget
// =============================================================================

/// Share of a pool's `max_sets` reserved for one descriptor type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub const fn new(descriptor_type: vk::DescriptorType, ratio: f32) -> Self {
        Self {
            descriptor_type,
            ratio,
        }
    }
}

/// Host-side bookkeeping of a pool's fixed capacity.
///
/// Mirrors what the driver reserves so exhaustion is reported with the
/// offending type instead of a bare `ERROR_OUT_OF_POOL_MEMORY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolBudget {
    max_sets: u32,
    sets_allocated: u32,
    /// `(type, reserved, used)` per descriptor type.
    types: Vec<(vk::DescriptorType, u32, u32)>,
}

impl PoolBudget {
    /// Reserves `floor(max_sets * ratio)` descriptors per type.
    ///
    /// Ratios naming the same type add up.
    pub fn new(max_sets: u32, ratios: &[PoolSizeRatio]) -> Self {
        let mut types: Vec<(vk::DescriptorType, u32, u32)> = Vec::new();
        for r in ratios {
            let reserved = (max_sets as f32 * r.ratio).floor().max(0.0) as u32;
            match types.iter_mut().find(|t| t.0 == r.descriptor_type) {
                Some(entry) => entry.1 += reserved,
                None => types.push((r.descriptor_type, reserved, 0)),
            }
        }

        Self {
            max_sets,
            sets_allocated: 0,
            types,
        }
    }

    /// Pool sizes to create the Vulkan pool with. Zero-sized types are left
    /// out since Vulkan rejects a zero `descriptorCount`.
    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        self.types
            .iter()
            .filter(|(_, reserved, _)| *reserved > 0)
            .map(|&(ty, reserved, _)| {
                vk::DescriptorPoolSize::default()
                    .ty(ty)
                    .descriptor_count(reserved)
            })
            .collect()
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    #[inline]
    pub fn sets_allocated(&self) -> u32 {
        self.sets_allocated
    }

    /// Descriptors of `ty` still unclaimed.
    pub fn remaining(&self, ty: vk::DescriptorType) -> u32 {
        self.types
            .iter()
            .find(|t| t.0 == ty)
            .map_or(0, |&(_, reserved, used)| reserved - used)
    }

    /// Checks that one set of `desc` fits, without claiming anything.
    ///
    /// # Errors
    ///
    /// [`RhiError::DescriptorSetsExhausted`] if every set is taken, or
    /// [`RhiError::DescriptorPoolExhausted`] naming the first type that does
    /// not fit.
    pub fn check(&self, desc: &DescriptorLayoutDesc) -> RhiResult<()> {
        if self.sets_allocated >= self.max_sets {
            return Err(RhiError::DescriptorSetsExhausted {
                max_sets: self.max_sets,
            });
        }

        for ty in desc.descriptor_types() {
            let requested = desc.descriptors_of(ty);
            let available = self.remaining(ty);
            if requested > available {
                return Err(RhiError::DescriptorPoolExhausted {
                    descriptor_type: ty,
                    requested,
                    available,
                });
            }
        }

        Ok(())
    }

    /// Claims capacity for one set of `desc`. All or nothing.
    pub fn try_reserve(&mut self, desc: &DescriptorLayoutDesc) -> RhiResult<()> {
        self.check(desc)?;

        for (ty, _, used) in &mut self.types {
            *used += desc.descriptors_of(*ty);
        }
        self.sets_allocated += 1;
        Ok(())
    }

    /// Returns every claimed descriptor and set to the budget.
    pub fn reset(&mut self) {
        self.sets_allocated = 0;
        for (_, _, used) in &mut self.types {
            *used = 0;
        }
    }
}

// =============================================================================
// DescriptorAllocator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PoolState {
    Live,
    /// Destroyed directly or handed to a deletion queue.
    Released,
}

/// Fixed-capacity descriptor pool with whole-pool reset and destroy.
pub struct DescriptorAllocator {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    budget: PoolBudget,
    state: PoolState,
}

impl DescriptorAllocator {
    /// Creates a pool for `max_sets` sets partitioned by `ratios`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn init(device: Arc<Device>, max_sets: u32, ratios: &[PoolSizeRatio]) -> RhiResult<Self> {
        let budget = PoolBudget::new(max_sets, ratios);
        let pool_sizes = budget.pool_sizes();

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={:?}",
            max_sets,
            pool_sizes
                .iter()
                .map(|s| (s.ty, s.descriptor_count))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            device,
            pool,
            budget,
            state: PoolState::Live,
        })
    }

    /// Allocates one set conforming to `layout`.
    ///
    /// # Errors
    ///
    /// Fails without claiming anything if the pool lacks a set or any
    /// descriptor type `layout` needs, or if the pool was destroyed.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.ensure_live()?;
        self.budget.check(layout.desc())?;

        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        let set = sets
            .first()
            .copied()
            .ok_or(RhiError::DescriptorSetsExhausted {
                max_sets: self.budget.max_sets(),
            })?;

        self.budget.try_reserve(layout.desc())?;
        debug!(
            "Allocated descriptor set {}/{}",
            self.budget.sets_allocated(),
            self.budget.max_sets()
        );

        Ok(set)
    }

    /// Invalidates every set allocated so far; the pool stays usable.
    pub fn reset(&mut self) -> RhiResult<()> {
        self.ensure_live()?;
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }
        self.budget.reset();

        debug!("Reset descriptor pool");

        Ok(())
    }

    /// Destroys the pool and, with it, every set.
    ///
    /// # Errors
    ///
    /// [`RhiError::AlreadyDestroyed`] if the pool was already released.
    pub fn destroy(&mut self) -> RhiResult<()> {
        self.ensure_live()?;
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        self.release();

        debug!("Destroyed descriptor pool");

        Ok(())
    }

    /// Hands the pool to `queue`; it is destroyed when the queue flushes.
    pub fn defer_destroy(&mut self, queue: &mut DeletionQueue) -> RhiResult<()> {
        self.ensure_live()?;
        queue.push(DeletionEntry::DescriptorPool(self.pool));
        self.release();
        Ok(())
    }

    #[inline]
    pub fn budget(&self) -> &PoolBudget {
        &self.budget
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    fn ensure_live(&self) -> RhiResult<()> {
        match self.state {
            PoolState::Live => Ok(()),
            PoolState::Released => Err(RhiError::AlreadyDestroyed("descriptor pool")),
        }
    }

    fn release(&mut self) {
        self.pool = vk::DescriptorPool::null();
        self.state = PoolState::Released;
    }
}

impl Drop for DescriptorAllocator {
    fn drop(&mut self) {
        if self.state == PoolState::Live {
            warn!("Descriptor pool dropped while live; destroying it now");
            unsafe {
                self.device
                    .handle()
                    .destroy_descriptor_pool(self.pool, None);
            }
        }
    }
}

// =============================================================================
// Writes
// =============================================================================

/// Writes `infos` into `set` at `binding`.
pub fn write_images(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    infos: &[vk::DescriptorImageInfo],
) {
    if infos.is_empty() {
        return;
    }

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type)
        .image_info(infos);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }

    debug!("Updated binding {} with {} image(s)", binding, infos.len());
}

#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}
