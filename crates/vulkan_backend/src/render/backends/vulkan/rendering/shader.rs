//! Shader programs and reflection-driven uniforms
//!
//! Linking a program creates its shader modules, a descriptor set layout with
//! one uniform-buffer binding per reflected block and one combined image
//! sampler binding per sampled texture, and the pipeline layout. Every block
//! member becomes an entry of the uniform table, addressed by name.
//!
//! Values set on the program are packed into one CPU mirror per block. Each
//! draw uploads the mirrors into a fresh uniform slot (a descriptor set and one
//! uniform buffer per block). Slots are kept per swapchain image and become
//! reusable once that image's fence has been waited again, so several draws
//! sharing a program within one frame never overwrite each other.

use super::reflection::{reflect_stage, StageReflection};
use crate::render::backends::vulkan::{
    BufferKind, DescriptorWrite, DeviceContext, GpuBuffer, PipelineStage, RenderStates, Texture, VulkanError,
    VulkanResult,
};
use crate::render::material::UniformValue;
use crate::render::shader_source::ShaderCompiler;
use ash::vk;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Descriptor sets allocated per pool unless configured otherwise
pub const DEFAULT_SETS_PER_POOL: u32 = 64;

/// Smallest uniform mirror; descriptor ranges must not be empty
const MIN_BLOCK_SIZE: usize = 16;

/// Type of a uniform table entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformType {
    /// 32-bit integer (also used for booleans)
    Int,
    /// 32-bit float
    Float,
    /// Two floats
    Vec2,
    /// Three floats
    Vec3,
    /// Four floats
    Vec4,
    /// Column-major 4x4 float matrix
    Mat4,
    /// Sampled texture; the value is the texture unit
    Texture,
}

impl UniformType {
    /// Size of one element in bytes
    pub const fn size(self) -> u32 {
        match self {
            Self::Int | Self::Float | Self::Texture => 4,
            Self::Vec2 => 8,
            Self::Vec3 => 12,
            Self::Vec4 => 16,
            Self::Mat4 => 64,
        }
    }
}

/// SPIR-V of one stage with its reflected interface
#[derive(Debug, Clone)]
pub struct CompiledStage {
    /// Pipeline stage
    pub stage: vk::ShaderStageFlags,
    /// SPIR-V words
    pub spirv: Vec<u32>,
    /// Reflected interface
    pub reflection: StageReflection,
}

impl CompiledStage {
    /// Reflect `spirv` for `stage`
    pub fn new(stage: vk::ShaderStageFlags, spirv: Vec<u32>) -> VulkanResult<Self> {
        let reflection = reflect_stage(&spirv)?;
        Ok(Self {
            stage,
            spirv,
            reflection,
        })
    }
}

/// Frame being recorded, as seen by uniform slot reuse
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    /// Swapchain image the frame renders to
    pub image_index: u32,
    /// Serial of that image's frame state, bumped by every fence wait
    pub serial: u64,
    /// Command buffer being recorded
    pub command_buffer: vk::CommandBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UniformLocation {
    Block { block: usize, offset: u32 },
    Sampler { sampler: usize },
}

/// Entry of the uniform table
#[derive(Debug, Clone)]
pub struct Uniform {
    name: String,
    uniform_type: UniformType,
    size: u32,
    stages: vk::ShaderStageFlags,
    location: UniformLocation,
    value: Vec<u8>,
    default: Vec<u8>,
    dirty: bool,
}

impl Uniform {
    /// Uniform name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element type
    pub const fn uniform_type(&self) -> UniformType {
        self.uniform_type
    }

    /// Size in bytes
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Number of elements
    pub const fn count(&self) -> u32 {
        self.size / self.uniform_type.size()
    }

    /// Stages that read the uniform
    pub const fn stages(&self) -> vk::ShaderStageFlags {
        self.stages
    }

    /// Byte offset inside its block; `None` for textures
    pub const fn offset(&self) -> Option<u32> {
        match self.location {
            UniformLocation::Block { offset, .. } => Some(offset),
            UniformLocation::Sampler { .. } => None,
        }
    }

    /// Current value bytes
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Whether the value changed since it was last packed
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Texture unit of a texture uniform
    pub fn texture_unit(&self) -> Option<u32> {
        match self.uniform_type {
            UniformType::Texture => u32::try_from(bytemuck::pod_read_unaligned::<i32>(&self.value)).ok(),
            _ => None,
        }
    }

    fn set_value(&mut self, bytes: &[u8]) {
        if self.value != bytes {
            self.value.copy_from_slice(bytes);
            self.dirty = true;
        }
    }
}

#[derive(Debug)]
struct UniformBlock {
    name: String,
    binding: u32,
    stages: vk::ShaderStageFlags,
    reflected_size: u32,
    mirror: Vec<u8>,
}

#[derive(Debug)]
struct SamplerBinding {
    name: String,
    binding: u32,
    stages: vk::ShaderStageFlags,
}

struct LinkedStage {
    stage: vk::ShaderStageFlags,
    module: vk::ShaderModule,
    reflection: StageReflection,
}

struct UniformSlot {
    set: vk::DescriptorSet,
    buffers: Vec<GpuBuffer>,
}

#[derive(Default)]
struct SlotRing {
    serial: Option<u64>,
    cursor: usize,
    slots: Vec<UniformSlot>,
}

/// Linked vertex and fragment stages with their uniform table
pub struct ShaderProgram {
    context: DeviceContext,
    sets_per_pool: u32,
    stages: Vec<LinkedStage>,
    set_layout: vk::DescriptorSetLayout,
    pipeline_layout: vk::PipelineLayout,
    blocks: Vec<UniformBlock>,
    samplers: Vec<SamplerBinding>,
    uniforms: Vec<Uniform>,
    by_name: HashMap<String, Vec<usize>>,
    pools: Vec<vk::DescriptorPool>,
    pool_remaining: u32,
    rings: Vec<SlotRing>,
    generation: u64,
    /// Fixed-function state the program's pipelines are built with
    pub states: RenderStates,
}

impl ShaderProgram {
    /// Create an unlinked program
    pub fn new(context: &DeviceContext, sets_per_pool: u32) -> Self {
        Self {
            context: context.clone(),
            sets_per_pool: sets_per_pool.max(1),
            stages: Vec::new(),
            set_layout: vk::DescriptorSetLayout::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            blocks: Vec::new(),
            samplers: Vec::new(),
            uniforms: Vec::new(),
            by_name: HashMap::new(),
            pools: Vec::new(),
            pool_remaining: 0,
            rings: Vec::new(),
            generation: 0,
            states: RenderStates::default(),
        }
    }

    /// Link the given stages, replacing any previous link
    ///
    /// Must not be called while a frame that used this program is being
    /// recorded. On failure the program is left unlinked.
    pub fn link(&mut self, stages: &[CompiledStage]) -> VulkanResult<()> {
        self.release();
        match self.try_link(stages) {
            Ok(()) => {
                self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
                log::info!(
                    "Linked shader program: {} uniform blocks, {} samplers, {} uniforms",
                    self.blocks.len(),
                    self.samplers.len(),
                    self.uniforms.len()
                );
                Ok(())
            }
            Err(err) => {
                log::error!("Failed to link shader program: {}", err);
                self.release();
                Err(err)
            }
        }
    }

    fn try_link(&mut self, stages: &[CompiledStage]) -> VulkanResult<()> {
        for required in [vk::ShaderStageFlags::VERTEX, vk::ShaderStageFlags::FRAGMENT] {
            if !stages.iter().any(|s| s.stage == required) {
                return Err(VulkanError::InvalidOperation {
                    reason: format!("program has no {required:?} stage"),
                });
            }
        }

        let device = self.context.device().clone();
        for compiled in stages {
            if compiled.stage == vk::ShaderStageFlags::COMPUTE {
                log::warn!("Compute stage ignored by graphics program");
                continue;
            }
            let module = device.create_shader_module(&compiled.spirv)?;
            self.stages.push(LinkedStage {
                stage: compiled.stage,
                module,
                reflection: compiled.reflection.clone(),
            });
            self.add_stage_uniforms(compiled)?;
        }

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .blocks
            .iter()
            .map(|block| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(block.binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(block.stages)
                    .build()
            })
            .chain(self.samplers.iter().map(|sampler| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(sampler.binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(sampler.stages)
                    .build()
            }))
            .collect();
        self.set_layout = device.create_descriptor_set_layout(&bindings)?;
        self.pipeline_layout = device.create_pipeline_layout(&[self.set_layout])?;

        self.alloc_uniform_bytes();
        Ok(())
    }

    fn add_stage_uniforms(&mut self, compiled: &CompiledStage) -> VulkanResult<()> {
        for reflected in &compiled.reflection.uniform_blocks {
            if self.samplers.iter().any(|s| s.binding == reflected.binding) {
                return Err(binding_conflict(&reflected.name, reflected.binding));
            }

            let block = match self.blocks.iter().position(|b| b.binding == reflected.binding) {
                Some(existing) => {
                    let shared = &mut self.blocks[existing];
                    if shared.name != reflected.name || shared.reflected_size != reflected.size {
                        return Err(binding_conflict(&reflected.name, reflected.binding));
                    }
                    shared.stages |= compiled.stage;
                    existing
                }
                None => {
                    self.blocks.push(UniformBlock {
                        name: reflected.name.clone(),
                        binding: reflected.binding,
                        stages: compiled.stage,
                        reflected_size: reflected.size,
                        mirror: Vec::new(),
                    });
                    self.blocks.len() - 1
                }
            };

            for member in &reflected.members {
                let already_known = self.by_name.get(&member.name).is_some_and(|indices| {
                    indices
                        .iter()
                        .any(|&i| matches!(self.uniforms[i].location, UniformLocation::Block { block: b, .. } if b == block))
                });
                if already_known {
                    self.mark_stage(&member.name, block, compiled.stage);
                    continue;
                }
                self.push_uniform(Uniform {
                    name: member.name.clone(),
                    uniform_type: member.uniform_type,
                    size: member.size,
                    stages: compiled.stage,
                    location: UniformLocation::Block {
                        block,
                        offset: member.offset,
                    },
                    value: vec![0; member.size as usize],
                    default: vec![0; member.size as usize],
                    dirty: true,
                });
            }
        }

        for reflected in &compiled.reflection.samplers {
            if self.blocks.iter().any(|b| b.binding == reflected.binding) {
                return Err(binding_conflict(&reflected.name, reflected.binding));
            }
            if let Some(sampler) = self.samplers.iter().position(|s| s.binding == reflected.binding) {
                if self.samplers[sampler].name != reflected.name {
                    return Err(binding_conflict(&reflected.name, reflected.binding));
                }
                self.samplers[sampler].stages |= compiled.stage;
                self.mark_sampler_stage(sampler, compiled.stage);
                continue;
            }

            let sampler = self.samplers.len();
            self.samplers.push(SamplerBinding {
                name: reflected.name.clone(),
                binding: reflected.binding,
                stages: compiled.stage,
            });
            // Texture units default to declaration order
            let unit = sampler as i32;
            self.push_uniform(Uniform {
                name: reflected.name.clone(),
                uniform_type: UniformType::Texture,
                size: UniformType::Texture.size(),
                stages: compiled.stage,
                location: UniformLocation::Sampler { sampler },
                value: unit.to_ne_bytes().to_vec(),
                default: unit.to_ne_bytes().to_vec(),
                dirty: true,
            });
        }
        Ok(())
    }

    fn push_uniform(&mut self, uniform: Uniform) {
        self.by_name
            .entry(uniform.name.clone())
            .or_default()
            .push(self.uniforms.len());
        self.uniforms.push(uniform);
    }

    fn mark_stage(&mut self, name: &str, block: usize, stage: vk::ShaderStageFlags) {
        for uniform in &mut self.uniforms {
            if uniform.name == name && matches!(uniform.location, UniformLocation::Block { block: b, .. } if b == block) {
                uniform.stages |= stage;
            }
        }
    }

    fn mark_sampler_stage(&mut self, sampler: usize, stage: vk::ShaderStageFlags) {
        for uniform in &mut self.uniforms {
            if uniform.location == (UniformLocation::Sampler { sampler }) {
                uniform.stages |= stage;
            }
        }
    }

    /// Size each block mirror to cover every member and zero it
    ///
    /// All uniforms are marked dirty so the next pack writes their values.
    pub fn alloc_uniform_bytes(&mut self) {
        for (index, uniform_block) in self.blocks.iter_mut().enumerate() {
            let extent = self
                .uniforms
                .iter()
                .filter_map(|u| match u.location {
                    UniformLocation::Block { block, offset } if block == index => Some((offset + u.size) as usize),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            let size = extent
                .max(uniform_block.reflected_size as usize)
                .max(MIN_BLOCK_SIZE);
            uniform_block.mirror = vec![0; size];
        }
        for uniform in &mut self.uniforms {
            uniform.dirty = true;
        }
    }

    fn release(&mut self) {
        let device = self.context.device().clone();
        self.rings.clear();
        for pool in self.pools.drain(..) {
            device.destroy_descriptor_pool(pool);
        }
        self.pool_remaining = 0;
        if self.pipeline_layout != vk::PipelineLayout::null() {
            device.destroy_pipeline_layout(self.pipeline_layout);
            self.pipeline_layout = vk::PipelineLayout::null();
        }
        if self.set_layout != vk::DescriptorSetLayout::null() {
            device.destroy_descriptor_set_layout(self.set_layout);
            self.set_layout = vk::DescriptorSetLayout::null();
        }
        for stage in self.stages.drain(..) {
            device.destroy_shader_module(stage.module);
        }
        self.blocks.clear();
        self.samplers.clear();
        self.uniforms.clear();
        self.by_name.clear();
    }

    /// Whether the program can be drawn with
    pub fn is_linked(&self) -> bool {
        self.pipeline_layout != vk::PipelineLayout::null()
    }

    /// Identity of the current link, unique across programs
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Descriptor sets allocated per pool
    pub fn set_sets_per_pool(&mut self, sets_per_pool: u32) {
        self.sets_per_pool = sets_per_pool.max(1);
    }

    /// Set a uniform from raw bytes
    ///
    /// Unknown names are ignored. Values whose size differs from the uniform's
    /// are logged and ignored.
    pub fn set_uniform(&mut self, name: &str, bytes: &[u8]) {
        let Some(indices) = self.by_name.get(name) else {
            log::debug!("Uniform '{}' is not used by the program", name);
            return;
        };
        for &index in indices {
            let uniform = &mut self.uniforms[index];
            if bytes.len() != uniform.size as usize {
                log::warn!(
                    "Uniform '{}' expects {} bytes, got {}",
                    name,
                    uniform.size,
                    bytes.len()
                );
                continue;
            }
            uniform.set_value(bytes);
        }
    }

    /// Restore the value a uniform had right after linking
    ///
    /// Block members go back to zero, textures to their declaration-order unit.
    pub fn reset_uniform(&mut self, name: &str) {
        let Some(indices) = self.by_name.get(name) else {
            return;
        };
        for &index in indices {
            let uniform = &mut self.uniforms[index];
            let default = std::mem::take(&mut uniform.default);
            uniform.set_value(&default);
            uniform.default = default;
        }
    }

    /// Set a uniform from a typed value
    pub fn set_uniform_value(&mut self, name: &str, value: &UniformValue) {
        self.set_uniform(name, &value.to_bytes());
    }

    /// Whether the program declares `name`
    pub fn has_uniform(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Uniform table entry for `name` (the first one if several stages declare it)
    pub fn uniform(&self, name: &str) -> Option<&Uniform> {
        self.by_name
            .get(name)
            .and_then(|indices| indices.first())
            .map(|&index| &self.uniforms[index])
    }

    /// Every uniform table entry
    pub fn uniforms(&self) -> impl Iterator<Item = &Uniform> {
        self.uniforms.iter()
    }

    /// Mirror of the first uniform block read by `stage`
    pub fn uniform_bytes(&self, stage: vk::ShaderStageFlags) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|block| block.stages.contains(stage))
            .map(|block| block.mirror.as_slice())
    }

    /// Mirror of the uniform block at `binding`
    pub fn block_bytes(&self, binding: u32) -> Option<&[u8]> {
        self.blocks
            .iter()
            .find(|block| block.binding == binding)
            .map(|block| block.mirror.as_slice())
    }

    /// Copy dirty values into the block mirrors
    pub fn pack_uniforms(&mut self) {
        for uniform in &mut self.uniforms {
            if !uniform.dirty {
                continue;
            }
            if let UniformLocation::Block { block, offset } = uniform.location {
                let start = offset as usize;
                let mirror = &mut self.blocks[block].mirror;
                mirror[start..start + uniform.value.len()].copy_from_slice(&uniform.value);
            }
            uniform.dirty = false;
        }
    }

    /// Pack uniforms, upload them into a free slot and write its descriptor set
    ///
    /// Texture uniforms read the texture bound to their unit in `textures`, or
    /// `fallback` when that unit is empty. Returns the set to bind.
    pub fn update_uniform_buffers(
        &mut self,
        frame: &FrameContext,
        textures: &[Option<Arc<Texture>>],
        fallback: &Texture,
    ) -> VulkanResult<vk::DescriptorSet> {
        if !self.is_linked() {
            return Err(VulkanError::InvalidOperation {
                reason: "shader program is not linked".to_string(),
            });
        }

        self.pack_uniforms();
        let slot_index = self.next_slot(frame)?;
        let slot = &mut self.rings[frame.image_index as usize].slots[slot_index];

        let mut writes = Vec::with_capacity(self.blocks.len() + self.samplers.len());
        for (buffer, block) in slot.buffers.iter_mut().zip(&self.blocks) {
            buffer.update_data(&block.mirror)?;
            writes.push(DescriptorWrite::UniformBuffer {
                binding: block.binding,
                buffer: buffer.handle(),
                range: block.mirror.len() as vk::DeviceSize,
            });
        }

        for uniform in &self.uniforms {
            let UniformLocation::Sampler { sampler } = uniform.location else {
                continue;
            };
            let texture = uniform
                .texture_unit()
                .and_then(|unit| textures.get(unit as usize))
                .and_then(Option::as_deref)
                .unwrap_or(fallback);
            writes.push(DescriptorWrite::CombinedImageSampler {
                binding: self.samplers[sampler].binding,
                view: texture.view(),
                sampler: texture.sampler(),
            });
        }

        self.context.device().update_descriptor_set(slot.set, &writes);
        log::trace!(
            "Updated uniform slot {} of image {} ({} writes)",
            slot_index,
            frame.image_index,
            writes.len()
        );
        Ok(slot.set)
    }

    fn next_slot(&mut self, frame: &FrameContext) -> VulkanResult<usize> {
        let index = frame.image_index as usize;
        if self.rings.len() <= index {
            self.rings.resize_with(index + 1, SlotRing::default);
        }

        let exhausted = {
            let ring = &mut self.rings[index];
            if ring.serial != Some(frame.serial) {
                // The image's fence was waited, every slot is free again
                ring.serial = Some(frame.serial);
                ring.cursor = 0;
            }
            ring.cursor == ring.slots.len()
        };
        if exhausted {
            let slot = self.create_slot()?;
            self.rings[index].slots.push(slot);
        }

        let ring = &mut self.rings[index];
        let cursor = ring.cursor;
        ring.cursor += 1;
        Ok(cursor)
    }

    fn create_slot(&mut self) -> VulkanResult<UniformSlot> {
        let set = self.allocate_set()?;
        let buffers = self
            .blocks
            .iter()
            .map(|_| GpuBuffer::new(&self.context, BufferKind::Uniform))
            .collect();
        Ok(UniformSlot { set, buffers })
    }

    fn allocate_set(&mut self) -> VulkanResult<vk::DescriptorSet> {
        let device = self.context.device().clone();
        if self.pool_remaining == 0 {
            let sets = self.sets_per_pool;
            let sizes = [
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::UNIFORM_BUFFER,
                    descriptor_count: (self.blocks.len() as u32).max(1) * sets,
                },
                vk::DescriptorPoolSize {
                    ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    descriptor_count: (self.samplers.len() as u32).max(1) * sets,
                },
            ];
            let pool = device.create_descriptor_pool(sets, &sizes)?;
            self.pools.push(pool);
            self.pool_remaining = sets;
            log::debug!("Created descriptor pool {} ({} sets)", self.pools.len(), sets);
        }

        let Some(&pool) = self.pools.last() else {
            return Err(VulkanError::InvalidOperation {
                reason: "no descriptor pool".to_string(),
            });
        };
        let set = device.allocate_descriptor_set(pool, self.set_layout)?;
        self.pool_remaining -= 1;
        Ok(set)
    }

    /// Stage modules for pipeline creation
    pub fn pipeline_stages(&self) -> Vec<PipelineStage> {
        self.stages
            .iter()
            .map(|stage| PipelineStage {
                stage: stage.stage,
                module: stage.module,
            })
            .collect()
    }

    /// Reflection of a linked stage
    pub fn reflection(&self, stage: vk::ShaderStageFlags) -> Option<&StageReflection> {
        self.stages
            .iter()
            .find(|linked| linked.stage == stage)
            .map(|linked| &linked.reflection)
    }

    /// Pipeline layout
    pub const fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    /// Descriptor set layout of set 0
    pub const fn descriptor_set_layout(&self) -> vk::DescriptorSetLayout {
        self.set_layout
    }

    /// Number of descriptor pools created so far
    pub fn descriptor_pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Names of the sampled textures, in binding order
    pub fn sampler_names(&self) -> impl Iterator<Item = &str> {
        self.samplers.iter().map(|s| s.name.as_str())
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("generation", &self.generation)
            .field("blocks", &self.blocks)
            .field("samplers", &self.samplers)
            .field("uniforms", &self.uniforms.len())
            .finish_non_exhaustive()
    }
}

fn binding_conflict(name: &str, binding: u32) -> VulkanError {
    VulkanError::InvalidOperation {
        reason: format!("'{name}' conflicts with another resource at binding {binding}"),
    }
}

fn compile_stage(
    stage: vk::ShaderStageFlags,
    stage_name: &'static str,
    source: &str,
    spirv: Vec<u32>,
) -> VulkanResult<CompiledStage> {
    if spirv.is_empty() {
        log::error!("{} shader '{}' produced no code", stage_name, source);
        return Err(VulkanError::ShaderCompilation {
            stage: stage_name,
            reason: format!("'{source}' produced no code"),
        });
    }
    CompiledStage::new(stage, spirv).map_err(|err| {
        log::error!("Failed to reflect {} shader '{}': {}", stage_name, source, err);
        err
    })
}

/// Compile, reflect and link a vertex/fragment program
pub fn create_shader_program(
    context: &DeviceContext,
    compiler: &dyn ShaderCompiler,
    vertex_source: &str,
    fragment_source: &str,
) -> VulkanResult<ShaderProgram> {
    let compiled = compiler.compile(vertex_source, fragment_source, None);
    if !compiled.compute.is_empty() {
        log::warn!("Compute stage ignored by graphics program");
    }

    let vertex = compile_stage(vk::ShaderStageFlags::VERTEX, "vertex", vertex_source, compiled.vertex)?;
    let fragment = compile_stage(
        vk::ShaderStageFlags::FRAGMENT,
        "fragment",
        fragment_source,
        compiled.fragment,
    )?;

    let mut program = ShaderProgram::new(context, DEFAULT_SETS_PER_POOL);
    program.link(&[vertex, fragment])?;
    Ok(program)
}
