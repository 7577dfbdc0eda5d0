//! Cached render state objects
//!
//! Each state keeps its engine-level descriptor next to the native structure
//! built from it. The native structure is built on first access and rebuilt
//! only after the descriptor changes. Every engine value maps to a native one;
//! values Vulkan cannot express are logged and replaced with a safe default.

use crate::render::backends::vulkan::{DeviceRef, VulkanResult};
use crate::render::state::{
    AddressMode, BlendDesc, BlendFactor, BlendOperation, BorderColor, ColorWriteMask, ComparisonFunc, CullMode,
    DepthStencilDesc, FilterMode, MipFilter, MultisampleDesc, PolygonMode, RasterizerDesc, SamplerDesc,
    StencilFaceDesc, StencilOperation,
};
use ash::vk;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Largest anisotropy a sampler is created with
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Descriptor plus the native object built from it
#[derive(Debug, Clone)]
pub struct Cached<D, B> {
    desc: D,
    built: Option<B>,
    revision: u64,
}

impl<D: PartialEq, B> Cached<D, B> {
    /// Wrap a descriptor; nothing is built yet
    pub fn new(desc: D) -> Self {
        Self {
            desc,
            built: None,
            revision: next_revision(),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &D {
        &self.desc
    }

    /// Replace the descriptor; returns the stale built object if it changed
    pub fn set_desc(&mut self, desc: D) -> Option<B> {
        if desc == self.desc {
            return None;
        }
        self.desc = desc;
        self.revision = next_revision();
        self.built.take()
    }

    /// Built object, if any
    pub const fn get(&self) -> Option<&B> {
        self.built.as_ref()
    }

    /// Built object, building it from the descriptor if needed
    pub fn get_or_build(&mut self, build: impl FnOnce(&D) -> B) -> &B {
        let desc = &self.desc;
        self.built.get_or_insert_with(|| build(desc))
    }

    /// Built object, building it with a fallible builder if needed
    pub fn try_get_or_build<E>(&mut self, build: impl FnOnce(&D) -> Result<B, E>) -> Result<&B, E> {
        let built = match self.built.take() {
            Some(built) => built,
            None => build(&self.desc)?,
        };
        Ok(self.built.insert(built))
    }

    /// Drop the built object so the next access rebuilds it
    pub fn take(&mut self) -> Option<B> {
        self.built.take()
    }

    /// Stamp of the current descriptor
    ///
    /// Stamps are unique across every cache, so two caches (or a cache and its
    /// clone) report the same revision only while holding the same descriptor.
    pub const fn revision(&self) -> u64 {
        self.revision
    }
}

// Native mappings

/// Native blend factor
pub const fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::InvSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DestAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::InvDestAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::DestColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::InvDestColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlphaSat => vk::BlendFactor::SRC_ALPHA_SATURATE,
        BlendFactor::BlendFactor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::InvBlendFactor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
    }
}

/// Native blend operation
pub const fn blend_op(op: BlendOperation) -> vk::BlendOp {
    match op {
        BlendOperation::Add => vk::BlendOp::ADD,
        BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
        BlendOperation::RevSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOperation::Min => vk::BlendOp::MIN,
        BlendOperation::Max => vk::BlendOp::MAX,
    }
}

/// Native color component mask
pub fn color_write_mask(mask: ColorWriteMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorWriteMask::RED) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorWriteMask::GREEN) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorWriteMask::BLUE) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorWriteMask::ALPHA) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

/// Native compare operation
pub const fn compare_op(func: ComparisonFunc) -> vk::CompareOp {
    match func {
        ComparisonFunc::Never => vk::CompareOp::NEVER,
        ComparisonFunc::Less => vk::CompareOp::LESS,
        ComparisonFunc::Equal => vk::CompareOp::EQUAL,
        ComparisonFunc::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        ComparisonFunc::Greater => vk::CompareOp::GREATER,
        ComparisonFunc::NotEqual => vk::CompareOp::NOT_EQUAL,
        ComparisonFunc::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        ComparisonFunc::Always => vk::CompareOp::ALWAYS,
    }
}

/// Native stencil operation
pub const fn stencil_op(op: StencilOperation) -> vk::StencilOp {
    match op {
        StencilOperation::Keep => vk::StencilOp::KEEP,
        StencilOperation::Zero => vk::StencilOp::ZERO,
        StencilOperation::Replace => vk::StencilOp::REPLACE,
        StencilOperation::IncrSat => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOperation::DecrSat => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOperation::Invert => vk::StencilOp::INVERT,
        StencilOperation::Incr => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOperation::Decr => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

/// Native polygon mode
pub const fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Point => vk::PolygonMode::POINT,
        PolygonMode::Wireframe => vk::PolygonMode::LINE,
        PolygonMode::Solid => vk::PolygonMode::FILL,
    }
}

/// Native cull mode
pub const fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

/// Native texel filter
pub const fn filter(mode: FilterMode) -> vk::Filter {
    match mode {
        FilterMode::Point => vk::Filter::NEAREST,
        FilterMode::Linear => vk::Filter::LINEAR,
    }
}

/// Mipmap mode; `MipFilter::None` has no native mode and samples mip 0 only
pub const fn mipmap_mode(mode: MipFilter) -> vk::SamplerMipmapMode {
    match mode {
        MipFilter::None | MipFilter::Point => vk::SamplerMipmapMode::NEAREST,
        MipFilter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

/// Native address mode
pub const fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Wrap => vk::SamplerAddressMode::REPEAT,
        AddressMode::Mirror => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::Clamp => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::Border => vk::SamplerAddressMode::CLAMP_TO_BORDER,
        AddressMode::MirrorOnce => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
    }
}

/// Native border color
pub const fn border_color(color: BorderColor) -> vk::BorderColor {
    match color {
        BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
        BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
        BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
    }
}

/// Sample count flag for `count`; unsupported counts fall back to one sample
pub fn sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        16 => vk::SampleCountFlags::TYPE_16,
        32 => vk::SampleCountFlags::TYPE_32,
        64 => vk::SampleCountFlags::TYPE_64,
        other => {
            log::error!("Unsupported sample count {}, using 1", other);
            vk::SampleCountFlags::TYPE_1
        }
    }
}

fn stencil_face(face: &StencilFaceDesc, desc: &DepthStencilDesc) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op(face.fail_op),
        pass_op: stencil_op(face.pass_op),
        depth_fail_op: stencil_op(face.depth_fail_op),
        compare_op: compare_op(face.func),
        compare_mask: u32::from(desc.stencil_read_mask),
        write_mask: u32::from(desc.stencil_write_mask),
        reference: desc.stencil_ref,
    }
}

/// Color attachment blend state
#[derive(Debug, Clone)]
pub struct BlendState {
    cache: Cached<BlendDesc, vk::PipelineColorBlendAttachmentState>,
}

impl BlendState {
    /// Wrap a descriptor
    pub fn new(desc: BlendDesc) -> Self {
        Self {
            cache: Cached::new(desc),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &BlendDesc {
        self.cache.desc()
    }

    /// Replace the descriptor
    pub fn set_desc(&mut self, desc: BlendDesc) {
        self.cache.set_desc(desc);
    }

    /// Native attachment state
    pub fn attachment(&mut self) -> vk::PipelineColorBlendAttachmentState {
        *self.cache.get_or_build(|desc| {
            vk::PipelineColorBlendAttachmentState::builder()
                .blend_enable(desc.blend_enable)
                .src_color_blend_factor(blend_factor(desc.src_blend))
                .dst_color_blend_factor(blend_factor(desc.dst_blend))
                .color_blend_op(blend_op(desc.blend_op))
                .src_alpha_blend_factor(blend_factor(desc.src_alpha_blend))
                .dst_alpha_blend_factor(blend_factor(desc.dst_alpha_blend))
                .alpha_blend_op(blend_op(desc.alpha_blend_op))
                .color_write_mask(color_write_mask(desc.color_write_mask))
                .build()
        })
    }

    /// Constant color used by `BlendFactor::BlendFactor`
    pub const fn blend_constants(&self) -> [f32; 4] {
        self.cache.desc().blend_factor
    }

    /// Descriptor revision
    pub const fn revision(&self) -> u64 {
        self.cache.revision()
    }
}

/// Depth and stencil test state
#[derive(Debug, Clone)]
pub struct DepthStencilState {
    cache: Cached<DepthStencilDesc, vk::PipelineDepthStencilStateCreateInfo>,
}

impl DepthStencilState {
    /// Wrap a descriptor
    pub fn new(desc: DepthStencilDesc) -> Self {
        Self {
            cache: Cached::new(desc),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &DepthStencilDesc {
        self.cache.desc()
    }

    /// Replace the descriptor
    pub fn set_desc(&mut self, desc: DepthStencilDesc) {
        self.cache.set_desc(desc);
    }

    /// Native create info
    pub fn create_info(&mut self) -> vk::PipelineDepthStencilStateCreateInfo {
        *self.cache.get_or_build(|desc| {
            vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(desc.depth_enable)
                .depth_write_enable(desc.depth_enable && desc.write_depth)
                .depth_compare_op(compare_op(desc.depth_func))
                .depth_bounds_test_enable(false)
                .stencil_test_enable(desc.stencil_enable)
                .front(stencil_face(&desc.front_face, desc))
                .back(stencil_face(&desc.back_face, desc))
                .min_depth_bounds(0.0)
                .max_depth_bounds(1.0)
                .build()
        })
    }

    /// Descriptor revision
    pub const fn revision(&self) -> u64 {
        self.cache.revision()
    }
}

/// Rasterization state
#[derive(Debug, Clone)]
pub struct RasterizerState {
    cache: Cached<RasterizerDesc, vk::PipelineRasterizationStateCreateInfo>,
}

impl RasterizerState {
    /// Wrap a descriptor
    pub fn new(desc: RasterizerDesc) -> Self {
        Self {
            cache: Cached::new(desc),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &RasterizerDesc {
        self.cache.desc()
    }

    /// Replace the descriptor
    pub fn set_desc(&mut self, desc: RasterizerDesc) {
        self.cache.set_desc(desc);
    }

    /// Native create info
    pub fn create_info(&mut self) -> vk::PipelineRasterizationStateCreateInfo {
        *self.cache.get_or_build(|desc| {
            let front_face = if desc.front_face_ccw {
                vk::FrontFace::COUNTER_CLOCKWISE
            } else {
                vk::FrontFace::CLOCKWISE
            };
            let line_width = if desc.line_width > 0.0 {
                desc.line_width
            } else {
                log::warn!("Invalid line width {}, using 1.0", desc.line_width);
                1.0
            };
            vk::PipelineRasterizationStateCreateInfo::builder()
                .depth_clamp_enable(!desc.depth_clip)
                .rasterizer_discard_enable(false)
                .polygon_mode(polygon_mode(desc.polygon_mode))
                .cull_mode(cull_mode(desc.cull_mode))
                .front_face(front_face)
                .depth_bias_enable(desc.depth_bias != 0.0 || desc.depth_bias_factor != 0.0)
                .depth_bias_constant_factor(desc.depth_bias)
                .depth_bias_slope_factor(desc.depth_bias_factor)
                .depth_bias_clamp(0.0)
                .line_width(line_width)
                .build()
        })
    }

    /// Descriptor revision
    pub const fn revision(&self) -> u64 {
        self.cache.revision()
    }
}

/// Multisample state
#[derive(Debug, Clone)]
pub struct MultisampleState {
    cache: Cached<MultisampleDesc, vk::PipelineMultisampleStateCreateInfo>,
}

impl MultisampleState {
    /// Wrap a descriptor
    pub fn new(desc: MultisampleDesc) -> Self {
        Self {
            cache: Cached::new(desc),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &MultisampleDesc {
        self.cache.desc()
    }

    /// Replace the descriptor
    pub fn set_desc(&mut self, desc: MultisampleDesc) {
        self.cache.set_desc(desc);
    }

    /// Native create info
    pub fn create_info(&mut self) -> vk::PipelineMultisampleStateCreateInfo {
        *self.cache.get_or_build(|desc| {
            let (shading, min_shading) = match desc.min_sample_shading {
                Some(fraction) => (true, fraction.clamp(0.0, 1.0)),
                None => (false, 1.0),
            };
            vk::PipelineMultisampleStateCreateInfo::builder()
                .rasterization_samples(sample_count(desc.sample_count))
                .sample_shading_enable(shading)
                .min_sample_shading(min_shading)
                .alpha_to_coverage_enable(desc.alpha_to_coverage)
                .alpha_to_one_enable(false)
                .build()
        })
    }

    /// Descriptor revision
    pub const fn revision(&self) -> u64 {
        self.cache.revision()
    }
}

/// Build the native sampler create info for a descriptor
pub fn sampler_create_info(desc: &SamplerDesc) -> vk::SamplerCreateInfo {
    let anisotropy = if (1.0..=MAX_ANISOTROPY).contains(&desc.max_anisotropy) {
        desc.max_anisotropy
    } else {
        let clamped = desc.max_anisotropy.clamp(1.0, MAX_ANISOTROPY);
        log::warn!("Anisotropy {} out of range, using {}", desc.max_anisotropy, clamped);
        clamped
    };
    let max_lod = if desc.mip_filter == MipFilter::None {
        0.0
    } else {
        desc.max_lod
    };

    vk::SamplerCreateInfo::builder()
        .mag_filter(filter(desc.mag_filter))
        .min_filter(filter(desc.min_filter))
        .mipmap_mode(mipmap_mode(desc.mip_filter))
        .address_mode_u(address_mode(desc.address_u))
        .address_mode_v(address_mode(desc.address_v))
        .address_mode_w(address_mode(desc.address_w))
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(anisotropy > 1.0)
        .max_anisotropy(anisotropy)
        .compare_enable(desc.compare_func.is_some())
        .compare_op(compare_op(desc.compare_func.unwrap_or(ComparisonFunc::Always)))
        .min_lod(desc.min_lod)
        .max_lod(max_lod.max(desc.min_lod))
        .border_color(border_color(desc.border_color))
        .unnormalized_coordinates(false)
        .build()
}

/// Sampler object, recreated when its descriptor changes
pub struct SamplerState {
    device: DeviceRef,
    cache: Cached<SamplerDesc, vk::Sampler>,
}

impl SamplerState {
    /// Wrap a descriptor; the sampler is created on first use
    pub fn new(device: DeviceRef, desc: SamplerDesc) -> Self {
        Self {
            device,
            cache: Cached::new(desc),
        }
    }

    /// Current descriptor
    pub const fn desc(&self) -> &SamplerDesc {
        self.cache.desc()
    }

    /// Replace the descriptor, destroying the stale sampler
    pub fn set_desc(&mut self, desc: SamplerDesc) {
        if let Some(stale) = self.cache.set_desc(desc) {
            self.device.destroy_sampler(stale);
        }
    }

    /// Native sampler, created if needed
    pub fn sampler(&mut self) -> VulkanResult<vk::Sampler> {
        let device = &self.device;
        self.cache
            .try_get_or_build(|desc| device.create_sampler(&sampler_create_info(desc)))
            .copied()
    }

    /// Native sampler if it has been created
    pub fn current(&self) -> Option<vk::Sampler> {
        self.cache.get().copied()
    }
}

impl Drop for SamplerState {
    fn drop(&mut self) {
        if let Some(sampler) = self.cache.take() {
            self.device.destroy_sampler(sampler);
        }
    }
}

/// The four pipeline states of a program
#[derive(Debug, Clone)]
pub struct RenderStates {
    /// Blend
    pub blend: BlendState,
    /// Depth and stencil
    pub depth_stencil: DepthStencilState,
    /// Rasterizer
    pub rasterizer: RasterizerState,
    /// Multisample
    pub multisample: MultisampleState,
}

impl Default for RenderStates {
    fn default() -> Self {
        Self {
            blend: BlendState::new(BlendDesc::default()),
            depth_stencil: DepthStencilState::new(DepthStencilDesc::default()),
            rasterizer: RasterizerState::new(RasterizerDesc::default()),
            multisample: MultisampleState::new(MultisampleDesc::default()),
        }
    }
}

impl RenderStates {
    /// Revisions of the four states
    ///
    /// Changes whenever a descriptor changes or a state is replaced by one
    /// holding a different descriptor.
    pub const fn revisions(&self) -> [u64; 4] {
        [
            self.blend.revision(),
            self.depth_stencil.revision(),
            self.rasterizer.revision(),
            self.multisample.revision(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::backends::vulkan::{HeadlessDevice, ObjectKind};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    #[test]
    fn test_cached_builds_lazily_and_once() {
        let mut cache: Cached<u32, u32> = Cached::new(3);
        let mut builds = 0;
        assert!(cache.get().is_none());

        for _ in 0..3 {
            let value = *cache.get_or_build(|d| {
                builds += 1;
                d * 2
            });
            assert_eq!(value, 6);
        }
        assert_eq!(builds, 1);

        // Same descriptor keeps the cache
        let revision = cache.revision();
        assert!(cache.set_desc(3).is_none());
        assert_eq!(cache.get(), Some(&6));
        assert_eq!(cache.revision(), revision);

        assert_eq!(cache.set_desc(5), Some(6));
        assert!(cache.revision() > revision);
        assert_eq!(*cache.get_or_build(|d| d * 2), 10);
    }

    #[test]
    fn test_blend_state_rebuilds_after_change() {
        let mut state = BlendState::new(BlendDesc::default());
        let revision = state.revision();
        let opaque = state.attachment();
        assert_eq!(opaque.blend_enable, vk::FALSE);
        assert_eq!(
            opaque.color_write_mask,
            vk::ColorComponentFlags::R | vk::ColorComponentFlags::G | vk::ColorComponentFlags::B | vk::ColorComponentFlags::A
        );

        state.set_desc(BlendDesc::alpha_blend());
        let blended = state.attachment();
        assert_eq!(blended.blend_enable, vk::TRUE);
        assert_eq!(blended.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blended.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_ne!(state.revision(), revision);
    }

    #[test]
    fn test_depth_stencil_mapping() {
        let mut state = DepthStencilState::new(DepthStencilDesc {
            depth_func: ComparisonFunc::Greater,
            stencil_enable: true,
            stencil_ref: 7,
            front_face: StencilFaceDesc {
                pass_op: StencilOperation::IncrSat,
                ..StencilFaceDesc::default()
            },
            ..DepthStencilDesc::default()
        });
        let info = state.create_info();
        assert_eq!(info.depth_test_enable, vk::TRUE);
        assert_eq!(info.depth_compare_op, vk::CompareOp::GREATER);
        assert_eq!(info.stencil_test_enable, vk::TRUE);
        assert_eq!(info.front.pass_op, vk::StencilOp::INCREMENT_AND_CLAMP);
        assert_eq!(info.front.reference, 7);
        assert_eq!(info.back.compare_mask, 0xff);
    }

    #[test]
    fn test_rasterizer_mapping() {
        let mut state = RasterizerState::new(RasterizerDesc {
            polygon_mode: PolygonMode::Wireframe,
            cull_mode: CullMode::None,
            front_face_ccw: false,
            depth_bias: 1.5,
            ..RasterizerDesc::default()
        });
        let info = state.create_info();
        assert_eq!(info.polygon_mode, vk::PolygonMode::LINE);
        assert_eq!(info.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(info.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(info.depth_bias_enable, vk::TRUE);
        assert_eq!(info.depth_clamp_enable, vk::FALSE);
        assert_relative_eq!(info.depth_bias_constant_factor, 1.5);
    }

    #[test]
    fn test_unsupported_sample_count_falls_back() {
        assert_eq!(sample_count(4), vk::SampleCountFlags::TYPE_4);
        assert_eq!(sample_count(3), vk::SampleCountFlags::TYPE_1);

        let mut state = MultisampleState::new(MultisampleDesc {
            sample_count: 5,
            alpha_to_coverage: true,
            min_sample_shading: Some(2.0),
        });
        let info = state.create_info();
        assert_eq!(info.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(info.alpha_to_coverage_enable, vk::TRUE);
        assert_eq!(info.sample_shading_enable, vk::TRUE);
        assert_relative_eq!(info.min_sample_shading, 1.0);
    }

    #[test]
    fn test_sampler_create_info_edge_cases() {
        let info = sampler_create_info(&SamplerDesc {
            mip_filter: MipFilter::None,
            max_anisotropy: 64.0,
            compare_func: Some(ComparisonFunc::Less),
            ..SamplerDesc::default()
        });
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::NEAREST);
        assert_relative_eq!(info.max_lod, 0.0);
        assert_relative_eq!(info.max_anisotropy, MAX_ANISOTROPY);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.compare_enable, vk::TRUE);
        assert_eq!(info.compare_op, vk::CompareOp::LESS);

        let info = sampler_create_info(&SamplerDesc::clamped());
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::CLAMP_TO_EDGE);
        assert_eq!(info.anisotropy_enable, vk::FALSE);
    }

    #[test]
    fn test_sampler_state_recreates_on_change() {
        let device = Arc::new(HeadlessDevice::default());
        let mut state = SamplerState::new(device.clone(), SamplerDesc::default());
        assert!(state.current().is_none());

        let first = state.sampler().unwrap();
        assert_eq!(state.sampler().unwrap(), first);
        assert_eq!(device.created_count(ObjectKind::Sampler), 1);

        state.set_desc(SamplerDesc::clamped());
        assert!(!device.is_live(ObjectKind::Sampler, first));
        let second = state.sampler().unwrap();
        assert_ne!(first, second);
        assert_eq!(device.live_count(ObjectKind::Sampler), 1);

        drop(state);
        assert_eq!(device.live_count(ObjectKind::Sampler), 0);
    }

    #[test]
    fn test_render_states_revision_tracks_all_states() {
        let mut states = RenderStates::default();
        let initial = states.revisions();
        states.rasterizer.set_desc(RasterizerDesc {
            cull_mode: CullMode::Front,
            ..RasterizerDesc::default()
        });
        states.blend.set_desc(BlendDesc::additive());
        let changed = states.revisions();
        assert_ne!(changed[0], initial[0]);
        assert_eq!(changed[1], initial[1]);
        assert_ne!(changed[2], initial[2]);
        states.blend.set_desc(BlendDesc::additive());
        assert_eq!(states.revisions(), changed);
    }

    #[test]
    fn test_replaced_state_never_reuses_a_revision() {
        let mut states = RenderStates::default();
        let before = states.revisions();

        // A fresh state starts from its own stamp
        states.blend = BlendState::new(BlendDesc::alpha_blend());
        assert_ne!(states.revisions()[0], before[0]);

        // A clone shares the stamp only until either side changes
        let mut copy = states.blend.clone();
        assert_eq!(copy.revision(), states.blend.revision());
        copy.set_desc(BlendDesc::additive());
        states.blend.set_desc(BlendDesc::default());
        assert_ne!(copy.revision(), states.blend.revision());
        states.blend = copy;
        assert_ne!(states.revisions()[0], before[0]);
    }
}
