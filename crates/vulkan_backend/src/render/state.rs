//! Engine-level render state descriptors
//!
//! Plain value types describing blend, depth-stencil, rasterizer, multisample and
//! sampler state. Backends translate them into native structures; see
//! `render::backends::vulkan::state::render_state`.
//!
//! Descriptors derive serde so materials can author them in RON or TOML. Enum
//! values can also be parsed from their snake_case names with [`parse_or_default`],
//! which logs unknown names and substitutes the default.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

macro_rules! named_enum {
    ($ty:ident { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

/// Parse an enum value by name, logging and falling back to the default on failure
pub fn parse_or_default<T>(name: &str) -> T
where
    T: FromStr<Err = String> + Default,
{
    name.parse().unwrap_or_else(|err: String| {
        log::error!("{err}, using default");
        T::default()
    })
}

/// Source or destination factor of a blend equation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    #[default]
    One,
    /// Source color
    SrcColor,
    /// 1 - source color
    InvSrcColor,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    InvSrcAlpha,
    /// Destination alpha
    DestAlpha,
    /// 1 - destination alpha
    InvDestAlpha,
    /// Destination color
    DestColor,
    /// 1 - destination color
    InvDestColor,
    /// min(source alpha, 1 - destination alpha)
    SrcAlphaSat,
    /// Constant blend factor
    BlendFactor,
    /// 1 - constant blend factor
    InvBlendFactor,
}

named_enum!(BlendFactor {
    "zero" => Zero,
    "one" => One,
    "src_color" => SrcColor,
    "inv_src_color" => InvSrcColor,
    "src_alpha" => SrcAlpha,
    "inv_src_alpha" => InvSrcAlpha,
    "dest_alpha" => DestAlpha,
    "inv_dest_alpha" => InvDestAlpha,
    "dest_color" => DestColor,
    "inv_dest_color" => InvDestColor,
    "src_alpha_sat" => SrcAlphaSat,
    "blend_factor" => BlendFactor,
    "inv_blend_factor" => InvBlendFactor,
});

/// Blend equation operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendOperation {
    /// src + dst
    #[default]
    Add,
    /// src - dst
    Subtract,
    /// dst - src
    RevSubtract,
    /// min(src, dst)
    Min,
    /// max(src, dst)
    Max,
}

named_enum!(BlendOperation {
    "add" => Add,
    "subtract" => Subtract,
    "rev_subtract" => RevSubtract,
    "min" => Min,
    "max" => Max,
});

bitflags! {
    /// Color channels written by the output merger
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ColorWriteMask: u8 {
        /// Red channel
        const RED = 0b0001;
        /// Green channel
        const GREEN = 0b0010;
        /// Blue channel
        const BLUE = 0b0100;
        /// Alpha channel
        const ALPHA = 0b1000;
        /// All channels
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Blend state of the single color attachment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendDesc {
    /// Enable blending
    pub blend_enable: bool,
    /// Color source factor
    pub src_blend: BlendFactor,
    /// Color destination factor
    pub dst_blend: BlendFactor,
    /// Color operator
    pub blend_op: BlendOperation,
    /// Alpha source factor
    pub src_alpha_blend: BlendFactor,
    /// Alpha destination factor
    pub dst_alpha_blend: BlendFactor,
    /// Alpha operator
    pub alpha_blend_op: BlendOperation,
    /// Written channels
    pub color_write_mask: ColorWriteMask,
    /// Constant used by `BlendFactor::BlendFactor`
    pub blend_factor: [f32; 4],
}

impl Default for BlendDesc {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: BlendFactor::One,
            dst_blend: BlendFactor::Zero,
            blend_op: BlendOperation::Add,
            src_alpha_blend: BlendFactor::One,
            dst_alpha_blend: BlendFactor::Zero,
            alpha_blend_op: BlendOperation::Add,
            color_write_mask: ColorWriteMask::ALL,
            blend_factor: [0.0; 4],
        }
    }
}

impl BlendDesc {
    /// Standard alpha blending (`src * a + dst * (1 - a)`)
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_blend: BlendFactor::SrcAlpha,
            dst_blend: BlendFactor::InvSrcAlpha,
            src_alpha_blend: BlendFactor::One,
            dst_alpha_blend: BlendFactor::InvSrcAlpha,
            ..Self::default()
        }
    }

    /// Additive blending
    pub fn additive() -> Self {
        Self {
            blend_enable: true,
            src_blend: BlendFactor::SrcAlpha,
            dst_blend: BlendFactor::One,
            src_alpha_blend: BlendFactor::One,
            dst_alpha_blend: BlendFactor::One,
            ..Self::default()
        }
    }
}

/// Comparison used by depth tests, stencil tests and comparison samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonFunc {
    /// Never passes
    Never,
    /// Passes if less
    Less,
    /// Passes if equal
    Equal,
    /// Passes if less or equal
    LessEqual,
    /// Passes if greater
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if greater or equal
    GreaterEqual,
    /// Always passes
    #[default]
    Always,
}

named_enum!(ComparisonFunc {
    "never" => Never,
    "less" => Less,
    "equal" => Equal,
    "less_equal" => LessEqual,
    "greater" => Greater,
    "not_equal" => NotEqual,
    "greater_equal" => GreaterEqual,
    "always" => Always,
});

/// Stencil buffer update operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StencilOperation {
    /// Keep the current value
    #[default]
    Keep,
    /// Set to zero
    Zero,
    /// Replace with the reference value
    Replace,
    /// Increment and clamp
    IncrSat,
    /// Decrement and clamp
    DecrSat,
    /// Bitwise invert
    Invert,
    /// Increment and wrap
    Incr,
    /// Decrement and wrap
    Decr,
}

named_enum!(StencilOperation {
    "keep" => Keep,
    "zero" => Zero,
    "replace" => Replace,
    "incr_sat" => IncrSat,
    "decr_sat" => DecrSat,
    "invert" => Invert,
    "incr" => Incr,
    "decr" => Decr,
});

/// Stencil behaviour of one face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilFaceDesc {
    /// Stencil test failed
    pub fail_op: StencilOperation,
    /// Stencil passed, depth failed
    pub depth_fail_op: StencilOperation,
    /// Both passed
    pub pass_op: StencilOperation,
    /// Stencil comparison
    pub func: ComparisonFunc,
}

/// Depth and stencil test state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilDesc {
    /// Enable the depth test
    pub depth_enable: bool,
    /// Write passing depth values
    pub write_depth: bool,
    /// Depth comparison
    pub depth_func: ComparisonFunc,
    /// Enable the stencil test
    pub stencil_enable: bool,
    /// Stencil compare mask
    pub stencil_read_mask: u8,
    /// Stencil write mask
    pub stencil_write_mask: u8,
    /// Front-facing polygons
    pub front_face: StencilFaceDesc,
    /// Back-facing polygons
    pub back_face: StencilFaceDesc,
    /// Stencil reference value
    pub stencil_ref: u32,
}

impl Default for DepthStencilDesc {
    fn default() -> Self {
        Self {
            depth_enable: true,
            write_depth: true,
            depth_func: ComparisonFunc::LessEqual,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front_face: StencilFaceDesc::default(),
            back_face: StencilFaceDesc::default(),
            stencil_ref: 0,
        }
    }
}

/// Polygon fill mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonMode {
    /// Vertices only
    Point,
    /// Edges only
    Wireframe,
    /// Filled
    #[default]
    Solid,
}

named_enum!(PolygonMode {
    "point" => Point,
    "wireframe" => Wireframe,
    "solid" => Solid,
});

/// Face culling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

named_enum!(CullMode {
    "none" => None,
    "front" => Front,
    "back" => Back,
});

/// Rasterizer state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizerDesc {
    /// Fill mode
    pub polygon_mode: PolygonMode,
    /// Culled faces
    pub cull_mode: CullMode,
    /// Counter-clockwise winding is front facing
    pub front_face_ccw: bool,
    /// Constant depth bias
    pub depth_bias: f32,
    /// Slope-scaled depth bias
    pub depth_bias_factor: f32,
    /// Clip against the near/far planes (false clamps depth instead)
    pub depth_clip: bool,
    /// Scissor test enable
    pub scissor: bool,
    /// Multisample rasterization enable
    pub multisample: bool,
    /// Rasterized line width
    pub line_width: f32,
}

impl Default for RasterizerDesc {
    fn default() -> Self {
        Self {
            polygon_mode: PolygonMode::Solid,
            cull_mode: CullMode::Back,
            front_face_ccw: true,
            depth_bias: 0.0,
            depth_bias_factor: 0.0,
            depth_clip: true,
            scissor: false,
            multisample: false,
            line_width: 1.0,
        }
    }
}

/// Multisample state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultisampleDesc {
    /// Samples per pixel; must be a power of two between 1 and 64
    pub sample_count: u32,
    /// Alpha-to-coverage enable
    pub alpha_to_coverage: bool,
    /// Minimum fraction of samples shaded; `None` disables sample shading
    pub min_sample_shading: Option<f32>,
}

impl Default for MultisampleDesc {
    fn default() -> Self {
        Self {
            sample_count: 1,
            alpha_to_coverage: false,
            min_sample_shading: None,
        }
    }
}

/// Texel filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Nearest texel
    Point,
    /// Linear interpolation
    #[default]
    Linear,
}

named_enum!(FilterMode {
    "point" => Point,
    "linear" => Linear,
});

/// Mipmap filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MipFilter {
    /// Sample mip 0 only
    None,
    /// Nearest mip
    #[default]
    Point,
    /// Interpolate between mips
    Linear,
}

named_enum!(MipFilter {
    "none" => None,
    "point" => Point,
    "linear" => Linear,
});

/// Texture coordinate addressing outside [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressMode {
    /// Repeat
    #[default]
    Wrap,
    /// Mirrored repeat
    Mirror,
    /// Clamp to edge
    Clamp,
    /// Clamp to the border color
    Border,
    /// Mirror once then clamp
    MirrorOnce,
}

named_enum!(AddressMode {
    "wrap" => Wrap,
    "mirror" => Mirror,
    "clamp" => Clamp,
    "border" => Border,
    "mirror_once" => MirrorOnce,
});

/// Border color for `AddressMode::Border`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderColor {
    /// (0, 0, 0, 0)
    #[default]
    TransparentBlack,
    /// (0, 0, 0, 1)
    OpaqueBlack,
    /// (1, 1, 1, 1)
    OpaqueWhite,
}

/// Sampler state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerDesc {
    /// Minification filter
    pub min_filter: FilterMode,
    /// Magnification filter
    pub mag_filter: FilterMode,
    /// Mipmap filter
    pub mip_filter: MipFilter,
    /// U addressing
    pub address_u: AddressMode,
    /// V addressing
    pub address_v: AddressMode,
    /// W addressing
    pub address_w: AddressMode,
    /// Anisotropy; 1 disables it, valid range is [1, 16]
    pub max_anisotropy: f32,
    /// Depth comparison for shadow samplers
    pub compare_func: Option<ComparisonFunc>,
    /// Border color
    pub border_color: BorderColor,
    /// Smallest mip level used
    pub min_lod: f32,
    /// Largest mip level used
    pub max_lod: f32,
    /// Bias added to the computed mip level
    pub mip_lod_bias: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_filter: MipFilter::Point,
            address_u: AddressMode::Wrap,
            address_v: AddressMode::Wrap,
            address_w: AddressMode::Wrap,
            max_anisotropy: 1.0,
            compare_func: None,
            border_color: BorderColor::TransparentBlack,
            min_lod: 0.0,
            max_lod: f32::MAX,
            mip_lod_bias: 0.0,
        }
    }
}

impl SamplerDesc {
    /// Clamp-to-edge sampler, as used for render targets
    pub fn clamped() -> Self {
        Self {
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_defaults_are_opaque() {
        let desc = BlendDesc::default();
        assert!(!desc.blend_enable);
        assert_eq!(desc.src_blend, BlendFactor::One);
        assert_eq!(desc.dst_blend, BlendFactor::Zero);
        assert_eq!(desc.color_write_mask, ColorWriteMask::ALL);
    }

    #[test]
    fn test_parse_known_names() {
        assert_eq!("inv_src_alpha".parse::<BlendFactor>(), Ok(BlendFactor::InvSrcAlpha));
        assert_eq!("less_equal".parse::<ComparisonFunc>(), Ok(ComparisonFunc::LessEqual));
        assert_eq!("mirror_once".parse::<AddressMode>(), Ok(AddressMode::MirrorOnce));
    }

    #[test]
    fn test_parse_unknown_name_falls_back_to_default() {
        let func: ComparisonFunc = parse_or_default("sometimes");
        assert_eq!(func, ComparisonFunc::Always);

        let cull: CullMode = parse_or_default("sideways");
        assert_eq!(cull, CullMode::Back);
    }

    #[test]
    fn test_descriptors_load_from_ron_with_defaults() {
        let desc: RasterizerDesc = ron::from_str("(cull_mode: none, polygon_mode: wireframe)").unwrap();
        assert_eq!(desc.cull_mode, CullMode::None);
        assert_eq!(desc.polygon_mode, PolygonMode::Wireframe);
        assert!(desc.depth_clip);

        let blend: BlendDesc = ron::from_str("(blend_enable: true, src_blend: src_alpha)").unwrap();
        assert!(blend.blend_enable);
        assert_eq!(blend.src_blend, BlendFactor::SrcAlpha);
        assert_eq!(blend.dst_blend, BlendFactor::Zero);
    }

    #[test]
    fn test_color_write_mask_bits() {
        let mask = ColorWriteMask::RED | ColorWriteMask::ALPHA;
        assert!(mask.contains(ColorWriteMask::RED));
        assert!(!mask.contains(ColorWriteMask::GREEN));
        assert_eq!(ColorWriteMask::ALL.bits(), 0b1111);
    }
}
