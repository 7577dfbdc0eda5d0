//! SPIR-V reflection
//!
//! Reads the interface of one shader stage with `spirq` and reduces it to what
//! the backend consumes: vertex inputs by name and location, uniform blocks
//! with their members, and combined image samplers.

use super::shader::UniformType;
use crate::render::backends::vulkan::{VulkanError, VulkanResult};
use spirq::ty::{DescriptorType, ScalarType, Type};
use spirq::var::Variable;

/// Shader input variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedInput {
    /// Variable name
    pub name: String,
    /// Input location
    pub location: u32,
}

/// Member of a uniform block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedMember {
    /// Member name
    pub name: String,
    /// Byte offset inside the block
    pub offset: u32,
    /// Byte size, including array elements
    pub size: u32,
    /// Element type
    pub uniform_type: UniformType,
}

impl ReflectedMember {
    /// Number of elements of `uniform_type` the member spans
    pub const fn count(&self) -> u32 {
        self.size / self.uniform_type.size()
    }
}

/// Uniform buffer bound in descriptor set 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBlock {
    /// Block instance name
    pub name: String,
    /// Binding slot
    pub binding: u32,
    /// Block size in bytes
    pub size: u32,
    /// Members with a supported type
    pub members: Vec<ReflectedMember>,
}

/// Combined image sampler bound in descriptor set 0
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedSampler {
    /// Variable name
    pub name: String,
    /// Binding slot
    pub binding: u32,
}

/// Interface of one shader stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReflection {
    /// Stage inputs (vertex attributes for the vertex stage)
    pub inputs: Vec<ReflectedInput>,
    /// Uniform blocks
    pub uniform_blocks: Vec<ReflectedBlock>,
    /// Sampled textures
    pub samplers: Vec<ReflectedSampler>,
}

impl StageReflection {
    /// Input with the given name
    pub fn input(&self, name: &str) -> Option<&ReflectedInput> {
        self.inputs.iter().find(|input| input.name == name)
    }
}

/// SPIR-V magic number, first word of every module
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Words in the module header
const SPIRV_HEADER_WORDS: usize = 5;

/// Reflect a SPIR-V module
///
/// Input without a complete header is rejected before it reaches `spirq`.
pub fn reflect_stage(spirv: &[u32]) -> VulkanResult<StageReflection> {
    if spirv.len() < SPIRV_HEADER_WORDS || spirv[0] != SPIRV_MAGIC {
        return Err(VulkanError::Reflection(format!(
            "not a SPIR-V module ({} words)",
            spirv.len()
        )));
    }

    let entry_points = spirq::ReflectConfig::new()
        .spv(spirv)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| VulkanError::Reflection(format!("{e:?}")))?;

    let mut reflection = StageReflection::default();
    for entry_point in &entry_points {
        for var in &entry_point.vars {
            match var {
                Variable::Input { name, location, .. } => {
                    let Some(name) = name.clone() else { continue };
                    if name.starts_with("gl_") || reflection.input(&name).is_some() {
                        continue;
                    }
                    reflection.inputs.push(ReflectedInput {
                        name,
                        location: location.loc(),
                    });
                }
                Variable::Descriptor {
                    name,
                    desc_bind,
                    desc_ty,
                    ty,
                    ..
                } => {
                    let name = name.clone().unwrap_or_default();
                    if desc_bind.set() != 0 {
                        log::warn!(
                            "Ignoring '{}' in descriptor set {}, only set 0 is bound",
                            name,
                            desc_bind.set()
                        );
                        continue;
                    }
                    let binding = desc_bind.bind();
                    match desc_ty {
                        DescriptorType::UniformBuffer() => {
                            if reflection.uniform_blocks.iter().any(|b| b.binding == binding) {
                                continue;
                            }
                            reflection.uniform_blocks.push(ReflectedBlock {
                                size: ty.nbyte().unwrap_or(0) as u32,
                                members: block_members(&name, ty),
                                name,
                                binding,
                            });
                        }
                        DescriptorType::CombinedImageSampler() => {
                            if reflection.samplers.iter().any(|s| s.binding == binding) {
                                continue;
                            }
                            reflection.samplers.push(ReflectedSampler { name, binding });
                        }
                        other => {
                            log::warn!("Unsupported descriptor {:?} for '{}' skipped", other, name);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    reflection.inputs.sort_by_key(|input| input.location);
    reflection.uniform_blocks.sort_by_key(|block| block.binding);
    reflection.samplers.sort_by_key(|sampler| sampler.binding);
    Ok(reflection)
}

fn block_members(block: &str, ty: &Type) -> Vec<ReflectedMember> {
    let Type::Struct(st) = ty else {
        log::warn!("Uniform block '{}' is not a struct", block);
        return Vec::new();
    };

    st.members
        .iter()
        .filter_map(|member| {
            let name = member.name.clone().unwrap_or_default();
            let Some(uniform_type) = uniform_type(&member.ty) else {
                log::warn!("Uniform '{}.{}' has unsupported type {:?}, skipped", block, name, member.ty);
                return None;
            };
            let size = member.ty.nbyte().map_or(uniform_type.size(), |n| n as u32);
            Some(ReflectedMember {
                name,
                offset: member.offset.unwrap_or(0) as u32,
                size,
                uniform_type,
            })
        })
        .collect()
}

fn uniform_type(ty: &Type) -> Option<UniformType> {
    match ty {
        Type::Scalar(ScalarType::Float { bits: 32 }) => Some(UniformType::Float),
        Type::Scalar(ScalarType::Integer { bits: 32, .. } | ScalarType::Boolean) => Some(UniformType::Int),
        Type::Vector(v) if matches!(v.scalar_ty, ScalarType::Float { bits: 32 }) => match v.nscalar {
            2 => Some(UniformType::Vec2),
            3 => Some(UniformType::Vec3),
            4 => Some(UniformType::Vec4),
            _ => None,
        },
        Type::Matrix(m)
            if m.nvector == 4
                && m.vector_ty.nscalar == 4
                && matches!(m.vector_ty.scalar_ty, ScalarType::Float { bits: 32 }) =>
        {
            Some(UniformType::Mat4)
        }
        Type::Array(a) => uniform_type(&a.element_ty),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const fn op(word_count: u32, opcode: u32) -> u32 {
        (word_count << 16) | opcode
    }

    // Fragment shader equivalent to:
    //   layout(location = 0) in vec2 v_UV;
    //   layout(set = 0, binding = 1) uniform Material { vec4 u_Color; float u_Alpha; } material;
    //   layout(set = 0, binding = 2) uniform sampler2D u_Albedo;
    #[rustfmt::skip]
    pub(crate) fn fragment_module() -> Vec<u32> {
        let (main, void, fn_ty, float, vec4, block, block_ptr, material) = (1, 2, 3, 4, 5, 6, 7, 8);
        let (image, sampled, sampled_ptr, albedo, vec2, input_ptr, uv, label) = (9, 10, 11, 12, 13, 14, 15, 16);
        vec![
            0x0723_0203, 0x0001_0000, 0, 17, 0,
            op(2, 17), 1,                                        // OpCapability Shader
            op(3, 14), 0, 1,                                     // OpMemoryModel Logical GLSL450
            op(6, 15), 4, main, 0x6e69_616d, 0, uv,              // OpEntryPoint Fragment "main"
            op(3, 16), main, 7,                                  // OpExecutionMode OriginUpperLeft
            op(4, 5), main, 0x6e69_616d, 0,                      // OpName "main"
            op(5, 5), block, 0x6574_614d, 0x6c61_6972, 0,        // OpName "Material"
            op(5, 6), block, 0, 0x6f43_5f75, 0x0072_6f6c,        // OpMemberName "u_Color"
            op(5, 6), block, 1, 0x6c41_5f75, 0x0061_6870,        // OpMemberName "u_Alpha"
            op(5, 5), material, 0x6574_616d, 0x6c61_6972, 0,     // OpName "material"
            op(5, 5), albedo, 0x6c41_5f75, 0x6f64_6562, 0,       // OpName "u_Albedo"
            op(4, 5), uv, 0x5655_5f76, 0,                        // OpName "v_UV"
            op(3, 71), block, 2,                                 // OpDecorate Block
            op(5, 72), block, 0, 35, 0,                          // OpMemberDecorate Offset 0
            op(5, 72), block, 1, 35, 16,                         // OpMemberDecorate Offset 16
            op(4, 71), material, 34, 0,                          // DescriptorSet 0
            op(4, 71), material, 33, 1,                          // Binding 1
            op(4, 71), albedo, 34, 0,
            op(4, 71), albedo, 33, 2,
            op(4, 71), uv, 30, 0,                                // Location 0
            op(2, 19), void,                                     // OpTypeVoid
            op(3, 33), fn_ty, void,                              // OpTypeFunction
            op(3, 22), float, 32,                                // OpTypeFloat 32
            op(4, 23), vec4, float, 4,                           // OpTypeVector
            op(4, 30), block, vec4, float,                       // OpTypeStruct
            op(4, 32), block_ptr, 2, block,                      // OpTypePointer Uniform
            op(4, 59), block_ptr, material, 2,                   // OpVariable Uniform
            op(9, 25), image, float, 1, 0, 0, 0, 1, 0,           // OpTypeImage 2D sampled
            op(3, 27), sampled, image,                           // OpTypeSampledImage
            op(4, 32), sampled_ptr, 0, sampled,                  // OpTypePointer UniformConstant
            op(4, 59), sampled_ptr, albedo, 0,                   // OpVariable UniformConstant
            op(4, 23), vec2, float, 2,
            op(4, 32), input_ptr, 1, vec2,                       // OpTypePointer Input
            op(4, 59), input_ptr, uv, 1,                         // OpVariable Input
            op(5, 54), void, main, 0, fn_ty,                     // OpFunction
            op(2, 248), label,                                   // OpLabel
            op(1, 253),                                          // OpReturn
            op(1, 56),                                           // OpFunctionEnd
        ]
    }

    #[test]
    fn test_reflects_blocks_samplers_and_inputs() {
        let reflection = reflect_stage(&fragment_module()).unwrap();

        assert_eq!(
            reflection.inputs,
            vec![ReflectedInput {
                name: "v_UV".to_string(),
                location: 0
            }]
        );

        assert_eq!(reflection.uniform_blocks.len(), 1);
        let block = &reflection.uniform_blocks[0];
        assert_eq!(block.name, "material");
        assert_eq!(block.binding, 1);
        assert!(block.size >= 20);
        assert_eq!(block.members.len(), 2);
        assert_eq!(block.members[0].name, "u_Color");
        assert_eq!(block.members[0].uniform_type, UniformType::Vec4);
        assert_eq!((block.members[0].offset, block.members[0].size), (0, 16));
        assert_eq!(block.members[1].name, "u_Alpha");
        assert_eq!(block.members[1].uniform_type, UniformType::Float);
        assert_eq!(block.members[1].offset, 16);

        assert_eq!(
            reflection.samplers,
            vec![ReflectedSampler {
                name: "u_Albedo".to_string(),
                binding: 2
            }]
        );
    }

    #[test]
    fn test_invalid_module_is_an_error() {
        assert!(matches!(reflect_stage(&[1, 2, 3]), Err(VulkanError::Reflection(_))));
        assert!(matches!(reflect_stage(&[]), Err(VulkanError::Reflection(_))));
    }

    #[test]
    fn test_truncated_header_is_an_error() {
        assert!(matches!(
            reflect_stage(&[SPIRV_MAGIC, 0x0001_0000]),
            Err(VulkanError::Reflection(_))
        ));

        // Whole header, wrong magic
        let mut module = fragment_module();
        module[0] = 0x0302_2307;
        assert!(matches!(reflect_stage(&module), Err(VulkanError::Reflection(_))));
    }

    #[test]
    fn test_member_count() {
        let member = ReflectedMember {
            name: "u_Bones".to_string(),
            offset: 0,
            size: 256,
            uniform_type: UniformType::Mat4,
        };
        assert_eq!(member.count(), 4);
    }
}
