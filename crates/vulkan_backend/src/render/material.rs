//! Material uniform values and the scene-side global uniform source

use crate::render::backends::vulkan::Texture;
use std::collections::HashMap;
use std::sync::Arc;

/// A typed uniform value
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// `int`
    Int(i32),
    /// `float`
    Float(f32),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column major
    Mat4([f32; 16]),
    /// Already packed bytes (arrays, structs)
    Bytes(Vec<u8>),
}

impl UniformValue {
    /// Packed byte representation
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Int(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Float(v) => bytemuck::bytes_of(v).to_vec(),
            Self::Vec2(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Vec3(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Vec4(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Mat4(v) => bytemuck::cast_slice(v).to_vec(),
            Self::Bytes(v) => v.clone(),
        }
    }

    /// Pack a float array, e.g. for `vec4 u_Lights[4]`
    pub fn from_floats(values: &[f32]) -> Self {
        Self::Bytes(bytemuck::cast_slice(values).to_vec())
    }
}

/// Per-node global uniforms supplied by the scene
pub trait GlobalUniforms {
    /// Packed value of a global uniform, if the scene provides one
    fn global_uniform_value(&self, name: &str) -> Option<&[u8]>;
}

/// Scene without global uniforms
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGlobals;

impl GlobalUniforms for NoGlobals {
    fn global_uniform_value(&self, _name: &str) -> Option<&[u8]> {
        None
    }
}

/// Table of named global uniforms (view/projection matrices, time, ...)
#[derive(Debug, Clone, Default)]
pub struct GlobalUniformTable {
    values: HashMap<String, Vec<u8>>,
}

impl GlobalUniformTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a global value
    pub fn set(&mut self, name: impl Into<String>, value: &UniformValue) {
        self.values.insert(name.into(), value.to_bytes());
    }

    /// Remove a global value
    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }
}

impl GlobalUniforms for GlobalUniformTable {
    fn global_uniform_value(&self, name: &str) -> Option<&[u8]> {
        self.values.get(name).map(Vec::as_slice)
    }
}

/// Material-owned uniform values and textures
///
/// Values are looked up by uniform name when a renderable is drawn; a name
/// the shader does not declare is ignored.
#[derive(Debug, Clone, Default)]
pub struct Material {
    name: String,
    values: HashMap<String, Vec<u8>>,
    textures: HashMap<String, Arc<Texture>>,
}

impl Material {
    /// Create an empty material
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Material name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set a uniform value
    pub fn set_value(&mut self, uniform: impl Into<String>, value: &UniformValue) {
        self.values.insert(uniform.into(), value.to_bytes());
    }

    /// Builder form of [`Material::set_value`]
    #[must_use]
    pub fn with_value(mut self, uniform: impl Into<String>, value: &UniformValue) -> Self {
        self.set_value(uniform, value);
        self
    }

    /// Packed value of a uniform
    pub fn value(&self, uniform: &str) -> Option<&[u8]> {
        self.values.get(uniform).map(Vec::as_slice)
    }

    /// Bind a texture to a sampler uniform
    pub fn set_texture(&mut self, uniform: impl Into<String>, texture: Arc<Texture>) {
        self.textures.insert(uniform.into(), texture);
    }

    /// Texture bound to a sampler uniform
    pub fn texture(&self, uniform: &str) -> Option<&Arc<Texture>> {
        self.textures.get(uniform)
    }
}
