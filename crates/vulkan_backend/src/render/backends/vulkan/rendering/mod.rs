//! Shader programs, reflection, pipelines and renderables

pub mod pipeline;
pub mod reflection;
pub mod renderable;
pub mod shader;
