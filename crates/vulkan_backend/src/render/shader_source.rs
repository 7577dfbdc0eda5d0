//! Shader compiler collaborator
//!
//! The backend consumes SPIR-V. Turning engine shader source into SPIR-V is the
//! job of a [`ShaderCompiler`]; the crate ships [`SpirvFileCompiler`], which
//! loads modules that `glslc` produced at build time.

use std::io::Cursor;
use std::path::{Path, PathBuf};

/// SPIR-V words per stage; an empty stage means "absent"
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledShaders {
    /// Vertex stage
    pub vertex: Vec<u32>,
    /// Fragment stage
    pub fragment: Vec<u32>,
    /// Compute stage
    pub compute: Vec<u32>,
}

/// Turns shader sources into SPIR-V
pub trait ShaderCompiler {
    /// Compile the given sources; stages that fail are returned empty
    fn compile(&self, vertex: &str, fragment: &str, compute: Option<&str>) -> CompiledShaders;
}

/// Treats each source as the name of a `.spv` file under a shader directory
#[derive(Debug, Clone)]
pub struct SpirvFileCompiler {
    directory: PathBuf,
}

impl SpirvFileCompiler {
    /// Load modules relative to `directory`
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn load(&self, name: &str) -> Vec<u32> {
        let path = self.directory.join(name);
        match Self::read_words(&path) {
            Ok(words) => words,
            Err(err) => {
                log::error!("Failed to load SPIR-V {:?}: {}", path, err);
                Vec::new()
            }
        }
    }

    fn read_words(path: &Path) -> std::io::Result<Vec<u32>> {
        let bytes = std::fs::read(path)?;
        ash::util::read_spv(&mut Cursor::new(bytes))
    }
}

impl ShaderCompiler for SpirvFileCompiler {
    fn compile(&self, vertex: &str, fragment: &str, compute: Option<&str>) -> CompiledShaders {
        CompiledShaders {
            vertex: self.load(vertex),
            fragment: self.load(fragment),
            compute: compute.map(|name| self.load(name)).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_stage_is_empty() {
        let compiler = SpirvFileCompiler::new("does/not/exist");
        let compiled = compiler.compile("a.vert.spv", "a.frag.spv", None);
        assert!(compiled.vertex.is_empty());
        assert!(compiled.fragment.is_empty());
        assert!(compiled.compute.is_empty());
    }

    #[test]
    fn test_reads_spirv_words() {
        let dir = std::env::temp_dir().join("vulkan_backend_spirv_test");
        std::fs::create_dir_all(&dir).unwrap();
        let words: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];
        std::fs::write(dir.join("tiny.spv"), bytemuck::cast_slice(&words)).unwrap();

        let compiler = SpirvFileCompiler::new(&dir);
        let compiled = compiler.compile("tiny.spv", "missing.spv", Some("tiny.spv"));
        assert_eq!(compiled.vertex, words.to_vec());
        assert!(compiled.fragment.is_empty());
        assert_eq!(compiled.compute.len(), 5);
    }
}
