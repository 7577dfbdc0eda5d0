// build.rs
// Compiles the GLSL shaders under shaders/ to SPIR-V with glslc

use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

const STAGE_EXTENSIONS: [&str; 3] = ["vert", "frag", "comp"];

fn is_stale(source: &Path, output: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(source), modified(output)) {
        (Some(src), Some(dst)) => src > dst,
        _ => true,
    }
}

fn compile_shaders(shader_dir: &Path, target_dir: &Path, glslc: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(shader_dir) else {
        eprintln!("info: No shader directory found at: {:?}", shader_dir);
        return 0;
    };

    let mut compiled = 0;
    for path in entries.filter_map(Result::ok).map(|entry| entry.path()) {
        if path.is_dir() {
            compiled += compile_shaders(&path, target_dir, glslc);
            continue;
        }
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if !STAGE_EXTENSIONS.contains(&extension) {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };

        // triangle.vert -> triangle.vert.spv
        let mut output_name = file_name.to_os_string();
        output_name.push(".spv");
        let output = target_dir.join(output_name);
        if !is_stale(&path, &output) {
            continue;
        }

        match Command::new(glslc).arg(&path).arg("-o").arg(&output).status() {
            Ok(status) if status.success() => {
                eprintln!("info: Compiled {:?} -> {:?}", path, output);
                compiled += 1;
            }
            Ok(status) => {
                println!("cargo:warning=glslc failed for {:?} with exit code {:?}", path, status.code());
            }
            Err(e) => {
                println!("cargo:warning=Failed to run glslc for {:?}: {}", path, e);
            }
        }
    }
    compiled
}

fn main() {
    println!("cargo:rerun-if-changed=shaders");
    println!("cargo:rerun-if-env-changed=VULKAN_SDK");
    println!("cargo:rerun-if-env-changed=SKIP_SHADERS");

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR").map(PathBuf::from) else {
        return;
    };
    let target_dir = manifest_dir.join("..").join("..").join("target").join("shaders");
    println!("cargo:rustc-env=VULKAN_BACKEND_SHADER_DIR={}", target_dir.display());

    if env::var("SKIP_SHADERS").is_ok() {
        eprintln!("info: Skipping shader compilation (SKIP_SHADERS set)");
        return;
    }

    let Ok(vulkan_sdk) = env::var("VULKAN_SDK") else {
        eprintln!("warning: VULKAN_SDK not set, shader compilation skipped");
        return;
    };
    let glslc = if cfg!(target_os = "windows") {
        PathBuf::from(vulkan_sdk).join("Bin").join("glslc.exe")
    } else {
        PathBuf::from(vulkan_sdk).join("bin").join("glslc")
    };
    if !glslc.exists() {
        println!("cargo:warning=glslc not found at {:?}, shader compilation skipped", glslc);
        return;
    }

    if let Err(e) = std::fs::create_dir_all(&target_dir) {
        println!("cargo:warning=Failed to create {:?}: {}", target_dir, e);
        return;
    }

    let compiled = compile_shaders(&manifest_dir.join("shaders"), &target_dir, &glslc);
    eprintln!("info: Compiled {} shader(s)", compiled);
}
