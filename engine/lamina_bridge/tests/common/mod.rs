//! Shared fixtures for the bridge integration tests.

#![allow(dead_code, unused_macros, reason = "each test crate uses a subset")]

use std::path::{Path, PathBuf};

use lamina_bridge::{BridgeConfig, RuntimeCommand};
use lamina_ir::{FunctionId, FunctionReference, Language, RuntimeName, SourceLocator};

/// The bundled demo scripts.
pub fn demos() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos")
}

pub fn demo_script(id: u32, file: &str) -> FunctionReference {
    FunctionReference::new(
        FunctionId(id),
        Language::Interpreted,
        SourceLocator::new(demos(), file),
    )
}

/// Write `source` into `dir` and return its locator.
pub fn write_script(dir: &Path, file: &str, source: &str) -> SourceLocator {
    std::fs::write(dir.join(file), source).unwrap_or_else(|e| panic!("write {file}: {e}"));
    SourceLocator::new(dir, file)
}

/// Config whose `host` runtime is the `lamina-host` built with these tests.
pub fn host_config() -> BridgeConfig {
    BridgeConfig::default().with_runtime(RuntimeName::host(), host_command())
}

pub fn host_command() -> RuntimeCommand {
    RuntimeCommand::new(env!("CARGO_BIN_EXE_lamina-host"))
}

pub fn hosted(id: u32, locator: SourceLocator) -> FunctionReference {
    FunctionReference::new(FunctionId(id), Language::External(RuntimeName::host()), locator)
}

/// Path of the demo module built alongside the test binary, if any.
pub fn demo_module() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let deps = exe.parent()?;
    let exact = libloading::library_filename("lamina_demo_module");
    let exact = exact.to_string_lossy();
    let stem = format!("{}lamina_demo_module", std::env::consts::DLL_PREFIX);

    for dir in [deps, deps.parent()?] {
        let candidate = dir.join(exact.as_ref());
        if candidate.is_file() {
            return Some(candidate);
        }
        let hashed = std::fs::read_dir(dir).ok()?.flatten().map(|e| e.path()).find(|p| {
            p.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
                n.starts_with(&stem) && n.ends_with(std::env::consts::DLL_SUFFIX)
            })
        });
        if hashed.is_some() {
            return hashed;
        }
    }
    None
}

/// The demo module path, or return from the test when it was not built.
macro_rules! demo_module_or_skip {
    () => {
        match common::demo_module() {
            Some(path) => path,
            None => {
                eprintln!("skipping: lamina_demo_module cdylib not found next to the test binary");
                return;
            }
        }
    };
}

pub fn native(id: u32, module: &Path, entry: &str) -> FunctionReference {
    FunctionReference::new(
        FunctionId(id),
        Language::NativeModule,
        SourceLocator::from_path(module).with_entry_point(entry),
    )
}
