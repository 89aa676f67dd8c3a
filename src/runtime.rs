//! ONNX Runtime bootstrap for compiled-module artifacts.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit ONNX Runtime library.
pub const ORT_DYLIB_ENV: &str = "ORT_DYLIB_PATH";

#[cfg(target_os = "windows")]
const LIBRARY_NAME: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const LIBRARY_NAME: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const LIBRARY_NAME: &str = "libonnxruntime.so";

/// Locate an ONNX Runtime shared library.
///
/// Checked in order: `ORT_DYLIB_PATH`, then `lib/` and the directory itself
/// next to the executable, then the same under the working directory.
/// Versioned names such as `libonnxruntime.so.1.22.0` also match.
#[must_use]
pub fn find_ort_library() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(ORT_DYLIB_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Some(path);
        }
    }

    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let cwd = std::env::current_dir().ok();

    [exe_dir, cwd]
        .into_iter()
        .flatten()
        .flat_map(|base| [base.join("lib"), base])
        .find_map(|dir| find_in_dir(&dir))
}

fn find_in_dir(dir: &Path) -> Option<PathBuf> {
    let exact = dir.join(LIBRARY_NAME);
    if exact.is_file() {
        return Some(exact);
    }
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter_map(|path| {
            let version = path
                .file_name()
                .and_then(|name| library_version(&name.to_string_lossy()))?;
            Some((version, path))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, path)| path)
}

/// Numeric version suffix of a library file name, e.g. `[1, 22, 0]` for
/// `libonnxruntime.so.1.22.0`. `None` for unrelated names.
fn library_version(file_name: &str) -> Option<Vec<u64>> {
    let suffix = file_name.strip_prefix(LIBRARY_NAME)?;
    suffix
        .split('.')
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().ok())
        .collect()
}

/// Point ONNX Runtime at a discovered library, if any.
///
/// Call once before loading a compiled module. Without a discovered library
/// ONNX Runtime falls back to its default lookup. Builds without the
/// `load-dynamic` feature link the runtime and only commit the environment.
///
/// # Errors
/// Returns [`Error::RuntimeInit`] if the runtime could not be initialized.
pub fn init_runtime() -> Result<()> {
    #[cfg(feature = "load-dynamic")]
    if let Some(path) = find_ort_library() {
        tracing::debug!(library = %path.display(), "initializing ONNX Runtime");
        ort::init_from(path.display().to_string())
            .commit()
            .map_err(|e| Error::RuntimeInit(e.to_string()))?;
        return Ok(());
    }
    ort::init()
        .with_name("scene-eval")
        .commit()
        .map_err(|e| Error::RuntimeInit(e.to_string()))?;
    Ok(())
}
