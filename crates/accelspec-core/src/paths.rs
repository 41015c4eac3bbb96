use std::path::{Component, Path, PathBuf};

/// Extraction root for bundles tied to one checkout: `<package>/build`.
pub fn build_cache_dir(package_root: &Path) -> PathBuf {
    package_root.join("build")
}

/// Returns the shared cache directory, honouring `ACCELSPEC_CACHE`.
///
/// Defaults to `<tmp>/reportlab-cache`, which survives between checkouts.
pub fn shared_cache_dir() -> PathBuf {
    if let Ok(val) = std::env::var("ACCELSPEC_CACHE") {
        return PathBuf::from(val);
    }
    std::env::temp_dir().join("reportlab-cache")
}

/// Returns the prefix of the active installation, if one can be determined.
///
/// Checked in order: `ACCELSPEC_PREFIX`, `VIRTUAL_ENV`, `CONDA_PREFIX`.
pub fn try_install_prefix() -> Option<PathBuf> {
    ["ACCELSPEC_PREFIX", "VIRTUAL_ENV", "CONDA_PREFIX"]
        .iter()
        .find_map(|k| std::env::var_os(k).filter(|v| !v.is_empty()))
        .map(PathBuf::from)
}

/// Lexically normalise `path`: drop `.` and fold `..` into its parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Compute a relative path from `from_dir` to `to_path`.
///
/// Both arguments must be absolute paths. The function walks up from
/// `from_dir` to the common ancestor and then descends into `to_path`.
///
/// Example: `relative_path("/a/b/c", "/a/b/d/e")` returns `"../../d/e"`.
pub fn relative_path(from_dir: &Path, to_path: &Path) -> PathBuf {
    let from_components: Vec<_> = from_dir.components().collect();
    let to_components: Vec<_> = to_path.components().collect();

    let common_len = from_components
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut result = PathBuf::new();
    for _ in common_len..from_components.len() {
        result.push("..");
    }
    for part in &to_components[common_len..] {
        result.push(part);
    }
    result
}
