use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ScanError, ScanResult};
use crate::registry::JobStore;
use crate::types::JobId;

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// Human-readable byte size: base 1024, at most two decimals, trailing zeros dropped.
///
/// - `0` -> `0 Bytes`
/// - `1536` -> `1.5 KB`
/// - `1048576` -> `1 MB`
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return String::from("0 Bytes");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", SIZE_UNITS[unit])
}

/// Recursive byte size of `dir`. Symlinks are not followed; unreadable
/// children are skipped. Fails only when `dir` itself cannot be listed.
pub fn try_dir_size(dir: &Path) -> ScanResult<u64> {
    let root = fs::read_dir(dir).map_err(|source| ScanError::ArtifactScan {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut total = 0u64;
    let mut pending = vec![root];
    while let Some(entries) = pending.pop() {
        for entry in entries {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(dir = %dir.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let meta = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping entry without metadata");
                    continue;
                }
            };
            if meta.is_dir() {
                match fs::read_dir(entry.path()) {
                    Ok(sub) => pending.push(sub),
                    Err(e) => {
                        debug!(path = %entry.path().display(), error = %e, "skipping unreadable directory")
                    }
                }
            } else if meta.is_file() {
                total += meta.len();
            }
        }
    }
    Ok(total)
}

/// Like [`try_dir_size`], but never fails: a missing directory is 0 bytes and
/// any other failure is logged and also reported as 0.
pub fn dir_size(dir: &Path) -> u64 {
    match try_dir_size(dir) {
        Ok(n) => n,
        Err(ScanError::ArtifactScan { source, .. }) if source.kind() == io::ErrorKind::NotFound => 0,
        Err(e) => {
            warn!(error = %e, "artifact sizing failed; reporting zero");
            0
        }
    }
}

/// Every regular file under `dir`, as sorted `/`-separated relative paths.
pub fn list_artifacts(dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let Ok(entries) = fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.metadata() else { continue };
            let path = entry.path();
            if meta.is_dir() {
                pending.push(path);
            } else if meta.is_file() {
                if let Ok(rel) = path.strip_prefix(dir) {
                    let parts: Vec<_> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    out.push(parts.join("/"));
                }
            }
        }
    }
    out.sort();
    out
}

/// Resolve a client-supplied path inside a job's output directory.
///
/// The path is normalised lexically before touching the filesystem; then both
/// sides are canonicalised so a symlink cannot lead outside the directory.
/// Escapes and missing files are reported identically.
pub fn resolve(store: &dyn JobStore, id: JobId, relative: &str) -> ScanResult<PathBuf> {
    let job = store
        .find(id)
        .ok_or_else(|| ScanError::NotFound(String::from("Scan not found")))?;

    let rel = normalize_relative(relative).ok_or_else(file_not_found)?;
    if rel.as_os_str().is_empty() {
        return Err(file_not_found());
    }

    let base = job.output_dir.canonicalize().map_err(|_| file_not_found())?;
    let candidate = base.join(&rel).canonicalize().map_err(|_| file_not_found())?;
    if !candidate.starts_with(&base) {
        debug!(job_id = id, requested = relative, "artifact path escapes job directory");
        return Err(file_not_found());
    }
    match fs::metadata(&candidate) {
        Ok(m) if m.is_file() => Ok(candidate),
        _ => Err(file_not_found()),
    }
}

/// The one error every rejected artifact lookup produces.
pub fn file_not_found() -> ScanError {
    ScanError::NotFound(String::from("File not found"))
}

/// Collapse `.` and `..` without consulting the filesystem. `None` when the
/// path is absolute or climbs above its starting point.
fn normalize_relative(relative: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes() {
        assert_eq!(format_size(0), "0 Bytes");
        assert_eq!(format_size(500), "500 Bytes");
        assert_eq!(format_size(1024), "1 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1_048_576), "1 MB");
        assert_eq!(format_size(1_234_567), "1.18 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024), "2048 GB");
    }

    #[test]
    fn normalizes_inside_paths() {
        assert_eq!(
            normalize_relative("screens/./a/../shot.png"),
            Some(PathBuf::from("screens/shot.png"))
        );
        assert_eq!(normalize_relative("report.html"), Some(PathBuf::from("report.html")));
    }

    #[test]
    fn rejects_escaping_paths() {
        assert_eq!(normalize_relative("../../etc/passwd"), None);
        assert_eq!(normalize_relative("sub/../../escape"), None);
        assert_eq!(normalize_relative("/etc/passwd"), None);
    }

    #[test]
    fn sizes_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), vec![0u8; 1000]).unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        fs::write(dir.path().join("nested/deeper/b.bin"), vec![0u8; 536]).unwrap();
        assert_eq!(try_dir_size(dir.path()).unwrap(), 1536);
        assert_eq!(format_size(dir_size(dir.path())), "1.5 KB");
        assert_eq!(
            list_artifacts(dir.path()),
            vec!["a.txt".to_string(), "nested/deeper/b.bin".to_string()]
        );
    }

    #[test]
    fn missing_directory_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let gone = dir.path().join("never-created");
        assert!(matches!(
            try_dir_size(&gone),
            Err(ScanError::ArtifactScan { .. })
        ));
        assert_eq!(dir_size(&gone), 0);
        assert!(list_artifacts(&gone).is_empty());
    }
}
