//! Artifact Installer
//!
//! Replaces a deployed file (a binary or config) without ever exposing a
//! partially written version: the new contents go to a hidden sibling temp
//! file, are flushed to disk, then renamed over the target.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{debug, info, warn};

/// Distinguishes temp files of installs running in the same process.
static INSTALL_SEQ: AtomicU64 = AtomicU64::new(0);

// == Deploy Error ==
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("staged artifact {path} is not a regular file")]
    NotAFile { path: PathBuf },

    #[error("target {path} has no parent directory")]
    NoParent { path: PathBuf },

    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeployError {
    fn io<'a>(action: &'static str, path: &'a Path) -> impl FnOnce(io::Error) -> Self + 'a {
        move |source| DeployError::Io {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// What an install did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub target: PathBuf,
    pub bytes: u64,
    /// Whether an existing target was replaced
    pub replaced: bool,
}

// == Install ==
/// Installs `staged` at `target`.
///
/// Readers of `target` see either the previous file or the complete new
/// one. On failure the temp file is removed and `target` is untouched.
pub fn install_artifact(staged: &Path, target: &Path) -> Result<InstallReport, DeployError> {
    let metadata = fs::metadata(staged).map_err(DeployError::io("stat", staged))?;
    if !metadata.is_file() {
        return Err(DeployError::NotAFile {
            path: staged.to_path_buf(),
        });
    }

    let temp_path = temp_sibling(target)?;
    let replaced = target.exists();

    let result = write_and_swap(staged, &temp_path, target);
    if result.is_err() {
        if let Err(err) = fs::remove_file(&temp_path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %temp_path.display(), error = %err, "Failed to remove temp file");
            }
        }
    }
    let bytes = result?;

    info!(
        target = %target.display(),
        bytes,
        replaced,
        "Installed artifact"
    );
    Ok(InstallReport {
        target: target.to_path_buf(),
        bytes,
        replaced,
    })
}

fn write_and_swap(staged: &Path, temp_path: &Path, target: &Path) -> Result<u64, DeployError> {
    let bytes = {
        let mut source = File::open(staged).map_err(DeployError::io("open", staged))?;
        let mut temp = File::create(temp_path).map_err(DeployError::io("create", temp_path))?;
        let bytes =
            io::copy(&mut source, &mut temp).map_err(DeployError::io("copy to", temp_path))?;
        temp.sync_all().map_err(DeployError::io("sync", temp_path))?;
        bytes
    };

    // Keep the staged file's mode (executables stay executable)
    let permissions = fs::metadata(staged)
        .map_err(DeployError::io("stat", staged))?
        .permissions();
    fs::set_permissions(temp_path, permissions)
        .map_err(DeployError::io("set permissions on", temp_path))?;

    debug!(from = %temp_path.display(), to = %target.display(), "Renaming into place");
    fs::rename(temp_path, target).map_err(DeployError::io("rename onto", target))?;
    sync_parent(target)?;

    Ok(bytes)
}

/// Flushes the directory entry so the rename survives a crash.
#[cfg(unix)]
fn sync_parent(target: &Path) -> Result<(), DeployError> {
    let parent = parent_dir(target)?;
    File::open(parent)
        .and_then(|dir| dir.sync_all())
        .map_err(DeployError::io("sync directory", parent))
}

#[cfg(not(unix))]
fn sync_parent(_target: &Path) -> Result<(), DeployError> {
    Ok(())
}

fn parent_dir(target: &Path) -> Result<&Path, DeployError> {
    match target.parent() {
        Some(parent) if parent.as_os_str().is_empty() => Ok(Path::new(".")),
        Some(parent) => Ok(parent),
        None => Err(DeployError::NoParent {
            path: target.to_path_buf(),
        }),
    }
}

/// `dir/.name.tmp-<pid>-<seq>` next to `target`, so the rename stays on
/// one filesystem.
fn temp_sibling(target: &Path) -> Result<PathBuf, DeployError> {
    let name = target.file_name().ok_or_else(|| DeployError::NoParent {
        path: target.to_path_buf(),
    })?;
    let parent = parent_dir(target)?;
    let seq = INSTALL_SEQ.fetch_add(1, Ordering::Relaxed);

    Ok(parent.join(format!(
        ".{}.tmp-{}-{}",
        name.to_string_lossy(),
        std::process::id(),
        seq
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn leftover_temp_files(dir: &TempDir) -> Vec<String> {
        fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".tmp-"))
            .collect()
    }

    #[test]
    fn test_install_new_target() {
        let dir = TempDir::new().unwrap();
        let staged = write(&dir, "staged.bin", b"new build");
        let target = dir.path().join("tile_cache");

        let report = install_artifact(&staged, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new build");
        assert_eq!(report.bytes, 9);
        assert!(!report.replaced);
        assert!(leftover_temp_files(&dir).is_empty());
    }

    #[test]
    fn test_install_replaces_existing_target() {
        let dir = TempDir::new().unwrap();
        let staged = write(&dir, "staged.bin", b"v2");
        let target = write(&dir, "tile_cache", b"v1 contents");

        let report = install_artifact(&staged, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"v2");
        assert!(report.replaced);
        // staged file is copied, not moved
        assert!(staged.exists());
    }

    #[test]
    fn test_missing_staged_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = write(&dir, "tile_cache", b"v1");

        let err = install_artifact(&dir.path().join("missing"), &target).unwrap_err();

        assert!(matches!(err, DeployError::Io { action: "stat", .. }));
        assert_eq!(fs::read(&target).unwrap(), b"v1");
        assert!(leftover_temp_files(&dir).is_empty());
    }

    #[test]
    fn test_directory_is_not_an_artifact() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tile_cache");

        let err = install_artifact(dir.path(), &target).unwrap_err();
        assert!(matches!(err, DeployError::NotAFile { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn test_failed_rename_cleans_up_temp_file() {
        let dir = TempDir::new().unwrap();
        let staged = write(&dir, "staged.bin", b"v2");
        // a non-empty directory cannot be replaced by a file
        let target = dir.path().join("occupied");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("inner"), b"x").unwrap();

        let err = install_artifact(&staged, &target).unwrap_err();

        assert!(matches!(err, DeployError::Io { action: "rename onto", .. }));
        assert!(target.join("inner").exists());
        assert!(leftover_temp_files(&dir).is_empty());
    }

    #[test]
    fn test_temp_sibling_is_hidden_and_adjacent() {
        let temp = temp_sibling(Path::new("/opt/tiles/tile_cache")).unwrap();
        assert_eq!(temp.parent(), Some(Path::new("/opt/tiles")));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".tile_cache.tmp-"));

        let relative = temp_sibling(Path::new("tile_cache")).unwrap();
        assert_eq!(relative.parent(), Some(Path::new(".")));
    }

    #[test]
    fn test_temp_sibling_unique_within_process() {
        let target = Path::new("/opt/tiles/tile_cache");
        let first = temp_sibling(target).unwrap();
        let second = temp_sibling(target).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_concurrent_installs_to_same_target() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("tile_cache");
        let staged: Vec<PathBuf> = (0..8)
            .map(|i| write(&dir, &format!("staged-{i}.bin"), format!("build {i}").as_bytes()))
            .collect();

        std::thread::scope(|scope| {
            for path in &staged {
                let target = &target;
                scope.spawn(move || install_artifact(path, target).unwrap());
            }
        });

        let installed = fs::read_to_string(&target).unwrap();
        assert!(installed.starts_with("build "));
        assert!(leftover_temp_files(&dir).is_empty());
    }

    #[test]
    fn test_parent_dir_of_bare_name_is_current_dir() {
        assert_eq!(parent_dir(Path::new("tile_cache")).unwrap(), Path::new("."));
        assert!(matches!(
            parent_dir(Path::new("/")),
            Err(DeployError::NoParent { .. })
        ));
    }
}
