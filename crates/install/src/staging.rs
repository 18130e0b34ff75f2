//! Staging directories and the atomic swap
//!
//! Extraction lands in a unique staging directory under the work area;
//! only a fully validated staging directory is ever moved to the live
//! path. The swap itself is rename-based: the old install is renamed
//! into a trash directory, the staging directory is renamed into place,
//! and the trash is deleted last. The work area shares a filesystem
//! with the plugin root, so both renames are atomic.

use plugget_errors::{Error, InstallError};
use plugget_types::PluginId;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

/// Unique directory path for one attempt, safe against leftovers from
/// crashed prior runs and against concurrent attempts for other ids
pub(crate) fn unique_dir(base: &Path, id: &PluginId) -> PathBuf {
    base.join(format!("{id}-{}", Uuid::new_v4()))
}

/// Remove a staging/trash directory, ignoring an already-absent one
pub(crate) async fn remove_dir(path: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallError::FilesystemError {
            operation: "remove_dir".to_string(),
            path: path.display().to_string(),
            message: e.to_string(),
        }
        .into()),
    }
}

/// Delete every entry inside a work subdirectory
///
/// The work area belongs exclusively to the install manager, so
/// anything found there is debris from a crashed or cancelled run.
pub(crate) async fn sweep(dir: &Path) -> Result<usize, Error> {
    let mut removed = 0;

    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::io_with_path(&e, dir)),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let result = if entry.file_type().await?.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        if result.is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

/// Atomically replace `live` with `staging`
///
/// The previous install (if any) is parked at `trash` before the new
/// directory is renamed into place, and deleted only after the new one
/// is confirmed live. If the second rename fails, the old install is
/// restored from trash, so the live path never ends up absent.
pub(crate) async fn swap_live(staging: &Path, live: &Path, trash: &Path) -> Result<(), Error> {
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let had_previous = fs::metadata(live).await.is_ok();
    if had_previous {
        fs::rename(live, trash)
            .await
            .map_err(|e| InstallError::AtomicOperationFailed {
                message: format!("failed to park previous install: {e}"),
            })?;
    }

    if let Err(e) = fs::rename(staging, live).await {
        if had_previous {
            let _ = fs::rename(trash, live).await;
        }
        return Err(InstallError::AtomicOperationFailed {
            message: format!("failed to move staging into place: {e}"),
        }
        .into());
    }

    if had_previous {
        remove_dir(trash).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn swap_installs_fresh_directory() {
        let temp = tempdir().unwrap();
        let staging = temp.path().join("staging");
        let live = temp.path().join("plugins/foo");
        let trash = temp.path().join("trash-foo");

        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("plugin.json"), "{}").unwrap();

        swap_live(&staging, &live, &trash).await.unwrap();

        assert!(live.join("plugin.json").is_file());
        assert!(!staging.exists());
        assert!(!trash.exists());
    }

    #[tokio::test]
    async fn swap_replaces_and_discards_previous() {
        let temp = tempdir().unwrap();
        let staging = temp.path().join("staging");
        let live = temp.path().join("plugins/foo");
        let trash = temp.path().join("trash-foo");

        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join("old.txt"), "old").unwrap();
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("new.txt"), "new").unwrap();

        swap_live(&staging, &live, &trash).await.unwrap();

        assert!(live.join("new.txt").is_file());
        assert!(!live.join("old.txt").exists());
        assert!(!trash.exists());
    }

    #[tokio::test]
    async fn failed_swap_restores_previous() {
        let temp = tempdir().unwrap();
        let staging = temp.path().join("staging-missing");
        let live = temp.path().join("plugins/foo");
        let trash = temp.path().join("trash-foo");

        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join("old.txt"), "old").unwrap();

        // Staging does not exist: the second rename must fail and the
        // old install must come back
        let err = swap_live(&staging, &live, &trash).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Install(InstallError::AtomicOperationFailed { .. })
        ));
        assert!(live.join("old.txt").is_file());
        assert!(!trash.exists());
    }

    #[tokio::test]
    async fn sweep_clears_work_area() {
        let temp = tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("foo-123")).unwrap();
        std::fs::create_dir_all(temp.path().join("bar-456/nested")).unwrap();
        std::fs::write(temp.path().join("stray.tmp"), "x").unwrap();

        let removed = sweep(temp.path()).await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn sweep_of_missing_dir_is_a_noop() {
        let temp = tempdir().unwrap();
        let removed = sweep(&temp.path().join("absent")).await.unwrap();
        assert_eq!(removed, 0);
    }
}
