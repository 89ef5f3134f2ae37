//! Filesystem storage driver. Copy, move, and delete operate on local
//! paths and rewrite each payload entry to its archived location.

use std::path::Path;
use std::process::Command;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use conveyor_common::ArchiveMethod;

use crate::error::{ArchiveError, Result};
use crate::StorageDriver;

pub struct PosixDriver;

impl PosixDriver {
    fn ensure_destination(dest: &Path) -> Result<()> {
        std::fs::create_dir_all(dest)?;
        if !dest.is_dir() {
            return Err(ArchiveError::Driver(format!(
                "destination {} is not a directory",
                dest.display()
            )));
        }
        Ok(())
    }

    fn copy(dest: &Path, items: &mut [String]) -> Result<()> {
        Self::ensure_destination(dest)?;
        for item in items.iter_mut() {
            let source = Path::new(item);
            if !source.exists() {
                warn!(item = %item, "source file does not exist, skipping");
                continue;
            }
            let target = dest.join(basename(source));
            std::fs::copy(source, &target)?;
            *item = target.display().to_string();
        }
        Ok(())
    }

    fn relocate(dest: &Path, items: &mut [String]) -> Result<()> {
        Self::ensure_destination(dest)?;
        for item in items.iter_mut() {
            let source = Path::new(item);
            if !source.exists() {
                warn!(item = %item, "source file does not exist, skipping");
                continue;
            }
            let target = dest.join(basename(source));
            // fs::rename fails across mount points; fall back to copy+remove.
            if std::fs::rename(source, &target).is_err() {
                std::fs::copy(source, &target)?;
                std::fs::remove_file(source)?;
            }
            *item = target.display().to_string();
        }
        Ok(())
    }

    fn delete(items: &mut Vec<String>) -> Result<()> {
        if items.is_empty() {
            info!("no files to delete");
            return Ok(());
        }
        for item in items.iter() {
            std::fs::remove_file(item)?;
        }
        items.clear();
        Ok(())
    }
}

#[async_trait]
impl StorageDriver for PosixDriver {
    async fn apply(
        &self,
        method: ArchiveMethod,
        dest: &Path,
        items: &mut Vec<String>,
    ) -> Result<()> {
        match method {
            ArchiveMethod::Bypass => {
                info!("bypassing archive");
                Ok(())
            }
            ArchiveMethod::Copy => Self::copy(dest, items),
            ArchiveMethod::Move => Self::relocate(dest, items),
            ArchiveMethod::Delete => Self::delete(items),
            ArchiveMethod::Upload => Err(ArchiveError::Unimplemented {
                operation: method.to_string(),
                storage: "posix",
            }),
        }
    }

    /// Open group access on the archived tree: `setfacl` where available,
    /// falling back to `chmod`. Failure is logged, never fatal.
    async fn permissions(&self, dest: &Path, site: &str) -> Result<()> {
        let path = dest.display().to_string();
        let acl = Command::new("setfacl")
            .args(["-R", "-m", "g::rwX", &path])
            .status();
        match acl {
            Ok(status) if status.success() => {
                debug!(site, path = %path, "permissions set via setfacl");
                return Ok(());
            }
            Ok(status) => warn!(site, %status, "setfacl failed, trying chmod"),
            Err(err) => debug!(site, error = %err, "setfacl unavailable, trying chmod"),
        }
        let chmod = Command::new("chmod").args(["-R", "g+w", &path]).status();
        match chmod {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(ArchiveError::Driver(format!("chmod exited with {status}"))),
            Err(err) => Err(ArchiveError::Driver(err.to_string())),
        }
    }
}

fn basename(path: &Path) -> std::ffi::OsString {
    path.file_name()
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| path.as_os_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, b"payload").unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn copy_keeps_source_and_rewrites_paths() {
        let workdir = tempfile::tempdir().unwrap();
        let dest = workdir.path().join("archive");
        let source = touch(workdir.path(), "spectra.h5");
        let mut items = vec![source.clone()];

        PosixDriver
            .apply(ArchiveMethod::Copy, &dest, &mut items)
            .await
            .unwrap();

        assert!(Path::new(&source).exists());
        assert_eq!(items[0], dest.join("spectra.h5").display().to_string());
        assert!(Path::new(&items[0]).exists());
    }

    #[tokio::test]
    async fn move_removes_source() {
        let workdir = tempfile::tempdir().unwrap();
        let dest = workdir.path().join("archive");
        let source = touch(workdir.path(), "waterfall.png");
        let mut items = vec![source.clone()];

        PosixDriver
            .apply(ArchiveMethod::Move, &dest, &mut items)
            .await
            .unwrap();

        assert!(!Path::new(&source).exists());
        assert!(Path::new(&items[0]).exists());
    }

    #[tokio::test]
    async fn delete_removes_source_and_empties_list() {
        let workdir = tempfile::tempdir().unwrap();
        let source = touch(workdir.path(), "scratch.dat");
        let mut items = vec![source.clone()];

        PosixDriver
            .apply(ArchiveMethod::Delete, workdir.path(), &mut items)
            .await
            .unwrap();

        assert!(!Path::new(&source).exists());
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn bypass_leaves_everything_alone() {
        let workdir = tempfile::tempdir().unwrap();
        let source = touch(workdir.path(), "untouched.dat");
        let mut items = vec![source.clone()];

        PosixDriver
            .apply(ArchiveMethod::Bypass, workdir.path(), &mut items)
            .await
            .unwrap();

        assert!(Path::new(&source).exists());
        assert_eq!(items, vec![source]);
    }

    #[tokio::test]
    async fn missing_source_is_skipped_not_fatal() {
        let workdir = tempfile::tempdir().unwrap();
        let dest = workdir.path().join("archive");
        let missing = workdir.path().join("gone.dat").display().to_string();
        let mut items = vec![missing.clone()];

        PosixDriver
            .apply(ArchiveMethod::Copy, &dest, &mut items)
            .await
            .unwrap();

        // Entry is left pointing at the original path.
        assert_eq!(items, vec![missing]);
    }

    #[tokio::test]
    async fn upload_is_unimplemented() {
        let workdir = tempfile::tempdir().unwrap();
        let result = PosixDriver
            .apply(ArchiveMethod::Upload, workdir.path(), &mut vec![])
            .await;
        assert!(matches!(result, Err(ArchiveError::Unimplemented { .. })));
    }
}
