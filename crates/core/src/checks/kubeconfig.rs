//! Transient kubeconfig materialisation.
//!
//! Check evaluation and the cluster probe never pass the persistent
//! kubeconfig file to subprocesses directly; the blob is copied into a
//! private temporary directory, `chmod 0600`, for the duration of one call.
//! Deletion is tied to `Drop`, which also runs during unwinding, so the
//! file is removed on every exit path.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// A kubeconfig file that lives only as long as this guard.
pub struct TransientKubeconfig {
    // Held for its Drop impl; removing the directory removes the file.
    _dir: TempDir,
    path: PathBuf,
}

impl TransientKubeconfig {
    /// Write `blob` into a fresh private directory.
    pub fn materialize(blob: &[u8]) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("inspect-kubeconfig-").tempdir()?;
        let path = dir.path().join("kubeconfig.yaml");
        std::fs::write(&path, blob)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(TransientKubeconfig { _dir: dir, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_exists_while_guard_lives_and_is_removed_after() {
        let path;
        {
            let transient = TransientKubeconfig::materialize(b"apiVersion: v1").expect("materialize");
            path = transient.path().to_path_buf();
            assert!(path.exists());
            assert_eq!(std::fs::read(&path).unwrap(), b"apiVersion: v1");
        }
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_mode_is_0600() {
        use std::os::unix::fs::PermissionsExt;
        let transient = TransientKubeconfig::materialize(b"x").expect("materialize");
        let mode = std::fs::metadata(transient.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
