//! Hash-gated atomic writer for generated device configurations.
//!
//! 1. Normalise line endings to LF.
//! 2. SHA-256 the content and the file already on disk.
//! 3. Identical digests → `Unchanged`, the file is not touched.
//! 4. Write to `<path>.netdeploy.tmp`.
//! 5. Rename over the final path (atomic on POSIX).
//!
//! Deployment never calls into this module; only `generate` writes files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use netdeploy_core::DeviceName;

use crate::error::{io_err, DeployError};

/// Outcome of writing one device configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Content changed or the file did not exist yet.
    Written { path: PathBuf },
    /// The file on disk already holds exactly this content.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn path(&self) -> &Path {
        match self {
            WriteResult::Written { path } | WriteResult::Unchanged { path } => path,
        }
    }
}

/// Hex SHA-256 of `content` after line-ending normalisation.
pub fn digest(content: &str) -> String {
    let mut h = Sha256::new();
    h.update(normalize_line_endings(content).as_bytes());
    hex::encode(h.finalize())
}

/// `<dir>/<device>.cfg`
pub fn config_path(dir: &Path, device: &DeviceName) -> PathBuf {
    dir.join(format!("{device}.cfg"))
}

/// Write `content` as the configuration file of `device` under `dir`.
pub fn write_config(
    dir: &Path,
    device: &DeviceName,
    content: &str,
) -> Result<WriteResult, DeployError> {
    let path = config_path(dir, device);
    let tmp = PathBuf::from(format!("{}.netdeploy.tmp", path.display()));
    write_with_tmp(&path, content, &tmp)
}

fn write_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, DeployError> {
    let content = normalize_line_endings(content);
    let wanted = digest(&content);

    match std::fs::read_to_string(path) {
        Ok(existing) if digest(&existing) == wanted => {
            tracing::debug!(path = %path.display(), "unchanged");
            return Ok(WriteResult::Unchanged {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(path, e)),
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, &content).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }

    tracing::info!(path = %path.display(), "wrote configuration");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

pub(crate) fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::thread::sleep;
    use std::time::Duration;
    use tempfile::TempDir;

    fn core() -> DeviceName {
        DeviceName::from("core-sw-01")
    }

    #[test]
    fn first_write_returns_written() {
        let tmp = TempDir::new().unwrap();
        let result = write_config(tmp.path(), &core(), "sysname CORE-SW-01\n").unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(result.path(), tmp.path().join("core-sw-01.cfg"));
        assert_eq!(
            fs::read_to_string(result.path()).unwrap(),
            "sysname CORE-SW-01\n"
        );
    }

    #[test]
    fn same_content_is_unchanged_and_not_rewritten() {
        let tmp = TempDir::new().unwrap();
        let first = write_config(tmp.path(), &core(), "vlan batch 10 20\n").unwrap();
        let mtime_1 = fs::metadata(first.path()).unwrap().modified().unwrap();

        sleep(Duration::from_millis(1100));
        let second = write_config(tmp.path(), &core(), "vlan batch 10 20\n").unwrap();
        assert!(matches!(second, WriteResult::Unchanged { .. }));
        let mtime_2 = fs::metadata(second.path()).unwrap().modified().unwrap();
        assert_eq!(mtime_1, mtime_2, "mtime changed; file was rewritten");
    }

    #[test]
    fn changed_content_returns_written() {
        let tmp = TempDir::new().unwrap();
        write_config(tmp.path(), &core(), "v1\n").unwrap();
        let result = write_config(tmp.path(), &core(), "v2\n").unwrap();
        assert!(matches!(result, WriteResult::Written { .. }));
        assert_eq!(fs::read_to_string(result.path()).unwrap(), "v2\n");
    }

    #[test]
    fn tmp_file_removed_after_write() {
        let tmp = TempDir::new().unwrap();
        let result = write_config(tmp.path(), &core(), "data\n").unwrap();
        let tmp_path = PathBuf::from(format!("{}.netdeploy.tmp", result.path().display()));
        assert!(!tmp_path.exists(), ".netdeploy.tmp must be cleaned up");
    }

    #[test]
    fn creates_output_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("out").join("configs");
        let result = write_config(&dir, &core(), "content\n").unwrap();
        assert!(result.path().exists());
    }

    #[test]
    fn crlf_and_lf_content_share_the_same_digest() {
        let tmp = TempDir::new().unwrap();
        let first = write_config(tmp.path(), &core(), "line1\r\nline2\r\n").unwrap();
        assert!(matches!(first, WriteResult::Written { .. }));

        let second = write_config(tmp.path(), &core(), "line1\nline2\n").unwrap();
        assert!(matches!(second, WriteResult::Unchanged { .. }));

        assert_eq!(fs::read_to_string(second.path()).unwrap(), "line1\nline2\n");
        assert_eq!(digest("a\r\nb"), digest("a\nb"));
    }

    #[test]
    #[cfg(unix)]
    fn rename_failure_leaves_original_and_cleans_tmp() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempDir::new().unwrap();
        let readonly_dir = root.path().join("readonly");
        fs::create_dir_all(&readonly_dir).unwrap();

        let path = readonly_dir.join("core-sw-01.cfg");
        fs::write(&path, "original").unwrap();

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o555);
        fs::set_permissions(&readonly_dir, perms).unwrap();

        let tmp_dir = TempDir::new().unwrap();
        let tmp_path = tmp_dir.path().join("core-sw-01.cfg.netdeploy.tmp");

        let err = write_with_tmp(&path, "new content", &tmp_path)
            .expect_err("rename should fail on readonly dir");
        assert!(matches!(err, DeployError::Io { .. }));

        let current = fs::read_to_string(&path).unwrap();
        assert_eq!(current, "original", "original file should be intact");
        assert!(!tmp_path.exists(), ".netdeploy.tmp should be cleaned up");

        let mut perms = fs::metadata(&readonly_dir).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&readonly_dir, perms).unwrap();
    }
}
