//! Unified diff of a freshly rendered configuration against the file
//! currently in the output directory. Nothing is written.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use similar::TextDiff;

use netdeploy_core::DeviceName;

use crate::error::{io_err, DeployError};
use crate::writer::{config_path, normalize_line_endings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDiff {
    pub device: DeviceName,
    pub path: PathBuf,
    /// No file existed yet; the diff is all additions.
    pub is_new: bool,
    pub unified_diff: String,
}

/// `None` when the file on disk already matches `rendered`.
pub fn diff_config(
    dir: &Path,
    device: &DeviceName,
    rendered: &str,
) -> Result<Option<ConfigDiff>, DeployError> {
    let path = config_path(dir, device);
    let rendered = normalize_line_endings(rendered);
    let existing = read_existing(&path)?;
    let is_new = existing.is_none();
    let existing = existing.unwrap_or_default();
    if existing == rendered {
        return Ok(None);
    }

    let old_header = format!("a/{device}.cfg");
    let new_header = format!("b/{device}.cfg");
    let unified = TextDiff::from_lines(&existing, &rendered)
        .unified_diff()
        .header(&old_header, &new_header)
        .context_radius(3)
        .to_string();

    Ok(Some(ConfigDiff {
        device: device.clone(),
        path,
        is_new,
        unified_diff: unified,
    }))
}

fn read_existing(path: &Path) -> Result<Option<String>, DeployError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(normalize_line_endings(&content))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}
