//! Error types for netdeploy-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading an inventory.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Underlying I/O failure (permission denied, not a file, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The inventory file did not exist at the given path.
    #[error("inventory not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error, including a missing required field. Carries the
    /// file path and the line context from serde_yaml.
    #[error("failed to parse inventory at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but breaks a schema rule (duplicate device name,
    /// empty address, unknown template, ...). Every problem found is listed.
    #[error("invalid inventory at {path}: {}", .problems.join("; "))]
    Invalid { path: PathBuf, problems: Vec<String> },
}

/// A role string that is not one of the closed set of device roles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown device role '{0}'; expected: management, core, access, edge")]
pub struct UnknownRole(pub String);
