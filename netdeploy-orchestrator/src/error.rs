//! Error types for netdeploy-orchestrator.
//!
//! Only structural problems are errors here. Anything that goes wrong for
//! a single device ends up in its [`crate::DeviceResult`] instead.

use std::path::PathBuf;

use thiserror::Error;

use netdeploy_core::InventoryError;
use netdeploy_renderer::RenderError;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Inventory missing, unparsable or failing schema checks.
    #[error("inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Template directory unreadable or template file missing.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("no inventory loaded")]
    InventoryNotLoaded,

    #[error("templates have not been validated against the inventory")]
    TemplatesNotValidated,

    #[error("device '{0}' is not in the inventory")]
    UnknownDevice(String),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`DeployError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DeployError {
    DeployError::Io {
        path: path.into(),
        source,
    }
}
