//! Error types for netdeploy-renderer.

use std::path::PathBuf;

use netdeploy_core::UnknownRole;
use thiserror::Error;

/// All errors that can arise from template loading and rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// No `<name>.j2` or `<name>.tera` file in the template directory.
    #[error("template '{name}' not found in {dir}")]
    TemplateNotFound { name: String, dir: PathBuf },

    /// The template failed to parse; rendering was not attempted.
    #[error("template '{template}' has syntax errors: {}", .errors.join("; "))]
    Syntax { template: String, errors: Vec<String> },

    /// A variable the template needs is absent from the binding.
    #[error("template '{template}' references undefined variable '{name}'")]
    UndefinedVariable { template: String, name: String },

    #[error(transparent)]
    UnknownRole(#[from] UnknownRole),

    /// Tera template engine error, reported with its whole cause chain.
    #[error("template engine error: {}", error_chain(.0))]
    Tera(#[from] tera::Error),

    /// JSON serialization error (building tera context).
    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while reading the template directory.
    #[error("template io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Join an error and all of its sources into one line.
///
/// Tera nests the useful part ("Variable `x` not found", the pest parse
/// position) under a generic "Failed to render" message.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let msg = inner.to_string();
        if !parts.contains(&msg) {
            parts.push(msg);
        }
        source = inner.source();
    }
    parts.join(": ")
}
