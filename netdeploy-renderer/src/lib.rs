//! # netdeploy-renderer
//!
//! Tera-based renderer that turns a device's variable binding into its
//! configuration text, with strict undefined-variable checks.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use netdeploy_core::{VariableValue, Variables};
//! use netdeploy_renderer::Renderer;
//!
//! fn render_core() -> Result<String, netdeploy_renderer::RenderError> {
//!     let renderer = Renderer::new("templates")?;
//!     let mut vars = Variables::new();
//!     vars.insert("hostname".into(), VariableValue::from("CORE-SW-01"));
//!     renderer.generate_config("core", &vars)
//! }
//! ```

pub mod engine;
pub mod error;
pub mod filters;
pub mod variables;

pub use engine::{Renderer, Template, TemplateInfo, TemplateValidation};
pub use error::RenderError;
pub use variables::InferredVariables;
