//! # netdeploy-orchestrator
//!
//! Drives a deployment run: loads the inventory, validates templates
//! against each device's variables, renders and (unless dry run) pushes
//! configurations device by device in priority order.
//!
//! - [`orchestrator`] — [`Orchestrator`] and its options
//! - [`result`] — [`DeviceResult`], [`DeploymentResult`]
//! - [`writer`] — hash-gated atomic write of generated configurations
//! - [`diff`] — unified diff against previously generated files

pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod result;
pub mod writer;

pub use diff::{diff_config, ConfigDiff};
pub use error::DeployError;
pub use orchestrator::{DeployOptions, Orchestrator, OrchestratorConfig, Reachability, ValidationReport};
pub use result::{DeploymentResult, DeviceResult, FailureStage};
pub use writer::{write_config, WriteResult};
