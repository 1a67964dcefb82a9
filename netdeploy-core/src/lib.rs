//! netdeploy core library — device data model, connection settings, inventory loading.
//!
//! - [`types`] — device, role and variable types
//! - [`connection`] — [`ConnectionConfig`] and the override layers merged into it
//! - [`inventory`] — YAML inventory load + schema validation
//! - [`error`] — [`InventoryError`]

pub mod connection;
pub mod error;
pub mod inventory;
pub mod types;

pub use connection::{Backoff, ConnectionConfig, ConnectionOverrides, Credentials};
pub use error::{InventoryError, UnknownRole};
pub use inventory::{GlobalSettings, Inventory, InventoryDefaults};
pub use types::{Device, DeviceName, DeviceRole, VariableValue, Variables};
