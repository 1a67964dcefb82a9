//! YAML device inventory.
//!
//! # Document layout
//!
//! ```yaml
//! global_settings:
//!   dry_run_default: true
//! defaults:
//!   connection: { username: admin, key_file: ~/.ssh/id_rsa }
//!   variables: { ntp_server: 10.0.0.1 }
//! vlans:                       # reference table, exposed to templates as `vlans`
//!   "10": { name: Management }
//! devices:
//!   - name: mgmt-sw-01
//!     address: 192.168.10.10   # alias: ip
//!     role: management
//!     priority: 1              # alias: deployment_order
//!     template: management_switch   # optional, defaults from role
//!     credentials: { username: admin }
//!     variables: { hostname: MGMT-SW-01 }
//! ```
//!
//! Loading is two-step: serde parses the document (missing required fields
//! surface as [`InventoryError::Parse`]), then `validate` checks the rules
//! serde cannot express and reports all of them at once as
//! [`InventoryError::Invalid`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionConfig, ConnectionOverrides, Credentials};
use crate::error::InventoryError;
use crate::types::{Device, DeviceName, DeviceRole, VariableValue, Variables};

// ---------------------------------------------------------------------------
// 1. Document types
// ---------------------------------------------------------------------------

/// Run-wide switches from `global_settings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Deploy in dry-run mode unless the operator asks for a live run.
    #[serde(default = "default_true")]
    pub dry_run_default: bool,
    /// Stop at the first failed device and skip the rest. The CLI's
    /// `--continue-on-error` overrides it.
    #[serde(default = "default_true")]
    pub halt_on_failure: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            dry_run_default: true,
            halt_on_failure: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Inventory-wide defaults applied beneath every device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InventoryDefaults {
    #[serde(default)]
    pub connection: ConnectionOverrides,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    global_settings: GlobalSettings,
    #[serde(default)]
    defaults: InventoryDefaults,
    #[serde(default)]
    vlans: Variables,
    devices: Vec<DeviceSpec>,
}

#[derive(Debug, Deserialize)]
struct DeviceSpec {
    name: String,
    #[serde(alias = "ip")]
    address: String,
    role: DeviceRole,
    #[serde(default)]
    template: Option<String>,
    #[serde(alias = "deployment_order")]
    priority: u32,
    #[serde(default)]
    credentials: Credentials,
    #[serde(default)]
    connection: ConnectionOverrides,
    #[serde(default)]
    variables: Variables,
}

impl DeviceSpec {
    fn resolve(self) -> Device {
        let template = match self.template {
            Some(t) => strip_template_extension(t.trim()),
            None => self.role.default_template().to_string(),
        };
        Device {
            name: DeviceName::from(self.name.trim()),
            address: self.address.trim().to_string(),
            role: self.role,
            template,
            priority: self.priority,
            credentials: self.credentials,
            connection: self.connection,
            variables: self.variables,
        }
    }
}

/// `core_switch.j2` and `core_switch` name the same template.
fn strip_template_extension(name: &str) -> String {
    for ext in [".j2", ".tera"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    name.to_string()
}

// ---------------------------------------------------------------------------
// 2. Inventory
// ---------------------------------------------------------------------------

/// A loaded, schema-checked inventory. Devices keep file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Inventory {
    pub path: PathBuf,
    pub settings: GlobalSettings,
    pub defaults: InventoryDefaults,
    pub vlans: Variables,
    pub devices: Vec<Device>,
}

impl Inventory {
    /// Load and validate the inventory at `path`.
    ///
    /// Returns `InventoryError::NotFound` if absent, `InventoryError::Parse`
    /// (with path + line context) on malformed YAML or missing fields, and
    /// `InventoryError::Invalid` on schema violations.
    pub fn load_at(path: &Path) -> Result<Self, InventoryError> {
        if !path.exists() {
            return Err(InventoryError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(path, &contents)
    }

    /// Parse and validate inventory YAML. `path` is used for error context only.
    pub fn from_yaml(path: &Path, contents: &str) -> Result<Self, InventoryError> {
        let file: InventoryFile =
            serde_yaml::from_str(contents).map_err(|e| InventoryError::Parse {
                path: path.to_path_buf(),
                source: e,
            })?;
        let devices: Vec<Device> = file.devices.into_iter().map(DeviceSpec::resolve).collect();
        validate(path, &devices)?;
        Ok(Self {
            path: path.to_path_buf(),
            settings: file.global_settings,
            defaults: file.defaults,
            vlans: file.vlans,
            devices,
        })
    }

    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name.0 == name)
    }

    /// Devices in deployment order: ascending priority, ties in file order.
    pub fn deployment_order(&self) -> Vec<Device> {
        let mut ordered = self.devices.clone();
        // `sort_by_key` is stable, which is what keeps ties in file order.
        ordered.sort_by_key(|d| d.priority);
        ordered
    }

    /// Reject devices whose template is not in `known`.
    pub fn check_templates(&self, known: &[String]) -> Result<(), InventoryError> {
        let problems: Vec<String> = self
            .devices
            .iter()
            .filter(|d| !known.iter().any(|k| k == &d.template))
            .map(|d| format!("device '{}' references unknown template '{}'", d.name, d.template))
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(InventoryError::Invalid {
                path: self.path.clone(),
                problems,
            })
        }
    }

    /// Variable binding for `device`, lowest precedence first: built-ins,
    /// the `vlans` reference table, `defaults.variables`, device variables.
    pub fn binding(&self, device: &Device) -> Variables {
        let mut vars = Variables::new();
        vars.insert("device_name".into(), VariableValue::from(device.name.0.as_str()));
        vars.insert("device_address".into(), VariableValue::from(device.address.as_str()));
        vars.insert("device_role".into(), VariableValue::from(device.role.to_string()));
        vars.insert("template_name".into(), VariableValue::from(device.template.as_str()));
        if !self.vlans.is_empty() {
            vars.insert("vlans".into(), VariableValue::Map(self.vlans.clone()));
        }
        vars.extend(self.defaults.variables.clone());
        vars.extend(device.variables.clone());
        vars
    }

    /// Session parameters for `device`: defaults ← inventory ← operator ← device.
    pub fn connection_config(
        &self,
        device: &Device,
        operator: &ConnectionOverrides,
    ) -> ConnectionConfig {
        ConnectionConfig::default()
            .apply(&self.defaults.connection)
            .apply(operator)
            .apply(&device.connection_overrides())
    }
}

// ---------------------------------------------------------------------------
// 3. Schema validation
// ---------------------------------------------------------------------------

fn validate(path: &Path, devices: &[Device]) -> Result<(), InventoryError> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for (idx, device) in devices.iter().enumerate() {
        let name = device.name.as_str();
        if name.is_empty() {
            problems.push(format!("device #{} has an empty name", idx + 1));
            continue;
        }
        if name.contains(&['/', '\\'][..]) || name == "." || name == ".." {
            problems.push(format!("device name '{name}' is not usable as a file name"));
        }
        if !seen.insert(name) {
            problems.push(format!("duplicate device name '{name}'"));
        }
        if device.address.is_empty() {
            problems.push(format!("device '{name}' has an empty address"));
        }
        if device.template.is_empty() {
            problems.push(format!("device '{name}' has an empty template reference"));
        }
    }
    if problems.is_empty() {
        Ok(())
    } else {
        Err(InventoryError::Invalid {
            path: path.to_path_buf(),
            problems,
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
