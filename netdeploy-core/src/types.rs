//! Domain types for devices and template variables.
//!
//! All types are serializable/deserializable via serde + serde_yaml.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionOverrides, Credentials};
use crate::error::UnknownRole;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed, unique device identifier from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeviceName(pub String);

impl DeviceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DeviceName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The closed set of device roles. Deployment order across roles is
/// management → core → access → edge, expressed through device priorities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceRole {
    Management,
    Core,
    Access,
    #[serde(alias = "router")]
    Edge,
}

impl DeviceRole {
    /// All roles in deployment order.
    pub fn all() -> &'static [DeviceRole] {
        &[
            DeviceRole::Management,
            DeviceRole::Core,
            DeviceRole::Access,
            DeviceRole::Edge,
        ]
    }

    /// Template used for this role when a device does not name one.
    pub fn default_template(&self) -> &'static str {
        match self {
            DeviceRole::Management => "management_switch",
            DeviceRole::Core => "core_switch",
            DeviceRole::Access => "access_switch",
            DeviceRole::Edge => "edge_router",
        }
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRole::Management => write!(f, "management"),
            DeviceRole::Core => write!(f, "core"),
            DeviceRole::Access => write!(f, "access"),
            DeviceRole::Edge => write!(f, "edge"),
        }
    }
}

impl FromStr for DeviceRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "management" => Ok(DeviceRole::Management),
            "core" => Ok(DeviceRole::Core),
            "access" => Ok(DeviceRole::Access),
            "edge" | "router" => Ok(DeviceRole::Edge),
            _ => Err(UnknownRole(s.to_owned())),
        }
    }
}

// ---------------------------------------------------------------------------
// Template variables
// ---------------------------------------------------------------------------

/// Ordered variable binding handed to the renderer.
pub type Variables = BTreeMap<String, VariableValue>;

/// A template variable value. Closed on purpose: anything the inventory
/// can express maps onto one of these variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<VariableValue>),
    Map(Variables),
}

impl VariableValue {
    /// Follow a dotted path (`routing.ospf.area`) through nested maps.
    pub fn lookup(&self, path: &str) -> Option<&VariableValue> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                VariableValue::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

impl From<&str> for VariableValue {
    fn from(s: &str) -> Self {
        VariableValue::String(s.to_owned())
    }
}

impl From<String> for VariableValue {
    fn from(s: String) -> Self {
        VariableValue::String(s)
    }
}

impl From<i64> for VariableValue {
    fn from(n: i64) -> Self {
        VariableValue::Integer(n)
    }
}

impl From<bool> for VariableValue {
    fn from(b: bool) -> Self {
        VariableValue::Bool(b)
    }
}

impl From<Variables> for VariableValue {
    fn from(map: Variables) -> Self {
        VariableValue::Map(map)
    }
}

impl From<Vec<VariableValue>> for VariableValue {
    fn from(list: Vec<VariableValue>) -> Self {
        VariableValue::List(list)
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// One managed network endpoint, fully resolved from the inventory.
///
/// Devices are loaded once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Device {
    pub name: DeviceName,
    pub address: String,
    pub role: DeviceRole,
    /// Template name (file stem in the template directory).
    pub template: String,
    /// Deployment order key; lower deploys first.
    pub priority: u32,
    pub credentials: Credentials,
    pub connection: ConnectionOverrides,
    pub variables: Variables,
}

impl Device {
    /// Device-level connection overrides with the credential block on top.
    pub fn connection_overrides(&self) -> ConnectionOverrides {
        self.connection.clone().with_credentials(&self.credentials)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
