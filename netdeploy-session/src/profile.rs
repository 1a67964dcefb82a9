//! Per-platform CLI conventions, selected by `device_type`.

/// Commands and output markers for one device platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub name: &'static str,
    /// Sent before a configuration block.
    pub enter_config: Option<&'static str>,
    /// Sent after a configuration block unless the block already ends with it.
    pub exit_config: Option<&'static str>,
    /// Sent once after login.
    pub disable_paging: Option<&'static str>,
    /// Output containing any of these means the device rejected the command.
    pub error_markers: &'static [&'static str],
    /// Trailing text of a yes/no confirmation prompt (`save` on VRP).
    pub confirm_prompt: &'static str,
}

pub const HUAWEI: DeviceProfile = DeviceProfile {
    name: "huawei",
    enter_config: Some("system-view"),
    exit_config: Some("return"),
    disable_paging: Some("screen-length 0 temporary"),
    error_markers: &[
        "Error:",
        "Unrecognized command",
        "Incomplete command",
        "Wrong parameter",
        "Too many parameters",
        "% Invalid",
    ],
    confirm_prompt: "[Y/N]:",
};

/// Plain command execution with the common IOS-style markers.
pub const GENERIC: DeviceProfile = DeviceProfile {
    name: "generic",
    enter_config: None,
    exit_config: None,
    disable_paging: None,
    error_markers: &["Error:", "% Invalid", "% Incomplete", "% Ambiguous", "% Unknown command"],
    confirm_prompt: "[confirm]",
};

impl DeviceProfile {
    pub fn for_device_type(device_type: &str) -> Self {
        match device_type.to_ascii_lowercase().as_str() {
            "huawei" | "huawei_vrp" | "huawei_vrpv8" => HUAWEI,
            _ => GENERIC,
        }
    }

    /// The first output line carrying an error marker, if any.
    pub fn rejection<'a>(&self, output: &'a str) -> Option<&'a str> {
        output
            .lines()
            .find(|line| self.error_markers.iter().any(|m| line.contains(m)))
            .map(str::trim)
    }

    pub fn asks_confirmation(&self, output: &str) -> bool {
        output.trim_end().ends_with(self.confirm_prompt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
