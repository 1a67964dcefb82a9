//! Per-device and per-run deployment outcomes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use netdeploy_core::{Device, DeviceName};

/// Where a device's deployment stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Render,
    Connect,
    Apply,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureStage::Render => "render",
            FailureStage::Connect => "connect",
            FailureStage::Apply => "apply",
        })
    }
}

/// Outcome for one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceResult {
    pub device: DeviceName,
    pub success: bool,
    pub template: String,
    /// Non-blank lines of the rendered configuration.
    pub config_lines: usize,
    pub elapsed: Duration,
    pub error: Option<String>,
    pub stage: Option<FailureStage>,
    /// Hex SHA-256 of the rendered configuration, when rendering got that far.
    pub digest: Option<String>,
    /// The session did not close cleanly. Does not affect `success`.
    pub disconnect_error: Option<String>,
}

impl DeviceResult {
    pub(crate) fn succeeded(device: &Device, config: &str, digest: String, elapsed: Duration) -> Self {
        DeviceResult {
            device: device.name.clone(),
            success: true,
            template: device.template.clone(),
            config_lines: count_lines(config),
            elapsed,
            error: None,
            stage: None,
            digest: Some(digest),
            disconnect_error: None,
        }
    }

    pub(crate) fn failed(
        device: &Device,
        stage: FailureStage,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        DeviceResult {
            device: device.name.clone(),
            success: false,
            template: device.template.clone(),
            config_lines: 0,
            elapsed,
            error: Some(error.into()),
            stage: Some(stage),
            digest: None,
            disconnect_error: None,
        }
    }

    /// Keep what rendering produced on a result that failed later.
    pub(crate) fn with_rendered(mut self, config: &str, digest: String) -> Self {
        self.config_lines = count_lines(config);
        self.digest = Some(digest);
        self
    }

    pub(crate) fn with_disconnect_error(mut self, error: Option<String>) -> Self {
        self.disconnect_error = error;
        self
    }
}

pub fn count_lines(config: &str) -> usize {
    config.lines().filter(|l| !l.trim().is_empty()).count()
}

/// Outcome of one deployment run.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentResult {
    /// All attempted devices succeeded and none were skipped.
    pub success: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub successful: Vec<DeviceName>,
    pub failed: Vec<DeviceName>,
    /// Not attempted because an earlier device failed and the run halted.
    pub skipped: Vec<DeviceName>,
    pub elapsed: Duration,
    pub total_config_lines: usize,
    pub results: BTreeMap<DeviceName, DeviceResult>,
}

impl DeploymentResult {
    pub(crate) fn new(dry_run: bool) -> Self {
        DeploymentResult {
            success: true,
            dry_run,
            started_at: Utc::now(),
            successful: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            elapsed: Duration::ZERO,
            total_config_lines: 0,
            results: BTreeMap::new(),
        }
    }

    pub(crate) fn record(&mut self, result: DeviceResult) {
        if result.success {
            self.successful.push(result.device.clone());
        } else {
            self.failed.push(result.device.clone());
        }
        self.total_config_lines += result.config_lines;
        self.results.insert(result.device.clone(), result);
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.success = self.failed.is_empty() && self.skipped.is_empty();
    }

    /// Devices the run covered, skipped ones included.
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len() + self.skipped.len()
    }

    /// `"2/3 devices deployed successfully (66.7%)"`
    pub fn summary(&self) -> String {
        let total = self.total();
        let rate = if total == 0 {
            0.0
        } else {
            self.successful.len() as f64 * 100.0 / total as f64
        };
        format!(
            "{}/{} devices deployed successfully ({rate:.1}%)",
            self.successful.len(),
            total
        )
    }

    pub fn result(&self, device: &str) -> Option<&DeviceResult> {
        self.results.get(&DeviceName::from(device))
    }
}
